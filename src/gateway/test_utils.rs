//! Shared test utilities for the `gateway` module.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use super::error::GatewayError;
use super::provider::{LlmProvider, ProviderMetadata, ProviderResponse, TokenUsage};

/// Builds a response with fixed token counts.
pub(crate) fn response(text: &str, model: &str) -> ProviderResponse {
    ProviderResponse {
        text: text.to_string(),
        model: model.to_string(),
        tokens: TokenUsage {
            input: 5,
            output: 7,
            total: 12,
        },
    }
}

/// Mock provider with a pre-programmed queue of results.
///
/// Results are returned in FIFO order. When the queue is exhausted,
/// subsequent calls fail with a transient "no more mock responses" error.
/// Every call records the question so tests can inspect what was sent.
pub(crate) struct ConfigurableMockProvider {
    id: String,
    responses: Arc<Mutex<VecDeque<Result<ProviderResponse, GatewayError>>>>,
    recorded_questions: Arc<Mutex<Vec<String>>>,
}

impl ConfigurableMockProvider {
    /// Creates a mock that returns the given results in order.
    pub(crate) fn new(id: &str, responses: Vec<Result<ProviderResponse, GatewayError>>) -> Self {
        Self {
            id: id.to_string(),
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            recorded_questions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Creates a mock that answers every call with `text`.
    pub(crate) fn answering(id: &str, text: &str, calls: usize) -> Self {
        Self::new(
            id,
            (0..calls)
                .map(|_| Ok(response(text, &format!("{id}-model"))))
                .collect(),
        )
    }

    /// Returns a handle for inspecting the questions after the mock has
    /// been moved into a gateway.
    pub(crate) fn question_handle(&self) -> QuestionRecordHandle {
        QuestionRecordHandle {
            recorded_questions: self.recorded_questions.clone(),
        }
    }
}

/// Shared handle to a mock provider's recorded questions.
pub(crate) struct QuestionRecordHandle {
    recorded_questions: Arc<Mutex<Vec<String>>>,
}

impl QuestionRecordHandle {
    /// Returns all recorded questions.
    pub(crate) fn questions(&self) -> Vec<String> {
        self.recorded_questions.lock().unwrap().clone()
    }

    /// Returns the number of requests made.
    pub(crate) fn request_count(&self) -> usize {
        self.recorded_questions.lock().unwrap().len()
    }
}

impl LlmProvider for ConfigurableMockProvider {
    fn send_request<'a>(
        &'a self,
        question: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, GatewayError>> + Send + 'a>> {
        let responses = self.responses.clone();
        let recorded = self.recorded_questions.clone();
        let question = question.to_string();
        let id = self.id.clone();
        Box::pin(async move {
            recorded.lock().unwrap().push(question);
            responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::transient(&id, "no more mock responses")))
        })
    }

    fn get_metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            provider: self.id.clone(),
            model: format!("{}-model", self.id),
        }
    }
}
