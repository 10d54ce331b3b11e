//! LLM-assisted rephrasing of generated queries.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::Query;
use crate::gateway::Gateway;

/// Queries sent to the provider per request.
pub const BATCH_SIZE: usize = 15;

const INSTRUCTIONS: &str = "Rephrase these to sound human. Keep brands. \
Return JSON array of objects with \"id\" and \"query\" fields, one per question, \
keeping each id.";

/// One rephrased query as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rephrasing {
    /// Id of the original query.
    pub id: u64,
    /// New question text.
    pub query: String,
}

/// Builds the rephrasing prompt for one batch.
pub fn build_prompt(batch: &[Query]) -> String {
    let mut prompt = format!("{INSTRUCTIONS}\n\n");
    for query in batch {
        prompt.push_str(&format!("{}. {}\n", query.id, query.text));
    }
    prompt
}

/// Parses a provider reply, tolerating a surrounding markdown code fence.
pub fn parse_rephrasings(content: &str) -> Result<Vec<Rephrasing>> {
    let json_content = if content.contains("```json") {
        content
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(content)
            .trim()
    } else if content.contains("```") {
        content
            .split("```")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(content)
            .trim()
    } else {
        content.trim()
    };

    serde_json::from_str(json_content).context("Provider reply is not a JSON array of rephrasings")
}

/// Applies rephrasings to `batch`; unknown ids and empty texts are ignored.
fn apply_rephrasings(batch: &[Query], rephrasings: Vec<Rephrasing>) -> Vec<Query> {
    let mut by_id: HashMap<u64, String> = rephrasings
        .into_iter()
        .filter(|r| !r.query.trim().is_empty())
        .map(|r| (r.id, r.query.trim().to_string()))
        .collect();

    batch
        .iter()
        .map(|query| Query {
            text: by_id.remove(&query.id).unwrap_or_else(|| query.text.clone()),
            ..query.clone()
        })
        .collect()
}

/// Rephrases every query with `provider_id`, batch by batch.
///
/// A batch whose request or reply fails keeps its original texts. Ids,
/// categories and order are never changed.
pub async fn enhance_queries(
    gateway: &Gateway,
    provider_id: &str,
    queries: &[Query],
) -> Vec<Query> {
    let mut enhanced = Vec::with_capacity(queries.len());

    for (index, batch) in queries.chunks(BATCH_SIZE).enumerate() {
        debug!(batch = index + 1, size = batch.len(), "Enhancing batch");

        let reply = match gateway.ask_provider(provider_id, &build_prompt(batch)).await {
            Ok(response) => response.text,
            Err(e) => {
                warn!(
                    batch = index + 1,
                    error = %e,
                    "Enhancement request failed, keeping originals"
                );
                enhanced.extend_from_slice(batch);
                continue;
            }
        };

        match parse_rephrasings(&reply) {
            Ok(rephrasings) => enhanced.extend(apply_rephrasings(batch, rephrasings)),
            Err(e) => {
                warn!(
                    batch = index + 1,
                    error = %e,
                    "Unusable enhancement reply, keeping originals"
                );
                enhanced.extend_from_slice(batch);
            }
        }
    }

    info!(count = enhanced.len(), "Enhanced queries");
    enhanced
}
