//! Loading a run's answers and summarising its analysis.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::detector::{AnalysisRecord, Answer};
use crate::store::{latest_run, parse_output_id, RunId, RunStore, StoreError};

/// Per-brand totals over a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrandSummary {
    /// Brand name.
    pub brand: String,
    /// Whether this is the target brand.
    pub is_target: bool,
    /// Mentions across every answer.
    pub total_mentions: usize,
    /// Answers mentioning the brand at least once.
    pub answers_found: usize,
    /// Sum of position scores.
    pub score_sum: f64,
    /// `score_sum / records * brands`.
    pub average_score: f64,
}

/// Loads every answer of `run`, or of the most recent run.
///
/// One [`Answer`] is produced per present provider slot. Records that
/// cannot be read or parsed are skipped with a warning. Answers are sorted
/// by question id.
pub fn load_answers(store: &dyn RunStore, run: Option<&RunId>) -> Result<(RunId, Vec<Answer>)> {
    let run = match run {
        Some(run) if store.run_exists(run) => run.clone(),
        Some(run) => {
            return Err(StoreError::SourceNotFound {
                what: "Run".to_string(),
                path: store.run_location(run),
            }
            .into())
        }
        None => latest_run(store)?,
    };

    let names = store
        .output_names(&run)
        .with_context(|| format!("Failed to list outputs of {run}"))?;

    let mut answers = Vec::new();
    for name in names.iter().filter(|name| parse_output_id(name).is_some()) {
        let output = match store.read_output(&run, name) {
            Ok(output) => output,
            Err(e) => {
                warn!(file = %name, error = %e, "Skipping unreadable output");
                continue;
            }
        };

        for (provider, response) in output.response {
            let Some(response) = response else {
                debug!(query_id = output.query_id, provider = %provider, "Provider slot absent");
                continue;
            };
            answers.push(Answer {
                question_id: output.query_id,
                provider,
                question: output.question.clone(),
                answer_text: response.text,
            });
        }
    }

    answers.sort_by_key(|answer| answer.question_id);
    info!(run = %run, answers = answers.len(), "Loaded answers");
    Ok((run, answers))
}

/// Aggregates records per brand, most mentioned first.
///
/// Brands with equal totals keep the order in which they first appear.
pub fn summarize(records: &[AnalysisRecord]) -> Vec<BrandSummary> {
    let mut summaries: Vec<BrandSummary> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records {
        let slot = *index.entry(record.brand.as_str()).or_insert_with(|| {
            summaries.push(BrandSummary {
                brand: record.brand.clone(),
                is_target: record.is_target,
                total_mentions: 0,
                answers_found: 0,
                score_sum: 0.0,
                average_score: 0.0,
            });
            summaries.len() - 1
        });

        let summary = &mut summaries[slot];
        summary.total_mentions += record.count;
        summary.score_sum += record.score;
        if record.found {
            summary.answers_found += 1;
        }
    }

    let brand_count = summaries.len() as f64;
    let record_count = records.len() as f64;
    for summary in &mut summaries {
        summary.average_score = summary.score_sum / record_count * brand_count;
    }

    summaries.sort_by(|a, b| b.total_mentions.cmp(&a.total_mentions));
    summaries
}

/// Renders the summary table printed after an analysis.
pub fn render_summary(summaries: &[BrandSummary]) -> String {
    let mut out = String::from("Brand Mentions Summary\n\n");
    for summary in summaries {
        let marker = if summary.is_target { " (TARGET)" } else { "" };
        out.push_str(&format!(
            "{}{marker}: {} mentions, found in {} answers, avg score: {:.2}\n",
            summary.brand, summary.total_mentions, summary.answers_found, summary.average_score
        ));
    }
    out
}

/// Writes `analysis.json` into `run`.
pub fn save_analysis(
    store: &dyn RunStore,
    run: &RunId,
    records: &[AnalysisRecord],
) -> Result<PathBuf> {
    store
        .write_analysis(run, records)
        .with_context(|| format!("Failed to save analysis for {run}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::gateway::{ProviderResponse, TokenUsage};
    use crate::store::{FsRunStore, QueryOutput, ANALYSIS_FILE};

    fn record(
        question_id: u64,
        brand: &str,
        is_target: bool,
        count: usize,
        score: f64,
    ) -> AnalysisRecord {
        AnalysisRecord {
            question_id,
            provider: "openai".to_string(),
            brand: brand.to_string(),
            is_target,
            found: count > 0,
            count,
            most_mentioned: String::new(),
            score,
        }
    }

    fn slot(text: &str) -> Option<ProviderResponse> {
        Some(ProviderResponse {
            text: text.to_string(),
            model: "m".to_string(),
            tokens: TokenUsage::default(),
        })
    }

    fn write(
        store: &FsRunStore,
        run: &RunId,
        id: u64,
        response: BTreeMap<String, Option<ProviderResponse>>,
    ) {
        store
            .write_output(
                run,
                &QueryOutput {
                    query_id: id,
                    question: format!("q{id}"),
                    response,
                },
            )
            .unwrap();
    }

    #[test]
    fn loads_present_slots_sorted_by_question() {
        let dir = TempDir::new().unwrap();
        let store = FsRunStore::new(dir.path());
        let run = store.create_run().unwrap();
        write(
            &store,
            &run,
            10,
            BTreeMap::from([("openai".to_string(), slot("ten"))]),
        );
        write(
            &store,
            &run,
            2,
            BTreeMap::from([
                ("anthropic".to_string(), slot("two-a")),
                ("google".to_string(), None),
                ("openai".to_string(), slot("two-o")),
            ]),
        );
        fs::write(store.run_location(&run).join("output_3.json"), "garbage").unwrap();
        fs::write(store.run_location(&run).join("notes.json"), "{}").unwrap();

        let (loaded_run, answers) = load_answers(&store, None).unwrap();

        assert_eq!(loaded_run, run);
        let summary: Vec<(u64, &str, &str)> = answers
            .iter()
            .map(|a| (a.question_id, a.provider.as_str(), a.answer_text.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (2, "anthropic", "two-a"),
                (2, "openai", "two-o"),
                (10, "openai", "ten"),
            ]
        );
    }

    #[test]
    fn unknown_run_is_an_error_naming_it() {
        let dir = TempDir::new().unwrap();
        let store = FsRunStore::new(dir.path());

        let err = load_answers(&store, Some(&RunId::new("run_missing"))).unwrap_err();

        assert!(err.to_string().contains("run_missing"));
    }

    #[test]
    fn no_runs_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FsRunStore::new(dir.path().join("results"));
        assert!(load_answers(&store, None).is_err());
    }

    #[test]
    fn summary_keeps_average_formula() {
        let records = vec![
            record(1, "Obsidian", true, 2, 1.0),
            record(1, "Notion", false, 0, 0.0),
            record(2, "Obsidian", true, 0, 0.0),
            record(2, "Notion", false, 3, 0.6),
        ];

        let summaries = summarize(&records);

        assert_eq!(summaries[0].brand, "Notion");
        assert_eq!(summaries[0].total_mentions, 3);
        assert_eq!(summaries[0].answers_found, 1);
        // 0.6 / 4 records * 2 brands
        assert!((summaries[0].average_score - 0.3).abs() < 1e-9);
        assert!((summaries[1].average_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn summary_ties_keep_first_seen_order() {
        let records = vec![
            record(1, "Obsidian", true, 1, 1.0),
            record(1, "Notion", false, 1, 0.3),
            record(1, "Logseq", false, 1, 0.6),
        ];

        let brands: Vec<String> = summarize(&records).into_iter().map(|s| s.brand).collect();
        assert_eq!(brands, vec!["Obsidian", "Notion", "Logseq"]);
    }

    #[test]
    fn summary_of_nothing_is_empty() {
        assert!(summarize(&[]).is_empty());
    }

    #[test]
    fn rendered_summary() {
        let records = vec![
            record(1, "Obsidian", true, 2, 1.0),
            record(1, "Notion", false, 5, 0.6),
            record(2, "Obsidian", true, 1, 0.3),
            record(2, "Notion", false, 0, 0.0),
        ];

        insta::assert_snapshot!(render_summary(&summarize(&records)), @r"
        Brand Mentions Summary

        Notion: 5 mentions, found in 1 answers, avg score: 0.30
        Obsidian (TARGET): 3 mentions, found in 2 answers, avg score: 0.65
        ");
    }

    #[test]
    fn analysis_is_saved_into_the_run() {
        let dir = TempDir::new().unwrap();
        let store = FsRunStore::new(dir.path());
        let run = store.create_run().unwrap();
        let records = vec![record(1, "Obsidian", true, 1, 1.0)];

        let path = save_analysis(&store, &run, &records).unwrap();

        assert_eq!(path, store.run_location(&run).join(ANALYSIS_FILE));
        let saved: Vec<AnalysisRecord> =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved, records);
    }
}
