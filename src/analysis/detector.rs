//! Lexical mention detection and position scoring.
//!
//! Every alias is matched as a whole word, case-insensitively and literally.
//! Positions and lengths are counted in characters of the original answer.

use std::sync::Arc;

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::brands::BrandRegistry;

/// Answers per blocking task in [`analyze_answers_chunked`].
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Occurrences of one brand in one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    /// Brand name.
    pub brand: String,
    /// Whether this is the target brand.
    pub is_target: bool,
    /// `count > 0`.
    pub found: bool,
    /// Number of non-overlapping alias matches.
    pub count: usize,
    /// Character offset of the earliest match.
    pub first_position: Option<usize>,
    /// Length of the answer in characters.
    pub text_length: usize,
}

/// One provider's answer to one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Id of the query answered.
    pub question_id: u64,
    /// Provider that answered.
    pub provider: String,
    /// Question text.
    pub question: String,
    /// Answer text.
    pub answer_text: String,
}

/// Analysis of one brand in one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Id of the query answered.
    pub question_id: u64,
    /// Provider that answered.
    pub provider: String,
    /// Brand name.
    pub brand: String,
    /// Whether this is the target brand.
    pub is_target: bool,
    /// Whether the brand occurs at all.
    pub found: bool,
    /// Number of mentions.
    pub count: usize,
    /// Brand with the most mentions in this answer.
    pub most_mentioned: String,
    /// Position score of the first mention.
    pub score: f64,
}

struct BrandPatterns {
    name: String,
    is_target: bool,
    patterns: Vec<Regex>,
}

/// Compiled matcher for every brand of a registry.
pub struct MentionDetector {
    brands: Vec<BrandPatterns>,
}

impl MentionDetector {
    /// Compiles the aliases of `registry`.
    pub fn new(registry: &BrandRegistry) -> Result<Self> {
        let brands = registry
            .brands()
            .map(|(brand, is_target)| {
                let patterns = brand
                    .match_terms()
                    .into_iter()
                    .map(|term| {
                        RegexBuilder::new(&format!(r"\b{}\b", regex::escape(term)))
                            .case_insensitive(true)
                            .build()
                            .with_context(|| format!("Invalid alias for {}: {term}", brand.name))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(BrandPatterns {
                    name: brand.name.clone(),
                    is_target,
                    patterns,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { brands })
    }

    /// One [`Mention`] per brand, target first, then competitors in order.
    pub fn detect(&self, text: &str) -> Vec<Mention> {
        let text_length = text.chars().count();

        self.brands
            .iter()
            .map(|brand| {
                let mut spans: Vec<(usize, usize)> = brand
                    .patterns
                    .iter()
                    .flat_map(|pattern| pattern.find_iter(text).map(|m| (m.start(), m.end())))
                    .collect();
                // Earliest first, longest first on equal starts.
                spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

                let mut count = 0;
                let mut first_byte = None;
                let mut covered_until = 0;
                for (start, end) in spans {
                    if count > 0 && start < covered_until {
                        continue;
                    }
                    first_byte.get_or_insert(start);
                    covered_until = end;
                    count += 1;
                }

                Mention {
                    brand: brand.name.clone(),
                    is_target: brand.is_target,
                    found: count > 0,
                    count,
                    first_position: first_byte.map(|byte| text[..byte].chars().count()),
                    text_length,
                }
            })
            .collect()
    }

    /// One [`AnalysisRecord`] per brand per answer, in answer order.
    pub fn analyze(&self, answers: &[Answer]) -> Vec<AnalysisRecord> {
        let mut records = Vec::with_capacity(answers.len() * self.brands.len());

        for answer in answers {
            let mentions = self.detect(&answer.answer_text);
            let most_mentioned = most_mentioned(&mentions);

            records.extend(mentions.into_iter().map(|mention| AnalysisRecord {
                question_id: answer.question_id,
                provider: answer.provider.clone(),
                score: calculate_position_score(mention.first_position, mention.text_length),
                brand: mention.brand,
                is_target: mention.is_target,
                found: mention.found,
                count: mention.count,
                most_mentioned: most_mentioned.clone(),
            }));
        }

        records
    }
}

/// Highest count wins; ties go to the brand listed first.
fn most_mentioned(mentions: &[Mention]) -> String {
    let mut best: Option<&Mention> = None;
    for mention in mentions {
        if best.map_or(true, |b| mention.count > b.count) {
            best = Some(mention);
        }
    }
    best.map(|m| m.brand.clone()).unwrap_or_default()
}

/// Detects every brand of `registry` in `text`.
pub fn detect_mentions(text: &str, registry: &BrandRegistry) -> Result<Vec<Mention>> {
    Ok(MentionDetector::new(registry)?.detect(text))
}

/// Three-tier weight for where the first mention falls.
///
/// Within the first 20% of the text scores 1.0, within 60% scores 0.6,
/// later scores 0.3. No mention, or an empty text, scores 0.0.
pub fn calculate_position_score(first_position: Option<usize>, text_length: usize) -> f64 {
    let Some(position) = first_position else {
        return 0.0;
    };
    if text_length == 0 {
        return 0.0;
    }

    let relative = position as f64 / text_length as f64;
    if relative <= 0.20 {
        1.0
    } else if relative <= 0.60 {
        0.6
    } else {
        0.3
    }
}

/// Analyses `answers` against `registry`.
pub fn analyze_answers(
    answers: &[Answer],
    registry: &BrandRegistry,
) -> Result<Vec<AnalysisRecord>> {
    Ok(MentionDetector::new(registry)?.analyze(answers))
}

/// Like [`analyze_answers`], with chunks of `chunk_size` answers analysed on
/// the blocking pool. Output order matches the sequential analysis.
pub async fn analyze_answers_chunked(
    answers: Vec<Answer>,
    registry: &BrandRegistry,
    chunk_size: usize,
) -> Result<Vec<AnalysisRecord>> {
    let detector = Arc::new(MentionDetector::new(registry)?);
    let chunk_size = chunk_size.max(1);

    let handles: Vec<_> = answers
        .chunks(chunk_size)
        .map(<[Answer]>::to_vec)
        .map(|chunk| {
            let detector = Arc::clone(&detector);
            tokio::task::spawn_blocking(move || detector.analyze(&chunk))
        })
        .collect();

    debug!(chunks = handles.len(), chunk_size, "Analysing answers");

    let mut records = Vec::new();
    for handle in handles {
        records.extend(handle.await.context("Analysis task failed")?);
    }
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::analysis::Brand;

    fn registry(target: &[&str], competitors: &[(&str, &[&str])]) -> BrandRegistry {
        BrandRegistry {
            target: Brand::new("Obsidian", target.iter().copied()),
            competitors: competitors
                .iter()
                .map(|(name, aliases)| Brand::new(*name, aliases.iter().copied()))
                .collect(),
        }
    }

    fn target_mention(text: &str, aliases: &[&str]) -> Mention {
        detect_mentions(text, &registry(aliases, &[]))
            .unwrap()
            .remove(0)
    }

    fn answer(id: u64, text: &str) -> Answer {
        Answer {
            question_id: id,
            provider: "openai".to_string(),
            question: format!("q{id}"),
            answer_text: text.to_string(),
        }
    }

    #[test]
    fn counts_every_mention() {
        let mention = target_mention(
            "Obsidian is great. I use Obsidian daily. Obsidian rocks!",
            &["Obsidian"],
        );
        assert_eq!(mention.count, 3);
        assert_eq!(mention.first_position, Some(0));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let mention = target_mention("obsidian and OBSIDIAN are the same", &["Obsidian"]);
        assert_eq!(mention.count, 2);
    }

    #[test]
    fn finds_brand_by_alias_once() {
        let mention = target_mention(
            "Check out Obsidian.md for your notes",
            &["Obsidian", "Obsidian.md"],
        );
        assert!(mention.found);
        assert_eq!(mention.count, 1);
        assert_eq!(mention.first_position, Some(10));
    }

    #[test]
    fn requires_whole_words() {
        let mention = target_mention("Obsidianite is not a note app", &["Obsidian"]);
        assert!(!mention.found);
        assert_eq!(mention.first_position, None);
    }

    #[test]
    fn aliases_are_literal() {
        let mention = target_mention("Try Obsidian+ or ObsidianX", &["Obsidian+"]);
        assert_eq!(mention.count, 0);
        let mention = target_mention("the a.b tool", &["a.b"]);
        assert_eq!(mention.count, 1);
        let mention = target_mention("the axb tool", &["a.b"]);
        assert_eq!(mention.count, 0);
    }

    #[test]
    fn positions_count_characters() {
        let mention = target_mention("Café notes: Obsidian", &["Obsidian"]);
        assert_eq!(mention.first_position, Some(12));
        assert_eq!(mention.text_length, 20);
    }

    #[test]
    fn every_brand_gets_a_mention_in_registry_order() {
        let registry = registry(
            &["Obsidian"],
            &[("Notion", &["Notion"]), ("Roam Research", &["Roam Research", "Roam"])],
        );

        let mentions =
            detect_mentions("Notion and Roam Research are alternatives to Obsidian", &registry)
                .unwrap();

        let summary: Vec<(&str, bool, usize)> = mentions
            .iter()
            .map(|m| (m.brand.as_str(), m.is_target, m.count))
            .collect();
        assert_eq!(
            summary,
            vec![("Obsidian", true, 1), ("Notion", false, 1), ("Roam Research", false, 1)]
        );
    }

    #[test]
    fn position_score_tiers() {
        assert!((calculate_position_score(None, 100) - 0.0).abs() < f64::EPSILON);
        assert!((calculate_position_score(Some(0), 100) - 1.0).abs() < f64::EPSILON);
        assert!((calculate_position_score(Some(20), 100) - 1.0).abs() < f64::EPSILON);
        assert!((calculate_position_score(Some(21), 100) - 0.6).abs() < f64::EPSILON);
        assert!((calculate_position_score(Some(60), 100) - 0.6).abs() < f64::EPSILON);
        assert!((calculate_position_score(Some(61), 100) - 0.3).abs() < f64::EPSILON);
        assert!((calculate_position_score(Some(0), 0) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn one_record_per_brand_with_shared_most_mentioned() {
        let registry = registry(&["Obsidian"], &[("Notion", &["Notion"]), ("Logseq", &["Logseq"])]);
        let answers = vec![
            answer(1, "Notion, Notion and Obsidian"),
            answer(2, "Nothing relevant here"),
        ];

        let records = analyze_answers(&answers, &registry).unwrap();

        assert_eq!(records.len(), 6);
        assert!(records[..3].iter().all(|r| r.most_mentioned == "Notion"));
        // All counts tie at zero: the target, listed first, wins.
        assert!(records[3..].iter().all(|r| r.most_mentioned == "Obsidian"));
        assert_eq!(records[2].brand, "Logseq");
        assert_eq!(records[2].count, 0);
        assert!((records[2].score - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn analysis_is_idempotent() {
        let registry = registry(&["Obsidian"], &[("Notion", &["Notion"])]);
        let answers = vec![answer(1, "Obsidian beats Notion"), answer(2, "Notion")];

        assert_eq!(
            analyze_answers(&answers, &registry).unwrap(),
            analyze_answers(&answers, &registry).unwrap()
        );
    }

    #[tokio::test]
    async fn chunked_analysis_matches_sequential() {
        let registry = registry(&["Obsidian"], &[("Notion", &["Notion"])]);
        let answers: Vec<Answer> = (1..=23)
            .map(|id| {
                let text = if id % 3 == 0 {
                    "Notion first, then Obsidian".to_string()
                } else {
                    format!("Answer {id} mentions Obsidian")
                };
                answer(id, &text)
            })
            .collect();

        let sequential = analyze_answers(&answers, &registry).unwrap();
        let chunked = analyze_answers_chunked(answers, &registry, 4).await.unwrap();

        assert_eq!(chunked, sequential);
    }

    mod prop {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn position_score_never_increases(
                len in 1usize..10_000,
                a in 0usize..10_000,
                b in 0usize..10_000,
            ) {
                let (early, late) = (a.min(b) % len, a.max(b) % len);
                let (early, late) = (early.min(late), early.max(late));
                prop_assert!(
                    calculate_position_score(Some(early), len)
                        >= calculate_position_score(Some(late), len)
                );
            }

            #[test]
            fn count_equals_inserted_mentions(
                words in proptest::collection::vec("[a-z]{1,8}", 0..20),
                inserts in proptest::collection::vec(any::<bool>(), 0..20),
            ) {
                let mut parts: Vec<String> = Vec::new();
                let mut expected = 0;
                for (i, word) in words.iter().enumerate() {
                    if word != "obsidian" {
                        parts.push(word.clone());
                    }
                    if inserts.get(i).copied().unwrap_or(false) {
                        let spelling = if i % 2 == 0 { "Obsidian" } else { "OBSIDIAN" };
                        parts.push(spelling.to_string());
                        expected += 1;
                    }
                }
                let text = parts.join(" ");

                let mention = target_mention(&text, &["Obsidian"]);

                prop_assert_eq!(mention.count, expected);
                prop_assert_eq!(mention.found, expected > 0);
            }
        }
    }
}
