//! Template expansion into the query source.
//!
//! Templates contain `{name}` placeholders. `{category}`, `{target}` and
//! `{brand1}` are filled from the template file and the target brand; a
//! template mentioning `{brand1}`, `{brand2}` or `{competitor}` expands once
//! per competitor, and one mentioning `{use_case}` once per use case.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use super::Query;
use crate::analysis::BrandRegistry;
use crate::data::read_json_file;

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static PLACEHOLDER_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(\w+)\}").unwrap());

const COMPETITOR_KEYS: [&str; 3] = ["brand1", "brand2", "competitor"];

/// Values shared by every template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TemplatePlaceholders {
    /// Product category, e.g. "note-taking app".
    pub category: String,
    /// Use cases substituted for `{use_case}`.
    #[serde(default)]
    pub use_cases: Vec<String>,
}

/// On-disk template source.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateFile {
    /// Free-form description of the template set.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Shared placeholder values.
    pub placeholders: TemplatePlaceholders,
    /// Templates per category, in file order.
    #[serde(deserialize_with = "ordered_categories")]
    pub templates: Vec<(String, Vec<String>)>,
}

impl TemplateFile {
    /// Reads a template file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json_file(path.as_ref())
            .with_context(|| format!("Failed to load templates from {}", path.as_ref().display()))
    }
}

/// Keeps the categories of a JSON object in document order.
fn ordered_categories<'de, D>(deserializer: D) -> Result<Vec<(String, Vec<String>)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct CategoriesVisitor;

    impl<'de> Visitor<'de> for CategoriesVisitor {
        type Value = Vec<(String, Vec<String>)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of category to a list of templates")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut categories = Vec::new();
            while let Some(entry) = map.next_entry::<String, Vec<String>>()? {
                categories.push(entry);
            }
            Ok(categories)
        }
    }

    deserializer.deserialize_map(CategoriesVisitor)
}

/// Placeholder names in `template`, in order of appearance.
pub fn get_placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER_PATTERN
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Replaces every `{key}` with its value; unknown placeholders stay intact.
pub fn fill_single_template(template: &str, variables: &HashMap<&str, &str>) -> String {
    PLACEHOLDER_PATTERN
        .replace_all(template, |caps: &regex::Captures<'_>| {
            variables
                .get(&caps[1])
                .map_or_else(|| caps[0].to_string(), |value| (*value).to_string())
        })
        .into_owned()
}

/// Expands one template into every query it stands for.
pub fn generate_queries_from_template(
    template: &str,
    placeholders: &TemplatePlaceholders,
    registry: &BrandRegistry,
) -> Vec<String> {
    let needed = get_placeholders(template);
    let needs = |key: &str| needed.iter().any(|name| name == key);

    let target = registry.target.primary_alias();
    let competitors: Vec<Option<&str>> = if COMPETITOR_KEYS.into_iter().any(|key| needs(key)) {
        registry
            .competitors
            .iter()
            .map(|brand| Some(brand.name.as_str()))
            .collect()
    } else {
        vec![None]
    };
    let use_cases: Vec<Option<&str>> = if needs("use_case") {
        placeholders.use_cases.iter().map(|c| Some(c.as_str())).collect()
    } else {
        vec![None]
    };

    let mut queries = Vec::with_capacity(competitors.len() * use_cases.len());
    for competitor in competitors.iter().copied() {
        for use_case in use_cases.iter().copied() {
            let mut variables = HashMap::from([
                ("category", placeholders.category.as_str()),
                ("target", target),
                ("brand1", target),
            ]);
            if let Some(competitor) = competitor {
                variables.insert("brand2", competitor);
                variables.insert("competitor", competitor);
            }
            if let Some(use_case) = use_case {
                variables.insert("use_case", use_case);
            }
            queries.push(fill_single_template(template, &variables));
        }
    }

    queries
}

/// Expands every template, numbering queries from 1 in file order.
pub fn generate_all_queries(templates: &TemplateFile, registry: &BrandRegistry) -> Vec<Query> {
    let mut queries = Vec::new();

    for (category, category_templates) in &templates.templates {
        for template in category_templates {
            for text in generate_queries_from_template(template, &templates.placeholders, registry)
            {
                queries.push(Query {
                    id: queries.len() as u64 + 1,
                    category: category.clone(),
                    text,
                });
            }
        }
        debug!(category = %category, total = queries.len(), "Expanded category");
    }

    info!(count = queries.len(), "Generated queries");
    queries
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::analysis::Brand;

    fn registry() -> BrandRegistry {
        BrandRegistry {
            target: Brand::new("Obsidian", ["Obsidian", "Obsidian.md"]),
            competitors: vec![
                Brand::new("Notion", ["Notion"]),
                Brand::new("Logseq", ["Logseq"]),
            ],
        }
    }

    fn placeholders() -> TemplatePlaceholders {
        TemplatePlaceholders {
            category: "note-taking app".to_string(),
            use_cases: vec!["journaling".to_string(), "research".to_string()],
        }
    }

    #[test]
    fn placeholders_in_order_of_appearance() {
        assert_eq!(
            get_placeholders("Is {brand1} better than {brand2} for {use_case}?"),
            vec!["brand1", "brand2", "use_case"]
        );
        assert!(get_placeholders("No placeholders here").is_empty());
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        let variables = HashMap::from([("category", "note-taking app")]);
        assert_eq!(
            fill_single_template("Best {category} for {audience}?", &variables),
            "Best note-taking app for {audience}?"
        );
    }

    #[test]
    fn plain_template_yields_one_query() {
        let queries = generate_queries_from_template(
            "What is the best {category}?",
            &placeholders(),
            &registry(),
        );
        assert_eq!(queries, vec!["What is the best note-taking app?"]);
    }

    #[test]
    fn competitor_and_use_case_nest_competitor_major() {
        let queries = generate_queries_from_template(
            "{brand1} vs {brand2} for {use_case}",
            &placeholders(),
            &registry(),
        );
        assert_eq!(
            queries,
            vec![
                "Obsidian vs Notion for journaling",
                "Obsidian vs Notion for research",
                "Obsidian vs Logseq for journaling",
                "Obsidian vs Logseq for research",
            ]
        );
    }

    #[test]
    fn competitor_placeholder_alone_expands_per_competitor() {
        let queries = generate_queries_from_template(
            "Alternatives to {competitor}?",
            &placeholders(),
            &registry(),
        );
        assert_eq!(queries, vec!["Alternatives to Notion?", "Alternatives to Logseq?"]);
    }

    #[test]
    fn all_queries_keep_file_order_and_number_from_one() {
        let templates: TemplateFile = serde_json::from_str(
            r#"{
                "metadata": {"version": 1},
                "placeholders": {"category": "note-taking app", "use_cases": ["journaling"]},
                "templates": {
                    "recommendation": ["Best {category}?"],
                    "comparison": ["{brand1} or {competitor}?"],
                    "alternatives": ["Good {category} for {use_case}?"]
                }
            }"#,
        )
        .unwrap();

        let queries = generate_all_queries(&templates, &registry());

        let summary: Vec<(u64, &str, &str)> = queries
            .iter()
            .map(|q| (q.id, q.category.as_str(), q.text.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, "recommendation", "Best note-taking app?"),
                (2, "comparison", "Obsidian or Notion?"),
                (3, "comparison", "Obsidian or Logseq?"),
                (4, "alternatives", "Good note-taking app for journaling?"),
            ]
        );
    }
}
