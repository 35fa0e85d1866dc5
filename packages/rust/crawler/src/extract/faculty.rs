//! Faculty extraction from catalog department pages.
//!
//! Catalog pages list faculty as block elements reading
//! `"Jane Doe, associate professor (topology). B.A., 1990, ..."`. A block is
//! accepted when a name is followed by a comma and at least one title from
//! the configured vocabulary.

use std::collections::HashSet;

use regex::Regex;
use scraper::{Html, Selector};

use gradesync_normalize::to_last_first;
use gradesync_shared::{ExtractConfig, GradeSyncError, NameOrder, Result};

use super::ExtractionStrategy;

/// Qualifiers allowed in front of a title ("senior instructor").
const TITLE_QUALIFIERS: &str = "senior|adjunct|visiting|courtesy|principal|research";

/// A name/title pair found on a faculty page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacultyCandidate {
    /// Name as it should be handed to the normalizer.
    pub raw_name: String,
    /// Matched title, lowercased.
    pub title: String,
}

/// Name-then-title matcher driven by a title vocabulary.
pub struct TitleVocabularyExtractor {
    blocks: Selector,
    pattern: Regex,
    name_order: NameOrder,
}

impl TitleVocabularyExtractor {
    /// Build the extractor from the `[extract]` config section.
    pub fn new(config: &ExtractConfig) -> Result<Self> {
        let blocks = Selector::parse(&config.block_selector).map_err(|e| {
            GradeSyncError::config(format!(
                "invalid block selector '{}': {e:?}",
                config.block_selector
            ))
        })?;

        if config.titles.is_empty() {
            return Err(GradeSyncError::config("title vocabulary is empty"));
        }

        // Longest titles first so "associate professor" wins over "professor".
        let mut titles: Vec<String> = config
            .titles
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        titles.sort_by_key(|t| std::cmp::Reverse(t.len()));
        let alternation = titles
            .iter()
            .map(|t| regex::escape(t).replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = Regex::new(&format!(
            r"(?i)^\s*(?P<name>\p{{L}}[\p{{L}}\p{{M}}'’.\- ,]*?)\s*,\s*(?:(?:{TITLE_QUALIFIERS})\s+)?(?P<title>{alternation})\b"
        ))
        .map_err(|e| GradeSyncError::config(format!("invalid title vocabulary: {e}")))?;

        Ok(Self {
            blocks,
            pattern,
            name_order: config.name_order,
        })
    }

    /// Match a single line of block text.
    pub fn match_line(&self, text: &str) -> Option<FacultyCandidate> {
        let caps = self.pattern.captures(text)?;
        let name = caps.name("name")?.as_str().trim();
        let title = caps.name("title")?.as_str();

        let raw_name = match self.name_order {
            NameOrder::FirstLast => to_last_first(name),
            NameOrder::LastFirst => name.to_string(),
        };
        if raw_name.is_empty() {
            return None;
        }

        Some(FacultyCandidate {
            raw_name,
            title: title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
        })
    }
}

impl ExtractionStrategy for TitleVocabularyExtractor {
    type Record = FacultyCandidate;

    fn extract(&self, content: &str) -> Result<Vec<FacultyCandidate>> {
        let doc = Html::parse_document(content);
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for el in doc.select(&self.blocks) {
            let text = el.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if let Some(candidate) = self.match_line(&text) {
                if seen.insert(candidate.raw_name.clone()) {
                    out.push(candidate);
                }
            }
        }

        Ok(out)
    }

    fn name(&self) -> &str {
        "title-vocabulary"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(order: NameOrder) -> TitleVocabularyExtractor {
        let config = ExtractConfig {
            name_order: order,
            ..ExtractConfig::default()
        };
        TitleVocabularyExtractor::new(&config).unwrap()
    }

    #[test]
    fn matches_name_then_title() {
        let ex = extractor(NameOrder::FirstLast);
        let c = ex
            .match_line("Hal Sadofsky, professor (algebraic topology). B.A., 1983, Princeton")
            .unwrap();
        assert_eq!(c.raw_name, "Sadofsky, Hal");
        assert_eq!(c.title, "professor");
    }

    #[test]
    fn prefers_longest_title() {
        let ex = extractor(NameOrder::FirstLast);
        let c = ex.match_line("Jane Q. Doe, Associate Professor (logic)").unwrap();
        assert_eq!(c.raw_name, "Doe, Jane Q.");
        assert_eq!(c.title, "associate professor");
    }

    #[test]
    fn accepts_qualified_titles() {
        let ex = extractor(NameOrder::FirstLast);
        let c = ex.match_line("Ann Lee, senior instructor (calculus)").unwrap();
        assert_eq!(c.title, "instructor");
    }

    #[test]
    fn last_first_pages_keep_comma_name() {
        let ex = extractor(NameOrder::LastFirst);
        let c = ex.match_line("Sadofsky, Hal, professor").unwrap();
        assert_eq!(c.raw_name, "Sadofsky, Hal");
    }

    #[test]
    fn rejects_lines_without_title() {
        let ex = extractor(NameOrder::FirstLast);
        assert!(ex.match_line("Emeriti").is_none());
        assert!(ex.match_line("Doe, John").is_none());
        assert!(ex.match_line("The professor will see you now").is_none());
        assert!(ex.match_line("1234, professor").is_none());
    }

    #[test]
    fn extracts_blocks_from_html() {
        let html = r#"<html><body>
            <h2>Faculty</h2>
            <p class="facultylist">Hal Sadofsky, professor (algebraic topology). B.A., 1983</p>
            <p class="facultylist">Jane   Doe,
               assistant professor (number theory).</p>
            <p>Courses are offered every term.</p>
            <ul><li>Ann Lee, lecturer (statistics).</li></ul>
            <p class="facultylist">Hal Sadofsky, professor (duplicate listing)</p>
        </body></html>"#;

        let ex = extractor(NameOrder::FirstLast);
        let found = ex.extract(html).unwrap();
        let names: Vec<_> = found.iter().map(|c| c.raw_name.as_str()).collect();
        assert_eq!(names, vec!["Sadofsky, Hal", "Doe, Jane", "Lee, Ann"]);
    }

    #[test]
    fn page_without_faculty_yields_empty() {
        let ex = extractor(NameOrder::FirstLast);
        let found = ex.extract("<html><body><p>Nothing here.</p></body></html>").unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn faculty_fixture_page() {
        let content = std::fs::read_to_string("../../../fixtures/html/mathematics.html")
            .expect("read faculty fixture");
        let ex = extractor(NameOrder::FirstLast);
        let found = ex.extract(&content).unwrap();
        assert_eq!(found.len(), 4);
        assert!(found.iter().any(|c| c.raw_name == "Smith, Alice"));
    }

    #[test]
    fn invalid_selector_is_config_error() {
        let config = ExtractConfig {
            block_selector: "p[".into(),
            ..ExtractConfig::default()
        };
        assert!(matches!(
            TitleVocabularyExtractor::new(&config),
            Err(GradeSyncError::Config { .. })
        ));
    }
}
