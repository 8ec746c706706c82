//! Instruction step parser

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::list::parse_list_block;

/// Longest summary stored for a step, in characters
pub const SUMMARY_MAX_CHARS: usize = 255;
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedStep {
    /// Contiguous from 1
    pub step_number: i32,
    pub summary: String,
    pub description: String,
}

/// Splits instruction text into numbered steps
///
/// In order of preference:
/// 1. a bracketed list of strings, one step per item
/// 2. explicit markers (`1.`, `2)`, `Step 3:`) when the text starts with one
/// 3. one step per sentence, split on `.`, `!` or `?` followed by whitespace
pub struct StepParser {
    marker: Regex,
    leading_marker: Regex,
    sentence_end: Regex,
}

impl StepParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            marker: Regex::new(r"(?:^|\s)(?i:step)?\s*(\d{1,2})[.):]\s+")?,
            leading_marker: Regex::new(r"^(?i:step)?\s*\d{1,2}[.):]\s+")?,
            sentence_end: Regex::new(r"[.!?]+\s+")?,
        })
    }

    pub fn parse_instructions(&self, block: &str) -> Vec<ParsedStep> {
        let trimmed = block.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let segments = self
            .list_segments(trimmed)
            .or_else(|| self.numbered_segments(trimmed))
            .unwrap_or_else(|| self.sentence_segments(trimmed));

        segments
            .into_iter()
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(i, description)| ParsedStep {
                step_number: i as i32 + 1,
                summary: summarize(&description),
                description,
            })
            .collect()
    }

    fn list_segments(&self, text: &str) -> Option<Vec<String>> {
        if !text.starts_with('[') {
            return None;
        }
        let items = parse_list_block(text).ok()?;
        Some(
            items
                .iter()
                .map(|item| self.leading_marker.replace(item, "").into_owned())
                .collect(),
        )
    }

    /// Markers must count up from the first one, which must open the text;
    /// other digit-dot sequences stay inside their step.
    fn numbered_segments(&self, text: &str) -> Option<Vec<String>> {
        let mut expected: Option<u32> = None;
        let mut bounds: Vec<(usize, usize)> = Vec::new();

        for caps in self.marker.captures_iter(text) {
            let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Ok(n) = number.as_str().parse::<u32>() else {
                continue;
            };
            match expected {
                None if whole.start() == 0 => {
                    bounds.push((whole.start(), whole.end()));
                    expected = Some(n + 1);
                },
                None => return None,
                Some(next) if n == next => {
                    bounds.push((whole.start(), whole.end()));
                    expected = Some(n + 1);
                },
                Some(_) => {},
            }
        }

        if bounds.is_empty() {
            return None;
        }

        let segments = bounds
            .iter()
            .enumerate()
            .map(|(i, &(_, body_start))| {
                let body_end = bounds.get(i + 1).map_or(text.len(), |&(start, _)| start);
                text[body_start..body_end].to_string()
            })
            .collect();
        Some(segments)
    }

    fn sentence_segments(&self, text: &str) -> Vec<String> {
        let mut segments = Vec::new();
        for line in text.lines() {
            let mut start = 0;
            for m in self.sentence_end.find_iter(line) {
                let end = m.start() + m.as_str().trim_end().len();
                segments.push(line[start..end].to_string());
                start = m.end();
            }
            segments.push(line[start..].to_string());
        }
        segments
    }
}

/// First `SUMMARY_MAX_CHARS` characters, with an ellipsis when cut
pub fn summarize(description: &str) -> String {
    if description.chars().count() <= SUMMARY_MAX_CHARS {
        return description.to_string();
    }
    let keep = SUMMARY_MAX_CHARS - ELLIPSIS.len();
    let mut summary: String = description.chars().take(keep).collect();
    summary.truncate(summary.trim_end().len());
    summary.push_str(ELLIPSIS);
    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<ParsedStep> {
        StepParser::new().unwrap().parse_instructions(text)
    }

    fn descriptions(steps: &[ParsedStep]) -> Vec<&str> {
        steps.iter().map(|s| s.description.as_str()).collect()
    }

    #[test]
    fn test_sentences() {
        let steps = parse("Preheat oven. Mix ingredients. Bake for 20 minutes.");
        assert_eq!(
            descriptions(&steps),
            vec!["Preheat oven.", "Mix ingredients.", "Bake for 20 minutes."]
        );
        assert_eq!(
            steps.iter().map(|s| s.step_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_sentence_punctuation_kept() {
        let steps = parse("Stir well! Is it thick? Serve warm");
        assert_eq!(
            descriptions(&steps),
            vec!["Stir well!", "Is it thick?", "Serve warm"]
        );
    }

    #[test]
    fn test_decimal_numbers_do_not_split() {
        let steps = parse("Add 2.5 cups water. Simmer.");
        assert_eq!(descriptions(&steps), vec!["Add 2.5 cups water.", "Simmer."]);
    }

    #[test]
    fn test_numbered_markers() {
        let steps = parse("1. Preheat oven to 350. 2) Mix flour and sugar. Step 3: Bake 20 minutes.");
        assert_eq!(
            descriptions(&steps),
            vec!["Preheat oven to 350.", "Mix flour and sugar.", "Bake 20 minutes."]
        );
    }

    #[test]
    fn test_numbered_markers_across_lines() {
        let steps = parse("1. Boil water.\n2. Add pasta. Cook 8. minutes\n3. Drain.");
        assert_eq!(
            descriptions(&steps),
            vec!["Boil water.", "Add pasta. Cook 8. minutes", "Drain."]
        );
    }

    #[test]
    fn test_bracketed_list() {
        let steps = parse(r#"['Preheat the oven.', "", '2. Grease a pan.']"#);
        assert_eq!(descriptions(&steps), vec!["Preheat the oven.", "Grease a pan."]);
        assert_eq!(steps[1].step_number, 2);
    }

    #[test]
    fn test_empty_segments_dropped_and_renumbered() {
        let steps = parse("Chop onions.\n\n   \nFry them.");
        assert_eq!(descriptions(&steps), vec!["Chop onions.", "Fry them."]);
        assert_eq!(steps[1].step_number, 2);
        assert!(parse("   ").is_empty());
    }

    #[test]
    fn test_summary_is_bounded() {
        let long = "é".repeat(400);
        let steps = parse(&long);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].description.chars().count(), 400);
        assert!(steps[0].summary.chars().count() <= SUMMARY_MAX_CHARS);
        assert!(steps[0].summary.ends_with("..."));
    }

    #[test]
    fn test_short_summary_is_description() {
        let steps = parse("Serve.");
        assert_eq!(steps[0].summary, "Serve.");
    }
}
