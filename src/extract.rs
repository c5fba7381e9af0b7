use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// How to locate the array inside the text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractStrategy {
    /// Leftmost `[` through rightmost `]`. Over-captures when the text holds
    /// several disjoint arrays.
    #[default]
    Greedy,
    /// First depth-balanced `[...]` span, string literals skipped.
    Balanced,
}

/// One multiple-choice question as the prompt asks for it.
///
/// Only used to report shape problems; stored payloads keep whatever the
/// model produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

impl Question {
    pub fn from_value(value: &Value) -> Option<Question> {
        let q: Question = serde_json::from_value(value.clone()).ok()?;
        (q.options.len() == 4).then_some(q)
    }
}

/// Recover a JSON array from model output wrapped in prose or markdown fences.
/// Anything unrecoverable is `None`, never an error.
pub fn extract_json_array(text: &str, strategy: ExtractStrategy) -> Option<Value> {
    match strategy {
        ExtractStrategy::Greedy => extract_greedy(text),
        ExtractStrategy::Balanced => extract_balanced(text),
    }
}

fn greedy_array_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").unwrap())
}

fn extract_greedy(text: &str) -> Option<Value> {
    match greedy_array_re().find(text) {
        Some(m) => parse(m.as_str()),
        None => parse(&strip_fences(text)),
    }
}

fn extract_balanced(text: &str) -> Option<Value> {
    match balanced_array_span(text) {
        Some(span) => parse(span),
        None => parse(&strip_fences(text)),
    }
}

fn parse(candidate: &str) -> Option<Value> {
    match serde_json::from_str(candidate) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(error = %e, len = candidate.len(), "candidate is not valid JSON");
            None
        }
    }
}

/// Remove ```` ```json ```` and ```` ``` ```` markers anywhere in the text.
pub fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// The first `[` ... matching `]` span, ignoring brackets inside strings.
fn balanced_array_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ONE: &str = r#"[{"question":"Q","options":["A","B","C","D"],"answer":"A"}]"#;

    fn greedy(text: &str) -> Option<Value> {
        extract_json_array(text, ExtractStrategy::Greedy)
    }

    #[test]
    fn bare_array() {
        assert_eq!(greedy(ONE), Some(serde_json::from_str(ONE).unwrap()));
    }

    #[test]
    fn prose_around_array() {
        let text = format!("Here is your JSON: {}\nLet me know if you need more.", ONE);
        assert_eq!(greedy(&text), Some(serde_json::from_str(ONE).unwrap()));
    }

    #[test]
    fn fenced_array() {
        let text = format!("```json\n{}\n```", ONE);
        let expected: Value = serde_json::from_str(ONE).unwrap();
        assert_eq!(greedy(&text), Some(expected.clone()));
        assert_eq!(
            extract_json_array(&text, ExtractStrategy::Balanced),
            Some(expected)
        );
    }

    #[test]
    fn fenced_non_array_falls_back_to_stripping() {
        let text = "```json\n{\"questions\": 3}\n```";
        assert_eq!(greedy(text), Some(json!({"questions": 3})));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(greedy("Sorry, I could not read that page."), None);
        assert_eq!(greedy(""), None);
        assert_eq!(greedy("```json\n{ not json\n```"), None);
    }

    #[test]
    fn greedy_span_that_fails_to_parse_is_none() {
        // Two arrays with prose between: greedy captures both plus the prose.
        let text = "[1, 2] and also [3]";
        assert_eq!(greedy(text), None);
    }

    #[test]
    fn balanced_takes_first_array_only() {
        let text = "[1, 2] and also [3]";
        assert_eq!(
            extract_json_array(text, ExtractStrategy::Balanced),
            Some(json!([1, 2]))
        );
    }

    #[test]
    fn balanced_skips_brackets_inside_strings() {
        let text = r#"Result: [{"question":"What does a[i] return? \"]\"","options":[],"answer":"x"}] done"#;
        let v = extract_json_array(text, ExtractStrategy::Balanced).unwrap();
        assert_eq!(v[0]["answer"], "x");
    }

    #[test]
    fn unbalanced_text_is_none() {
        assert_eq!(extract_json_array("[1, 2", ExtractStrategy::Balanced), None);
    }

    #[test]
    fn question_shape() {
        let ok = json!({"question":"Q","options":["A","B","C","D"],"answer":"A"});
        assert!(Question::from_value(&ok).is_some());
        let three = json!({"question":"Q","options":["A","B","C"],"answer":"A"});
        assert!(Question::from_value(&three).is_none());
        assert!(Question::from_value(&json!("just text")).is_none());
    }
}
