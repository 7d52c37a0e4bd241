//! `{{var}}` template handling for stored prompts.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([a-z_][a-z0-9_]*)\s*\}\}").expect("valid regex"))
}

/// Extract unique variable names from a template, in order of first appearance.
pub fn extract_variables(template: &str) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for capture in variable_pattern().captures_iter(template) {
        let name = capture[1].to_string();
        if !result.contains(&name) {
            result.push(name);
        }
    }
    result
}

/// Replace all `{{var}}` placeholders with values from `variables`.
///
/// Placeholders without a supplied value are left intact.
pub fn fill_template(template: &str, variables: &HashMap<String, String>) -> String {
    variable_pattern()
        .replace_all(template, |capture: &regex::Captures<'_>| {
            variables
                .get(&capture[1])
                .cloned()
                .unwrap_or_else(|| capture[0].to_string())
        })
        .into_owned()
}

/// Variable names the template requires but `variables` does not supply.
pub fn validate_variables(template: &str, variables: &HashMap<String, String>) -> Vec<String> {
    extract_variables(template)
        .into_iter()
        .filter(|name| !variables.contains_key(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_extract_in_order_without_duplicates() {
        let extracted = extract_variables("{{file}} then {{line}} then {{file}} again");
        assert_eq!(extracted, vec!["file", "line"]);
    }

    #[test]
    fn test_extract_respects_name_rules() {
        assert_eq!(
            extract_variables("{{ok_1}} {{Bad}} {{1bad}} {{ spaced }}"),
            vec!["ok_1", "spaced"]
        );
        assert!(extract_variables("no placeholders here").is_empty());
    }

    #[test]
    fn test_fill_replaces_known_and_keeps_unknown() {
        let filled = fill_template(
            "review {{file}} for {{concern}}",
            &vars(&[("file", "src/lib.rs")]),
        );
        assert_eq!(filled, "review src/lib.rs for {{concern}}");
    }

    #[test]
    fn test_validate_reports_missing() {
        let missing = validate_variables(
            "need {{one}} and {{two}}",
            &vars(&[("one", "supplied")]),
        );
        assert_eq!(missing, vec!["two"]);
    }
}
