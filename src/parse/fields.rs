use indexmap::IndexMap;

use crate::model::task::FieldKey;

const PAIR_SEPARATOR: &str = " | ";

/// Check if a line is a bold field line:
/// `**Key**: value[ | **Key2**: value2]`
pub fn is_field_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("**") && trimmed.contains("**:")
}

/// Split a field line into `(key, value)` pairs. A ` | ` that is not followed
/// by another `**Key**:` belongs to the preceding value.
pub fn split_field_pairs(line: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for segment in line.trim().split(PAIR_SEPARATOR) {
        let parsed = segment
            .trim_start()
            .strip_prefix("**")
            .and_then(|rest| rest.split_once("**:"));
        match parsed {
            Some((key, value)) if !key.trim().is_empty() => {
                pairs.push((key.trim().to_string(), value.trim().to_string()));
            }
            _ => {
                if let Some((_, value)) = pairs.last_mut() {
                    value.push_str(PAIR_SEPARATOR);
                    value.push_str(segment.trim_end());
                }
            }
        }
    }
    pairs
}

/// Lift every recognized field on `line` into `metadata`. A repeated key
/// overwrites; other keys are left alone.
pub fn extract_fields(line: &str, metadata: &mut IndexMap<FieldKey, String>) {
    for (key, value) in split_field_pairs(line) {
        if let Some(key) = FieldKey::from_label(&key) {
            metadata.insert(key, value);
        }
    }
}

/// Format pairs back into one field line
pub fn format_field_line<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("**{}**: {}", k.as_ref(), v.as_ref()))
        .collect::<Vec<_>>()
        .join(PAIR_SEPARATOR)
}

/// Replace the value of `key` on `line`. Returns `None` if the line does not
/// carry that key.
pub fn set_field_in_line(line: &str, key: FieldKey, value: &str) -> Option<String> {
    let mut pairs = split_field_pairs(line);
    let pair = pairs
        .iter_mut()
        .find(|(k, _)| FieldKey::from_label(k) == Some(key))?;
    pair.1 = value.to_string();
    Some(format!("{}{}", leading_ws(line), format_field_line(&pairs)))
}

/// Drop `key` from `line`. Returns `None` if the key is not on the line,
/// `Some(None)` if nothing is left of the line.
pub fn remove_field_from_line(line: &str, key: FieldKey) -> Option<Option<String>> {
    let mut pairs = split_field_pairs(line);
    let before = pairs.len();
    pairs.retain(|(k, _)| FieldKey::from_label(k) != Some(key));
    if pairs.len() == before {
        return None;
    }
    if pairs.is_empty() {
        return Some(None);
    }
    Some(Some(format!("{}{}", leading_ws(line), format_field_line(&pairs))))
}

/// Parse a configuration line (`**Key**: value`, optionally as a list item)
pub fn parse_config_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix("- ").unwrap_or(trimmed);
    if !is_field_line(trimmed) {
        return None;
    }
    split_field_pairs(trimmed).into_iter().next()
}

fn leading_ws(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_field_line() {
        assert!(is_field_line("**Priority**: High"));
        assert!(is_field_line("  **Foo**: bar"));
        assert!(!is_field_line("**bold** text"));
        assert!(!is_field_line("Priority: High"));
    }

    #[test]
    fn test_split_two_pairs() {
        let pairs = split_field_pairs("**Priority**: High | **Assigned**: @sam");
        assert_eq!(
            pairs,
            vec![
                ("Priority".to_string(), "High".to_string()),
                ("Assigned".to_string(), "@sam".to_string()),
            ]
        );
    }

    #[test]
    fn test_pipe_inside_value_is_kept() {
        let pairs = split_field_pairs("**Tags**: ui | backend | **Project**: web");
        assert_eq!(pairs[0].1, "ui | backend");
        assert_eq!(pairs[1], ("Project".to_string(), "web".to_string()));
    }

    #[test]
    fn test_extract_is_order_independent() {
        let mut meta = IndexMap::new();
        extract_fields("**Priority**: Low | **Due**: Friday", &mut meta);
        extract_fields("**Assigned**: kim", &mut meta);
        extract_fields("**Priority**: High", &mut meta);
        assert_eq!(meta.get(&FieldKey::Priority).map(String::as_str), Some("High"));
        assert_eq!(meta.get(&FieldKey::Assigned).map(String::as_str), Some("kim"));
        assert_eq!(meta.len(), 2);
        // Position of a repeated key stays where it was first seen
        assert_eq!(meta.get_index(0).map(|(k, _)| *k), Some(FieldKey::Priority));
    }

    #[test]
    fn test_set_field_in_line() {
        let line = "**Priority**: High | **Assigned**: @sam";
        assert_eq!(
            set_field_in_line(line, FieldKey::Assigned, "@kim").as_deref(),
            Some("**Priority**: High | **Assigned**: @kim")
        );
        assert!(set_field_in_line(line, FieldKey::Tags, "x").is_none());
    }

    #[test]
    fn test_remove_field_from_line() {
        let line = "**Priority**: High | **Assigned**: @sam";
        assert_eq!(
            remove_field_from_line(line, FieldKey::Priority),
            Some(Some("**Assigned**: @sam".to_string()))
        );
        assert_eq!(
            remove_field_from_line("**Tags**: a", FieldKey::Tags),
            Some(None)
        );
        assert_eq!(remove_field_from_line(line, FieldKey::Closed), None);
    }

    #[test]
    fn test_parse_config_line() {
        assert_eq!(
            parse_config_line("- **Default Assignee**: robin"),
            Some(("Default Assignee".to_string(), "robin".to_string()))
        );
        assert_eq!(parse_config_line("just text"), None);
    }
}
