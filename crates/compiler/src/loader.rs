//! DSL Loader: parses YAML rule documents into the untyped [`RawDocument`]
//! AST, rejecting malformed structure and duplicate mapping keys before the
//! schema validator ever sees the data.

use hashbrown::HashSet;

use crate::error::{ParseError, ParseResult};
use crate::raw::{RawDocument, RawRule};

/// Parse `yaml_text` into a [`RawDocument`], attributing each rule its
/// 1-based line number in the source for later diagnostics.
pub fn load(yaml_text: &str, source_name: &str) -> ParseResult<RawDocument> {
    detect_duplicate_keys(yaml_text, source_name)?;

    let mut document: RawDocument =
        serde_yaml::from_str(yaml_text).map_err(|e| ParseError::InvalidYaml {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;

    attach_rule_lines(yaml_text, &mut document.rules);
    Ok(document)
}

/// Finds the source line each rule's `name:` key appears on and records it,
/// so downstream diagnostics can point at the right line.
fn attach_rule_lines(yaml_text: &str, rules: &mut [RawRule]) {
    let lines: Vec<&str> = yaml_text.lines().collect();
    for rule in rules.iter_mut() {
        let needle = format!("name: {}", rule.name);
        let needle_quoted = format!("name: \"{}\"", rule.name);
        if let Some((idx, _)) = lines.iter().enumerate().find(|(_, l)| {
            let t = l.trim();
            t == needle || t == needle_quoted || t.starts_with(&format!("{}  ", needle))
        }) {
            rule.line = (idx + 1) as u32;
        }
    }
}

/// Rejects duplicate mapping keys within the same indentation block,
/// scanning top-down so a duplicate `name:` at the root or a duplicate
/// field within a single rule is reported with its line number.
fn detect_duplicate_keys(yaml_text: &str, source_name: &str) -> ParseResult<()> {
    let mut stack: Vec<(usize, HashSet<String>)> = vec![(0, HashSet::new())];

    for (line_no, raw_line) in yaml_text.lines().enumerate() {
        let trimmed = raw_line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("---") {
            continue;
        }
        let indent = raw_line.len() - trimmed.len();
        let content = trimmed.strip_prefix("- ").unwrap_or(trimmed);
        let content_indent = indent + (trimmed.len() - content.len());

        let Some(key) = scalar_key(content) else {
            continue;
        };

        while stack.len() > 1 && stack.last().unwrap().0 > content_indent {
            stack.pop();
        }
        if stack.last().unwrap().0 < content_indent {
            stack.push((content_indent, HashSet::new()));
        } else if stack.last().unwrap().0 > content_indent {
            // A list item started a fresh indentation level shallower than
            // tracked; treat as its own scope.
            stack.push((content_indent, HashSet::new()));
        }

        let top = stack.last_mut().expect("stack always has a root frame");
        if !top.1.insert(key.clone()) {
            return Err(ParseError::DuplicateKey {
                source_name: source_name.to_string(),
                line: (line_no + 1) as u32,
                key,
            });
        }
    }
    Ok(())
}

/// Extract the key name from a line like `name: foo` or `name:`. Returns
/// `None` for non-key lines (list markers with no inline key, plain
/// scalars, etc).
fn scalar_key(content: &str) -> Option<String> {
    let colon = content.find(':')?;
    let key = content[..colon].trim();
    if key.is_empty() || key.contains(' ') {
        return None;
    }
    Some(key.trim_matches(['"', '\'']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
version: 3
rules:
  - name: HighTemperatureRule
    condition:
      type: comparison
      sensor: temperature
      op: gt
      value: 30
    actions:
      - type: set
        key: high_temperature_alert
        value_expression: "true"
        emit: always
"#;

    #[test]
    fn loads_a_well_formed_document() {
        let doc = load(VALID, "rules.yaml").unwrap();
        assert_eq!(doc.version, 3);
        assert_eq!(doc.rules.len(), 1);
        assert_eq!(doc.rules[0].name, "HighTemperatureRule");
        assert!(doc.rules[0].line > 0);
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = load("version: [unclosed", "rules.yaml");
        assert!(err.is_err());
    }

    #[test]
    fn rejects_duplicate_key_within_a_rule() {
        let text = r#"
version: 3
rules:
  - name: R
    name: Duplicate
    condition:
      type: all
      children: []
"#;
        let err = load(text, "rules.yaml");
        assert!(matches!(err, Err(ParseError::DuplicateKey { .. })));
    }

    #[test]
    fn rejects_duplicate_key_at_root() {
        let text = r#"
version: 3
version: 4
rules: []
"#;
        let err = load(text, "rules.yaml");
        assert!(matches!(err, Err(ParseError::DuplicateKey { .. })));
    }

    #[test]
    fn rejects_unknown_top_level_field() {
        let text = r#"
version: 3
rules: []
extra_unknown_field: true
"#;
        assert!(load(text, "rules.yaml").is_err());
    }
}
