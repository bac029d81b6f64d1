//! Personalization of message templates.
//!
//! Placeholders use the literal wire format `{{identifier}}`: case
//! sensitive, no nesting, no escaping. Rendering is exact-token substring
//! substitution, deliberately not a template language: an unmatched
//! placeholder stays verbatim in the output, a mapping entry with no
//! occurrence in the template is ignored, and rendering never fails.
//!
//! The recipient column is always usable as a placeholder equal to its own
//! column name, even when it is absent from the explicit mapping.

use crate::campaign::Record;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Matches `{{identifier}}` tokens for diagnostics and previews.
static PLACEHOLDER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("valid regex"));

/// A subject and body rendered for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    pub subject: String,
    pub body: String,
}

/// The literal token for a placeholder name.
fn token(name: &str) -> String {
    format!("{{{{{name}}}}}")
}

/// Render a body and subject for one record.
///
/// Every `(placeholder, column)` pair in `mapping` replaces each exact
/// `{{placeholder}}` token in both templates with the record's value for
/// `column` (empty string when the column is absent). The recipient column
/// is then substituted unconditionally. Replacements act on disjoint exact
/// tokens, so mapping iteration order cannot change the output.
pub fn render(
    body_template: &str,
    subject_template: &str,
    record: &Record,
    mapping: &HashMap<String, String>,
    recipient_column: &str,
) -> RenderedMail {
    let mut body = body_template.to_string();
    let mut subject = subject_template.to_string();

    for (placeholder, column) in mapping {
        let needle = token(placeholder);
        let value = record.field(column);
        body = body.replace(&needle, value);
        subject = subject.replace(&needle, value);
    }

    let needle = token(recipient_column);
    let value = record.field(recipient_column);
    body = body.replace(&needle, value);
    subject = subject.replace(&needle, value);

    RenderedMail { subject, body }
}

/// List the placeholder names occurring in a template, in order of first
/// appearance, without duplicates. Diagnostic only; rendering does not
/// care about unknown tokens.
pub fn scan_placeholders(template: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for cap in PLACEHOLDER_TOKEN.captures_iter(template) {
        let name = cap[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// Whether a name is usable as a placeholder identifier.
pub fn is_valid_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
