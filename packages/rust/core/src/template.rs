//! Prompt template parsing and `{field}` placeholder rendering.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use orgenrich_shared::CanonicalRecord;

/// Keys tried, in order, when a nested object has to be rendered as text.
const PREFERRED_KEYS: [&str; 4] = ["url", "platform", "name", "value"];

// ---------------------------------------------------------------------------
// PromptTemplate
// ---------------------------------------------------------------------------

/// Instruction text and request template split out of a prompt file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    /// Text between `SYSTEM:` and `USER:`; empty when the file has no markers.
    pub instruction: String,
    /// Text after `USER:`, or the whole file.
    pub template: String,
}

impl PromptTemplate {
    /// Split on case-insensitive `SYSTEM:` / `USER:` markers.
    ///
    /// `USER:` must start a later line. Without both markers the entire trimmed text
    /// becomes the template.
    pub fn parse(text: &str) -> Self {
        static SECTIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?is)SYSTEM:\s*(.*?)\n\s*USER:\s*(.*)\z").expect("valid regex")
        });

        match SECTIONS_RE.captures(text) {
            Some(caps) => Self {
                instruction: caps[1].trim().to_string(),
                template: caps[2].trim().to_string(),
            },
            None => Self {
                instruction: String::new(),
                template: text.trim().to_string(),
            },
        }
    }

    pub fn has_instruction(&self) -> bool {
        !self.instruction.is_empty()
    }

    /// Render the request template against `record`.
    pub fn render(&self, record: &CanonicalRecord) -> String {
        render(&self.template, record)
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Substitute `{key}` for every record field, then drop unresolved placeholders.
///
/// The output never contains a `{identifier}` sequence or a placeholder for any
/// record key, so rendering it again changes nothing.
pub fn render(template: &str, record: &CanonicalRecord) -> String {
    let mut out = template.to_string();

    for (key, value) in record.fields() {
        let placeholder = format!("{{{key}}}");
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, &stringify(value));
        }
    }

    strip_placeholders(out, record)
}

fn strip_placeholders(mut text: String, record: &CanonicalRecord) -> String {
    static PLACEHOLDER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\{[A-Za-z0-9_]+\}").expect("valid regex"));

    // Keys with spaces or punctuation are not caught by the regex.
    let odd_keys: Vec<String> = record
        .fields()
        .keys()
        .filter(|key| !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        .map(|key| format!("{{{key}}}"))
        .collect();

    // Removing one placeholder can join the braces around it into another.
    loop {
        let before = text.len();
        for placeholder in &odd_keys {
            text = text.replace(placeholder, "");
        }
        text = PLACEHOLDER_RE.replace_all(&text, "").into_owned();
        if text.len() == before {
            return text;
        }
    }
}

/// Printable form of a field value for prompt injection.
///
/// Objects prefer `url`, `platform`, `name`, then `value`, falling back to compact
/// JSON; arrays join their elements with `", "`; null is empty.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(", "),
        Value::Object(map) => PREFERRED_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find(|v| is_truthy(v))
            .map(stringify)
            .unwrap_or_else(|| serde_json::to_string(map).unwrap_or_default()),
    }
}

/// Whether a value carries content: not null, false, zero, or an empty string/array/object.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
