//! Core domain types for organization records and their enriched documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A raw JSON object, keyed by field name, in source order.
pub type Record = Map<String, Value>;

/// Keys every record carries after schema unification.
pub const CANONICAL_KEYS: [&str; 5] = [
    "company_name",
    "primary_address",
    "website_url",
    "social_links",
    "about_html",
];

/// Keys the generation service is asked to fill in.
pub const ENRICHMENT_KEYS: [&str; 12] = [
    "main_industry",
    "ai_benefit_score",
    "ai_benefit_reason",
    "data_volume_score",
    "data_volume_reason",
    "opensearch_score",
    "opensearch_reason",
    "ai_initiative_maturity_score",
    "ai_initiative_maturity_reason",
    "afi_score",
    "afi_band",
    "afi_reason",
];

/// Document key holding the anomaly flag for downstream review.
pub const WARNING_KEY: &str = "validation_warning";

/// Fallback document id when a record has no usable name.
const NO_ID: &str = "noid";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AfiBand / Anomaly
// ---------------------------------------------------------------------------

/// Categorical band derived from the numeric AFI score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AfiBand {
    High,
    Mid,
    Low,
}

impl AfiBand {
    /// Band for a score: `>= 1.0` is High, `>= 0.5` is Mid, anything else Low.
    pub fn for_score(score: f64) -> Self {
        if score >= 1.0 {
            Self::High
        } else if score >= 0.5 {
            Self::Mid
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Mid => "Mid",
            Self::Low => "Low",
        }
    }

    /// Parse an exact band label. Case matters: `"high"` is not a valid band.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "High" => Some(Self::High),
            "Mid" => Some(Self::Mid),
            "Low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for AfiBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data anomaly recorded in a document instead of failing the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anomaly {
    /// The generation response was not a JSON object.
    JsonDecodeFailure,
    /// `afi_score` could not be read as a number.
    AfiScoreInvalid,
}

impl Anomaly {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonDecodeFailure => "json_decode_failure",
            Self::AfiScoreInvalid => "afi_score_invalid",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "json_decode_failure" => Some(Self::JsonDecodeFailure),
            "afi_score_invalid" => Some(Self::AfiScoreInvalid),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// CanonicalRecord
// ---------------------------------------------------------------------------

/// One organization record after schema unification.
///
/// Constructed by `orgenrich_core::unify`; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalRecord(Record);

impl CanonicalRecord {
    /// Wrap an already-unified field map.
    pub fn new(fields: Record) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn fields(&self) -> &Record {
        &self.0
    }

    pub fn into_fields(self) -> Record {
        self.0
    }

    /// Name used in log lines: `company_name`, or `idx_{position}` when it is blank.
    pub fn display_name(&self, position: usize) -> String {
        match self.0.get("company_name") {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            _ => format!("idx_{position}"),
        }
    }

    /// Index document id for this record. See [`doc_id_for`].
    pub fn doc_id(&self) -> String {
        doc_id_for(&self.0)
    }
}

// ---------------------------------------------------------------------------
// EnrichedDocument
// ---------------------------------------------------------------------------

/// A canonical record merged with generation output, ready to index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrichedDocument(Record);

impl EnrichedDocument {
    pub fn new(fields: Record) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn fields(&self) -> &Record {
        &self.0
    }

    pub fn fields_mut(&mut self) -> &mut Record {
        &mut self.0
    }

    /// Numeric AFI score, if the field holds a JSON number.
    pub fn afi_score(&self) -> Option<f64> {
        self.0.get("afi_score").and_then(Value::as_f64)
    }

    pub fn afi_band(&self) -> Option<AfiBand> {
        self.0
            .get("afi_band")
            .and_then(Value::as_str)
            .and_then(AfiBand::parse)
    }

    /// The recorded anomaly flag, if it is one we set ourselves.
    pub fn anomaly(&self) -> Option<Anomaly> {
        self.0
            .get(WARNING_KEY)
            .and_then(Value::as_str)
            .and_then(Anomaly::parse)
    }

    pub fn doc_id(&self) -> String {
        doc_id_for(&self.0)
    }
}

/// Filesystem-safe document id derived from the record's name.
///
/// First non-empty string among `company_name` and `name`, else `noid`; lowercased,
/// spaces become underscores, slashes are dropped. Collisions are left to the index.
pub fn doc_id_for(fields: &Record) -> String {
    let name = ["company_name", "name"]
        .iter()
        .filter_map(|key| fields.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or(NO_ID);

    name.replace(' ', "_").replace('/', "").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn band_thresholds() {
        assert_eq!(AfiBand::for_score(1.0), AfiBand::High);
        assert_eq!(AfiBand::for_score(2.7), AfiBand::High);
        assert_eq!(AfiBand::for_score(0.5), AfiBand::Mid);
        assert_eq!(AfiBand::for_score(0.99), AfiBand::Mid);
        assert_eq!(AfiBand::for_score(0.49), AfiBand::Low);
        assert_eq!(AfiBand::for_score(-1.0), AfiBand::Low);
    }

    #[test]
    fn band_parse_is_exact() {
        assert_eq!(AfiBand::parse("Mid"), Some(AfiBand::Mid));
        assert_eq!(AfiBand::parse("mid"), None);
        assert_eq!(AfiBand::parse(""), None);
    }

    #[test]
    fn doc_id_slug() {
        let fields = record(json!({"company_name": "Acme Widgets / Boulder"}));
        assert_eq!(doc_id_for(&fields), "acme_widgets__boulder");
    }

    #[test]
    fn doc_id_falls_back_to_name_then_noid() {
        let fields = record(json!({"company_name": "", "name": "Beta Co"}));
        assert_eq!(doc_id_for(&fields), "beta_co");

        let fields = record(json!({"company_name": 42}));
        assert_eq!(doc_id_for(&fields), "noid");
    }

    #[test]
    fn display_name_uses_position_when_blank() {
        let rec = CanonicalRecord::new(record(json!({"company_name": ""})));
        assert_eq!(rec.display_name(7), "idx_7");

        let rec = CanonicalRecord::new(record(json!({"company_name": "Acme"})));
        assert_eq!(rec.display_name(7), "Acme");
    }

    #[test]
    fn document_accessors() {
        let doc = EnrichedDocument::new(record(json!({
            "afi_score": 0.7,
            "afi_band": "Mid",
            "validation_warning": "afi_score_invalid",
        })));
        assert_eq!(doc.afi_score(), Some(0.7));
        assert_eq!(doc.afi_band(), Some(AfiBand::Mid));
        assert_eq!(doc.anomaly(), Some(Anomaly::AfiScoreInvalid));
    }

    #[test]
    fn document_serializes_as_plain_object() {
        let doc = EnrichedDocument::new(record(json!({"company_name": "Acme", "afi_band": null})));
        let line = serde_json::to_string(&doc).unwrap();
        assert_eq!(line, r#"{"company_name":"Acme","afi_band":null}"#);
    }
}
