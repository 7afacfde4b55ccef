//! Merge generation output onto a record and enforce the document schema.
//!
//! Malformed output never fails a record: problems are written into the document
//! under `validation_warning` so they can be reviewed after indexing.

use serde_json::Value;
use tracing::warn;

use orgenrich_shared::{
    AfiBand, Anomaly, CANONICAL_KEYS, CanonicalRecord, ENRICHMENT_KEYS, EnrichedDocument, Record,
    WARNING_KEY,
};

/// A merged document plus the parse error, if the response was not a JSON object.
#[derive(Debug, Clone)]
pub struct Validated {
    pub document: EnrichedDocument,
    pub decode_error: Option<String>,
}

/// Parse `raw`, overlay it on `record`, fill required keys, and normalize the AFI fields.
pub fn validate_response(record: &CanonicalRecord, raw: &str) -> Validated {
    let mut fields = record.fields().clone();

    let decode_error = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(generated)) => {
            for (key, value) in generated {
                fields.insert(key, value);
            }
            None
        }
        Ok(other) => Some(format!("response was {}, not an object", json_kind(&other))),
        Err(e) => Some(e.to_string()),
    };

    if let Some(err) = &decode_error {
        warn!(error = %err, "generation response is not a JSON object");
        fields.insert(
            WARNING_KEY.into(),
            Value::from(Anomaly::JsonDecodeFailure.as_str()),
        );
    }

    ensure_required_keys(&mut fields);
    normalize_afi(&mut fields);

    Validated {
        document: EnrichedDocument::new(fields),
        decode_error,
    }
}

/// Insert `null` for every canonical or enrichment key that is missing.
pub fn ensure_required_keys(fields: &mut Record) {
    for key in CANONICAL_KEYS.iter().chain(ENRICHMENT_KEYS.iter()) {
        fields.entry(*key).or_insert(Value::Null);
    }
}

/// Round `afi_score` to one decimal and make `afi_band` agree with it.
///
/// A score that cannot be read as a finite number is left as is and flagged
/// `afi_score_invalid`, unless another warning is already present.
pub fn normalize_afi(fields: &mut Record) {
    let Some(score) = fields.get("afi_score").and_then(coerce_score) else {
        fields
            .entry(WARNING_KEY)
            .or_insert_with(|| Value::from(Anomaly::AfiScoreInvalid.as_str()));
        return;
    };

    let score = round_one_decimal(score);
    fields.insert("afi_score".into(), Value::from(score));

    let band = AfiBand::for_score(score);
    let current = fields
        .get("afi_band")
        .and_then(Value::as_str)
        .and_then(AfiBand::parse);
    if current != Some(band) {
        fields.insert("afi_band".into(), Value::from(band.as_str()));
    }
}

/// JSON numbers, or strings holding one, as a finite `f64`.
fn coerce_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    score.filter(|x| x.is_finite())
}

/// Round on the exact binary value, ties to even: `0.95` is stored just below the
/// midpoint and becomes `0.9`, `0.25` is an exact tie and becomes `0.2`.
fn round_one_decimal(x: f64) -> f64 {
    format!("{x:.1}").parse().unwrap_or(x)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
