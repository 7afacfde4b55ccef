//! Schema unification: maps the known input shapes onto one canonical record.
//!
//! Member-directory exports and compiled chamber directories name the same facts
//! differently (`name` vs `company_name`, nested vs flat address, ...). Each
//! canonical field is filled from its alternates only when it is missing or empty;
//! every other field passes through untouched.

use serde_json::Value;

use orgenrich_shared::{CanonicalRecord, Record};

use crate::template::{is_truthy, stringify};

/// Address parts joined, in this order, into `primary_address`.
const ADDRESS_PARTS: [&str; 4] = ["street", "city", "region", "postal_code"];

/// Fields consulted, in order, for the social link list.
const SOCIAL_KEYS: [&str; 3] = ["social_links", "social", "socials"];

/// Normalize one raw input object. Never fails; missing data becomes `""` or `[]`.
pub fn unify_record(raw: Record) -> CanonicalRecord {
    let mut out = raw;

    fill_from(&mut out, "company_name", &["name"]);

    if !out.get("primary_address").is_some_and(is_truthy) {
        let address = match out.get("address") {
            Some(Value::Object(parts)) => ADDRESS_PARTS
                .iter()
                .filter_map(|key| parts.get(*key))
                .filter(|v| is_truthy(v))
                .map(stringify)
                .collect::<Vec<_>>()
                .join(", "),
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };
        out.insert("primary_address".into(), Value::String(address));
    }

    fill_from(&mut out, "website_url", &["website"]);

    if !out.get("source_url").is_some_and(is_truthy) {
        if let Some(detail) = out.get("detail_url").filter(|v| is_truthy(v)).cloned() {
            out.insert("source_url".into(), detail);
        }
    }

    let links = social_links(&out);
    out.insert("social_links".into(), Value::Array(links));

    fill_from(&mut out, "about_html", &["about", "description"]);

    CanonicalRecord::new(out)
}

/// Copy the first non-empty alternate into `key` when `key` is empty.
///
/// A missing or null `key` with no usable alternate becomes `""`.
fn fill_from(out: &mut Record, key: &str, alternates: &[&str]) {
    if out.get(key).is_some_and(is_truthy) {
        return;
    }

    let replacement = alternates
        .iter()
        .filter_map(|alt| out.get(*alt))
        .find(|v| is_truthy(v))
        .cloned();

    match replacement {
        Some(value) => {
            out.insert(key.into(), value);
        }
        None if matches!(out.get(key), None | Some(Value::Null)) => {
            out.insert(key.into(), Value::String(String::new()));
        }
        None => {}
    }
}

fn social_links(out: &Record) -> Vec<Value> {
    for key in SOCIAL_KEYS {
        match out.get(key) {
            Some(Value::Array(items)) => return items.clone(),
            Some(value) if is_truthy(value) => return vec![value.clone()],
            _ => {}
        }
    }
    Vec::new()
}
