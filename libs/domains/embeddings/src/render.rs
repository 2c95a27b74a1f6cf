//! Canonical text renderings that get embedded.
//!
//! A record's vector is only comparable to a query vector if every writer
//! renders the record the same way, so both inline embedding and the
//! backfill go through [`Embeddable::render`].

use serde_json::{Map, Value};

use crate::models::{Message, NewMessage, NewPatientMemory, PatientMemory};

const PART_SEPARATOR: &str = ". ";
/// Search results contributing snippets to a message rendering.
const MAX_CONTEXT_RESULTS: usize = 3;
/// Metadata keys rendered first, in this order, with a capitalized label.
const LEADING_METADATA: [(&str, &str); 3] = [
    ("description", "Description"),
    ("severity", "Severity"),
    ("status", "Status"),
];

/// A row that can be turned into embedding input.
pub trait Embeddable {
    fn id(&self) -> &str;

    /// Empty when there is nothing worth embedding.
    fn render(&self) -> String;
}

/// `"{role}: {content}"`, followed by `"Context: ..."` built from the
/// snippets of the first three search results.
pub fn render_message(role: &str, content: &str, search_results: Option<&Value>) -> String {
    let mut parts = Vec::with_capacity(2);

    let content = content.trim();
    if !content.is_empty() {
        parts.push(format!("{}: {}", role.trim(), content));
    }

    let snippets: Vec<&str> = search_results
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .take(MAX_CONTEXT_RESULTS)
                .filter_map(|r| r.get("snippet").and_then(Value::as_str))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if !snippets.is_empty() {
        parts.push(format!("Context: {}", snippets.join(" ")));
    }

    parts.join(PART_SEPARATOR)
}

/// `"{entityType}: {entityName}"`, then relationships, then metadata.
pub fn render_memory(
    entity_type: &str,
    entity_name: &str,
    relationships: Option<&Value>,
    metadata: Option<&Value>,
) -> String {
    let entity_name = entity_name.trim();
    if entity_name.is_empty() {
        return String::new();
    }

    let mut parts = vec![format!("{}: {}", entity_type.trim(), entity_name)];

    let relations: Vec<String> = relationships
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|rel| {
                    let kind = rel.get("type")?.as_str()?;
                    let target = rel.get("relatedEntity")?.as_str()?;
                    Some(format!("{} {}", kind, target))
                })
                .collect()
        })
        .unwrap_or_default();

    if !relations.is_empty() {
        parts.push(format!("Relationships: {}", relations.join(", ")));
    }

    if let Some(metadata) = metadata.and_then(Value::as_object) {
        parts.extend(render_metadata(metadata));
    }

    parts.join(PART_SEPARATOR)
}

fn render_metadata(metadata: &Map<String, Value>) -> Vec<String> {
    let mut parts = Vec::new();

    for (key, label) in LEADING_METADATA {
        if let Some(value) = metadata.get(key).and_then(scalar_text) {
            parts.push(format!("{}: {}", label, value));
        }
    }

    let mut rest: Vec<(&String, String)> = metadata
        .iter()
        .filter(|(key, _)| !LEADING_METADATA.iter().any(|(k, _)| k == key))
        .filter_map(|(key, value)| scalar_text(value).map(|text| (key, text)))
        .collect();
    rest.sort_by(|a, b| a.0.cmp(b.0));

    parts.extend(rest.into_iter().map(|(key, value)| format!("{}: {}", key, value)));
    parts
}

/// Strings, numbers and booleans; nested values and nulls are skipped.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl Embeddable for Message {
    fn id(&self) -> &str {
        &self.id
    }

    fn render(&self) -> String {
        render_message(&self.role, &self.content, self.search_results.as_ref())
    }
}

impl Embeddable for NewMessage {
    fn id(&self) -> &str {
        &self.id
    }

    fn render(&self) -> String {
        render_message(&self.role, &self.content, self.search_results.as_ref())
    }
}

impl Embeddable for PatientMemory {
    fn id(&self) -> &str {
        &self.id
    }

    fn render(&self) -> String {
        render_memory(
            &self.entity_type,
            &self.entity_name,
            self.relationships.as_ref(),
            self.metadata.as_ref(),
        )
    }
}

impl Embeddable for NewPatientMemory {
    fn id(&self) -> &str {
        &self.id
    }

    fn render(&self) -> String {
        render_memory(
            &self.entity_type,
            &self.entity_name,
            self.relationships.as_ref(),
            self.metadata.as_ref(),
        )
    }
}
