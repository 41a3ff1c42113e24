//! Content items served by dynamic endpoints, and the typed query shape
//! the resolver hands to the content repository.

#[cfg(test)]
use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::field::FieldType;

/// Maps to the `content_items` table.
///
/// `data` is always a JSON object keyed by field storage keys
/// (`meta_key` when set, otherwise `field_name`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContentItem {
    pub id: i64,
    pub post_type: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
impl ContentItem {
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.data.get(key).filter(|v| !v.is_null())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Equality predicate on one stored key, value already coerced.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    pub key: String,
    pub field_type: FieldType,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct ContentSort {
    pub key: String,
    pub field_type: FieldType,
    pub direction: SortDirection,
}

/// Case-insensitive substring match over the given keys.
#[derive(Debug, Clone)]
pub struct ContentSearch {
    pub term: String,
    pub keys: Vec<String>,
}

/// Fully validated list query.
#[derive(Debug, Clone)]
pub struct ContentQuery {
    pub post_type: String,
    pub filters: Vec<ContentFilter>,
    pub search: Option<ContentSearch>,
    pub sort: Vec<ContentSort>,
    pub limit: u32,
    pub offset: u64,
}

#[derive(Debug, Clone)]
pub struct ContentPage {
    pub items: Vec<ContentItem>,
    pub total: u64,
}

// Evaluated in process by the in-memory store.
#[cfg(test)]
impl ContentQuery {
    /// Whether `item` satisfies every filter and the search term.
    pub fn matches(&self, item: &ContentItem) -> bool {
        if item.post_type != self.post_type {
            return false;
        }

        let filters_match = self.filters.iter().all(|filter| {
            item.value(&filter.key)
                .is_some_and(|stored| values_equal(filter.field_type, stored, &filter.value))
        });
        if !filters_match {
            return false;
        }

        match &self.search {
            None => true,
            Some(search) => {
                let needle = search.term.to_lowercase();
                search.keys.iter().any(|key| {
                    item.value(key)
                        .is_some_and(|v| display(v).to_lowercase().contains(&needle))
                })
            }
        }
    }

    /// Ordering by the sort keys in turn, missing values last, then by id.
    /// A value whose JSON type does not match the field type counts as missing.
    pub fn compare(&self, a: &ContentItem, b: &ContentItem) -> Ordering {
        for sort in &self.sort {
            let ordering = match (
                sort_value(sort.field_type, a, &sort.key),
                sort_value(sort.field_type, b, &sort.key),
            ) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) => {
                    let ord = compare_values(sort.field_type, x, y);
                    match sort.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.id.cmp(&b.id)
    }
}

#[cfg(test)]
fn sort_value<'a>(field_type: FieldType, item: &'a ContentItem, key: &str) -> Option<&'a Value> {
    item.value(key).filter(|v| match field_type {
        FieldType::Integer | FieldType::Number => v.is_number(),
        FieldType::Boolean => v.is_boolean(),
        FieldType::String | FieldType::Date | FieldType::Datetime => true,
    })
}

#[cfg(test)]
fn values_equal(field_type: FieldType, stored: &Value, wanted: &Value) -> bool {
    if matches!(field_type, FieldType::Integer | FieldType::Number) {
        return match (stored.as_f64(), wanted.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        };
    }
    stored == wanted
}

#[cfg(test)]
fn compare_values(field_type: FieldType, a: &Value, b: &Value) -> Ordering {
    match field_type {
        FieldType::Integer | FieldType::Number => {
            let x = a.as_f64().unwrap_or(f64::NAN);
            let y = b.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        FieldType::Boolean => a.as_bool().cmp(&b.as_bool()),
        // Canonical date/datetime strings order lexicographically.
        FieldType::String | FieldType::Date | FieldType::Datetime => display(a).cmp(&display(b)),
    }
}

#[cfg(test)]
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the response object for one item: `id` plus the projected fields,
/// each read from its storage key and emitted under its public name.
pub fn project(item: &ContentItem, projection: &[(String, String)]) -> Value {
    let mut out = Map::new();
    out.insert("id".to_string(), Value::from(item.id));
    for (name, key) in projection {
        out.insert(
            name.clone(),
            item.data.get(key).cloned().unwrap_or(Value::Null),
        );
    }
    Value::Object(out)
}
