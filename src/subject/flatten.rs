//! Detail record flattening
//!
//! The detail API returns nested JSON. The persisted table wants one flat row
//! per subject, so `flatten` rewrites a raw record according to this table:
//!
//! | Source field                      | Row columns                                    |
//! |-----------------------------------|------------------------------------------------|
//! | `images: {size: url}`             | `{size}_cover = url`, one per size             |
//! | `infobox: [{key, value}]`         | `key = value`, later duplicates overwrite      |
//! | `tags: [{name, count}]`           | `tags = {name: count}`                         |
//! | `rating: {rank, total, count}`    | `rank`, `votes`, `ratings`, `rating_score`     |
//! | anything else                     | copied unchanged                               |
//!
//! `rating_score` is the vote-weighted mean of the score buckets in
//! `rating.count`, or empty when nobody voted.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Top-level keys every detail record must carry
pub const REQUIRED_FIELDS: [&str; 4] = ["images", "infobox", "tags", "rating"];

/// Schema problems that make one record unusable
#[derive(Debug, Error, PartialEq)]
pub enum FlattenError {
    #[error("detail record is not a JSON object")]
    NotAnObject,

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// One flattened table row
///
/// Column order follows the source record, with expanded columns appended
/// where `flatten` produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRecord {
    fields: Map<String, Value>,
}

impl FlatRecord {
    /// Returns the raw value of a column, if this row has it
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Iterates over the column names of this row in order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Renders a column as a table cell
    ///
    /// Missing columns and JSON nulls render as the empty string, strings are
    /// written verbatim, and nested values are written as compact JSON.
    pub fn cell(&self, column: &str) -> String {
        match self.fields.get(column) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// Flattens a raw detail record into a table row
///
/// The `images`, `infobox`, `tags` and `rating` keys must be present. A JSON
/// null in `images`, `infobox` or `tags` counts as empty; `rating` must be an
/// object.
pub fn flatten(raw: Value) -> Result<FlatRecord, FlattenError> {
    let Value::Object(source) = raw else {
        return Err(FlattenError::NotAnObject);
    };

    let mut images = None;
    let mut infobox = None;
    let mut tags_seen = false;
    let mut rating = None;
    let mut fields = Map::new();

    for (key, value) in source {
        match key.as_str() {
            "images" => images = Some(value),
            "infobox" => infobox = Some(value),
            "rating" => rating = Some(value),
            "tags" => {
                tags_seen = true;
                fields.insert(key, Value::Object(collapse_tags(value)?));
            }
            _ => {
                fields.insert(key, value);
            }
        }
    }

    if !tags_seen {
        return Err(FlattenError::MissingField("tags"));
    }

    let images = images.ok_or(FlattenError::MissingField("images"))?;
    for (size, url) in expand_images(images)? {
        fields.insert(format!("{size}_cover"), url);
    }

    let infobox = infobox.ok_or(FlattenError::MissingField("infobox"))?;
    for (key, value) in expand_infobox(infobox)? {
        fields.insert(key, value);
    }

    let rating = Rating::from_value(rating.ok_or(FlattenError::MissingField("rating"))?)?;
    let score = rating.score();
    fields.insert("rank".to_string(), rating.rank);
    fields.insert("votes".to_string(), Value::from(rating.votes));
    fields.insert("ratings".to_string(), Value::Object(rating.counts));
    fields.insert("rating_score".to_string(), score);

    Ok(FlatRecord { fields })
}

fn expand_images(images: Value) -> Result<Map<String, Value>, FlattenError> {
    match images {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(invalid("images", format!("expected object, got {other}"))),
    }
}

fn expand_infobox(infobox: Value) -> Result<Vec<(String, Value)>, FlattenError> {
    let items = match infobox {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => return Err(invalid("infobox", format!("expected list, got {other}"))),
    };

    items
        .into_iter()
        .map(|item| {
            let Value::Object(mut entry) = item else {
                return Err(invalid("infobox", "entry is not an object".to_string()));
            };
            let key = match entry.remove("key") {
                Some(Value::String(key)) => key,
                _ => return Err(invalid("infobox", "entry without a string key".to_string())),
            };
            let value = entry
                .remove("value")
                .ok_or_else(|| invalid("infobox", format!("entry '{key}' has no value")))?;
            Ok((key, value))
        })
        .collect()
}

fn collapse_tags(tags: Value) -> Result<Map<String, Value>, FlattenError> {
    let items = match tags {
        Value::Null => return Ok(Map::new()),
        Value::Array(items) => items,
        other => return Err(invalid("tags", format!("expected list, got {other}"))),
    };

    let mut collapsed = Map::new();
    for item in items {
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("tags", "tag without a name".to_string()))?;
        let count = item.get("count").cloned().unwrap_or(Value::Null);
        collapsed.insert(name.to_string(), count);
    }
    Ok(collapsed)
}

/// The parts of `rating` that end up in the row
struct Rating {
    rank: Value,
    votes: u64,
    counts: Map<String, Value>,
}

impl Rating {
    fn from_value(value: Value) -> Result<Self, FlattenError> {
        let Value::Object(mut rating) = value else {
            return Err(invalid("rating", "expected object".to_string()));
        };

        let rank = rating
            .remove("rank")
            .ok_or(FlattenError::MissingField("rating.rank"))?;
        let votes = rating
            .get("total")
            .ok_or(FlattenError::MissingField("rating.total"))?
            .as_u64()
            .ok_or_else(|| invalid("rating", "total is not a vote count".to_string()))?;
        let counts = match rating.remove("count") {
            Some(Value::Object(counts)) => counts,
            Some(_) => return Err(invalid("rating", "count is not an object".to_string())),
            None => return Err(FlattenError::MissingField("rating.count")),
        };

        Ok(Self {
            rank,
            votes,
            counts,
        })
    }

    fn score(&self) -> Value {
        if self.votes == 0 {
            return Value::Null;
        }

        let mut weighted = 0.0;
        for (bucket, count) in &self.counts {
            let (Ok(score), Some(count)) = (bucket.parse::<i64>(), count.as_f64()) else {
                continue;
            };
            weighted += score as f64 * count;
        }

        Number::from_f64(weighted / self.votes as f64)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn invalid(field: &'static str, reason: String) -> FlattenError {
    FlattenError::InvalidField { field, reason }
}
