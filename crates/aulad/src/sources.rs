use std::fs;
use std::path::{Path, PathBuf};

use aula_core::{
    Career, Catalog, CatalogItem, CatalogProvider, CoreError, RawSearchRecord,
    SearchHistoryProvider, Topic,
};
use serde_json::{Map, Value};

/// Catalog read from a JSON document shaped `{courses, topics, resources}`.
///
/// Entries without an integer `id` or a string `name` are dropped one by one.
/// A `topics` or `careers` field of the wrong shape is treated as empty.
#[derive(Debug, Clone)]
pub struct JsonCatalogFile {
    path: PathBuf,
}

impl JsonCatalogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogProvider for JsonCatalogFile {
    fn load_catalog(&self) -> Result<Catalog, CoreError> {
        let document = read_json(&self.path)?;
        let Value::Object(sections) = document else {
            return Err(CoreError::InvalidSource(format!(
                "{}: expected a JSON object with courses, topics and resources",
                self.path.display()
            )));
        };

        let mut dropped = 0usize;
        let courses = section(&sections, "courses")
            .filter_map(|row| item_from_value(row).or_else(|| drop_row(&mut dropped)))
            .collect::<Vec<_>>();
        let resources = section(&sections, "resources")
            .filter_map(|row| item_from_value(row).or_else(|| drop_row(&mut dropped)))
            .collect::<Vec<_>>();
        let topics = section(&sections, "topics")
            .filter_map(|row| topic_from_value(row).or_else(|| drop_row(&mut dropped)))
            .collect::<Vec<_>>();

        if dropped > 0 {
            tracing::warn!(
                path = %self.path.display(),
                dropped,
                "dropped catalog entries without an integer id or a string name"
            );
        }
        tracing::debug!(
            path = %self.path.display(),
            courses = courses.len(),
            topics = topics.len(),
            resources = resources.len(),
            "loaded catalog file"
        );
        Ok(Catalog::new(courses, topics).with_resources(resources))
    }
}

/// Search history read from a JSON array of `{query, timestamp, resultsCount}` rows.
///
/// The file is returned whole; windowing happens during aggregation. Rows
/// with fields of the wrong type come back with those fields unset so the
/// parser can skip and count them.
#[derive(Debug, Clone)]
pub struct JsonHistoryFile {
    path: PathBuf,
}

impl JsonHistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SearchHistoryProvider for JsonHistoryFile {
    fn load_history(&self, _window_days: Option<u32>) -> Result<Vec<RawSearchRecord>, CoreError> {
        let Value::Array(rows) = read_json(&self.path)? else {
            return Err(CoreError::InvalidSource(format!(
                "{}: expected a JSON array of search records",
                self.path.display()
            )));
        };
        Ok(rows.iter().map(record_from_value).collect())
    }
}

fn read_json(path: &Path) -> Result<Value, CoreError> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|err| CoreError::InvalidSource(format!("{}: {err}", path.display())))
}

fn section<'a>(sections: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Value> {
    sections
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn drop_row<T>(dropped: &mut usize) -> Option<T> {
    *dropped += 1;
    None
}

fn string_field(row: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| row.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
}

fn record_from_value(row: &Value) -> RawSearchRecord {
    let results_count = ["resultsCount", "results_count"]
        .iter()
        .find_map(|key| row.get(*key).and_then(Value::as_u64))
        .and_then(|count| u32::try_from(count).ok());
    RawSearchRecord {
        query: string_field(row, &["query"]),
        timestamp: string_field(row, &["timestamp", "created_at"]),
        results_count,
    }
}

fn item_from_value(row: &Value) -> Option<CatalogItem> {
    let id = row.get("id")?.as_i64()?;
    let name = row.get("name")?.as_str()?;

    let mut item = CatalogItem::new(id, name);
    item.description = string_field(row, &["description"]);
    item.topics = row
        .get("topics")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_owned)
        .collect();
    item.careers = row
        .get("careers")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|career| {
            let name = career.get("name")?.as_str()?;
            let area = career.get("area").and_then(Value::as_str);
            Some(Career::new(name, area))
        })
        .collect();
    Some(item)
}

fn topic_from_value(row: &Value) -> Option<Topic> {
    let id = row.get("id")?.as_i64()?;
    let name = row.get("name")?.as_str()?;
    Some(Topic::new(id, name))
}
