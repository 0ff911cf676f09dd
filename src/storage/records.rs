//! Record read/write capability
//!
//! The engine reads records to recompute them and writes back only the
//! changed calculated fields. [`JsonlRecordStore`] keeps one
//! `.recalc/data/<collection>.jsonl` file per collection;
//! [`MemoryRecordStore`] holds the same data in memory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use parking_lot::RwLock;

use super::config::PROJECT_DIR;
use super::jsonl::JsonlFile;
use crate::domain::{values_equal, Record, Value};

/// Field holding a record's identity
pub const ID_FIELD: &str = "id";

/// Equality filter, projection and paging for [`RecordStore::read_many`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    /// Every entry must match the record's field
    pub filter: Record,
    /// Only records with one of these ids
    pub ids: Option<Vec<String>>,
    /// Fields to return; the id is always kept
    pub fields: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl RecordQuery {
    pub fn filtered(filter: Record) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Matches the records with these ids, whatever their other fields
    pub fn by_ids(ids: Vec<String>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    /// Returns only the id field
    pub fn ids_only(mut self) -> Self {
        self.fields = Some(Vec::new());
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

pub trait RecordStore {
    /// Reads one record by id, optionally projected
    fn read_one(&self, collection: &str, id: &str, fields: Option<&[String]>) -> Result<Option<Record>>;

    /// Reads the records matching `query`, in storage order
    fn read_many(&self, collection: &str, query: &RecordQuery) -> Result<Vec<Record>>;

    /// Number of records matching `filter`, when the store can tell cheaply
    fn count(&self, collection: &str, filter: &Record) -> Result<Option<usize>>;

    /// Merges `updates` into the record `id`. Returns false when it does not exist.
    fn update_one(&self, collection: &str, id: &str, updates: &Record) -> Result<bool>;

    /// Creates or patches a record, assigning an id when it has none.
    /// Returns the record's id.
    fn put(&self, collection: &str, record: Record) -> Result<String>;
}

/// The record's id as text
pub fn record_id(record: &Record) -> Option<String> {
    record
        .get(ID_FIELD)
        .filter(|v| !v.is_null())
        .map(Value::to_text)
}

fn matches(record: &Record, filter: &Record) -> bool {
    filter.iter().all(|(field, expected)| {
        let actual = record.get(field).unwrap_or(&Value::Null);
        values_equal(actual, expected)
    })
}

fn project(record: &Record, fields: Option<&[String]>) -> Record {
    match fields {
        None => record.clone(),
        Some(fields) => record
            .iter()
            .filter(|(name, _)| name.as_str() == ID_FIELD || fields.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    }
}

fn has_listed_id(record: &Record, ids: Option<&[String]>) -> bool {
    match ids {
        None => true,
        Some(ids) => record_id(record).is_some_and(|id| ids.contains(&id)),
    }
}

fn select(records: &[Record], query: &RecordQuery) -> Vec<Record> {
    records
        .iter()
        .filter(|r| has_listed_id(r, query.ids.as_deref()) && matches(r, &query.filter))
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .map(|r| project(r, query.fields.as_deref()))
        .collect()
}

fn find_mut<'a>(records: &'a mut [Record], id: &str) -> Option<&'a mut Record> {
    records
        .iter_mut()
        .find(|r| record_id(r).as_deref() == Some(id))
}

/// Merges `record` into `records`, returning its id
fn upsert(records: &mut Vec<Record>, mut record: Record) -> String {
    if let Some(id) = record_id(&record) {
        if let Some(existing) = find_mut(records, &id) {
            existing.extend(record);
            return id;
        }
        records.push(record);
        return id;
    }

    let next = records
        .iter()
        .filter_map(|r| r.get(ID_FIELD).and_then(Value::to_number))
        .fold(0.0_f64, f64::max)
        .floor() as i64
        + 1;
    record.insert(ID_FIELD.to_string(), Value::from(next));
    records.push(record);
    next.to_string()
}

fn check_collection_name(collection: &str) -> Result<()> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        bail!(
            "Invalid collection name '{}': use letters, digits, '_' or '-'",
            collection
        );
    }
    Ok(())
}

/// One JSONL file per collection
#[derive(Debug, Clone)]
pub struct JsonlRecordStore {
    dir: PathBuf,
}

impl JsonlRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(PROJECT_DIR).join("data"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, collection: &str) -> Result<JsonlFile> {
        check_collection_name(collection)?;
        Ok(JsonlFile::new(
            self.dir.join(format!("{}.jsonl", collection)),
            "record",
        ))
    }

    /// Every record of `collection`
    pub fn read_all(&self, collection: &str) -> Result<Vec<Record>> {
        self.file(collection)?.read_all()
    }
}

impl RecordStore for JsonlRecordStore {
    fn read_one(&self, collection: &str, id: &str, fields: Option<&[String]>) -> Result<Option<Record>> {
        Ok(self
            .read_all(collection)?
            .iter()
            .find(|r| record_id(r).as_deref() == Some(id))
            .map(|r| project(r, fields)))
    }

    fn read_many(&self, collection: &str, query: &RecordQuery) -> Result<Vec<Record>> {
        Ok(select(&self.read_all(collection)?, query))
    }

    fn count(&self, collection: &str, filter: &Record) -> Result<Option<usize>> {
        let records = self.read_all(collection)?;
        Ok(Some(records.iter().filter(|r| matches(r, filter)).count()))
    }

    fn update_one(&self, collection: &str, id: &str, updates: &Record) -> Result<bool> {
        let file = self.file(collection)?;
        let mut records: Vec<Record> = file.read_all()?;
        let Some(record) = find_mut(&mut records, id) else {
            return Ok(false);
        };
        record.extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));
        file.write_all(&records)?;
        Ok(true)
    }

    fn put(&self, collection: &str, record: Record) -> Result<String> {
        let file = self.file(collection)?;
        let mut records: Vec<Record> = file.read_all()?;
        let id = upsert(&mut records, record);
        file.write_all(&records)?;
        Ok(id)
    }
}

/// Records held in memory, per collection
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    collections: RwLock<BTreeMap<String, Vec<Record>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record of `collection`
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn read_one(&self, collection: &str, id: &str, fields: Option<&[String]>) -> Result<Option<Record>> {
        let collections = self.collections.read();
        Ok(collections.get(collection).and_then(|records| {
            records
                .iter()
                .find(|r| record_id(r).as_deref() == Some(id))
                .map(|r| project(r, fields))
        }))
    }

    fn read_many(&self, collection: &str, query: &RecordQuery) -> Result<Vec<Record>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|records| select(records, query))
            .unwrap_or_default())
    }

    fn count(&self, collection: &str, filter: &Record) -> Result<Option<usize>> {
        let collections = self.collections.read();
        Ok(Some(
            collections
                .get(collection)
                .map(|records| records.iter().filter(|r| matches(r, filter)).count())
                .unwrap_or(0),
        ))
    }

    fn update_one(&self, collection: &str, id: &str, updates: &Record) -> Result<bool> {
        let mut collections = self.collections.write();
        let Some(record) = collections
            .get_mut(collection)
            .and_then(|records| find_mut(records, id))
        else {
            return Ok(false);
        };
        record.extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(true)
    }

    fn put(&self, collection: &str, record: Record) -> Result<String> {
        let mut collections = self.collections.write();
        let records = collections.entry(collection.to_string()).or_default();
        Ok(upsert(records, record))
    }
}
