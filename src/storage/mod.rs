//! Storage collaborator interface.
//!
//! The core does not own the relational schema; it talks to storage through a
//! generic parameterized-query capability and treats every row as a loosely
//! typed column map. The production implementation lives in [`postgres`].

use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

pub mod postgres;

#[cfg(test)]
pub mod mock;

/// Query parameter passed to [`Storage::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Uuid(Uuid),
    UuidArray(Vec<Uuid>),
    Text(String),
    Int(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Json(Value),
    Null,
}

impl From<Uuid> for SqlParam {
    fn from(v: Uuid) -> Self {
        SqlParam::Uuid(v)
    }
}

impl From<Option<Uuid>> for SqlParam {
    fn from(v: Option<Uuid>) -> Self {
        v.map(SqlParam::Uuid).unwrap_or(SqlParam::Null)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Bool(v)
    }
}

impl From<DateTime<Utc>> for SqlParam {
    fn from(v: DateTime<Utc>) -> Self {
        SqlParam::Timestamp(v)
    }
}

impl From<Value> for SqlParam {
    fn from(v: Value) -> Self {
        SqlParam::Json(v)
    }
}

impl From<Vec<Uuid>> for SqlParam {
    fn from(v: Vec<Uuid>) -> Self {
        SqlParam::UuidArray(v)
    }
}

impl SqlParam {
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            SqlParam::Uuid(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlParam::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            SqlParam::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// One result row: column name -> JSON-typed value.
///
/// Timestamps come back as RFC 3339 strings, uuids as strings; the typed
/// getters do the narrowing so call sites stay terse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn insert(&mut self, column: &str, value: Value) {
        self.0.insert(column.to_string(), value);
    }

    pub fn uuid(&self, column: &str) -> Option<Uuid> {
        self.0
            .get(column)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(Value::as_str)
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        self.0.get(column).and_then(Value::as_i64)
    }

    pub fn bool(&self, column: &str) -> Option<bool> {
        self.0.get(column).and_then(Value::as_bool)
    }

    pub fn timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        self.0
            .get(column)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn json(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }
}

/// Generic execute(query, params) -> rows capability.
///
/// Every persistence touch in the core goes through this trait, which keeps
/// the storage engine swappable and the services testable against a mock.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn execute(&self, query: &str, params: &[SqlParam]) -> AppResult<Vec<Row>>;
}
