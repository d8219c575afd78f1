//! The request context an MQL query is compiled against.
//!
//! The query text only names metrics and arithmetic. Everything else a plan
//! needs (time range, tenant scope, rollup and paging) comes from a JSON
//! context payload deserialized into [`MqlContext`].

mod populate;

pub use populate::populate_query_from_context;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{MqlError, MqlResult};

/// Mapping from metric and tag names to their indexed integer ids.
pub type IndexerMappings = BTreeMap<String, u64>;

/// Request context supplied next to the query text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MqlContext {
    pub start: String,
    pub end: String,
    pub rollup: Rollup,
    pub scope: Scope,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub indexer_mappings: IndexerMappings,
}

/// Time bucketing of the result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Rollup {
    /// Storage granularity in seconds.
    pub granularity: u64,
    /// Bucket width in seconds; absent (or zero) for a single total.
    #[serde(default)]
    pub interval: Option<u64>,
    /// Must be the string "True" or "False" when present.
    #[serde(default)]
    pub with_totals: Option<Value>,
    /// "ASC" or "DESC".
    #[serde(default)]
    pub orderby: Option<String>,
}

/// Tenant scope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scope {
    pub org_ids: Vec<i64>,
    pub project_ids: Vec<i64>,
    pub use_case_id: String,
}

impl MqlContext {
    /// Deserialize a context payload.
    pub fn from_value(value: &Value) -> MqlResult<Self> {
        MqlContext::deserialize(value)
            .map_err(|e| MqlError::semantic(format!("invalid MQL context: {}", e)))
    }

    /// The `[start, end)` time range.
    pub fn time_range(&self) -> MqlResult<(DateTime<Utc>, DateTime<Utc>)> {
        match (parse_datetime(&self.start), parse_datetime(&self.end)) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(MqlError::semantic("Invalid start or end time")),
        }
    }
}

/// Parse RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS` taken as UTC.
fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
