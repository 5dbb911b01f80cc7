use crate::query::{Namespace, Statement};
use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

mod influx;

pub use influx::InfluxStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Query against `{namespace}` failed: {reason}")]
    QueryFailed { namespace: String, reason: String },
    #[error("Target not found in `{namespace}`: {reason}")]
    TargetNotFound { namespace: String, reason: String },
}

impl StoreError {
    pub fn query_failed(namespace: &Namespace, reason: impl Into<String>) -> Self {
        StoreError::QueryFailed {
            namespace: namespace.to_string(),
            reason: reason.into(),
        }
    }

    /// Reclassify a failed delete. A missing measurement or database is [StoreError::TargetNotFound].
    ///
    /// Only deletes are reclassified; a read against a missing target stays a failed query.
    pub fn for_delete(self) -> Self {
        match self {
            StoreError::QueryFailed { namespace, reason } if reason.contains("not found") => {
                StoreError::TargetNotFound { namespace, reason }
            }
            other => other,
        }
    }
}

/// Read-only access to a time-series store, plus statement execution for deletes.
///
/// Implementations must not retry; callers decide what to do with a failure.
pub trait TimeSeriesStore: Send + Sync {
    fn query<'a>(
        &'a self,
        namespace: &'a Namespace,
        statement: &'a Statement,
    ) -> BoxFuture<'a, Result<QueryResponse, StoreError>>;

    fn execute<'a>(
        &'a self,
        namespace: &'a Namespace,
        statement: &'a Statement,
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// The result of a single statement: zero or more series, one per measurement and tag set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub series: Vec<QuerySeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySeries {
    pub name: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<QuerySeries>,
    #[serde(default)]
    error: Option<String>,
}

impl QueryResponse {
    /// Decode one entry of the `results` array of an InfluxDB JSON response.
    ///
    /// A result without series is an empty response, not an error.
    pub fn from_statement_result(namespace: &Namespace, result: Value) -> Result<Self, StoreError> {
        let result: StatementResult =
            serde_json::from_value(result).map_err(|e| StoreError::QueryFailed {
                namespace: namespace.to_string(),
                reason: format!("Malformed response: {e}"),
            })?;

        if let Some(error) = result.error {
            return Err(StoreError::query_failed(namespace, error));
        }

        Ok(Self {
            series: result.series,
        })
    }

    /// Whether there are no rows at all.
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|series| series.values.is_empty())
    }

    /// Rows of every series, in order.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.series.iter().flat_map(QuerySeries::rows)
    }
}

impl QuerySeries {
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.values.iter().map(move |values| Row {
            series: self,
            values,
        })
    }
}

/// One row of a series, with access to columns by name and to the series' group tags.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    series: &'a QuerySeries,
    values: &'a [Value],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.series
            .columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Numeric value of a column. Nulls and non-numeric values are `None`.
    pub fn f64(&self, column: &str) -> Option<f64> {
        match self.get(column)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn str(&self, column: &str) -> Option<&'a str> {
        self.get(column).and_then(Value::as_str)
    }

    /// A tag value, from the series group tags or else from a selected column.
    pub fn tag(&self, name: &str) -> Option<&'a str> {
        self.series
            .tags
            .get(name)
            .map(String::as_str)
            .or_else(|| self.str(name))
    }

    pub fn time(&self) -> anyhow::Result<DateTime<Utc>> {
        let raw = self.str("time").context("Row has no time column")?;
        Ok(DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid row time: {raw}"))?
            .with_timezone(&Utc))
    }

    /// Map of every non-time column to its numeric value.
    pub fn numeric_columns(&self) -> BTreeMap<String, Option<f64>> {
        self.series
            .columns
            .iter()
            .filter(|column| column.as_str() != "time")
            .map(|column| (column.clone(), self.f64(column)))
            .collect()
    }
}
