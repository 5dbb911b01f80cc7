//! Canned store responses for tests.

use crate::query::{Namespace, Statement};
use crate::store::{QueryResponse, StoreError, TimeSeriesStore};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use perf_report_model::{ReportRegistry, RunReport};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
enum Fixture {
    /// One entry of the `results` array of an InfluxDB response
    Result(Value),
    Fail(String),
}

/// In-memory [TimeSeriesStore].
///
/// Statements are answered by the first registered fixture whose pattern is a substring of the
/// statement. Statements that match nothing get an empty result, as InfluxDB gives for a query
/// that selects no rows. Every statement is recorded together with its namespace.
#[derive(Debug, Default)]
pub struct FixtureStore {
    fixtures: Mutex<Vec<(String, Fixture)>>,
    statements: Mutex<Vec<(String, String)>>,
}

impl FixtureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `pattern` with the given series, each built with [series].
    pub fn respond(&self, pattern: &str, series: Vec<Value>) -> &Self {
        self.fixtures.lock().push((
            pattern.to_string(),
            Fixture::Result(json!({ "statement_id": 0, "series": series })),
        ));
        self
    }

    /// Fail statements containing `pattern` with an error reported by the store.
    ///
    /// Failures are [StoreError::QueryFailed], except that executed statements whose reason
    /// contains `not found` become [StoreError::TargetNotFound].
    pub fn fail(&self, pattern: &str, reason: &str) -> &Self {
        self.fixtures
            .lock()
            .push((pattern.to_string(), Fixture::Fail(reason.to_string())));
        self
    }

    /// `(namespace, statement)` for every statement received so far, in order.
    pub fn statements(&self) -> Vec<(String, String)> {
        self.statements.lock().clone()
    }

    /// Statements received so far that contain `pattern`.
    pub fn statements_matching(&self, pattern: &str) -> Vec<String> {
        self.statements
            .lock()
            .iter()
            .filter(|(_, statement)| statement.contains(pattern))
            .map(|(_, statement)| statement.clone())
            .collect()
    }

    fn answer(
        &self,
        namespace: &Namespace,
        statement: &Statement,
    ) -> Result<QueryResponse, StoreError> {
        log::debug!("Fixture query on {namespace}: {statement}");
        self.statements
            .lock()
            .push((namespace.to_string(), statement.to_string()));

        let fixture = self
            .fixtures
            .lock()
            .iter()
            .find(|(pattern, _)| statement.as_str().contains(pattern.as_str()))
            .map(|(_, fixture)| fixture.clone());

        match fixture {
            Some(Fixture::Result(result)) => QueryResponse::from_statement_result(namespace, result),
            Some(Fixture::Fail(reason)) => Err(StoreError::query_failed(namespace, reason)),
            None => Ok(QueryResponse::default()),
        }
    }
}

impl TimeSeriesStore for FixtureStore {
    fn query<'a>(
        &'a self,
        namespace: &'a Namespace,
        statement: &'a Statement,
    ) -> BoxFuture<'a, Result<QueryResponse, StoreError>> {
        futures::future::ready(self.answer(namespace, statement)).boxed()
    }

    fn execute<'a>(
        &'a self,
        namespace: &'a Namespace,
        statement: &'a Statement,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        let result = self
            .answer(namespace, statement)
            .map(|_| ())
            .map_err(StoreError::for_delete);
        futures::future::ready(result).boxed()
    }
}

/// One series of an InfluxDB JSON response.
pub fn series(name: &str, tags: &[(&str, &str)], columns: &[&str], values: Vec<Vec<Value>>) -> Value {
    let tags = tags
        .iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect::<serde_json::Map<_, _>>();

    json!({
        "name": name,
        "tags": tags,
        "columns": columns,
        "values": values,
    })
}

/// A registry holding a single run of `project_id`.
pub fn registry(build_id: &str, project_id: u64, test_name: &str, lg_type: &str) -> ReportRegistry {
    ReportRegistry::from_reports(vec![RunReport::new(
        build_id.to_string(),
        project_id,
        test_name.to_string(),
        lg_type.to_string(),
        0,
    )])
}
