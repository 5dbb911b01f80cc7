use crate::query::{Namespace, Statement};
use crate::store::{QueryResponse, StoreError, TimeSeriesStore};
use futures::future::BoxFuture;
use futures::FutureExt;
use influxdb::ReadQuery;
use std::time::Duration;

/// [TimeSeriesStore] backed by an InfluxDB 1.x compatible HTTP API.
///
/// A fresh client bound to the statement's database is created for every call and dropped when
/// the call completes, so no connection state is shared between requests.
#[derive(Debug, Clone)]
pub struct InfluxStore {
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl InfluxStore {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            token,
            timeout,
        }
    }

    fn connect(&self, namespace: &Namespace) -> influxdb::Client {
        let client = influxdb::Client::new(self.url.clone(), namespace.name());
        match &self.token {
            Some(token) => client.with_token(token.clone()),
            None => client,
        }
    }

    fn timed_out(&self, namespace: &Namespace) -> StoreError {
        StoreError::query_failed(namespace, format!("Timed out after {:?}", self.timeout))
    }
}

impl TimeSeriesStore for InfluxStore {
    fn query<'a>(
        &'a self,
        namespace: &'a Namespace,
        statement: &'a Statement,
    ) -> BoxFuture<'a, Result<QueryResponse, StoreError>> {
        async move {
            log::debug!("Querying {namespace}: {statement}");

            let client = self.connect(namespace);
            let response = tokio::time::timeout(
                self.timeout,
                client.json_query(ReadQuery::new(statement.as_str())),
            )
            .await
            .map_err(|_| self.timed_out(namespace))?
            .map_err(|e| StoreError::query_failed(namespace, e.to_string()))?;

            let result = response.results.into_iter().next().ok_or_else(|| {
                StoreError::query_failed(namespace, "Response contained no statement results")
            })?;

            let response = QueryResponse::from_statement_result(namespace, result)?;
            log::trace!("Response from {namespace}: {response:?}");

            Ok(response)
        }
        .boxed()
    }

    fn execute<'a>(
        &'a self,
        namespace: &'a Namespace,
        statement: &'a Statement,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            log::debug!("Executing on {namespace}: {statement}");

            let client = self.connect(namespace);
            let body = tokio::time::timeout(
                self.timeout,
                client.query(ReadQuery::new(statement.as_str())),
            )
            .await
            .map_err(|_| self.timed_out(namespace))?
            .map_err(|e| StoreError::query_failed(namespace, e.to_string()).for_delete())?;

            // Statement level errors come back with a 200 status
            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&body) {
                let results = parsed
                    .get("results")
                    .and_then(|r| r.as_array())
                    .cloned()
                    .unwrap_or_default();
                for result in results {
                    QueryResponse::from_statement_result(namespace, result)
                        .map_err(StoreError::for_delete)?;
                }
            }

            Ok(())
        }
        .boxed()
    }
}
