use crate::config::EngineConfig;
use crate::model::{
    ChartContext, MetricChart, RunRef, Sample, Scope, ScopedSeries, Series, SeriesRequest,
    StatusFilter, TimestampAxis,
};
use crate::query::{Condition, Function, Namespace, Select};
use crate::store::{QueryResponse, Row, TimeSeriesStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use perf_report_model::ProjectResolver;

mod auto_aggregation;
mod build_data;
mod chart;
mod engine_health;
mod errors;
mod hits;
mod response_codes;
mod response_time;
mod rollup;
mod run_data;
mod throughput;
mod users;

pub(crate) const TAG_BUILD_ID: &str = "build_id";
pub(crate) const TAG_REQUEST_NAME: &str = "request_name";
pub(crate) const TAG_SAMPLER_TYPE: &str = "sampler_type";
pub(crate) const TAG_STATUS: &str = "status";

/// Per-request summary rows written for cross-run comparison.
pub(crate) const COMPARISON_MEASUREMENT: &str = "api_comparison";

/// Alias given to the aggregated value of every metric query.
const VALUE_COLUMN: &str = "value";

/// Builds chart series for performance test runs from the time-series store.
///
/// Every operation resolves the run's project on its own and issues its own queries. Nothing is
/// cached between calls.
pub struct ChartAggregator<S, R> {
    store: S,
    resolver: R,
    config: EngineConfig,
}

impl<S, R> ChartAggregator<S, R> {
    pub fn new(store: S, resolver: R, config: EngineConfig) -> Self {
        Self {
            store,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// The aggregate a metric series is built from.
#[derive(Debug, Clone)]
pub(crate) struct Metric {
    /// Key of the output series when results are not broken down by request
    pub label: &'static str,
    pub function: Function,
    pub field: String,
    pub status: StatusFilter,
}

impl<S, R> ChartAggregator<S, R>
where
    S: TimeSeriesStore,
    R: ProjectResolver,
{
    pub(crate) fn project_id(&self, build_id: &str) -> anyhow::Result<u64> {
        Ok(self.resolver.resolve_project(build_id)?)
    }

    pub(crate) fn raw_namespace(&self, run: &RunRef) -> anyhow::Result<Namespace> {
        let project_id = self.project_id(&run.build_id)?;
        Ok(Namespace::raw(&run.lg_type, project_id)?)
    }

    pub(crate) async fn query(
        &self,
        namespace: &Namespace,
        select: &Select,
    ) -> anyhow::Result<QueryResponse> {
        let statement = select.build();
        self.store
            .query(namespace, &statement)
            .await
            .with_context(|| format!("Query on {namespace} failed: {statement}"))
    }

    /// Use the caller's precomputed context, or compute a fresh one for the request.
    pub(crate) async fn context_for(
        &self,
        request: &SeriesRequest,
        context: Option<ChartContext>,
    ) -> anyhow::Result<ChartContext> {
        match context {
            Some(context) => Ok(context),
            None => self.users(&request.run, request.window, request.width).await,
        }
    }

    /// Build one metric against the request's pre-aggregated measurement.
    ///
    /// The aggregate is grouped by the request's bucket width, and additionally by request name
    /// when the scope asks for a breakdown, then densified onto the context axis.
    pub(crate) async fn metric_series(
        &self,
        request: &SeriesRequest,
        scope: &Scope,
        context: Option<ChartContext>,
        metric: Metric,
    ) -> anyhow::Result<MetricChart> {
        let namespace = self.raw_namespace(&request.run)?;
        let context = self.context_for(request, context).await?;

        let mut select = Select::from(
            Some(&namespace),
            &request.width.measurement_for(&request.run.test_name),
        )?
        .aggregate(metric.function, &metric.field, Some(VALUE_COLUMN))?
        .between(request.window.start, request.window.end)
        .filter_opt(status_condition(&metric.status)?)
        .filter(Condition::tag(TAG_SAMPLER_TYPE, &request.sampler)?)
        .filter(Condition::tag(TAG_BUILD_ID, &request.run.build_id)?)
        .filter_opt(scope_condition(scope)?);
        if scope.is_breakdown() {
            select = select.group_by_tag(TAG_REQUEST_NAME)?;
        }
        let select = select.group_by_time(request.width);

        let response = self
            .query(&namespace, &select)
            .await
            .with_context(|| format!("Load {} series", metric.label))?;

        let series = densify_response(&context.axis, &response, scope, metric.label);
        Ok(MetricChart::new(context, series))
    }
}

pub(crate) fn status_condition(status: &StatusFilter) -> anyhow::Result<Option<Condition>> {
    Ok(match status.token() {
        Some(token) => Some(Condition::tag(TAG_STATUS, token)?),
        None => None,
    })
}

/// Request name filter for a scope. A single name is an equality, a list an OR-disjunction.
pub(crate) fn scope_condition(scope: &Scope) -> anyhow::Result<Option<Condition>> {
    Ok(match scope {
        Scope::Request(name) => Some(Condition::tag(TAG_REQUEST_NAME, name)?),
        Scope::Requests(names) => Condition::any_of(TAG_REQUEST_NAME, names.clone())?,
        Scope::All | Scope::PerRequest => None,
    })
}

/// `(time, value)` of a row, skipping rows whose time cannot be read.
pub(crate) fn timed_value(row: &Row<'_>, column: &str) -> Option<(DateTime<Utc>, Sample)> {
    match row.time() {
        Ok(ts) => Some((ts, Sample::from(row.f64(column)))),
        Err(e) => {
            log::warn!("Skipping row: {e:?}");
            None
        }
    }
}

/// Densify a response onto the axis, one series per request name for breakdown scopes and a
/// single series under `label` otherwise.
pub(crate) fn densify_response(
    axis: &TimestampAxis,
    response: &QueryResponse,
    scope: &Scope,
    label: &str,
) -> ScopedSeries {
    let mut scoped = ScopedSeries::new();

    if !scope.is_breakdown() {
        let points = response
            .rows()
            .filter_map(|row| timed_value(&row, VALUE_COLUMN));
        scoped.insert(label.to_string(), Series::densify(axis, points));
        return scoped;
    }

    for series in &response.series {
        let Some(name) = series
            .tags
            .get(TAG_REQUEST_NAME)
            .filter(|name| !name.is_empty())
        else {
            log::debug!("Skipping series without a request name: {}", series.name);
            continue;
        };

        let entry = scoped
            .entry(name.clone())
            .or_insert_with(|| Series::no_data(axis));
        for (ts, sample) in series
            .rows()
            .filter_map(|row| timed_value(&row, VALUE_COLUMN))
        {
            entry.set(ts, sample);
        }
    }

    scoped
}
