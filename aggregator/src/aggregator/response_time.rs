use crate::aggregator::{ChartAggregator, Metric};
use crate::model::{ChartContext, MetricChart, ResponseStatistic, Scope, SeriesRequest, StatusFilter};
use crate::query::Function;
use crate::store::TimeSeriesStore;
use perf_report_model::ProjectResolver;

/// Aggregate, field and status filter for a response time statistic.
///
/// Timing statistics take the 95th percentile of their own column across the bucket. `errors`
/// sums the totals of failed requests, anything else sums all totals.
pub(crate) fn response_time_aggregate(
    statistic: ResponseStatistic,
    status: &StatusFilter,
) -> (Function, String, StatusFilter) {
    match statistic.timing_field() {
        Some(field) => (Function::Percentile(95), field.to_string(), status.clone()),
        None if statistic == ResponseStatistic::Errors => {
            (Function::Sum, "total".to_string(), StatusFilter::failures())
        }
        None => (Function::Sum, "total".to_string(), status.clone()),
    }
}

impl<S, R> ChartAggregator<S, R>
where
    S: TimeSeriesStore,
    R: ProjectResolver,
{
    /// Response time series for the run.
    ///
    /// Use [Scope::PerRequest] for one series per request name, or [Scope::Requests] for a
    /// selection of them. Single series are keyed `response`.
    pub async fn response_time(
        &self,
        request: &SeriesRequest,
        scope: &Scope,
        statistic: ResponseStatistic,
        context: Option<ChartContext>,
    ) -> anyhow::Result<MetricChart> {
        let (function, field, status) = response_time_aggregate(statistic, &request.status);
        self.metric_series(
            request,
            scope,
            context,
            Metric {
                label: "response",
                function,
                field,
                status,
            },
        )
        .await
    }
}
