use crate::aggregator::{ChartAggregator, Metric};
use crate::model::{ChartContext, MetricChart, Scope, SeriesRequest, StatusFilter};
use crate::query::Function;
use crate::store::TimeSeriesStore;
use perf_report_model::ProjectResolver;

impl<S, R> ChartAggregator<S, R>
where
    S: TimeSeriesStore,
    R: ProjectResolver,
{
    /// Failed requests per bucket. The request's status filter is ignored, only failures are
    /// counted. Single series are keyed `errors`.
    pub async fn errors(
        &self,
        request: &SeriesRequest,
        scope: &Scope,
        context: Option<ChartContext>,
    ) -> anyhow::Result<MetricChart> {
        self.metric_series(
            request,
            scope,
            context,
            Metric {
                label: "errors",
                function: Function::Count,
                field: "status".to_string(),
                status: StatusFilter::failures(),
            },
        )
        .await
    }
}
