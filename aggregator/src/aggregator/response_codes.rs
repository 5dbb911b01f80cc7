use crate::aggregator::{ChartAggregator, Metric};
use crate::model::{ChartContext, MetricChart, ResponseCodeClass, Scope, SeriesRequest};
use crate::query::Function;
use crate::store::TimeSeriesStore;
use perf_report_model::ProjectResolver;

impl<S, R> ChartAggregator<S, R>
where
    S: TimeSeriesStore,
    R: ProjectResolver,
{
    /// Responses of one status class per bucket. Single series are keyed `rcodes`.
    pub async fn response_codes(
        &self,
        request: &SeriesRequest,
        scope: &Scope,
        class: ResponseCodeClass,
        context: Option<ChartContext>,
    ) -> anyhow::Result<MetricChart> {
        self.metric_series(
            request,
            scope,
            context,
            Metric {
                label: "rcodes",
                function: Function::Sum,
                field: class.to_string(),
                status: request.status.clone(),
            },
        )
        .await
    }
}
