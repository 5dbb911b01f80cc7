use crate::aggregator::{ChartAggregator, Metric};
use crate::model::{ChartContext, MetricChart, Scope, SeriesRequest};
use crate::query::Function;
use crate::store::TimeSeriesStore;
use perf_report_model::ProjectResolver;

impl<S, R> ChartAggregator<S, R>
where
    S: TimeSeriesStore,
    R: ProjectResolver,
{
    /// Requests completed per bucket. Single series are keyed `responses`.
    pub async fn tps(
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
                label: "responses",
                function: Function::Sum,
                field: "total".to_string(),
                status: request.status.clone(),
            },
        )
        .await
    }

    /// Throughput of the whole run on a freshly computed axis, keyed `throughput`.
    pub async fn hits_tps(&self, request: &SeriesRequest) -> anyhow::Result<MetricChart> {
        let mut chart = self.tps(request, &Scope::All, None).await?;
        if let Some(responses) = chart.series.remove("responses") {
            chart.series.insert("throughput".to_string(), responses);
        }
        Ok(chart)
    }
}
