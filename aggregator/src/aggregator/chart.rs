use crate::aggregator::ChartAggregator;
use crate::model::{Chart, ResponseStatistic, Scope, SeriesRequest};
use crate::store::TimeSeriesStore;
use perf_report_model::ProjectResolver;

impl<S, R> ChartAggregator<S, R>
where
    S: TimeSeriesStore,
    R: ProjectResolver,
{
    /// Users, response time, throughput and errors of a run on one shared axis.
    ///
    /// The users context is computed once and handed to every builder, which then run
    /// concurrently. Any failure fails the whole chart.
    pub async fn chart(
        &self,
        request: &SeriesRequest,
        scope: &Scope,
        statistic: ResponseStatistic,
    ) -> anyhow::Result<Chart> {
        let context = self
            .users(&request.run, request.window, request.width)
            .await?;

        let (response_time, throughput, errors) = futures::try_join!(
            self.response_time(request, scope, statistic, Some(context.clone())),
            self.tps(request, scope, Some(context.clone())),
            self.errors(request, scope, Some(context.clone())),
        )?;

        Ok(Chart {
            axis: context.axis,
            users: context.users,
            response_time: response_time.series,
            throughput: throughput.series,
            errors: errors.series,
        })
    }
}
