use crate::aggregator::{
    response_time::response_time_aggregate, scope_condition, status_condition, ChartAggregator,
    TAG_BUILD_ID, TAG_SAMPLER_TYPE,
};
use crate::model::{BucketWidth, ResponseStatistic, RunRef, Sample, Scope, StatusFilter};
use crate::query::{Condition, Function, Namespace, Select};
use crate::store::TimeSeriesStore;
use anyhow::Context;
use perf_report_model::ProjectResolver;

impl<S, R> ChartAggregator<S, R>
where
    S: TimeSeriesStore,
    R: ProjectResolver,
{
    /// Mean requests per bucket over the whole run, rounded to 2 decimal places.
    ///
    /// `scope` narrows to one request name. `None` and `All` cover every request.
    pub async fn throughput_per_test(
        &self,
        run: &RunRef,
        sampler: Option<&str>,
        scope: Option<&str>,
        width: BucketWidth,
        status: &StatusFilter,
    ) -> anyhow::Result<Sample> {
        let namespace = self.raw_namespace(run)?;

        let per_bucket = self
            .run_select(run, &namespace, sampler, scope, width, status)?
            .aggregate(Function::Sum, "total", Some("rt"))?
            .group_by_time(width);
        let select =
            Select::from_subquery(per_bucket).aggregate(Function::Mean, "rt", Some("throughput"))?;

        let response = self
            .query(&namespace, &select)
            .await
            .context("Load throughput per test")?;

        let throughput = Sample::from(response.rows().next().and_then(|row| row.f64("throughput")));
        Ok(throughput.rounded())
    }

    /// One response time statistic over the whole run, rounded to 2 decimal places.
    ///
    /// The statistic is computed the same way as for [ChartAggregator::response_time], once
    /// across every `width` bucket of the run.
    pub async fn response_time_per_test(
        &self,
        run: &RunRef,
        sampler: Option<&str>,
        scope: Option<&str>,
        statistic: ResponseStatistic,
        status: &StatusFilter,
        width: BucketWidth,
    ) -> anyhow::Result<Sample> {
        let namespace = self.raw_namespace(run)?;
        let (function, field, status) = response_time_aggregate(statistic, status);

        let select = self
            .run_select(run, &namespace, sampler, scope, width, &status)?
            .aggregate(function, &field, Some("rt"))?;

        let response = self
            .query(&namespace, &select)
            .await
            .context("Load response time per test")?;

        let rt = Sample::from(response.rows().next().and_then(|row| row.f64("rt")));
        Ok(rt.rounded())
    }

    /// Select over every bucket of the run, without a projection.
    fn run_select(
        &self,
        run: &RunRef,
        namespace: &Namespace,
        sampler: Option<&str>,
        scope: Option<&str>,
        width: BucketWidth,
        status: &StatusFilter,
    ) -> anyhow::Result<Select> {
        let sampler = sampler
            .map(|sampler| Condition::tag(TAG_SAMPLER_TYPE, sampler))
            .transpose()?;

        Ok(
            Select::from(Some(namespace), &width.measurement_for(&run.test_name))?
                .filter_opt(sampler)
                .filter(Condition::tag(TAG_BUILD_ID, &run.build_id)?)
                .filter_opt(status_condition(status)?)
                .filter_opt(scope_condition(&Scope::from_param(scope))?),
        )
    }
}
