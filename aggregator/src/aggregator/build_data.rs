use crate::aggregator::{
    status_condition, ChartAggregator, COMPARISON_MEASUREMENT, TAG_BUILD_ID, TAG_REQUEST_NAME,
    TAG_SAMPLER_TYPE,
};
use crate::frame::load_from_response;
use crate::model::{BucketWidth, RunRef, StatusFilter};
use crate::query::{Condition, Function, Namespace, Select};
use crate::store::TimeSeriesStore;
use anyhow::Context;
use perf_report_model::ProjectResolver;
use polars::prelude::DataFrame;

const TAG_SIMULATION: &str = "simulation";

impl<S, R> ChartAggregator<S, R>
where
    S: TimeSeriesStore,
    R: ProjectResolver,
{
    /// Comparison rows for every request of the run that recorded a response time at 5s
    /// granularity.
    ///
    /// Used for tabular summaries rather than charts. A run without any such request gives an
    /// empty frame.
    pub async fn build_data(
        &self,
        run: &RunRef,
        sampler: &str,
        status: &StatusFilter,
    ) -> anyhow::Result<DataFrame> {
        let project_id = self.project_id(&run.build_id)?;
        let namespace = Namespace::raw(&run.lg_type, project_id)?;

        let recorded = Select::from(
            Some(&namespace),
            &BucketWidth::FiveSeconds.measurement_for(&run.test_name),
        )?
        .aggregate(Function::Max, "pct95", None)?
        .filter(Condition::tag(TAG_SAMPLER_TYPE, sampler)?)
        .filter_opt(status_condition(status)?)
        .filter(Condition::tag(TAG_BUILD_ID, &run.build_id)?)
        .group_by_tag(TAG_REQUEST_NAME)?;

        let response = self
            .query(&namespace, &recorded)
            .await
            .context("Find recorded requests")?;
        let request_names = response
            .series
            .iter()
            .filter_map(|series| series.tags.get(TAG_REQUEST_NAME))
            .filter(|name| !name.is_empty())
            .cloned()
            .collect::<Vec<_>>();
        if request_names.is_empty() {
            log::debug!("No recorded requests for run {}", run.build_id);
            return Ok(DataFrame::empty());
        }

        let comparison = Namespace::comparison(project_id)?;
        let rows = Select::from(Some(&comparison), COMPARISON_MEASUREMENT)?
            .all_fields()
            .filter(Condition::tag(TAG_BUILD_ID, &run.build_id)?)
            .filter_opt(Condition::any_of(TAG_REQUEST_NAME, request_names)?);

        let response = self
            .query(&comparison, &rows)
            .await
            .context("Load comparison rows")?;

        load_from_response(&response)
    }

    /// Every comparison row of one simulation for a run.
    pub async fn aggregated_test_results(
        &self,
        test: &str,
        build_id: &str,
    ) -> anyhow::Result<DataFrame> {
        let comparison = Namespace::comparison(self.project_id(build_id)?)?;
        let select = Select::from(Some(&comparison), COMPARISON_MEASUREMENT)?
            .all_fields()
            .filter(Condition::tag(TAG_SIMULATION, test)?)
            .filter(Condition::tag(TAG_BUILD_ID, build_id)?);

        let response = self
            .query(&comparison, &select)
            .await
            .context("Load aggregated test results")?;

        load_from_response(&response)
    }
}
