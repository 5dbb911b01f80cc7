use crate::aggregator::{ChartAggregator, TAG_BUILD_ID};
use crate::model::{BucketWidth, ChartContext, RunRef, TimeWindow, TimestampAxis};
use crate::query::{Condition, Function, Select};
use crate::rebucket::{rebucket, Rebucket};
use crate::store::TimeSeriesStore;
use anyhow::Context;
use perf_report_model::ProjectResolver;
use std::collections::BTreeMap;

const TAG_LG_ID: &str = "lg_id";

impl<S, R> ChartAggregator<S, R>
where
    S: TimeSeriesStore,
    R: ProjectResolver,
{
    /// Concurrent virtual users for a run, and the axis every other series of the chart shares.
    ///
    /// The peak active user count of each load generator is taken per second and summed across
    /// generators. The per-second totals are then re-bucketed to `width`, emitting the peak of
    /// each bucket on its last second. The axis is widened to whole buckets so grouped metric
    /// queries land on it.
    pub async fn users(
        &self,
        run: &RunRef,
        window: TimeWindow,
        width: BucketWidth,
    ) -> anyhow::Result<ChartContext> {
        log::debug!("Aggregating users for run {} at {width}", run.build_id);

        let namespace = self.raw_namespace(run)?;

        let per_generator = Select::from(Some(&namespace), &format!("users_{width}"))?
            .aggregate(Function::Max, "active", None)?
            .between(window.start, window.end)
            .filter(Condition::tag(TAG_BUILD_ID, &run.build_id)?)
            .group_by_time(BucketWidth::OneSecond)
            .group_by_tag(TAG_LG_ID)?;
        let select = Select::from_subquery(per_generator)
            .aggregate(Function::Sum, "max", None)?
            .between(window.start, window.end)
            .group_by_time(BucketWidth::OneSecond);

        let response = self
            .query(&namespace, &select)
            .await
            .context("Load users")?;

        let mut per_second = BTreeMap::new();
        for row in response.rows() {
            match row.time() {
                Ok(ts) => {
                    per_second.insert(ts, row.f64("sum").unwrap_or_default());
                }
                Err(e) => log::warn!("Skipping users row: {e:?}"),
            }
        }

        let axis = TimestampAxis::for_window(&window, width);
        let users = rebucket(&axis, width, Rebucket::MaxAtEnd, |ts| {
            per_second.get(ts).copied().unwrap_or_default()
        });

        Ok(ChartContext { axis, users })
    }
}
