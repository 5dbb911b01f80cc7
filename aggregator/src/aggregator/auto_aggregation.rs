use crate::aggregator::{ChartAggregator, TAG_BUILD_ID};
use crate::model::{BucketWidth, RunRef, TimeWindow};
use crate::query::{Condition, Function, Namespace, Select};
use crate::store::TimeSeriesStore;
use anyhow::Context;
use perf_report_model::ProjectResolver;

impl<S, R> ChartAggregator<S, R>
where
    S: TimeSeriesStore,
    R: ProjectResolver,
{
    /// Pick the finest bucket width that keeps a chart of the run under the configured point
    /// ceiling.
    ///
    /// Every width on the ladder is probed, finest first. Whenever a width produces more points
    /// than the ceiling, the selection moves to the next coarser width. If any width other than
    /// the finest has no points at all, the run is treated as not having data yet and
    /// [BucketWidth::FALLBACK] is returned.
    pub async fn auto_aggregation(
        &self,
        run: &RunRef,
        window: TimeWindow,
    ) -> anyhow::Result<BucketWidth> {
        let namespace = self.raw_namespace(run)?;
        let max_points = self.config.max_points_on_chart;

        let mut selected = BucketWidth::FINEST;
        for width in BucketWidth::LADDER {
            let points = self
                .count_points(&namespace, run, window, width)
                .await
                .with_context(|| format!("Count points at {width}"))?;
            log::debug!("Run {} has {points} points at {width}", run.build_id);

            if points == 0 && width != BucketWidth::FINEST {
                log::info!(
                    "No points for run {} at {width}, using {}",
                    run.build_id,
                    BucketWidth::FALLBACK
                );
                return Ok(BucketWidth::FALLBACK);
            }
            if points > max_points && selected != BucketWidth::COARSEST {
                selected = width.coarser();
            }
        }

        log::info!("Selected {selected} for run {}", run.build_id);
        Ok(selected)
    }

    /// Number of non-empty buckets of `width` in the window.
    async fn count_points(
        &self,
        namespace: &Namespace,
        run: &RunRef,
        window: TimeWindow,
        width: BucketWidth,
    ) -> anyhow::Result<u64> {
        let buckets = Select::from(Some(namespace), &width.measurement_for(&run.test_name))?
            .aggregate(Function::Count, "pct95", None)?
            .between(window.start, window.end)
            .filter(Condition::tag(TAG_BUILD_ID, &run.build_id)?)
            .group_by_time(width);
        let select = Select::from_subquery(buckets).aggregate(Function::Sum, "count", None)?;

        let response = self.query(namespace, &select).await?;
        let points = response
            .rows()
            .next()
            .and_then(|row| row.f64("sum"))
            .unwrap_or_default();

        Ok(points as u64)
    }
}
