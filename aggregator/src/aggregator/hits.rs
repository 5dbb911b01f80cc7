use crate::aggregator::{
    scope_condition, status_condition, ChartAggregator, TAG_BUILD_ID, TAG_REQUEST_NAME,
    TAG_SAMPLER_TYPE,
};
use crate::model::{ChartContext, MetricChart, Scope, ScopedSeries, SeriesRequest};
use crate::query::{Condition, Select};
use crate::rebucket::{rebucket, Rebucket};
use crate::store::{QueryResponse, TimeSeriesStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use perf_report_model::ProjectResolver;
use polars::prelude::*;
use std::collections::BTreeMap;

const LABEL: &str = "hits";

impl<S, R> ChartAggregator<S, R>
where
    S: TimeSeriesStore,
    R: ProjectResolver,
{
    /// Requests started per bucket, counted from the raw per-request hit timestamps.
    ///
    /// Hits are truncated to whole seconds and counted per second, then summed over groups of
    /// `width` seconds with the total placed on the first second of each group. Single series
    /// are keyed `hits`.
    pub async fn hits(
        &self,
        request: &SeriesRequest,
        scope: &Scope,
        context: Option<ChartContext>,
    ) -> anyhow::Result<MetricChart> {
        let namespace = self.raw_namespace(&request.run)?;
        let context = self.context_for(request, context).await?;

        let mut select = Select::from(Some(&namespace), &request.run.test_name)?
            .field("hit", None)?
            .between(request.window.start, request.window.end)
            .filter_opt(status_condition(&request.status)?)
            .filter(Condition::tag(TAG_SAMPLER_TYPE, &request.sampler)?)
            .filter(Condition::tag(TAG_BUILD_ID, &request.run.build_id)?)
            .filter_opt(scope_condition(scope)?);
        if scope.is_breakdown() {
            select = select.group_by_tag(TAG_REQUEST_NAME)?;
        }

        let response = self
            .query(&namespace, &select)
            .await
            .context("Load hits")?;

        let mut counts = hits_per_second(&response, scope.is_breakdown())?;
        if !scope.is_breakdown() {
            counts.entry(LABEL.to_string()).or_default();
        }

        let series = counts
            .into_iter()
            .map(|(key, per_second)| {
                let rebucketed = rebucket(&context.axis, request.width, Rebucket::SumAtStart, |ts| {
                    per_second.get(ts).copied().unwrap_or_default()
                });
                (key, rebucketed)
            })
            .collect::<ScopedSeries>();

        Ok(MetricChart::new(context, series))
    }
}

/// Count hits per whole second, keyed by request name or by [LABEL] when not broken down.
fn hits_per_second(
    response: &QueryResponse,
    breakdown: bool,
) -> anyhow::Result<BTreeMap<String, BTreeMap<DateTime<Utc>, f64>>> {
    let mut keys = Vec::new();
    let mut seconds = Vec::new();
    for row in response.rows() {
        let key = if breakdown {
            match row.tag(TAG_REQUEST_NAME).filter(|name| !name.is_empty()) {
                Some(name) => name,
                None => continue,
            }
        } else {
            LABEL
        };
        let Some(hit) = row.f64("hit") else {
            log::trace!("Skipping row without a hit time");
            continue;
        };
        keys.push(key.to_string());
        seconds.push(hit.floor() as i64);
    }

    let mut counts = BTreeMap::<String, BTreeMap<DateTime<Utc>, f64>>::new();
    if keys.is_empty() {
        return Ok(counts);
    }

    let frame = df!(
        "key" => keys,
        "second" => seconds,
    )?
    .lazy()
    .group_by([col("key"), col("second")])
    .agg([len().cast(DataType::Float64).alias("hits")])
    .collect()
    .context("Count hits per second")?;

    let keys = frame.column("key")?.str()?;
    let seconds = frame.column("second")?.i64()?;
    let hits = frame.column("hits")?.f64()?;
    for ((key, second), hits) in keys.into_iter().zip(seconds).zip(hits) {
        let (Some(key), Some(second), Some(hits)) = (key, second, hits) else {
            continue;
        };
        let Some(ts) = DateTime::from_timestamp(second, 0) else {
            continue;
        };
        counts.entry(key.to_string()).or_default().insert(ts, hits);
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::QuerySeries;
    use serde_json::json;

    fn raw_hits(request_name: &str, hits: &[f64]) -> QuerySeries {
        QuerySeries {
            name: "checkout".to_string(),
            tags: BTreeMap::from([(TAG_REQUEST_NAME.to_string(), request_name.to_string())]),
            columns: vec!["time".to_string(), "hit".to_string()],
            values: hits
                .iter()
                .map(|hit| vec![json!("2024-03-01T10:00:00Z"), json!(hit)])
                .collect(),
        }
    }

    #[test]
    fn hits_are_counted_per_truncated_second() -> anyhow::Result<()> {
        let response = QueryResponse {
            series: vec![
                raw_hits("login", &[100.1, 100.9, 101.0]),
                raw_hits("search", &[100.5]),
            ],
        };

        let counts = hits_per_second(&response, false)?;
        let at = |s| DateTime::from_timestamp(s, 0).unwrap();
        assert_eq!(
            counts[LABEL],
            BTreeMap::from([(at(100), 3.0), (at(101), 1.0)])
        );

        let counts = hits_per_second(&response, true)?;
        assert_eq!(counts["login"], BTreeMap::from([(at(100), 2.0), (at(101), 1.0)]));
        assert_eq!(counts["search"], BTreeMap::from([(at(100), 1.0)]));
        Ok(())
    }

    #[test]
    fn no_hits_means_no_counts() -> anyhow::Result<()> {
        assert!(hits_per_second(&QueryResponse::default(), false)?.is_empty());
        Ok(())
    }
}
