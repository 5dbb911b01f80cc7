use crate::aggregator::{ChartAggregator, TAG_BUILD_ID};
use crate::model::{BucketWidth, HealthSample, HostSeries, TimeWindow};
use crate::query::{Condition, Function, Namespace, Select};
use crate::store::{QueryResponse, TimeSeriesStore};
use anyhow::Context;
use perf_report_model::ProjectResolver;

const TAG_HOST: &str = "host";

impl<S, R> ChartAggregator<S, R>
where
    S: TimeSeriesStore,
    R: ProjectResolver,
{
    /// Mean CPU usage of each load generator host, per bucket.
    pub async fn engine_health_cpu(
        &self,
        build_id: &str,
        window: TimeWindow,
        width: BucketWidth,
    ) -> anyhow::Result<HostSeries> {
        let namespace = self.telegraf_namespace(build_id)?;
        let mut select = Select::from(None, "cpu")?;
        for (field, alias) in [
            ("usage_system", "system"),
            ("usage_user", "user"),
            ("usage_softirq", "softirq"),
            ("usage_iowait", "iowait"),
        ] {
            select = select.aggregate(Function::Mean, field, Some(alias))?;
        }
        let select = select
            .filter(Condition::tag(TAG_BUILD_ID, build_id)?)
            .filter(Condition::tag("cpu", "cpu-total")?)
            .between(window.start, window.end)
            .group_by_time(width)
            .group_by_tag(TAG_HOST)?;

        self.host_series(&namespace, &select)
            .await
            .context("Load CPU health")
    }

    /// Heap and non-heap memory samples of each load generator host, as reported.
    pub async fn engine_health_memory(
        &self,
        build_id: &str,
        window: TimeWindow,
    ) -> anyhow::Result<HostSeries> {
        let namespace = self.telegraf_namespace(build_id)?;
        let select = Select::from(None, "java_memory")?
            .field("HeapMemoryUsage.used", Some("heap memory"))?
            .field("NonHeapMemoryUsage.used", Some("non-heap memory"))?
            .filter(Condition::tag(TAG_BUILD_ID, build_id)?)
            .between(window.start, window.end)
            .group_by_tag(TAG_HOST)?;

        self.host_series(&namespace, &select)
            .await
            .context("Load memory health")
    }

    /// Mean system load of each load generator host, per bucket.
    pub async fn engine_health_load(
        &self,
        build_id: &str,
        window: TimeWindow,
        width: BucketWidth,
    ) -> anyhow::Result<HostSeries> {
        let namespace = self.telegraf_namespace(build_id)?;
        let mut select = Select::from(None, "system")?;
        for field in ["load1", "load5", "load15"] {
            select = select.aggregate(Function::Mean, field, Some(field))?;
        }
        let select = select
            .filter(Condition::tag(TAG_BUILD_ID, build_id)?)
            .between(window.start, window.end)
            .group_by_time(width)
            .group_by_tag(TAG_HOST)?;

        self.host_series(&namespace, &select)
            .await
            .context("Load system load health")
    }

    fn telegraf_namespace(&self, build_id: &str) -> anyhow::Result<Namespace> {
        Ok(Namespace::telegraf(self.project_id(build_id)?)?)
    }

    async fn host_series(
        &self,
        namespace: &Namespace,
        select: &Select,
    ) -> anyhow::Result<HostSeries> {
        let response = self.query(namespace, select).await?;
        Ok(group_by_host(&response))
    }
}

fn group_by_host(response: &QueryResponse) -> HostSeries {
    let mut hosts = HostSeries::new();
    for series in &response.series {
        let Some(host) = series.tags.get(TAG_HOST) else {
            log::debug!("Skipping health series without a host: {}", series.name);
            continue;
        };

        let samples = hosts.entry(host.clone()).or_default();
        for row in series.rows() {
            match row.time() {
                Ok(time) => samples.push(HealthSample {
                    time,
                    values: row.numeric_columns(),
                }),
                Err(e) => log::warn!("Skipping health sample for {host}: {e:?}"),
            }
        }
    }

    hosts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::QuerySeries;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn host(name: Option<&str>, values: Vec<Vec<serde_json::Value>>) -> QuerySeries {
        QuerySeries {
            name: "system".to_string(),
            tags: name
                .map(|name| BTreeMap::from([(TAG_HOST.to_string(), name.to_string())]))
                .unwrap_or_default(),
            columns: vec!["time".to_string(), "load1".to_string(), "load5".to_string()],
            values,
        }
    }

    #[test]
    fn samples_are_grouped_by_host() {
        let response = QueryResponse {
            series: vec![
                host(
                    Some("lg-1"),
                    vec![
                        vec![json!("2024-03-01T10:00:00Z"), json!(0.5), json!(0.25)],
                        vec![json!("2024-03-01T10:00:30Z"), json!(null), json!(0.75)],
                    ],
                ),
                host(
                    Some("lg-2"),
                    vec![vec![json!("2024-03-01T10:00:10Z"), json!(1.0), json!(1.0)]],
                ),
                host(None, vec![vec![json!("2024-03-01T10:00:10Z"), json!(1.0), json!(1.0)]]),
            ],
        };

        let hosts = group_by_host(&response);
        assert_eq!(hosts.keys().collect::<Vec<_>>(), vec!["lg-1", "lg-2"]);
        assert_eq!(hosts["lg-1"].len(), 2);
        assert_eq!(
            hosts["lg-1"][1].values,
            BTreeMap::from([("load1".to_string(), None), ("load5".to_string(), Some(0.75))])
        );
        assert_eq!(hosts["lg-2"][0].time.timestamp(), 1_709_287_210);
    }
}
