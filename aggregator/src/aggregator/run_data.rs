use crate::aggregator::{
    ChartAggregator, COMPARISON_MEASUREMENT, TAG_BUILD_ID, TAG_REQUEST_NAME, TAG_SAMPLER_TYPE,
};
use crate::model::{ResponseTotals, TestDetails};
use crate::query::{delete, show_tag_values, Condition, Namespace, Select};
use crate::store::{StoreError, TimeSeriesStore};
use anyhow::Context;
use itertools::Itertools;
use perf_report_model::ProjectResolver;

const USERS_MEASUREMENT: &str = "users";

impl<S, R> ChartAggregator<S, R>
where
    S: TimeSeriesStore,
    R: ProjectResolver,
{
    /// Delete everything recorded for a run: its raw samples and its comparison rows.
    ///
    /// Exactly one delete is issued per measurement. A measurement or database that does not
    /// exist is logged and skipped, any other failure is returned.
    pub async fn delete_test_data(
        &self,
        build_id: &str,
        test_name: &str,
        lg_type: &str,
    ) -> anyhow::Result<()> {
        let project_id = self.project_id(build_id)?;
        let targets = [
            (Namespace::raw(lg_type, project_id)?, test_name),
            (Namespace::comparison(project_id)?, COMPARISON_MEASUREMENT),
        ];

        for (namespace, measurement) in &targets {
            let statement = delete(
                measurement,
                vec![Condition::tag(TAG_BUILD_ID, build_id)?],
            )?;

            match self.store.execute(namespace, &statement).await {
                Ok(()) => log::info!("Deleted run {build_id} from {namespace}..{measurement}"),
                Err(e @ StoreError::TargetNotFound { .. }) => {
                    log::warn!("Nothing to delete for run {build_id}: {e}");
                }
                Err(e) => {
                    return Err(anyhow::Error::from(e)
                        .context(format!("Delete run {build_id} from {measurement}")));
                }
            }
        }

        Ok(())
    }

    /// Summary of a run once it has data: its time span from the users samples, and the tags and
    /// response code totals of its comparison rows.
    pub async fn test_details(&self, build_id: &str, lg_type: &str) -> anyhow::Result<TestDetails> {
        let project_id = self.project_id(build_id)?;
        let raw = Namespace::raw(lg_type, project_id)?;
        let comparison = Namespace::comparison(project_id)?;

        let users = Select::from(Some(&raw), USERS_MEASUREMENT)?
            .field("active", None)?
            .filter(Condition::tag(TAG_BUILD_ID, build_id)?)
            .limit(1);
        let earliest = self.query(&raw, &users).await.context("Load run start")?;
        let latest = self
            .query(&raw, &users.order_by_time_desc())
            .await
            .context("Load run end")?;
        let (Some(first), Some(last)) = (earliest.rows().next(), latest.rows().next()) else {
            anyhow::bail!("Run {build_id} has no users samples");
        };

        let vusers = self.tag_values(&comparison, "users", build_id).await?;
        let environment = self.tag_values(&comparison, "env", build_id).await?;
        let test_type = self.tag_values(&comparison, "test_type", build_id).await?;
        let requests = self
            .tag_values(&comparison, TAG_REQUEST_NAME, build_id)
            .await?;

        Ok(TestDetails {
            start_time: first.time()?,
            end_time: last.time()?,
            vusers: vusers.into_iter().next(),
            environment: environment.into_iter().next(),
            test_type: test_type.into_iter().next(),
            requests,
            totals: self.response_totals(&comparison, build_id).await?,
        })
    }

    /// Distinct sampler types recorded for a run.
    pub async fn sampler_types(&self, build_id: &str, lg_type: &str) -> anyhow::Result<Vec<String>> {
        let raw = Namespace::raw(lg_type, self.project_id(build_id)?)?;
        self.tag_values(&raw, TAG_SAMPLER_TYPE, build_id).await
    }

    async fn tag_values(
        &self,
        namespace: &Namespace,
        key: &str,
        build_id: &str,
    ) -> anyhow::Result<Vec<String>> {
        let statement = show_tag_values(
            namespace,
            key,
            vec![Condition::tag(TAG_BUILD_ID, build_id)?],
        )?;
        let response = self
            .store
            .query(namespace, &statement)
            .await
            .with_context(|| format!("Load `{key}` tag values"))?;

        Ok(response
            .rows()
            .filter_map(|row| row.str("value"))
            .map(str::to_string)
            .unique()
            .collect())
    }

    /// Totals of the run wide `All` comparison row.
    async fn response_totals(
        &self,
        comparison: &Namespace,
        build_id: &str,
    ) -> anyhow::Result<Option<ResponseTotals>> {
        let select = Select::from(Some(comparison), COMPARISON_MEASUREMENT)?
            .field("1xx", None)?
            .field("2xx", None)?
            .field("3xx", None)?
            .field("4xx", None)?
            .field("5xx", None)?
            .field("ko", Some("KO"))?
            .field("total", Some("Total"))?
            .field("throughput", None)?
            .filter(Condition::tag(TAG_BUILD_ID, build_id)?)
            .filter(Condition::tag(TAG_REQUEST_NAME, "All")?);

        let response = self
            .query(comparison, &select)
            .await
            .context("Load response totals")?;

        let totals = response.rows().next().map(|row| {
            let value = |column: &str| row.f64(column).unwrap_or_default();
            ResponseTotals {
                total: value("Total"),
                failures: value("KO"),
                throughput: value("throughput"),
                onexx: value("1xx"),
                twoxx: value("2xx"),
                threexx: value("3xx"),
                fourxx: value("4xx"),
                fivexx: value("5xx"),
            }
        });
        Ok(totals)
    }
}
