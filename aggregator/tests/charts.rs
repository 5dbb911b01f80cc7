use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use perf_aggregator::model::{
    BucketWidth, ResponseCodeClass, ResponseStatistic, RunRef, Sample, Scope, SeriesRequest,
    StatusFilter, TimeWindow,
};
use perf_aggregator::test_data::{registry, series, FixtureStore};
use perf_aggregator::{ChartAggregator, EngineConfig, StoreError};
use perf_report_model::{RegistryError, ReportRegistry};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const BUILD_ID: &str = "b-1";
const USERS: &str = "sum(\"max\")";

fn aggregator(store: FixtureStore) -> ChartAggregator<FixtureStore, ReportRegistry> {
    aggregator_with(store, EngineConfig::default())
}

fn aggregator_with(
    store: FixtureStore,
    config: EngineConfig,
) -> ChartAggregator<FixtureStore, ReportRegistry> {
    env_logger::try_init().ok();
    ChartAggregator::new(store, registry(BUILD_ID, 7, "checkout", "jmeter"), config)
}

fn at(second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, second).unwrap()
}

fn time(second: u32) -> Value {
    json!(at(second).to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn run() -> RunRef {
    RunRef::new(BUILD_ID, "checkout", "jmeter")
}

fn window() -> TimeWindow {
    TimeWindow::new(at(0), at(9)).unwrap()
}

fn request() -> SeriesRequest {
    SeriesRequest {
        run: run(),
        window: window(),
        width: BucketWidth::FiveSeconds,
        sampler: "REQUEST".to_string(),
        status: StatusFilter::All,
    }
}

/// Users for each second of the window: 1, 2, ... 10, with the 7th second missing.
fn respond_users(store: &FixtureStore) {
    let values = (0..10)
        .filter(|second| *second != 6)
        .map(|second| vec![time(second), json!(second + 1)])
        .collect();
    store.respond(USERS, vec![series("users_5s", &[], &["time", "sum"], values)]);
}

#[tokio::test]
async fn users_are_rebucketed_onto_the_window_axis() -> anyhow::Result<()> {
    let store = FixtureStore::new();
    respond_users(&store);
    let aggregator = aggregator(store);

    let context = aggregator
        .users(&run(), window(), BucketWidth::FiveSeconds)
        .await?;

    assert_eq!(context.axis.len(), 10);
    assert_eq!(context.users.len(), 10);
    assert_eq!(
        context.users.values().map(|(ts, v)| (*ts, v)).collect::<Vec<_>>(),
        vec![(at(4), 5.0), (at(9), 10.0)]
    );
    assert_eq!(context.users.get(&at(5)), Sample::NoData);

    let statements = aggregator.store().statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].0, "jmeter_7");
    assert!(statements[0].1.contains("FROM \"jmeter_7\"..\"users_5s\""));
    assert!(statements[0].1.contains("GROUP BY time(1s), \"lg_id\""));
    Ok(())
}

#[tokio::test]
async fn breakdown_series_cover_the_whole_axis() -> anyhow::Result<()> {
    let store = FixtureStore::new();
    respond_users(&store);
    store.respond(
        "sum(\"total\") AS \"value\"",
        vec![
            series(
                "checkout_5s",
                &[("request_name", "login")],
                &["time", "value"],
                vec![vec![time(0), json!(12)], vec![time(5), json!(null)]],
            ),
            series(
                "checkout_5s",
                &[("request_name", "search")],
                &["time", "value"],
                vec![vec![time(5), json!(4)]],
            ),
        ],
    );
    let aggregator = aggregator(store);

    let chart = aggregator
        .tps(&request(), &Scope::PerRequest, None)
        .await?;

    assert_eq!(chart.series.keys().collect::<Vec<_>>(), vec!["login", "search"]);
    for series in chart.series.values() {
        assert_eq!(
            series.iter().map(|(ts, _)| *ts).collect::<Vec<_>>(),
            chart.axis.as_slice()
        );
    }
    assert_eq!(chart.series["login"].get(&at(0)), Sample::Value(12.0));
    assert_eq!(chart.series["login"].get(&at(5)), Sample::NoData);
    assert_eq!(chart.series["search"].get(&at(5)), Sample::Value(4.0));

    let tps = aggregator.store().statements_matching("sum(\"total\")");
    assert_eq!(tps.len(), 1);
    assert!(tps[0].ends_with("GROUP BY \"request_name\", time(5s)"));
    Ok(())
}

#[tokio::test]
async fn missing_scope_and_all_scope_aggregate_every_request() -> anyhow::Result<()> {
    let store = FixtureStore::new();
    respond_users(&store);
    store.respond(
        "sum(\"total\") AS \"value\"",
        vec![series(
            "checkout_5s",
            &[],
            &["time", "value"],
            vec![vec![time(0), json!(30)], vec![time(5), json!(25)]],
        )],
    );
    let aggregator = aggregator(store);

    let all = aggregator.tps(&request(), &Scope::All, None).await?;
    let unscoped = aggregator
        .tps(&request(), &Scope::from_param(None), None)
        .await?;

    assert_eq!(all, unscoped);
    assert_eq!(
        all.series["responses"].values().map(|(_, v)| v).sum::<f64>(),
        55.0
    );

    let statements = aggregator.store().statements_matching("sum(\"total\")");
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0], statements[1]);
    assert!(!statements[0].contains("request_name"));
    Ok(())
}

#[tokio::test]
async fn unaligned_windows_share_the_bucket_grid() -> anyhow::Result<()> {
    let store = FixtureStore::new();
    respond_users(&store);
    store.respond(
        "sum(\"total\") AS \"value\"",
        vec![series(
            "checkout_5s",
            &[],
            &["time", "value"],
            vec![
                vec![time(0), json!(30)],
                vec![time(5), json!(25)],
                vec![time(10), json!(20)],
            ],
        )],
    );
    let aggregator = aggregator(store);
    let request = SeriesRequest {
        window: TimeWindow::new(at(3), at(12))?,
        ..request()
    };

    let chart = aggregator.tps(&request, &Scope::All, None).await?;

    assert_eq!(chart.axis.as_slice().first(), Some(&at(0)));
    assert_eq!(chart.axis.as_slice().last(), Some(&at(14)));
    assert_eq!(
        chart.series["responses"]
            .values()
            .map(|(ts, v)| (*ts, v))
            .collect::<Vec<_>>(),
        vec![(at(0), 30.0), (at(5), 25.0), (at(10), 20.0)]
    );
    assert_eq!(
        chart.users.values().map(|(ts, _)| *ts).collect::<Vec<_>>(),
        vec![at(4), at(9), at(14)]
    );
    Ok(())
}

#[tokio::test]
async fn a_single_request_is_filtered_not_broken_down() -> anyhow::Result<()> {
    let aggregator = aggregator(FixtureStore::new());
    let scope = Scope::from_param(Some("login"));

    let response_time = aggregator
        .response_time(&request(), &scope, ResponseStatistic::Pct95, None)
        .await?;
    let hits = aggregator.hits(&request(), &scope, None).await?;

    assert_eq!(response_time.series.keys().collect::<Vec<_>>(), vec!["response"]);
    assert_eq!(hits.series.keys().collect::<Vec<_>>(), vec!["hits"]);
    for pattern in ["percentile(\"pct95\", 95)", "SELECT \"hit\" FROM"] {
        let statements = aggregator.store().statements_matching(pattern);
        assert_eq!(statements.len(), 1, "{pattern}");
        assert!(statements[0].contains("\"request_name\" = 'login'"));
        assert!(!statements[0].contains("GROUP BY \"request_name\""));
    }
    Ok(())
}

#[tokio::test]
async fn an_empty_request_list_is_not_a_filter() -> anyhow::Result<()> {
    let aggregator = aggregator(FixtureStore::new());

    aggregator
        .tps(&request(), &Scope::Requests(vec![]), None)
        .await?;

    let statements = aggregator.store().statements_matching("sum(\"total\")");
    assert_eq!(statements.len(), 1);
    assert!(!statements[0].contains("()"));
    assert!(!statements[0].contains("'login'"));
    assert!(statements[0].ends_with("GROUP BY \"request_name\", time(5s)"));
    Ok(())
}

#[tokio::test]
async fn listed_requests_are_an_or_disjunction() -> anyhow::Result<()> {
    let store = FixtureStore::new();
    respond_users(&store);
    let aggregator = aggregator(store);

    let chart = aggregator
        .response_time(
            &request(),
            &Scope::from_list(vec!["login".to_string(), "search".to_string()]),
            ResponseStatistic::Pct99,
            None,
        )
        .await?;
    assert!(chart.series.is_empty());

    let statements = aggregator.store().statements_matching("percentile(\"pct99\", 95)");
    assert_eq!(statements.len(), 1);
    assert!(statements[0]
        .contains("(\"request_name\" = 'login' OR \"request_name\" = 'search')"));
    Ok(())
}

#[tokio::test]
async fn no_rows_give_a_no_data_series() -> anyhow::Result<()> {
    let aggregator = aggregator(FixtureStore::new());

    let chart = aggregator
        .response_codes(&request(), &Scope::All, ResponseCodeClass::ServerError, None)
        .await?;

    assert_eq!(chart.series["rcodes"].len(), 10);
    assert!(chart.series["rcodes"].iter().all(|(_, s)| s.is_no_data()));
    assert!(aggregator.store().statements()[1].1.contains("sum(\"5xx\") AS \"value\""));
    Ok(())
}

#[tokio::test]
async fn errors_only_count_failures() -> anyhow::Result<()> {
    let aggregator = aggregator(FixtureStore::new());

    let request = SeriesRequest {
        status: StatusFilter::Only("OK".to_string()),
        ..request()
    };
    aggregator.errors(&request, &Scope::All, None).await?;

    let statements = aggregator.store().statements_matching("count(\"status\")");
    assert_eq!(statements.len(), 1);
    assert!(statements[0].contains("\"status\" = 'KO'"));
    assert!(!statements[0].contains("'OK'"));
    Ok(())
}

#[tokio::test]
async fn hits_are_summed_per_bucket() -> anyhow::Result<()> {
    let store = FixtureStore::new();
    let second = |s: u32| at(s).timestamp() as f64;
    store.respond(
        "SELECT \"hit\" FROM",
        vec![series(
            "checkout",
            &[],
            &["time", "hit"],
            vec![
                vec![time(0), json!(second(0) + 0.2)],
                vec![time(0), json!(second(0) + 0.7)],
                vec![time(3), json!(second(3) + 0.1)],
                vec![time(6), json!(second(6) + 0.5)],
            ],
        )],
    );
    let aggregator = aggregator(store);

    let chart = aggregator.hits(&request(), &Scope::All, None).await?;

    assert_eq!(chart.series["hits"].len(), 10);
    assert_eq!(
        chart.series["hits"]
            .values()
            .map(|(ts, v)| (*ts, v))
            .collect::<Vec<_>>(),
        vec![(at(0), 3.0), (at(5), 1.0)]
    );
    assert_eq!(
        aggregator
            .store()
            .statements_matching("FROM \"jmeter_7\"..\"checkout\" ")
            .len(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn chart_shares_one_users_context() -> anyhow::Result<()> {
    let store = FixtureStore::new();
    respond_users(&store);
    let aggregator = aggregator(store);

    let chart = aggregator
        .chart(&request(), &Scope::All, ResponseStatistic::Pct95)
        .await?;

    assert_eq!(chart.axis.len(), 10);
    for series in [
        &chart.response_time["response"],
        &chart.throughput["responses"],
        &chart.errors["errors"],
    ] {
        assert_eq!(
            series.iter().map(|(ts, _)| *ts).collect::<Vec<_>>(),
            chart.axis.as_slice()
        );
    }
    assert_eq!(aggregator.store().statements_matching(USERS).len(), 1);
    assert_eq!(aggregator.store().statements().len(), 4);
    Ok(())
}

#[tokio::test]
async fn hits_tps_relabels_throughput() -> anyhow::Result<()> {
    let aggregator = aggregator(FixtureStore::new());

    let chart = aggregator.hits_tps(&request()).await?;

    assert_eq!(chart.series.keys().collect::<Vec<_>>(), vec!["throughput"]);
    Ok(())
}

#[tokio::test]
async fn store_failures_fail_the_whole_chart() {
    let store = FixtureStore::new();
    respond_users(&store);
    store.fail("count(\"status\")", "error parsing query: found EOF");
    let aggregator = aggregator(store);

    let err = aggregator
        .chart(&request(), &Scope::All, ResponseStatistic::Pct95)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::QueryFailed { .. })
    ));
}

#[tokio::test]
async fn unknown_runs_are_rejected() {
    let aggregator = aggregator(FixtureStore::new());

    let err = aggregator
        .users(
            &RunRef::new("unknown", "checkout", "jmeter"),
            window(),
            BucketWidth::FiveSeconds,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<RegistryError>(),
        Some(RegistryError::UnknownRun { .. })
    ));
    assert!(aggregator.store().statements().is_empty());
}

#[tokio::test]
async fn invalid_identifiers_never_reach_the_store() {
    let aggregator = aggregator(FixtureStore::new());

    let result = aggregator
        .users(
            &RunRef::new(BUILD_ID, "checkout", "jmeter\"; DROP"),
            window(),
            BucketWidth::FiveSeconds,
        )
        .await;

    assert!(result.is_err());
    assert!(aggregator.store().statements().is_empty());
}
