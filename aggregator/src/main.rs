use anyhow::Context;
use clap::Parser;
use perf_aggregator::{ChartAggregator, EngineConfig, InfluxStore};
use perf_report_model::ReportRegistry;
use polars::io::SerWriter;
use polars::prelude::{DataFrame, JsonFormat};
use serde::Serialize;

mod cli;

use cli::{AggregatorCli, Command, HealthKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = AggregatorCli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::default(),
    };
    log::debug!("Using engine configuration {config:?}");

    log::debug!("Loading run reports from {}", cli.run_reports.display());
    let registry = ReportRegistry::load(cli.run_reports.clone())
        .with_context(|| format!("Failed to load run reports from {}", cli.run_reports.display()))?;

    let store = InfluxStore::new(
        cli.influx_host.clone(),
        cli.influx_token.clone(),
        config.query_timeout(),
    );
    let aggregator = ChartAggregator::new(store, registry, config);

    match cli.command {
        Command::AutoAggregation { run, window } => {
            let width = aggregator
                .auto_aggregation(&run.run_ref(), window.window()?)
                .await?;
            print_json(&width)
        }
        Command::Users { run, window, width } => {
            let context = aggregator
                .users(&run.run_ref(), window.window()?, width)
                .await?;
            print_json(&context)
        }
        Command::ResponseTime { series, statistic } => {
            let chart = aggregator
                .response_time(&series.request()?, &series.scope(), statistic, None)
                .await?;
            print_json(&chart)
        }
        Command::Tps { series } => {
            let chart = aggregator
                .tps(&series.request()?, &series.scope(), None)
                .await?;
            print_json(&chart)
        }
        Command::Hits { series } => {
            let chart = aggregator
                .hits(&series.request()?, &series.scope(), None)
                .await?;
            print_json(&chart)
        }
        Command::Errors { series } => {
            let chart = aggregator
                .errors(&series.request()?, &series.scope(), None)
                .await?;
            print_json(&chart)
        }
        Command::ResponseCodes { series, class } => {
            let chart = aggregator
                .response_codes(&series.request()?, &series.scope(), class, None)
                .await?;
            print_json(&chart)
        }
        Command::Chart { series, statistic } => {
            let chart = aggregator
                .chart(&series.request()?, &series.scope(), statistic)
                .await?;
            print_json(&chart)
        }
        Command::HitsTps { series } => {
            let chart = aggregator.hits_tps(&series.request()?).await?;
            print_json(&chart)
        }
        Command::BuildData {
            run,
            sampler,
            status,
        } => {
            let mut frame = aggregator
                .build_data(&run.run_ref(), &sampler, &status)
                .await?;
            print_frame(&mut frame)
        }
        Command::AggregatedResults { build_id, test } => {
            let mut frame = aggregator.aggregated_test_results(&test, &build_id).await?;
            print_frame(&mut frame)
        }
        Command::ThroughputPerTest { rollup } => {
            let throughput = aggregator
                .throughput_per_test(
                    &rollup.run.run_ref(),
                    rollup.sampler.as_deref(),
                    rollup.request.as_deref(),
                    rollup.width,
                    &rollup.status,
                )
                .await?;
            print_json(&throughput)
        }
        Command::ResponseTimePerTest { rollup, statistic } => {
            let rt = aggregator
                .response_time_per_test(
                    &rollup.run.run_ref(),
                    rollup.sampler.as_deref(),
                    rollup.request.as_deref(),
                    statistic,
                    &rollup.status,
                    rollup.width,
                )
                .await?;
            print_json(&rt)
        }
        Command::EngineHealth {
            build_id,
            window,
            width,
            kind,
        } => {
            let window = window.window()?;
            let hosts = match kind {
                HealthKind::Cpu => aggregator.engine_health_cpu(&build_id, window, width).await?,
                HealthKind::Memory => aggregator.engine_health_memory(&build_id, window).await?,
                HealthKind::Load => aggregator.engine_health_load(&build_id, window, width).await?,
            };
            print_json(&hosts)
        }
        Command::TestDetails { build_id, lg_type } => {
            let details = aggregator.test_details(&build_id, &lg_type).await?;
            print_json(&details)
        }
        Command::SamplerTypes { build_id, lg_type } => {
            let samplers = aggregator.sampler_types(&build_id, &lg_type).await?;
            print_json(&samplers)
        }
        Command::Delete { run } => {
            aggregator
                .delete_test_data(&run.build_id, &run.test, &run.lg_type)
                .await?;
            log::info!("Deleted data for run {}", run.build_id);
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(std::io::stdout(), value)?;
    println!();
    Ok(())
}

fn print_frame(frame: &mut DataFrame) -> anyhow::Result<()> {
    polars::io::json::JsonWriter::new(std::io::stdout())
        .with_json_format(JsonFormat::Json)
        .finish(frame)?;
    println!();
    Ok(())
}
