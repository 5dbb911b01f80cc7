use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use perf_aggregator::model::{
    BucketWidth, ResponseCodeClass, ResponseStatistic, RunRef, Scope, SeriesRequest, StatusFilter,
    TimeWindow,
};
use std::path::PathBuf;

/// Default path for the run reports file
const DEFAULT_RUN_REPORTS_PATH: &str = "run_reports.jsonl";

#[derive(Parser)]
#[command(about, long_about = None)]
pub struct AggregatorCli {
    /// Base URL of the InfluxDB HTTP API
    #[clap(long, env = "INFLUX_HOST")]
    pub influx_host: String,

    /// Token to authenticate with, if the store requires one
    #[clap(long, env = "INFLUX_TOKEN")]
    pub influx_token: Option<String>,

    /// JSON lines file of run reports, used to find the project that owns a run
    #[clap(long, env = "RUN_REPORTS_PATH", default_value = DEFAULT_RUN_REPORTS_PATH)]
    pub run_reports: PathBuf,

    /// Engine configuration file, in TOML. Defaults are used when not given.
    #[clap(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Pick the bucket width for charting a run
    AutoAggregation {
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Concurrent users and the chart axis
    Users {
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        window: WindowArgs,
        #[clap(long, default_value = "30s")]
        width: BucketWidth,
    },
    /// Response time series
    ResponseTime {
        #[command(flatten)]
        series: SeriesArgs,
        #[clap(long, default_value = "pct95")]
        statistic: ResponseStatistic,
    },
    /// Throughput series
    Tps {
        #[command(flatten)]
        series: SeriesArgs,
    },
    /// Hits series, counted from raw hit timestamps
    Hits {
        #[command(flatten)]
        series: SeriesArgs,
    },
    /// Error count series
    Errors {
        #[command(flatten)]
        series: SeriesArgs,
    },
    /// Series of one response code class
    ResponseCodes {
        #[command(flatten)]
        series: SeriesArgs,
        #[clap(long, default_value = "2xx")]
        class: ResponseCodeClass,
    },
    /// Users, response time, throughput and errors on one axis
    Chart {
        #[command(flatten)]
        series: SeriesArgs,
        #[clap(long, default_value = "pct95")]
        statistic: ResponseStatistic,
    },
    /// Throughput of the whole run
    HitsTps {
        #[command(flatten)]
        series: SeriesArgs,
    },
    /// Comparison rows for the requests recorded in a run
    BuildData {
        #[command(flatten)]
        run: RunArgs,
        #[clap(long, default_value = "REQUEST")]
        sampler: String,
        #[clap(long, default_value = "all")]
        status: StatusFilter,
    },
    /// Comparison rows of one simulation
    AggregatedResults {
        #[clap(long)]
        build_id: String,
        #[clap(long)]
        test: String,
    },
    /// Mean throughput over the whole run
    ThroughputPerTest {
        #[command(flatten)]
        rollup: RollupArgs,
    },
    /// One response time statistic over the whole run
    ResponseTimePerTest {
        #[command(flatten)]
        rollup: RollupArgs,
        #[clap(long, default_value = "pct95")]
        statistic: ResponseStatistic,
    },
    /// Load generator host telemetry
    EngineHealth {
        #[clap(long)]
        build_id: String,
        #[command(flatten)]
        window: WindowArgs,
        #[clap(long, default_value = "30s")]
        width: BucketWidth,
        #[clap(long, value_enum)]
        kind: HealthKind,
    },
    /// Time span, tags and totals of a run
    TestDetails {
        #[clap(long)]
        build_id: String,
        #[clap(long)]
        lg_type: String,
    },
    /// Sampler types recorded for a run
    SamplerTypes {
        #[clap(long)]
        build_id: String,
        #[clap(long)]
        lg_type: String,
    },
    /// Delete the raw samples and comparison rows of a run
    Delete {
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum HealthKind {
    Cpu,
    Memory,
    Load,
}

#[derive(Args)]
pub struct RunArgs {
    #[clap(long)]
    pub build_id: String,
    /// Test name, which is also the raw measurement name
    #[clap(long)]
    pub test: String,
    /// Load generator type, e.g. `jmeter` or `gatling`
    #[clap(long)]
    pub lg_type: String,
}

impl RunArgs {
    pub fn run_ref(&self) -> RunRef {
        RunRef::new(&self.build_id, &self.test, &self.lg_type)
    }
}

#[derive(Args)]
pub struct WindowArgs {
    /// RFC 3339 start of the window
    #[clap(long)]
    pub start: DateTime<Utc>,
    /// RFC 3339 end of the window
    #[clap(long)]
    pub end: DateTime<Utc>,
}

impl WindowArgs {
    pub fn window(&self) -> anyhow::Result<TimeWindow> {
        TimeWindow::new(self.start, self.end)
    }
}

#[derive(Args)]
pub struct SeriesArgs {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(flatten)]
    pub window: WindowArgs,
    #[clap(long, default_value = "30s")]
    pub width: BucketWidth,
    #[clap(long, default_value = "REQUEST")]
    pub sampler: String,
    /// `all`, or a status token such as `ok` or `ko`
    #[clap(long, default_value = "all")]
    pub status: StatusFilter,
    /// Restrict to a request name. Give it more than once for one series per listed request.
    #[clap(long = "request")]
    pub requests: Vec<String>,
    /// One series per request name
    #[clap(long, default_value = "false")]
    pub per_request: bool,
}

impl SeriesArgs {
    pub fn request(&self) -> anyhow::Result<SeriesRequest> {
        Ok(SeriesRequest {
            run: self.run.run_ref(),
            window: self.window.window()?,
            width: self.width,
            sampler: self.sampler.clone(),
            status: self.status.clone(),
        })
    }

    pub fn scope(&self) -> Scope {
        if self.per_request {
            return Scope::PerRequest;
        }
        match self.requests.as_slice() {
            [] => Scope::All,
            [name] => Scope::from_param(Some(name)),
            names => Scope::from_list(names.to_vec()),
        }
    }
}

#[derive(Args)]
pub struct RollupArgs {
    #[command(flatten)]
    pub run: RunArgs,
    #[clap(long)]
    pub sampler: Option<String>,
    /// Restrict to one request name
    #[clap(long = "request")]
    pub request: Option<String>,
    #[clap(long, default_value = "30s")]
    pub width: BucketWidth,
    #[clap(long, default_value = "all")]
    pub status: StatusFilter,
}
