use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

/// Persisted metadata for a single performance test run.
///
/// Reports are written by the API layer when a run starts and updated when it finishes. The
/// aggregation engine only reads them, to find out which project (and therefore which InfluxDB
/// databases) a run belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    /// The run identifier
    ///
    /// Assigned by the control tower when the run is scheduled and attached as the `build_id` tag
    /// to every sample the load generators write.
    pub build_id: String,
    /// The project that owns the run
    pub project_id: u64,
    /// Name of the test, which is also the measurement name for raw samples
    pub name: String,
    /// The load generator that produced the samples, e.g. `jmeter` or `gatling`
    pub lg_type: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The time the run finished, if it has finished
    pub ended_at: Option<i64>,
    /// Environment label the run targeted
    #[serde(default)]
    pub environment: Option<String>,
    /// Test type label, e.g. `baseline` or `stress`
    #[serde(default)]
    pub test_type: Option<String>,
}

impl RunReport {
    /// Create a new report for a run that has just started
    pub fn new(
        build_id: String,
        project_id: u64,
        name: String,
        lg_type: String,
        started_at: i64,
    ) -> Self {
        Self {
            build_id,
            project_id,
            name,
            lg_type,
            started_at,
            ended_at: None,
            environment: None,
            test_type: None,
        }
    }

    /// Mark the run as finished
    pub fn set_ended_at(&mut self, ended_at: i64) {
        self.ended_at = Some(ended_at);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No report found for run `{build_id}`")]
    UnknownRun { build_id: String },
}

/// Resolve the project that owns a run.
///
/// Implemented by anything that can look up persisted report metadata.
pub trait ProjectResolver {
    fn resolve_project(&self, build_id: &str) -> Result<u64, RegistryError>;
}

/// In-memory index of run reports, keyed by run identifier.
///
/// When the same run has been reported more than once, the report with the latest start time
/// wins.
#[derive(Debug, Clone, Default)]
pub struct ReportRegistry {
    reports: BTreeMap<String, RunReport>,
}

impl ReportRegistry {
    pub fn from_reports(reports: Vec<RunReport>) -> Self {
        let reports = reports
            .into_iter()
            .into_group_map_by(|report| report.build_id.clone())
            .into_iter()
            .filter_map(|(build_id, reports)| {
                reports
                    .into_iter()
                    .max_by_key(|report| report.started_at)
                    .map(|report| (build_id, report))
            })
            .collect::<BTreeMap<_, _>>();

        log::debug!("Loaded reports for {} runs", reports.len());

        Self { reports }
    }

    /// Load the registry from a JSON lines file, see [load_run_reports].
    pub fn load(path: PathBuf) -> anyhow::Result<Self> {
        Ok(Self::from_reports(load_run_reports(path)?))
    }

    pub fn get(&self, build_id: &str) -> Option<&RunReport> {
        self.reports.get(build_id)
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

impl ProjectResolver for ReportRegistry {
    fn resolve_project(&self, build_id: &str) -> Result<u64, RegistryError> {
        self.get(build_id)
            .map(|report| report.project_id)
            .ok_or_else(|| RegistryError::UnknownRun {
                build_id: build_id.to_string(),
            })
    }
}

/// Serialize the run report to a writer
pub fn store_run_report<W: Write>(run_report: &RunReport, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_report)?;
    Ok(())
}

/// Load a run report from a reader
pub fn load_run_report<R: Read>(reader: R) -> anyhow::Result<RunReport> {
    let reader = std::io::BufReader::new(reader);
    let run_report: RunReport = serde_json::from_reader(reader)?;
    Ok(run_report)
}

/// Append the run report to a file
///
/// The report will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_report(run_report: &RunReport, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_report(run_report, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Load run reports from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_report]. Blank lines are skipped.
pub fn load_run_reports(path: PathBuf) -> anyhow::Result<Vec<RunReport>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut reports = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let report: RunReport = serde_json::from_str(&line)?;
        reports.push(report);
    }
    Ok(reports)
}
