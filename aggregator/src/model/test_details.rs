use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of a run read back from the store once the run has data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDetails {
    /// Time of the first users sample
    pub start_time: DateTime<Utc>,
    /// Time of the last users sample
    pub end_time: DateTime<Utc>,
    /// Configured virtual users, as tagged on the comparison data
    pub vusers: Option<String>,
    pub environment: Option<String>,
    pub test_type: Option<String>,
    /// Every request name recorded for the run
    pub requests: Vec<String>,
    /// Totals across all requests
    pub totals: Option<ResponseTotals>,
}

/// Response code totals for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResponseTotals {
    pub total: f64,
    pub failures: f64,
    pub throughput: f64,
    pub onexx: f64,
    pub twoxx: f64,
    pub threexx: f64,
    pub fourxx: f64,
    pub fivexx: f64,
}
