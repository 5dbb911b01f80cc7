use crate::model::BucketWidth;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifies the raw data of one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunRef {
    /// Run identifier, stored as the `build_id` tag
    pub build_id: String,
    /// Test name, which is the measurement raw samples are written to
    pub test_name: String,
    /// Load generator type, which selects the database raw samples are written to
    pub lg_type: String,
}

impl RunRef {
    pub fn new(
        build_id: impl Into<String>,
        test_name: impl Into<String>,
        lg_type: impl Into<String>,
    ) -> Self {
        Self {
            build_id: build_id.into(),
            test_name: test_name.into(),
            lg_type: lg_type.into(),
        }
    }
}

/// Closed time range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> anyhow::Result<Self> {
        if end < start {
            anyhow::bail!("Time window ends ({end}) before it starts ({start})");
        }
        Ok(Self { start, end })
    }
}

/// Request name filter for a metric query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Every request aggregated into a single series
    All,
    /// One request only
    Request(String),
    /// The listed requests, one series each
    Requests(Vec<String>),
    /// Every request, one series each
    PerRequest,
}

impl Scope {
    /// Scope from a single optional request name. No name, or `All`, aggregates every request.
    pub fn from_param(name: Option<&str>) -> Self {
        match name {
            None | Some("All") => Scope::All,
            Some(name) => Scope::Request(name.to_string()),
        }
    }

    /// Scope from a list of request names. A list mentioning `All` selects every request.
    pub fn from_list(names: Vec<String>) -> Self {
        if names.is_empty() || names.iter().any(|name| name == "All") {
            Scope::PerRequest
        } else {
            Scope::Requests(names)
        }
    }

    /// Whether results are split into one series per request name.
    pub fn is_breakdown(&self) -> bool {
        matches!(self, Scope::Requests(_) | Scope::PerRequest)
    }

    /// Request names to filter on, if any.
    pub fn request_names(&self) -> Option<Vec<&str>> {
        match self {
            Scope::Request(name) => Some(vec![name.as_str()]),
            Scope::Requests(names) => Some(names.iter().map(String::as_str).collect()),
            Scope::All | Scope::PerRequest => None,
        }
    }
}

/// Filter on the sample status tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StatusFilter {
    #[default]
    All,
    /// Only samples with this status token, e.g. `OK` or `KO`
    Only(String),
}

impl StatusFilter {
    pub fn failures() -> Self {
        StatusFilter::Only("KO".to_string())
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Only(token) => Some(token),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(StatusFilter::All)
        } else {
            Ok(StatusFilter::Only(s.to_uppercase()))
        }
    }
}

/// Statistic requested for a response time chart or rollup.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Default,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResponseStatistic {
    Min,
    Max,
    Median,
    #[default]
    Pct95,
    Pct99,
    /// Failed request totals
    Errors,
    /// Request totals
    Total,
}

impl ResponseStatistic {
    /// The timing column this statistic is read from, if it is a timing statistic.
    pub fn timing_field(&self) -> Option<&'static str> {
        match self {
            ResponseStatistic::Min => Some("min"),
            ResponseStatistic::Max => Some("max"),
            ResponseStatistic::Median => Some("median"),
            ResponseStatistic::Pct95 => Some("pct95"),
            ResponseStatistic::Pct99 => Some("pct99"),
            ResponseStatistic::Errors | ResponseStatistic::Total => None,
        }
    }
}

impl FromStr for ResponseStatistic {
    type Err = std::convert::Infallible;

    /// Unrecognised statistics fall back to request totals.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "min" => ResponseStatistic::Min,
            "max" => ResponseStatistic::Max,
            "median" => ResponseStatistic::Median,
            "pct95" => ResponseStatistic::Pct95,
            "pct99" => ResponseStatistic::Pct99,
            "errors" => ResponseStatistic::Errors,
            _ => ResponseStatistic::Total,
        })
    }
}

/// Response code class column.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Default,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
pub enum ResponseCodeClass {
    #[serde(rename = "1xx")]
    #[strum(serialize = "1xx")]
    Informational,
    #[default]
    #[serde(rename = "2xx")]
    #[strum(serialize = "2xx")]
    Success,
    #[serde(rename = "3xx")]
    #[strum(serialize = "3xx")]
    Redirection,
    #[serde(rename = "4xx")]
    #[strum(serialize = "4xx")]
    ClientError,
    #[serde(rename = "5xx")]
    #[strum(serialize = "5xx")]
    ServerError,
}

/// The common parameters of every metric series builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesRequest {
    pub run: RunRef,
    pub window: TimeWindow,
    pub width: BucketWidth,
    /// Sampler type tag, e.g. `REQUEST`
    pub sampler: String,
    pub status: StatusFilter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_scope_treats_missing_and_all_alike() {
        assert_eq!(Scope::from_param(None), Scope::All);
        assert_eq!(Scope::from_param(Some("All")), Scope::All);
        assert_eq!(
            Scope::from_param(Some("login")),
            Scope::Request("login".to_string())
        );
    }

    #[test]
    fn list_scope_with_all_is_unfiltered_breakdown() {
        let scope = Scope::from_list(vec!["login".to_string(), "All".to_string()]);
        assert_eq!(scope, Scope::PerRequest);
        assert!(scope.is_breakdown());
        assert_eq!(scope.request_names(), None);

        let scope = Scope::from_list(vec!["login".to_string(), "logout".to_string()]);
        assert_eq!(scope.request_names(), Some(vec!["login", "logout"]));
    }

    #[test]
    fn statistic_parsing_defaults_to_total() {
        assert_eq!(
            "PCT99".parse::<ResponseStatistic>().unwrap(),
            ResponseStatistic::Pct99
        );
        assert_eq!(
            "throughput".parse::<ResponseStatistic>().unwrap(),
            ResponseStatistic::Total
        );
        assert_eq!(ResponseStatistic::Median.timing_field(), Some("median"));
        assert_eq!(ResponseStatistic::Errors.timing_field(), None);
    }

    #[test]
    fn status_tokens_are_upper_cased() {
        assert_eq!("all".parse::<StatusFilter>().unwrap(), StatusFilter::All);
        assert_eq!(
            "ko".parse::<StatusFilter>().unwrap(),
            StatusFilter::failures()
        );
    }

    #[test]
    fn window_must_not_be_reversed() {
        let now = Utc::now();
        assert!(TimeWindow::new(now, now).is_ok());
        assert!(TimeWindow::new(now, now - chrono::Duration::seconds(1)).is_err());
    }
}
