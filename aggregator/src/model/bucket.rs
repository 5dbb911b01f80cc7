use serde::{Deserialize, Serialize};

/// Time resolution that raw samples are grouped by for charting.
///
/// The load generators pre-aggregate into one measurement per width (`{test}_1s`, `{test}_5s`,
/// ...), so only the widths on this ladder can be queried.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
pub enum BucketWidth {
    #[serde(rename = "1s")]
    #[strum(serialize = "1s")]
    OneSecond,
    #[serde(rename = "5s")]
    #[strum(serialize = "5s")]
    FiveSeconds,
    #[serde(rename = "30s")]
    #[strum(serialize = "30s")]
    ThirtySeconds,
    #[serde(rename = "1m")]
    #[strum(serialize = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    #[strum(serialize = "5m")]
    FiveMinutes,
    #[serde(rename = "10m")]
    #[strum(serialize = "10m")]
    TenMinutes,
}

impl BucketWidth {
    /// All widths, finest first.
    pub const LADDER: [BucketWidth; 6] = [
        BucketWidth::OneSecond,
        BucketWidth::FiveSeconds,
        BucketWidth::ThirtySeconds,
        BucketWidth::OneMinute,
        BucketWidth::FiveMinutes,
        BucketWidth::TenMinutes,
    ];

    pub const FINEST: BucketWidth = BucketWidth::OneSecond;
    pub const COARSEST: BucketWidth = BucketWidth::TenMinutes;

    /// Width used when a run has no data to size the buckets from.
    pub const FALLBACK: BucketWidth = BucketWidth::ThirtySeconds;

    /// Start of the bucket holding `second`, on multiples of the width counted from the epoch.
    pub fn bucket_start(&self, second: i64) -> i64 {
        let width = self.seconds() as i64;
        second.div_euclid(width) * width
    }

    pub fn seconds(&self) -> usize {
        match self {
            BucketWidth::OneSecond => 1,
            BucketWidth::FiveSeconds => 5,
            BucketWidth::ThirtySeconds => 30,
            BucketWidth::OneMinute => 60,
            BucketWidth::FiveMinutes => 300,
            BucketWidth::TenMinutes => 600,
        }
    }

    /// The next width up the ladder, saturating at the coarsest.
    pub fn coarser(&self) -> BucketWidth {
        let position = Self::LADDER
            .iter()
            .position(|width| width == self)
            .unwrap_or(Self::LADDER.len() - 1);

        Self::LADDER
            .get(position + 1)
            .copied()
            .unwrap_or(Self::COARSEST)
    }

    /// Suffix of the pre-aggregated measurement for this width, e.g. `checkout_30s`.
    pub fn measurement_for(&self, test_name: &str) -> String {
        format!("{test_name}_{self}")
    }
}
