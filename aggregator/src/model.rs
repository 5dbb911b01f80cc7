use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod bucket;
mod engine_health;
mod request;
mod test_details;

pub use bucket::BucketWidth;
pub use engine_health::{HealthSample, HostSeries};
pub use request::{
    ResponseCodeClass, ResponseStatistic, RunRef, Scope, SeriesRequest, StatusFilter, TimeWindow,
};
pub use test_details::{ResponseTotals, TestDetails};

/// A single point in a chart series.
///
/// `NoData` means nothing was recorded for the point and must be skipped when rendering. It is
/// not the same as a recorded zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Sample {
    Value(f64),
    #[default]
    NoData,
}

impl Sample {
    pub fn value(&self) -> Option<f64> {
        match self {
            Sample::Value(v) => Some(*v),
            Sample::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Sample::NoData)
    }

    /// Round to 2 decimal places, as reported for whole-run rollups.
    pub fn rounded(self) -> Sample {
        match self {
            Sample::Value(v) => Sample::Value((v * 100.0).round() / 100.0),
            Sample::NoData => Sample::NoData,
        }
    }
}

impl From<Option<f64>> for Sample {
    fn from(value: Option<f64>) -> Self {
        value.map(Sample::Value).unwrap_or(Sample::NoData)
    }
}

/// The canonical, ordered set of timestamps a chart is plotted against.
///
/// One point per second, from the start of the bucket holding the window start to the last second
/// of the bucket holding the window end. Buckets start on multiples of the width counted from the
/// epoch, the same grid the store uses for `GROUP BY time(..)`, so every series built for the same
/// run, window and width lands on this axis and they can be overlaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampAxis(Vec<DateTime<Utc>>);

impl TimestampAxis {
    pub fn for_window(window: &TimeWindow, width: BucketWidth) -> Self {
        let first = width.bucket_start(window.start.timestamp());
        let last = width.bucket_start(window.end.timestamp()) + width.seconds() as i64 - 1;
        Self(
            (first..=last)
                .filter_map(|second| DateTime::from_timestamp(second, 0))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[DateTime<Utc>] {
        &self.0
    }
}

/// Values for every point of a [TimestampAxis].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series(BTreeMap<DateTime<Utc>, Sample>);

impl Series {
    /// A series with every axis point set to [Sample::NoData].
    pub fn no_data(axis: &TimestampAxis) -> Self {
        Self(axis.iter().map(|ts| (*ts, Sample::NoData)).collect())
    }

    /// Overlay `points` onto the axis. Points that are not on the axis are dropped so the result
    /// always has exactly one entry per axis timestamp.
    pub fn densify<I>(axis: &TimestampAxis, points: I) -> Self
    where
        I: IntoIterator<Item = (DateTime<Utc>, Sample)>,
    {
        let mut series = Self::no_data(axis);
        for (ts, sample) in points {
            if !series.set(ts, sample) {
                log::trace!("Dropping point at {ts} which is not on the axis");
            }
        }
        series
    }

    /// Set the sample at `ts`. Returns false, leaving the series unchanged, if `ts` is not on the
    /// axis.
    pub fn set(&mut self, ts: DateTime<Utc>, sample: Sample) -> bool {
        match self.0.get_mut(&ts) {
            Some(existing) => {
                *existing = sample;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, ts: &DateTime<Utc>) -> Sample {
        self.0.get(ts).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Utc>, &Sample)> {
        self.0.iter()
    }

    /// Only the points that carry a value.
    pub fn values(&self) -> impl Iterator<Item = (&DateTime<Utc>, f64)> {
        self.0
            .iter()
            .filter_map(|(ts, sample)| sample.value().map(|v| (ts, v)))
    }
}

/// Series broken out by a dimension such as request name, keyed by the dimension value.
pub type ScopedSeries = BTreeMap<String, Series>;

/// The axis and concurrent users series shared by every metric on one chart.
///
/// Compute it once with [crate::ChartAggregator::users] and pass it to each builder so that
/// builders running in parallel cannot derive different axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartContext {
    pub axis: TimestampAxis,
    pub users: Series,
}

/// Output of a metric series builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricChart {
    pub axis: TimestampAxis,
    pub users: Series,
    pub series: ScopedSeries,
}

impl MetricChart {
    pub fn new(context: ChartContext, series: ScopedSeries) -> Self {
        Self {
            axis: context.axis,
            users: context.users,
            series,
        }
    }
}

/// Everything needed to overlay the main metrics of a run on one chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub axis: TimestampAxis,
    pub users: Series,
    pub response_time: ScopedSeries,
    pub throughput: ScopedSeries,
    pub errors: ScopedSeries,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(start: i64, end: i64) -> TimeWindow {
        TimeWindow::new(
            Utc.timestamp_opt(start, 0).unwrap(),
            Utc.timestamp_opt(end, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn axis_length_depends_only_on_window_and_width() {
        let axis = TimestampAxis::for_window(&window(1_000, 1_059), BucketWidth::FiveSeconds);
        assert_eq!(axis.len(), 60);
        assert_eq!(
            axis,
            TimestampAxis::for_window(&window(1_000, 1_059), BucketWidth::FiveSeconds)
        );
        assert_eq!(
            TimestampAxis::for_window(&window(1_000, 1_000), BucketWidth::OneSecond).len(),
            1
        );
    }

    #[test]
    fn axis_covers_whole_buckets_from_the_epoch() {
        let axis = TimestampAxis::for_window(&window(1_003, 1_012), BucketWidth::FiveSeconds);
        assert_eq!(axis.as_slice().first().map(|ts| ts.timestamp()), Some(1_000));
        assert_eq!(axis.as_slice().last().map(|ts| ts.timestamp()), Some(1_014));
        assert_eq!(axis.len(), 15);

        let axis = TimestampAxis::for_window(&window(1_003, 1_012), BucketWidth::OneMinute);
        assert_eq!(axis.as_slice().first().map(|ts| ts.timestamp()), Some(960));
        assert_eq!(axis.len(), 60);
    }

    #[test]
    fn densify_keeps_every_axis_point_once() {
        let axis = TimestampAxis::for_window(&window(0, 9), BucketWidth::FiveSeconds);
        let on_axis = Utc.timestamp_opt(3, 0).unwrap();
        let off_axis = Utc.timestamp_opt(42, 0).unwrap();

        let series = Series::densify(
            &axis,
            vec![
                (on_axis, Sample::Value(4.5)),
                (off_axis, Sample::Value(1.0)),
                (on_axis, Sample::Value(5.5)),
            ],
        );

        assert_eq!(series.len(), axis.len());
        assert_eq!(series.get(&on_axis), Sample::Value(5.5));
        assert_eq!(series.get(&off_axis), Sample::NoData);
        assert_eq!(series.values().count(), 1);
        assert!(axis.iter().all(|ts| series.iter().any(|(t, _)| t == ts)));
    }

    #[test]
    fn no_data_serializes_as_null() {
        let json = serde_json::to_string(&vec![Sample::Value(1.5), Sample::NoData]).unwrap();
        assert_eq!(json, "[1.5,null]");
        let back: Vec<Sample> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Sample::Value(1.5), Sample::NoData]);
    }

    #[test]
    fn rounding() {
        assert_eq!(Sample::Value(12.3456).rounded(), Sample::Value(12.35));
        assert_eq!(Sample::NoData.rounded(), Sample::NoData);
    }
}
