use crate::model::{BucketWidth, Sample, Series, TimestampAxis};
use chrono::{DateTime, Utc};

/// How a full buffer of per-second values is collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rebucket {
    /// Peak of the buffer, placed on the last second of the group
    MaxAtEnd,
    /// Total of the buffer, placed on the first second of the group
    SumAtStart,
}

/// Re-bucket a per-second signal into `width` sized groups along `axis`.
///
/// Groups are the store's buckets: they start on multiples of the width counted from the epoch.
/// Seconds are accumulated into a rolling buffer that is reset at each bucket start. Once it holds
/// `width` seconds it is collapsed into one value and cleared. Every other axis point is
/// [Sample::NoData]. A partial group is not emitted. Missing seconds count as zero.
pub(crate) fn rebucket<F>(
    axis: &TimestampAxis,
    width: BucketWidth,
    mode: Rebucket,
    per_second: F,
) -> Series
where
    F: Fn(&DateTime<Utc>) -> f64,
{
    let group_len = width.seconds();
    let mut series = Series::no_data(axis);
    let mut buffer = Vec::with_capacity(group_len);
    let mut group_start = None;

    for ts in axis.iter() {
        if width.bucket_start(ts.timestamp()) == ts.timestamp() {
            buffer.clear();
            group_start = Some(*ts);
        }
        if group_start.is_none() {
            continue;
        }
        buffer.push(per_second(ts));

        if buffer.len() == group_len {
            let (at, value) = match mode {
                Rebucket::MaxAtEnd => (*ts, buffer.iter().copied().fold(f64::MIN, f64::max)),
                Rebucket::SumAtStart => (group_start.unwrap_or(*ts), buffer.iter().sum()),
            };
            series.set(at, Sample::Value(value));
            buffer.clear();
        }
    }

    series
}
