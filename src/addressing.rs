//! Decides how a channel's samples are addressed.
//!
//! A channel is time-addressed when it carries a usable time track (same
//! length as the samples, all finite, strictly increasing) and
//! index-addressed otherwise. Sample arrays of any supported element type
//! are normalized to `f64` on the way through.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A complex sample as stored by the instrument
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Complex64 {
    pub re: f64,
    pub im: f64,
}

/// Raw channel samples as read from the source file
#[derive(Debug, Clone, PartialEq)]
pub enum SampleArray {
    Float64(Vec<f64>),
    Float32(Vec<f32>),
    Int64(Vec<i64>),
    Int32(Vec<i32>),
    UInt64(Vec<u64>),
    UInt8(Vec<u8>),
    Bool(Vec<bool>),
    Complex(Vec<Complex64>),
    Text(Vec<String>),
}

impl SampleArray {
    pub fn len(&self) -> usize {
        match self {
            SampleArray::Float64(v) => v.len(),
            SampleArray::Float32(v) => v.len(),
            SampleArray::Int64(v) => v.len(),
            SampleArray::Int32(v) => v.len(),
            SampleArray::UInt64(v) => v.len(),
            SampleArray::UInt8(v) => v.len(),
            SampleArray::Bool(v) => v.len(),
            SampleArray::Complex(v) => v.len(),
            SampleArray::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert to `f64`. Complex samples become their magnitude.
    pub fn into_f64(self, label: &str) -> Result<Vec<f64>> {
        Ok(match self {
            SampleArray::Float64(v) => v,
            SampleArray::Float32(v) => v.into_iter().map(f64::from).collect(),
            SampleArray::Int64(v) => v.into_iter().map(|x| x as f64).collect(),
            SampleArray::Int32(v) => v.into_iter().map(f64::from).collect(),
            SampleArray::UInt64(v) => v.into_iter().map(|x| x as f64).collect(),
            SampleArray::UInt8(v) => v.into_iter().map(f64::from).collect(),
            SampleArray::Bool(v) => v.into_iter().map(|b| if b { 1.0 } else { 0.0 }).collect(),
            SampleArray::Complex(v) => {
                info!(channel = label, "Complex samples stored as magnitude");
                v.into_iter().map(|c| c.re.hypot(c.im)).collect()
            }
            SampleArray::Text(v) => v
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    s.trim().parse::<f64>().map_err(|_| {
                        Error::InvalidData(format!(
                            "channel {label}: sample {i} ({s:?}) is not numeric"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

/// Time track attached to a channel
#[derive(Debug, Clone, PartialEq)]
pub enum TimeTrack {
    /// Explicit UTC timestamps, one per sample
    Absolute(Vec<DateTime<Utc>>),
    /// Explicit epoch seconds, one per sample
    EpochSeconds(Vec<f64>),
    /// Uniformly sampled: `start + i * increment_secs`
    Waveform {
        start: DateTime<Utc>,
        increment_secs: f64,
    },
}

impl TimeTrack {
    /// Expand into epoch microseconds for `n` samples.
    ///
    /// Returns `None` when the track cannot address the samples.
    fn to_micros(&self, n: usize) -> Option<Vec<i64>> {
        match self {
            TimeTrack::Absolute(ts) => {
                if ts.len() != n {
                    return None;
                }
                Some(ts.iter().map(|t| t.timestamp_micros()).collect())
            }
            TimeTrack::EpochSeconds(secs) => {
                if secs.len() != n {
                    return None;
                }
                secs.iter().map(|s| secs_to_micros(*s)).collect()
            }
            TimeTrack::Waveform {
                start,
                increment_secs,
            } => {
                if !increment_secs.is_finite() || *increment_secs <= 0.0 {
                    return None;
                }
                let start_us = start.timestamp_micros();
                (0..n)
                    .map(|i| {
                        secs_to_micros(i as f64 * increment_secs)
                            .and_then(|offset| start_us.checked_add(offset))
                    })
                    .collect()
            }
        }
    }
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub(crate) fn secs_to_micros(secs: f64) -> Option<i64> {
    if !secs.is_finite() {
        return None;
    }
    let us = (secs * 1e6).round();
    if us < i64::MIN as f64 || us > i64::MAX as f64 {
        return None;
    }
    Some(us as i64)
}

/// Resolved positions for one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Positions {
    /// Epoch microseconds
    Time(Vec<i64>),
    /// Zero-based sample indices
    Index(Vec<u64>),
}

impl Positions {
    pub fn has_time(&self) -> bool {
        matches!(self, Positions::Time(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Positions::Time(v) => v.len(),
            Positions::Index(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One stored position.
///
/// Serializes as epoch seconds (`f64`) for time positions and as the bare
/// index for index positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Position {
    Time(i64),
    Index(u64),
}

impl Position {
    /// Position on the numeric axis: seconds for time, the index otherwise
    pub fn axis_value(&self) -> f64 {
        match self {
            Position::Time(us) => *us as f64 / 1e6,
            Position::Index(i) => *i as f64,
        }
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Position::Time(us) => DateTime::from_timestamp_micros(*us),
            Position::Index(_) => None,
        }
    }
}

impl Serialize for Position {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Position::Time(_) => serializer.serialize_f64(self.axis_value()),
            Position::Index(i) => serializer.serialize_u64(*i),
        }
    }
}

/// A channel ready for loading
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChannel {
    pub values: Vec<f64>,
    pub positions: Positions,
}

impl ResolvedChannel {
    pub fn has_time(&self) -> bool {
        self.positions.has_time()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolve one channel's values and addressing mode.
///
/// `label` identifies the channel in logs and errors.
pub fn resolve(
    label: &str,
    samples: SampleArray,
    time: Option<&TimeTrack>,
) -> Result<ResolvedChannel> {
    if samples.is_empty() {
        return Err(Error::InvalidData(format!("channel {label} has no samples")));
    }
    let values = samples.into_f64(label)?;
    let n = values.len();

    let positions = match time {
        Some(track) => match track.to_micros(n) {
            Some(us) if is_strictly_increasing(&us) => Positions::Time(us),
            Some(_) => {
                warn!(
                    channel = label,
                    "Time track is not strictly increasing, using sample index"
                );
                index_positions(n)
            }
            None => {
                warn!(
                    channel = label,
                    samples = n,
                    "Time track unusable (length mismatch or non-finite), using sample index"
                );
                index_positions(n)
            }
        },
        None => index_positions(n),
    };

    Ok(ResolvedChannel { values, positions })
}

fn index_positions(n: usize) -> Positions {
    Positions::Index((0..n as u64).collect())
}

fn is_strictly_increasing(v: &[i64]) -> bool {
    v.windows(2).all(|w| w[0] < w[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_no_track_is_index() {
        let r = resolve("g/c", SampleArray::Int32(vec![5, 6, 7]), None).unwrap();
        assert_eq!(r.values, vec![5.0, 6.0, 7.0]);
        assert_eq!(r.positions, Positions::Index(vec![0, 1, 2]));
        assert!(!r.has_time());
    }

    #[test]
    fn test_waveform_track() {
        let track = TimeTrack::Waveform {
            start: t0(),
            increment_secs: 0.001,
        };
        let r = resolve("g/c", SampleArray::Float64(vec![1.0, 2.0, 3.0]), Some(&track)).unwrap();
        let base = t0().timestamp_micros();
        assert_eq!(r.positions, Positions::Time(vec![base, base + 1000, base + 2000]));
    }

    #[test]
    fn test_epoch_seconds_track() {
        let track = TimeTrack::EpochSeconds(vec![10.0, 10.5, 11.0]);
        let r = resolve("g/c", SampleArray::Float64(vec![0.0; 3]), Some(&track)).unwrap();
        assert_eq!(
            r.positions,
            Positions::Time(vec![10_000_000, 10_500_000, 11_000_000])
        );
    }

    #[test]
    fn test_repeated_timestamps_fall_back() {
        let track = TimeTrack::EpochSeconds(vec![10.0, 10.5, 10.5]);
        let r = resolve("g/c", SampleArray::Float64(vec![0.0; 3]), Some(&track)).unwrap();
        assert_eq!(r.positions, Positions::Index(vec![0, 1, 2]));

        let track = TimeTrack::Waveform {
            start: t0(),
            increment_secs: 0.0,
        };
        let r = resolve("g/c", SampleArray::Float64(vec![0.0; 3]), Some(&track)).unwrap();
        assert!(!r.has_time());
    }

    #[test]
    fn test_length_mismatch_falls_back() {
        let track = TimeTrack::EpochSeconds(vec![1.0, 2.0]);
        let r = resolve("g/c", SampleArray::Float64(vec![0.0; 3]), Some(&track)).unwrap();
        assert!(!r.has_time());
        assert_eq!(r.positions.len(), 3);
    }

    #[test]
    fn test_non_monotonic_falls_back() {
        let track = TimeTrack::EpochSeconds(vec![1.0, 3.0, 2.0]);
        let r = resolve("g/c", SampleArray::Float64(vec![0.0; 3]), Some(&track)).unwrap();
        assert!(!r.has_time());
    }

    #[test]
    fn test_non_finite_falls_back() {
        let track = TimeTrack::EpochSeconds(vec![1.0, f64::NAN, 2.0]);
        let r = resolve("g/c", SampleArray::Float64(vec![0.0; 3]), Some(&track)).unwrap();
        assert!(!r.has_time());
    }

    #[test]
    fn test_complex_magnitude() {
        let samples = SampleArray::Complex(vec![Complex64 { re: 3.0, im: 4.0 }]);
        let r = resolve("g/c", samples, None).unwrap();
        assert_eq!(r.values, vec![5.0]);
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = t0();
        assert_eq!(parse_timestamp("2024-01-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T01:00:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 00:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_empty_and_text_rejected() {
        let err = resolve("g/c", SampleArray::Float64(vec![]), None).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));

        let samples = SampleArray::Text(vec!["1.5".into(), "abc".into()]);
        let err = resolve("g/c", samples, None).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));

        let samples = SampleArray::Text(vec!["1.5".into(), " 2 ".into()]);
        assert_eq!(resolve("g/c", samples, None).unwrap().values, vec![1.5, 2.0]);
    }
}
