//! Reader for JSON exports of instrument files.
//!
//! ```json
//! {"groups": [{"name": "Group 1", "channels": [
//!     {"name": "Voltage",
//!      "properties": {"unit_string": "V"},
//!      "values": [0.1, 0.2, 0.3],
//!      "time": {"start": "2024-01-01T00:00:00Z", "increment": 0.001}}
//! ]}]}
//! ```
//!
//! `time` may also be `{"timestamps": [..iso..]}` or `{"epoch_seconds": [..]}`.
//! Without `time`, the waveform properties `wf_start_time` and
//! `wf_increment` are used when both are present. Values may be numbers,
//! booleans, numeric strings or `{"re": .., "im": ..}` objects.

use crate::addressing::{parse_timestamp, Complex64, SampleArray, TimeTrack};
use crate::error::{Error, Result};
use crate::extract::{ChannelKey, InstrumentReader, Properties};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct JsonFile {
    #[serde(default)]
    groups: Vec<JsonGroup>,
}

#[derive(Debug, Deserialize)]
struct JsonGroup {
    name: String,
    #[serde(default)]
    channels: Vec<JsonChannel>,
}

#[derive(Debug, Deserialize)]
struct JsonChannel {
    name: String,
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
    #[serde(default)]
    values: Vec<Value>,
    /// Decoded per channel so one malformed track never rejects the file
    #[serde(default)]
    time: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonTime {
    Waveform { start: String, increment: f64 },
    Timestamps { timestamps: Vec<String> },
    EpochSeconds { epoch_seconds: Vec<f64> },
}

/// Instrument reader over a parsed JSON export
#[derive(Debug)]
pub struct JsonReader {
    channels: Vec<(ChannelKey, JsonChannel)>,
}

impl JsonReader {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let file: JsonFile = serde_json::from_slice(bytes)?;
        let channels = file
            .groups
            .into_iter()
            .flat_map(|group| {
                let group_name = group.name;
                group
                    .channels
                    .into_iter()
                    .map(move |c| (ChannelKey::new(group_name.clone(), c.name.clone()), c))
            })
            .collect();
        Ok(Self { channels })
    }

    fn get(&self, key: &ChannelKey) -> Result<&JsonChannel> {
        self.channels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, c)| c)
            .ok_or_else(|| Error::InvalidData(format!("no channel {key} in file")))
    }
}

impl std::str::FromStr for JsonReader {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_slice(s.as_bytes())
    }
}

impl InstrumentReader for JsonReader {
    fn channel_keys(&self) -> Vec<ChannelKey> {
        self.channels.iter().map(|(k, _)| k.clone()).collect()
    }

    fn read_samples(&self, key: &ChannelKey) -> Result<SampleArray> {
        samples_from_json(key, &self.get(key)?.values)
    }

    fn read_time_track(&self, key: &ChannelKey) -> Result<Option<TimeTrack>> {
        let channel = self.get(key)?;
        let Some(raw) = &channel.time else {
            return waveform_from_properties(key, &channel.properties);
        };
        let time = JsonTime::deserialize(raw).map_err(|e| {
            Error::InvalidData(format!("channel {key}: unrecognized time track: {e}"))
        })?;
        match time {
            JsonTime::Waveform { start, increment } => Ok(Some(TimeTrack::Waveform {
                start: parse_time(key, &start)?,
                increment_secs: increment,
            })),
            JsonTime::Timestamps { timestamps } => Ok(Some(TimeTrack::Absolute(
                timestamps
                    .iter()
                    .map(|t| parse_time(key, t))
                    .collect::<Result<_>>()?,
            ))),
            JsonTime::EpochSeconds { epoch_seconds } => {
                Ok(Some(TimeTrack::EpochSeconds(epoch_seconds)))
            }
        }
    }

    fn properties(&self, key: &ChannelKey) -> Result<Properties> {
        Ok(self
            .get(key)?
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), property_string(v)))
            .collect())
    }
}

fn parse_time(key: &ChannelKey, s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    parse_timestamp(s)
        .ok_or_else(|| Error::InvalidData(format!("channel {key}: bad timestamp {s:?}")))
}

fn property_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn waveform_from_properties(
    key: &ChannelKey,
    props: &serde_json::Map<String, Value>,
) -> Result<Option<TimeTrack>> {
    let (Some(start), Some(increment)) = (props.get("wf_start_time"), props.get("wf_increment"))
    else {
        return Ok(None);
    };
    let start = match start {
        Value::String(s) => parse_time(key, s)?,
        _ => return Ok(None),
    };
    let increment_secs = match increment {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    Ok(increment_secs.map(|increment_secs| TimeTrack::Waveform {
        start,
        increment_secs,
    }))
}

fn samples_from_json(key: &ChannelKey, values: &[Value]) -> Result<SampleArray> {
    let Some(first) = values.first() else {
        return Ok(SampleArray::Float64(Vec::new()));
    };
    let bad = |i: usize, v: &Value| {
        Error::InvalidData(format!("channel {key}: unsupported sample {i}: {v}"))
    };

    match first {
        Value::Bool(_) => values
            .iter()
            .enumerate()
            .map(|(i, v)| v.as_bool().ok_or_else(|| bad(i, v)))
            .collect::<Result<_>>()
            .map(SampleArray::Bool),
        Value::Object(_) => values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let re = v.get("re").and_then(Value::as_f64);
                let im = v.get("im").and_then(Value::as_f64);
                match (re, im) {
                    (Some(re), Some(im)) => Ok(Complex64 { re, im }),
                    _ => Err(bad(i, v)),
                }
            })
            .collect::<Result<_>>()
            .map(SampleArray::Complex),
        _ if values.iter().all(Value::is_i64) => values
            .iter()
            .enumerate()
            .map(|(i, v)| v.as_i64().ok_or_else(|| bad(i, v)))
            .collect::<Result<_>>()
            .map(SampleArray::Int64),
        _ if values.iter().all(Value::is_number) => values
            .iter()
            .enumerate()
            .map(|(i, v)| v.as_f64().ok_or_else(|| bad(i, v)))
            .collect::<Result<_>>()
            .map(SampleArray::Float64),
        _ => values
            .iter()
            .enumerate()
            .map(|(i, v)| match v {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(bad(i, other)),
            })
            .collect::<Result<_>>()
            .map(SampleArray::Text),
    }
}
