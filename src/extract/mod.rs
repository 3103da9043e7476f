//! Access to decoded instrument files.
//!
//! Ingestion only needs an iterator over `(group, channel)` keys and, per
//! key, the sample array, an optional time track and the channel's property
//! map. Readers for concrete file representations implement
//! [`InstrumentReader`]:
//!
//! - `memory`: channels already decoded in memory
//! - `json`: JSON export of an instrument file

pub mod json;
pub mod memory;

use crate::addressing::{SampleArray, TimeTrack};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub use self::json::JsonReader;
pub use self::memory::{MemoryChannel, MemoryReader};

/// Property keys carrying a channel's unit, in lookup order
pub const UNIT_PROPERTY_KEYS: [&str; 2] = ["NI_UnitDescription", "unit_string"];

/// Channel properties as string key/value pairs
pub type Properties = HashMap<String, String>;

/// Identifies one channel inside a file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelKey {
    pub group: String,
    pub channel: String,
}

impl ChannelKey {
    pub fn new(group: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            channel: channel.into(),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.channel)
    }
}

/// Source of channel data for ingestion
pub trait InstrumentReader: Send + Sync {
    /// Every channel in file order
    fn channel_keys(&self) -> Vec<ChannelKey>;

    fn read_samples(&self, key: &ChannelKey) -> Result<SampleArray>;

    fn read_time_track(&self, key: &ChannelKey) -> Result<Option<TimeTrack>>;

    fn properties(&self, key: &ChannelKey) -> Result<Properties>;

    /// Unit from the channel properties, empty when none is recorded
    fn unit(&self, key: &ChannelKey) -> Result<String> {
        Ok(unit_for(&self.properties(key)?))
    }
}

/// Look up the unit under the known property keys.
pub fn unit_for(props: &Properties) -> String {
    UNIT_PROPERTY_KEYS
        .iter()
        .filter_map(|k| props.get(*k))
        .find(|v| !v.is_empty())
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_lookup_order() {
        let mut props = Properties::new();
        assert_eq!(unit_for(&props), "");

        props.insert("unit_string".into(), "V".into());
        assert_eq!(unit_for(&props), "V");

        props.insert("NI_UnitDescription".into(), "Volts".into());
        assert_eq!(unit_for(&props), "Volts");

        props.insert("NI_UnitDescription".into(), String::new());
        assert_eq!(unit_for(&props), "V");
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ChannelKey::new("Group 1", "Voltage").to_string(), "Group 1/Voltage");
    }
}
