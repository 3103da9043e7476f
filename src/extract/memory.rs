use crate::addressing::{SampleArray, TimeTrack};
use crate::error::{Error, Result};
use crate::extract::{ChannelKey, InstrumentReader, Properties};

/// One decoded channel
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    pub key: ChannelKey,
    pub samples: SampleArray,
    pub time: Option<TimeTrack>,
    pub properties: Properties,
}

impl MemoryChannel {
    pub fn new(group: impl Into<String>, channel: impl Into<String>, samples: SampleArray) -> Self {
        Self {
            key: ChannelKey::new(group, channel),
            samples,
            time: None,
            properties: Properties::new(),
        }
    }

    pub fn with_time(mut self, track: TimeTrack) -> Self {
        self.time = Some(track);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_unit(self, unit: impl Into<String>) -> Self {
        self.with_property("unit_string", unit)
    }
}

/// Reader over channels that are already in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    channels: Vec<MemoryChannel>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: MemoryChannel) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn push(&mut self, channel: MemoryChannel) {
        self.channels.push(channel);
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn get(&self, key: &ChannelKey) -> Result<&MemoryChannel> {
        self.channels
            .iter()
            .find(|c| &c.key == key)
            .ok_or_else(|| Error::InvalidData(format!("no channel {key} in file")))
    }
}

impl InstrumentReader for MemoryReader {
    fn channel_keys(&self) -> Vec<ChannelKey> {
        self.channels.iter().map(|c| c.key.clone()).collect()
    }

    fn read_samples(&self, key: &ChannelKey) -> Result<SampleArray> {
        Ok(self.get(key)?.samples.clone())
    }

    fn read_time_track(&self, key: &ChannelKey) -> Result<Option<TimeTrack>> {
        Ok(self.get(key)?.time.clone())
    }

    fn properties(&self, key: &ChannelKey) -> Result<Properties> {
        Ok(self.get(key)?.properties.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_order() {
        let reader = MemoryReader::new()
            .with_channel(MemoryChannel::new("g", "b", SampleArray::Float64(vec![1.0])))
            .with_channel(
                MemoryChannel::new("g", "a", SampleArray::Int64(vec![1, 2])).with_unit("A"),
            );

        let keys = reader.channel_keys();
        assert_eq!(keys, vec![ChannelKey::new("g", "b"), ChannelKey::new("g", "a")]);
        assert_eq!(reader.unit(&keys[1]).unwrap(), "A");
        assert_eq!(reader.unit(&keys[0]).unwrap(), "");
        assert_eq!(reader.read_samples(&keys[1]).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_key() {
        let reader = MemoryReader::new();
        assert!(reader.read_samples(&ChannelKey::new("x", "y")).is_err());
    }
}
