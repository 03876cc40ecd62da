use super::ChannelValue;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Values of the sources that currently have data, keyed by source label.
pub type SourceValues = BTreeMap<String, ChannelValue>;
/// Last-updated time of the same sources.
pub type SourceTimestamps = BTreeMap<String, DateTime<Utc>>;

/// Computes a mobile value from whichever sources have data. Returning
/// `None` leaves the mobile cache untouched.
pub type MobileTransform = fn(&SourceValues, &SourceTimestamps) -> Option<ChannelValue>;

/// Line voltage above which shore power counts as connected.
pub const SHORE_POWER_MIN_VOLTAGE: f64 = 50.0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingSource {
    pub label: String,
    pub device_key: String,
    pub channel_key: String,
}

impl MappingSource {
    pub fn new(label: &str, device_key: &str, channel_key: &str) -> Self {
        Self {
            label: label.to_string(),
            device_key: device_key.to_string(),
            channel_key: channel_key.to_string(),
        }
    }

    pub fn source_key(&self) -> String {
        super::source_key(&self.device_key, &self.channel_key)
    }
}

/// A derived value computed from one or more raw device channels.
#[derive(Clone, Debug)]
pub struct MobileChannelMapping {
    pub key: String,
    pub sources: Vec<MappingSource>,
    pub transform: MobileTransform,
}

impl MobileChannelMapping {
    pub fn new(key: &str, sources: Vec<MappingSource>, transform: MobileTransform) -> Self {
        Self {
            key: key.to_string(),
            sources,
            transform,
        }
    }
}

/// Label of the source updated most recently.
fn latest_label<'a>(values: &'a SourceValues, updated: &SourceTimestamps) -> Option<&'a str> {
    values
        .keys()
        .max_by_key(|label| updated.get(*label).copied())
        .map(String::as_str)
}

/// The value of the most recently updated source.
pub fn most_recent_valid(values: &SourceValues, updated: &SourceTimestamps) -> Option<ChannelValue> {
    let label = latest_label(values, updated)?;
    values.get(label).cloned()
}

/// Shore power is connected according to whichever indicator spoke last:
/// the BLS bit, the line voltage, or the charger's component status.
pub fn shore_power_connected(
    values: &SourceValues,
    updated: &SourceTimestamps,
) -> Option<ChannelValue> {
    let derived: SourceValues = values
        .iter()
        .filter_map(|(label, value)| {
            let connected = match label.as_str() {
                "voltage" => value.as_f64().map(|v| v > SHORE_POWER_MIN_VOLTAGE),
                "componentStatus" => match value {
                    ChannelValue::Text(s) => Some(s.eq_ignore_ascii_case("connected")),
                    other => other.as_bool(),
                },
                _ => value.as_bool(),
            }?;
            Some((label.clone(), ChannelValue::Bool(connected)))
        })
        .collect();

    most_recent_valid(&derived, updated)
}
