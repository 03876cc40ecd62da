use super::{json_kind, parse_object, ParseResult};
use crate::devices::{ChannelUpdate, ChannelValue, N2kDeviceType};
use crate::prelude::*;

use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct DeviceListEntry {
    id: String,
    #[serde(rename = "type")]
    device_type: String,
}

/// `[{id, type}, ...]` from the "list devices" call. Entries with a type we
/// don't model are skipped.
pub fn parse_device_list(json: &str) -> ParseResult<Vec<(String, N2kDeviceType)>> {
    let entries: Vec<DeviceListEntry> =
        serde_json::from_str(json).map_err(|e| ParseError::invalid_json("device list", e))?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry.device_type.parse::<N2kDeviceType>() {
            Ok(device_type) => Some((entry.id, device_type)),
            Err(e) => {
                warn!("skipping device {}: {}", entry.id, e);
                None
            }
        })
        .collect())
}

/// `{channel_key: value, ...}` for one device. `{Valid, Value}` wrappers
/// marked invalid are left out, as are values we can't represent.
pub fn parse_device_state(device_key: &str, json: &str) -> ParseResult<Vec<ChannelUpdate>> {
    let root = parse_object(json, "device state")?;

    Ok(root
        .iter()
        .filter_map(|(channel_key, raw)| {
            let value = channel_value(raw);
            if value.is_none() {
                debug!(
                    "{}: no usable value for {} ({})",
                    device_key,
                    channel_key,
                    json_kind(raw)
                );
            }
            value.map(|v| ChannelUpdate::new(device_key, channel_key, v))
        })
        .collect())
}

fn channel_value(raw: &Value) -> Option<ChannelValue> {
    match raw {
        Value::Bool(b) => Some(ChannelValue::Bool(*b)),
        Value::Number(n) => n.as_f64().map(ChannelValue::Number),
        Value::String(s) => Some(ChannelValue::Text(s.clone())),
        Value::Object(map) => {
            if let Some(valid) = map.get("Valid") {
                if valid.as_bool() != Some(true) {
                    return None;
                }
                return map.get("Value").and_then(channel_value);
            }
            match (
                map.get("Latitude").and_then(Value::as_f64),
                map.get("Longitude").and_then(Value::as_f64),
            ) {
                (Some(latitude), Some(longitude)) => Some(ChannelValue::Point {
                    latitude,
                    longitude,
                }),
                _ => None,
            }
        }
        Value::Null | Value::Array(_) => None,
    }
}
