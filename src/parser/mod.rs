//! Turns raw bus JSON payloads into the typed configuration model.
//!
//! Every section is parsed on its own; a missing section means "no entities
//! of that kind". Any malformed section or element fails the whole call so
//! that a half-parsed configuration is never published.

pub mod state;

use crate::prelude::*;
use crate::model::*;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub use state::{parse_device_list, parse_device_state};

type ParseResult<T> = std::result::Result<T, ParseError>;

pub fn parse_config(
    config_json: &str,
    categories_json: &str,
    config_metadata_json: &str,
) -> ParseResult<N2kConfiguration> {
    let root = parse_object(config_json, "config")?;
    let mut config = N2kConfiguration::default();

    for gnss in parse_section::<Gnss>(&root, "GNSS")? {
        if let Some(instance) = gnss.instance.enabled_instance() {
            config.gnss.insert(instance, gnss);
        }
    }

    for circuit in parse_section::<Circuit>(&root, "Circuits")? {
        let Some(id) = circuit.id.get() else {
            debug!("dropping circuit {:?} without a valid id", circuit.name_utf8);
            continue;
        };
        if circuit.non_visible_circuit {
            config.hidden_circuit.insert(id, circuit);
        } else {
            config.circuit.insert(circuit.control_id, circuit);
        }
    }

    for dc in parse_section::<Dc>(&root, "DCs")? {
        if let Some(instance) = dc.instance.enabled_instance() {
            config.dc.insert(instance, dc);
        }
    }

    for ac in parse_section::<Ac>(&root, "ACs")? {
        let Some(instance) = ac.instance.enabled_instance() else {
            continue;
        };
        let Some(line) = ac.line else {
            warn!("dropping AC instance {} record without a line", instance);
            continue;
        };
        config
            .ac
            .entry(instance)
            .or_default()
            .line
            .insert(line.number(), ac);
    }

    for tank in parse_section::<Tank>(&root, "Tanks")? {
        if let Some(instance) = tank.instance.enabled_instance() {
            config.tank.insert(instance, tank);
        }
    }

    for ic in parse_section::<InverterChargerDevice>(&root, "InverterChargers")? {
        match ic.instance() {
            Some(instance) => {
                config.inverter_charger.insert(instance, ic);
            }
            None => debug!("dropping inverter/charger {:?}: sub-instance disabled", ic.name_utf8),
        }
    }

    for device in parse_section::<Device>(&root, "Devices")? {
        config.device.insert(device.dipswitch, device);
    }

    for hvac in parse_section::<Hvac>(&root, "HVACs")? {
        if let Some(instance) = hvac.instance.enabled_instance() {
            config.hvac.insert(instance, hvac);
        }
    }

    for stereo in parse_section::<AudioStereo>(&root, "AudioStereos")? {
        if let Some(instance) = stereo.instance.enabled_instance() {
            config.audio_stereo.insert(instance, stereo);
        }
    }

    for bls in parse_section::<BinaryLogicState>(&root, "BinaryLogicStates")? {
        config.binary_logic_state.insert(bls.address, bls);
    }

    config.ui_relationships = parse_section::<UiRelationShipMsg>(&root, "UiRelationships")?;

    for pressure in parse_section::<Pressure>(&root, "Pressures")? {
        if let Some(instance) = pressure.instance.enabled_instance() {
            config.pressure.insert(instance, pressure);
        }
    }

    for mode in parse_section::<Mode>(&root, "Modes")? {
        if let Some(id) = mode.id.get() {
            config.mode.insert(id, mode);
        }
    }

    config.category = parse_categories(categories_json)?;
    config.config_metadata = parse_config_metadata(config_metadata_json)?;

    for bls in config.binary_logic_state.values() {
        if let Some(alarm_channel) = get_bls_alarm_channel(bls, &config.ui_relationships) {
            config.bls_alarm_mappings.insert(
                bls.address,
                BlsAlarmMapping {
                    alarm_channel,
                    binary_logic_state: bls.clone(),
                },
            );
        }
    }

    info!(
        "parsed config: {} circuits ({} hidden), {} dc, {} ac, {} tanks, {} inverter/chargers, {} relationships",
        config.circuit.len(),
        config.hidden_circuit.len(),
        config.dc.len(),
        config.ac.len(),
        config.tank.len(),
        config.inverter_charger.len(),
        config.ui_relationships.len()
    );

    Ok(config)
}

/// Merges newly reported engines into `existing`. Engines not mentioned in
/// this payload are kept.
pub fn parse_engine_configuration(
    json: &str,
    existing: &EngineConfiguration,
) -> ParseResult<EngineConfiguration> {
    let root = parse_object(json, "engines")?;
    let mut merged = existing.clone();

    for engine in parse_section::<EngineDevice>(&root, "Engines")? {
        if let Some(instance) = engine.instance.enabled_instance() {
            merged.devices.insert(instance, engine);
        }
    }

    Ok(merged)
}

pub fn parse_factory_metadata(json: &str) -> ParseResult<FactoryMetadata> {
    let root = parse_object(json, "factory")?;

    match root.get("FactoryDataSettings") {
        None | Some(Value::Null) => Ok(FactoryMetadata::default()),
        Some(settings) => serde_json::from_value(settings.clone())
            .map_err(|e| ParseError::invalid_section("FactoryDataSettings", e)),
    }
}

/// Alarm channel for a binary logic state: the config address high byte
/// plus the channel index low byte of the first relationship naming the BLS.
/// A match on the primary side wins over one on the secondary side.
pub fn get_bls_alarm_channel(
    bls: &BinaryLogicState,
    ui_relationships: &[UiRelationShipMsg],
) -> Option<u32> {
    let as_primary = ui_relationships.iter().find(|r| {
        r.primary_type == Some(ItemType::BinaryLogicState) && r.primary_id == bls.address
    });
    if let Some(r) = as_primary {
        return Some((r.primary_config_address & 0xFF00) + (r.primary_channel_index & 0xFF));
    }

    ui_relationships
        .iter()
        .find(|r| {
            r.secondary_type == Some(ItemType::BinaryLogicState) && r.secondary_id == bls.address
        })
        .map(|r| (r.secondary_config_address & 0xFF00) + (r.secondary_channel_index & 0xFF))
}

fn parse_categories(json: &str) -> ParseResult<Vec<CategoryItem>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let root = parse_object(json, "categories")?;
    parse_section::<CategoryItem>(&root, "Items")
}

fn parse_config_metadata(json: &str) -> ParseResult<Option<ConfigMetadata>> {
    if json.trim().is_empty() {
        return Ok(None);
    }
    let root = parse_object(json, "config metadata")?;
    serde_json::from_value(Value::Object(root))
        .map(Some)
        .map_err(|e| ParseError::invalid_section("config metadata", e))
}

pub(crate) fn parse_object(json: &str, section: &str) -> ParseResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ParseError::invalid_json(
            section,
            format!("expected an object, got {}", json_kind(&other)),
        )),
        Err(e) => Err(ParseError::invalid_json(section, e)),
    }
}

fn parse_section<T: DeserializeOwned>(
    root: &Map<String, Value>,
    key: &str,
) -> ParseResult<Vec<T>> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                T::deserialize(item)
                    .map_err(|e| ParseError::invalid_section(key, format!("element {}: {}", i, e)))
            })
            .collect(),
        Some(other) => Err(ParseError::invalid_section(
            key,
            format!("expected an array, got {}", json_kind(other)),
        )),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
