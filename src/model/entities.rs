use super::enums::*;
use super::fields::{de_lenient_enum, AlarmLimit, DataId, Instance, ValueU32};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_remote_visibility() -> u32 {
    1
}

// Circuit {{{
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CircuitLoad {
    #[serde(default)]
    pub channel_address: u32,
    #[serde(default)]
    pub fuse_level: f64,
    #[serde(default)]
    pub running_current: f64,
    #[serde(default)]
    pub systems_on_current: f64,
    #[serde(default)]
    pub level: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Circuit {
    #[serde(default)]
    pub id: ValueU32,
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
    #[serde(default)]
    pub control_id: u32,
    #[serde(default)]
    pub non_visible_circuit: bool,
    #[serde(default = "default_remote_visibility")]
    pub remote_visibility: u32,
    #[serde(default)]
    pub dimmable: bool,
    #[serde(default, deserialize_with = "de_lenient_enum")]
    pub switch_type: Option<SwitchType>,
    #[serde(default, deserialize_with = "de_lenient_enum")]
    pub circuit_type: Option<CircuitType>,
    #[serde(default)]
    pub min_level: u32,
    #[serde(default)]
    pub max_level: u32,
    #[serde(default)]
    pub circuit_loads: Vec<CircuitLoad>,
}

impl Circuit {
    pub fn is_remote_visible(&self) -> bool {
        self.remote_visibility != 0
    }
} // }}}

// DC {{{
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dc {
    #[serde(default)]
    pub instance: Instance,
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
    #[serde(default)]
    pub address: u32,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default, deserialize_with = "de_lenient_enum")]
    pub battery_type: Option<BatteryType>,
    #[serde(default)]
    pub show_voltage: bool,
    #[serde(default)]
    pub show_current: bool,
    #[serde(default)]
    pub show_state_of_charge: bool,
    #[serde(default)]
    pub show_temperature: bool,
    #[serde(default)]
    pub show_time_of_remaining: bool,
    #[serde(default)]
    pub very_low_limit: AlarmLimit,
    #[serde(default)]
    pub low_limit: AlarmLimit,
    #[serde(default)]
    pub high_limit: AlarmLimit,
    #[serde(default)]
    pub very_high_limit: AlarmLimit,
}

impl Dc {
    pub fn alarm_limits(&self) -> [&AlarmLimit; 4] {
        [
            &self.very_low_limit,
            &self.low_limit,
            &self.high_limit,
            &self.very_high_limit,
        ]
    }
} // }}}

// AC {{{
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ac {
    #[serde(default)]
    pub instance: Instance,
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
    #[serde(default, deserialize_with = "de_lenient_enum")]
    pub line: Option<AcLine>,
    #[serde(default)]
    pub address: u32,
    #[serde(default, deserialize_with = "de_lenient_enum")]
    pub ac_type: Option<AcType>,
    #[serde(default)]
    pub nominal_voltage: f64,
    #[serde(default)]
    pub nominal_frequency: f64,
    #[serde(default)]
    pub output: bool,
    #[serde(default)]
    pub low_voltage: AlarmLimit,
    #[serde(default)]
    pub very_low_voltage: AlarmLimit,
    #[serde(default)]
    pub high_voltage: AlarmLimit,
    #[serde(default)]
    pub very_high_voltage: AlarmLimit,
    #[serde(default)]
    pub high_current: AlarmLimit,
    #[serde(default)]
    pub very_high_current: AlarmLimit,
    #[serde(default)]
    pub low_frequency: AlarmLimit,
    #[serde(default)]
    pub high_frequency: AlarmLimit,
}

impl Ac {
    pub fn alarm_limits(&self) -> [&AlarmLimit; 8] {
        [
            &self.low_voltage,
            &self.very_low_voltage,
            &self.high_voltage,
            &self.very_high_voltage,
            &self.high_current,
            &self.very_high_current,
            &self.low_frequency,
            &self.high_frequency,
        ]
    }
}

/// One physical AC meter: up to three line records sharing an instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AcMeter {
    pub line: BTreeMap<u32, Ac>,
}

impl AcMeter {
    pub fn line1(&self) -> Option<&Ac> {
        self.line.get(&AcLine::Line1.number())
    }

    /// Line 1 if present, else the lowest line we have.
    pub fn primary_line(&self) -> Option<&Ac> {
        self.line1().or_else(|| self.line.values().next())
    }
} // }}}

// Tank {{{
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tank {
    #[serde(default)]
    pub instance: Instance,
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
    #[serde(default)]
    pub address: u32,
    #[serde(default, deserialize_with = "de_lenient_enum")]
    pub tank_type: Option<TankType>,
    #[serde(default)]
    pub tank_capacity: f64,
    #[serde(default)]
    pub very_low_limit: AlarmLimit,
    #[serde(default)]
    pub low_limit: AlarmLimit,
    #[serde(default)]
    pub high_limit: AlarmLimit,
    #[serde(default)]
    pub very_high_limit: AlarmLimit,
}

impl Tank {
    pub fn alarm_limits(&self) -> [&AlarmLimit; 4] {
        [
            &self.very_low_limit,
            &self.low_limit,
            &self.high_limit,
            &self.very_high_limit,
        ]
    }
} // }}}

// InverterCharger {{{
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InverterChargerDevice {
    #[serde(default)]
    pub inverter_instance: Instance,
    #[serde(default)]
    pub charger_instance: Instance,
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
    #[serde(default)]
    pub model: u32,
    #[serde(default)]
    pub inverter_ac_id: DataId,
    #[serde(default)]
    pub inverter_circuit_id: DataId,
    #[serde(default)]
    pub inverter_toggle_circuit_id: DataId,
    #[serde(default)]
    pub charger_ac_id: DataId,
    #[serde(default)]
    pub charger_circuit_id: DataId,
    #[serde(default)]
    pub charger_toggle_circuit_id: DataId,
    #[serde(default)]
    pub battery_bank1_id: DataId,
    #[serde(default)]
    pub battery_bank2_id: DataId,
    #[serde(default)]
    pub battery_bank3_id: DataId,
    #[serde(default)]
    pub dipswitch: u32,
    #[serde(default)]
    pub channel_index: u32,
}

impl InverterChargerDevice {
    /// Synthesized map key: `(inverter << 8) | charger`, only when both
    /// sub-instances are enabled.
    pub fn instance(&self) -> Option<u32> {
        calculate_inverter_charger_instance(&self.inverter_instance, &self.charger_instance)
    }

    pub fn battery_banks(&self) -> impl Iterator<Item = u32> + '_ {
        [
            &self.battery_bank1_id,
            &self.battery_bank2_id,
            &self.battery_bank3_id,
        ]
        .into_iter()
        .filter_map(DataId::get)
    }
}

pub fn calculate_inverter_charger_instance(inverter: &Instance, charger: &Instance) -> Option<u32> {
    let inverter = inverter.enabled_instance()?;
    let charger = charger.enabled_instance()?;
    Some((inverter << 8) | charger)
} // }}}

// Device {{{
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Device {
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
    #[serde(default, deserialize_with = "de_lenient_enum")]
    pub device_type: Option<DeviceType>,
    #[serde(default)]
    pub dipswitch: u32,
    #[serde(default)]
    pub source_address: u32,
    #[serde(default)]
    pub instance_number: u32,
} // }}}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Gnss {
    #[serde(default)]
    pub instance: Instance,
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
    #[serde(default)]
    pub is_external: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Hvac {
    #[serde(default)]
    pub instance: Instance,
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
    #[serde(default)]
    pub operating_mode_id: DataId,
    #[serde(default)]
    pub fan_mode_id: DataId,
    #[serde(default)]
    pub fan_speed_id: DataId,
    #[serde(default)]
    pub setpoint_temperature_id: DataId,
    #[serde(default)]
    pub temperature_monitoring_id: DataId,
    #[serde(default)]
    pub fan_speed_count: u32,
    #[serde(default)]
    pub setpoint_temperature_min: f64,
    #[serde(default)]
    pub setpoint_temperature_max: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AudioStereo {
    #[serde(default)]
    pub instance: Instance,
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
    #[serde(default)]
    pub mute_enabled: bool,
    #[serde(default)]
    pub circuit_ids: Vec<DataId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Pressure {
    #[serde(default)]
    pub instance: Instance,
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
    #[serde(default, deserialize_with = "de_lenient_enum")]
    pub pressure_type: Option<PressureType>,
    #[serde(default)]
    pub address: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mode {
    #[serde(default)]
    pub id: ValueU32,
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
    #[serde(default)]
    pub bit_index: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BinaryLogicState {
    #[serde(default)]
    pub address: u32,
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
}

// UiRelationShipMsg {{{
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UiRelationShipMsg {
    #[serde(default, deserialize_with = "de_lenient_enum")]
    pub primary_type: Option<ItemType>,
    #[serde(default, deserialize_with = "de_lenient_enum")]
    pub secondary_type: Option<ItemType>,
    #[serde(default)]
    pub primary_id: u32,
    #[serde(default)]
    pub secondary_id: u32,
    #[serde(default, deserialize_with = "de_lenient_enum")]
    pub relationship_type: Option<RelationshipType>,
    #[serde(default)]
    pub primary_config_address: u32,
    #[serde(default)]
    pub secondary_config_address: u32,
    #[serde(default)]
    pub primary_channel_index: u32,
    #[serde(default)]
    pub secondary_channel_index: u32,
}

impl UiRelationShipMsg {
    pub fn links(
        &self,
        primary: ItemType,
        secondary: ItemType,
        relationship: RelationshipType,
    ) -> bool {
        self.primary_type == Some(primary)
            && self.secondary_type == Some(secondary)
            && self.relationship_type == Some(relationship)
    }
} // }}}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CategoryItem {
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub index: u32,
}

impl CategoryItem {
    /// Is this category's bit set in a relationship membership mask?
    pub fn in_mask(&self, mask: u32) -> bool {
        self.index < 32 && mask & (1 << self.index) != 0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BlsAlarmMapping {
    pub alarm_channel: u32,
    pub binary_logic_state: BinaryLogicState,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigMetadata {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub config_name: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub timestamp: String,
}
