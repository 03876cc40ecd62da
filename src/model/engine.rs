use super::enums::EngineType;
use super::fields::{de_lenient_enum, Instance};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineDevice {
    #[serde(default)]
    pub instance: Instance,
    #[serde(default, rename = "NameUTF8")]
    pub name_utf8: String,
    #[serde(default)]
    pub software_id: String,
    #[serde(default)]
    pub calibration_id: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default, rename = "ECUSerialNumber")]
    pub ecu_serial_number: String,
    #[serde(default, deserialize_with = "de_lenient_enum")]
    pub engine_type: Option<EngineType>,
}

/// Engines arrive on their own bus call, so this accumulates across parses
/// instead of being replaced.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EngineConfiguration {
    pub devices: BTreeMap<u32, EngineDevice>,
}

impl EngineConfiguration {
    pub fn find_by_name(&self, name: &str) -> Option<&EngineDevice> {
        self.devices.values().find(|e| e.name_utf8 == name)
    }
}
