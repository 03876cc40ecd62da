//! Typed in-memory representation of the bus configuration.

pub mod engine;
pub mod entities;
pub mod enums;
pub mod factory;
pub mod fields;

pub use engine::{EngineConfiguration, EngineDevice};
pub use entities::*;
pub use enums::*;
pub use factory::FactoryMetadata;
pub use fields::{AlarmLimit, DataId, Instance, ValueU32};

use serde::Serialize;
use std::collections::BTreeMap;

/// Root aggregate produced by one successful parse. Replaced wholesale on
/// every re-parse; never mutated in place once published.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct N2kConfiguration {
    pub gnss: BTreeMap<u32, Gnss>,
    /// Visible circuits keyed by `control_id`.
    pub circuit: BTreeMap<u32, Circuit>,
    /// Internal circuits keyed by their own id.
    pub hidden_circuit: BTreeMap<u32, Circuit>,
    pub dc: BTreeMap<u32, Dc>,
    pub ac: BTreeMap<u32, AcMeter>,
    pub tank: BTreeMap<u32, Tank>,
    pub inverter_charger: BTreeMap<u32, InverterChargerDevice>,
    pub device: BTreeMap<u32, Device>,
    pub hvac: BTreeMap<u32, Hvac>,
    pub audio_stereo: BTreeMap<u32, AudioStereo>,
    pub binary_logic_state: BTreeMap<u32, BinaryLogicState>,
    pub pressure: BTreeMap<u32, Pressure>,
    pub mode: BTreeMap<u32, Mode>,
    pub ui_relationships: Vec<UiRelationShipMsg>,
    pub category: Vec<CategoryItem>,
    pub bls_alarm_mappings: BTreeMap<u32, BlsAlarmMapping>,
    pub config_metadata: Option<ConfigMetadata>,
}

impl N2kConfiguration {
    pub fn to_dict(&self) -> serde_json::Value {
        // every member is plain data with string-able keys
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Follows the hidden-circuit indirection: internal id -> `control_id` ->
    /// visible circuit.
    pub fn visible_circuit_for_hidden(&self, hidden_id: u32) -> Option<&Circuit> {
        let hidden = self.hidden_circuit.get(&hidden_id)?;
        self.circuit.get(&hidden.control_id)
    }

    /// Resolves a circuit id as found in relationships: a visible circuit
    /// with that id, else through the hidden-circuit indirection.
    pub fn circuit_by_id(&self, id: u32) -> Option<&Circuit> {
        self.circuit
            .values()
            .find(|c| c.id.get() == Some(id))
            .or_else(|| self.visible_circuit_for_hidden(id))
    }

    pub fn relationships_from(
        &self,
        primary: ItemType,
        primary_id: u32,
    ) -> impl Iterator<Item = &UiRelationShipMsg> {
        self.ui_relationships
            .iter()
            .filter(move |r| r.primary_type == Some(primary) && r.primary_id == primary_id)
    }

    pub fn relationships_to(
        &self,
        secondary: ItemType,
        secondary_id: u32,
    ) -> impl Iterator<Item = &UiRelationShipMsg> {
        self.ui_relationships
            .iter()
            .filter(move |r| r.secondary_type == Some(secondary) && r.secondary_id == secondary_id)
    }

    /// Enabled categories an entity belongs to, via `Category`-typed
    /// relationships whose `secondary_id` is a membership bitmask.
    pub fn categories_for(&self, item: ItemType, id: u32) -> Vec<&CategoryItem> {
        let mask = self
            .relationships_from(item, id)
            .filter(|r| r.secondary_type == Some(ItemType::Category))
            .fold(0u32, |mask, r| mask | r.secondary_id);

        self.category
            .iter()
            .filter(|c| c.enabled && c.in_mask(mask))
            .collect()
    }

    pub fn binary_logic_state_for(&self, item: ItemType, id: u32) -> Option<&BinaryLogicState> {
        self.relationships_from(item, id)
            .filter(|r| r.secondary_type == Some(ItemType::BinaryLogicState))
            .find_map(|r| self.binary_logic_state.get(&r.secondary_id))
    }

    pub fn ac_line(&self, instance: u32, line: u32) -> Option<&Ac> {
        self.ac.get(&instance)?.line.get(&line)
    }
}
