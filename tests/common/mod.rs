#![allow(dead_code)]

use n2k_gateway::bus::BusTransport;
use n2k_gateway::model::N2kConfiguration;
use n2k_gateway::parser;
use n2k_gateway::prelude::*;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

pub fn instance(n: u32) -> Value {
    json!({ "Enabled": true, "Instance": n })
}

pub fn disabled_instance(n: u32) -> Value {
    json!({ "Enabled": false, "Instance": n })
}

pub fn valid(n: u32) -> Value {
    json!({ "Valid": true, "Value": n })
}

pub fn data_id(id: u32) -> Value {
    json!({ "Enabled": true, "Id": id })
}

pub fn alarm_limit(id: u32) -> Value {
    json!({ "Enabled": true, "On": 10.0, "Off": 11.0, "Id": id })
}

/// `{Items: [...]}` with each name at the given bit index, all enabled.
pub fn categories(items: &[(&str, u32)]) -> String {
    let items: Vec<Value> = items
        .iter()
        .map(|(name, index)| json!({ "NameUTF8": name, "Enabled": true, "Index": index }))
        .collect();
    json!({ "Items": items }).to_string()
}

pub fn standard_categories() -> String {
    categories(&[
        ("Lighting", 0),
        ("Bilge Pumps", 1),
        ("Water Pumps", 2),
        ("Power", 3),
    ])
}

pub fn circuit(id: u32, control_id: u32, name: &str) -> Value {
    json!({
        "Id": valid(id),
        "NameUTF8": name,
        "ControlId": control_id,
        "Dimmable": false,
        "SwitchType": 3,
    })
}

pub fn hidden_circuit(id: u32, control_id: u32) -> Value {
    json!({
        "Id": valid(id),
        "NameUTF8": format!("hidden {}", id),
        "ControlId": control_id,
        "NonVisibleCircuit": true,
    })
}

/// Relationship putting a circuit into categories by bitmask.
pub fn in_categories(item_type: u32, id: u32, mask: u32) -> Value {
    json!({
        "PrimaryType": item_type,
        "SecondaryType": 7,
        "PrimaryId": id,
        "SecondaryId": mask,
        "RelationshipType": 0,
    })
}

pub fn relationship(
    primary_type: u32,
    primary_id: u32,
    secondary_type: u32,
    secondary_id: u32,
    relationship_type: u32,
) -> Value {
    json!({
        "PrimaryType": primary_type,
        "SecondaryType": secondary_type,
        "PrimaryId": primary_id,
        "SecondaryId": secondary_id,
        "RelationshipType": relationship_type,
    })
}

pub fn parse(config: Value, categories: &str) -> N2kConfiguration {
    parser::parse_config(&config.to_string(), categories, "").unwrap()
}

// ScriptedBus {{{
/// In-memory bus answering from a table of canned payloads. Missing
/// entries are transport failures.
#[derive(Default)]
pub struct ScriptedBus {
    responses: Mutex<HashMap<String, String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, endpoint: &str, body: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), body.into());
    }

    pub fn remove(&self, endpoint: &str) {
        self.responses.lock().unwrap().remove(endpoint);
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    fn answer(&self, endpoint: &str) -> Result<String> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default() += 1;

        self.responses
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| anyhow!("no response scripted for {}", endpoint))
    }
}

#[async_trait]
impl BusTransport for ScriptedBus {
    async fn factory_metadata(&self) -> Result<String> {
        self.answer("factory")
    }

    async fn config(&self) -> Result<String> {
        self.answer("config")
    }

    async fn categories(&self) -> Result<String> {
        self.answer("config/categories")
    }

    async fn config_metadata(&self) -> Result<String> {
        self.answer("config/metadata")
    }

    async fn engine_config(&self) -> Result<String> {
        self.answer("config/engines")
    }

    async fn list_devices(&self) -> Result<String> {
        self.answer("devices")
    }

    async fn device_state(&self, device_id: &str) -> Result<String> {
        self.answer(&format!("devices/{}/state", device_id))
    }
} // }}}

/// Waits up to a second for `check` to hold, polling every 10ms.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    check()
}
