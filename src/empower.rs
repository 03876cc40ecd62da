//! The user-facing object model derived from the configuration: Things with
//! typed Channels, tied together by Links.

use crate::devices::{ChannelSource, FilterSpec, MobileChannelMapping};
use crate::prelude::*;

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

// ThingType {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ThingType {
    Hub,
    CombiInverter,
    CombiCharger,
    Battery,
    Gnss,
    ShorePower,
    AcMeterInverter,
    AcMeterCharger,
    FuelTank,
    WaterTank,
    WasteWaterTank,
    BlackWaterTank,
    Climate,
    Light,
    BilgePump,
    WaterPump,
    GenericCircuit,
    MarineEngine,
}

impl ThingType {
    pub fn as_str(&self) -> &'static str {
        use ThingType::*;
        match self {
            Hub => "hub",
            CombiInverter => "combiInverter",
            CombiCharger => "combiCharger",
            Battery => "battery",
            Gnss => "gnss",
            ShorePower => "shorePower",
            AcMeterInverter => "acMeterInverter",
            AcMeterCharger => "acMeterCharger",
            FuelTank => "fuelTank",
            WaterTank => "waterTank",
            WasteWaterTank => "wasteWaterTank",
            BlackWaterTank => "blackWaterTank",
            Climate => "climate",
            Light => "light",
            BilgePump => "bilgePump",
            WaterPump => "waterPump",
            GenericCircuit => "genericCircuit",
            MarineEngine => "marineEngine",
        }
    }

    pub fn thing_id(&self, instance: u32) -> String {
        format!("{}.{}", self.as_str(), instance)
    }
}

impl std::fmt::Display for ThingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
} // }}}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelType {
    String,
    Number,
    Boolean,
    Point,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Unit {
    Volt,
    Ampere,
    Percent,
    Celsius,
    Second,
    Hour,
    Hertz,
    Watt,
    Rpm,
    Pascal,
    Liter,
    AmpereHour,
    Decibel,
}

// Channel {{{
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    pub read_only: bool,
    pub tags: Vec<String>,
    #[serde(skip)]
    pub source: Option<ChannelSource>,
    #[serde(skip)]
    pub filter: FilterSpec,
}

impl Channel {
    /// `local_id` is made globally unique when the channel is added to a
    /// Thing.
    pub fn new(local_id: &str, name: &str, channel_type: ChannelType) -> Self {
        Self {
            id: local_id.to_string(),
            name: name.to_string(),
            channel_type,
            unit: None,
            read_only: true,
            tags: Vec::new(),
            source: None,
            filter: FilterSpec::NONE,
        }
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn writable(mut self) -> Self {
        self.read_only = false;
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn source(mut self, source: ChannelSource, filter: FilterSpec) -> Self {
        self.source = Some(source);
        self.filter = filter;
        self
    }
} // }}}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub target_thing_id: String,
    pub tags: Vec<String>,
}

impl Link {
    pub fn new(target_thing_id: &str, tag: &str) -> Self {
        Self {
            target_thing_id: target_thing_id.to_string(),
            tags: vec![tag.to_string()],
        }
    }
}

// Thing {{{
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Thing {
    pub id: String,
    #[serde(rename = "type")]
    pub thing_type: ThingType,
    pub name: String,
    pub metadata: BTreeMap<String, Value>,
    pub categories: Vec<String>,
    pub channels: BTreeMap<String, Channel>,
    pub links: Vec<Link>,
}

impl Thing {
    pub fn new(thing_type: ThingType, instance: u32, name: &str) -> Self {
        Self {
            id: thing_type.thing_id(instance),
            thing_type,
            name: name.to_string(),
            metadata: BTreeMap::new(),
            categories: Vec::new(),
            channels: BTreeMap::new(),
            links: Vec::new(),
        }
    }

    pub fn add_channel(&mut self, mut channel: Channel) {
        channel.id = format!("{}.{}", self.id, channel.id);
        self.channels.insert(channel.id.clone(), channel);
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.add_channel(channel);
        self
    }

    pub fn add_metadata(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn add_link(&mut self, link: Link) {
        if !self.links.contains(&link) {
            self.links.push(link);
        }
    }

    /// Looks a channel up by its local id (the part after the thing id).
    pub fn channel(&self, local_id: &str) -> Option<&Channel> {
        self.channels.get(&format!("{}.{}", self.id, local_id))
    }
} // }}}

/// The whole derived graph. Rebuilt from scratch on every config change.
#[derive(Clone, Debug, Default)]
pub struct EmpowerSystem {
    pub things: BTreeMap<String, Thing>,
    pub metadata: BTreeMap<String, Value>,
    pub mobile_mappings: Vec<MobileChannelMapping>,
}

impl EmpowerSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a thing, refusing duplicate thing or channel ids.
    pub fn add_thing(&mut self, thing: Thing) -> Result<()> {
        if self.things.contains_key(&thing.id) {
            bail!("duplicate thing id {}", thing.id);
        }
        if let Some(dup) = thing
            .channels
            .keys()
            .find(|id| self.things.values().any(|t| t.channels.contains_key(*id)))
        {
            bail!("duplicate channel id {}", dup);
        }
        self.things.insert(thing.id.clone(), thing);
        Ok(())
    }

    pub fn thing(&self, id: &str) -> Option<&Thing> {
        self.things.get(id)
    }

    pub fn thing_ids(&self) -> Vec<String> {
        self.things.keys().cloned().collect()
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.things.values().flat_map(|t| t.channels.values())
    }

    pub fn to_config_dict(&self) -> Value {
        let things: serde_json::Map<String, Value> = self
            .things
            .iter()
            .map(|(id, thing)| (id.clone(), serde_json::to_value(thing).unwrap_or(Value::Null)))
            .collect();

        json!({
            "things": things,
            "metadata": self.metadata,
        })
    }
}

/// Engines poll on their own bus channel, so they get their own list.
#[derive(Clone, Debug, Default)]
pub struct EngineList {
    pub engines: BTreeMap<String, Thing>,
}

impl EngineList {
    pub fn to_config_dict(&self) -> Value {
        json!({ "engines": self.engines })
    }
}
