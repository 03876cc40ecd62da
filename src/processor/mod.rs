//! Builds the [`EmpowerSystem`] from a parsed configuration.
//!
//! Steps run in a fixed order and later steps consult what earlier ones
//! claimed, so an entity playing several roles (an AC line that is really
//! an inverter output, a DC bank owned by a charger, a pump circuit behind a
//! tank) only ever becomes one Thing.

mod circuits;
mod power;
mod tanks;

use crate::devices::{ChannelSource, FilterSpec, N2kDeviceType, N2kDevices};
use crate::empower::*;
use crate::model::*;
use crate::prelude::*;

use std::collections::{BTreeMap, BTreeSet};

pub use circuits::classify_circuit;

const EMPOWER_GROUP: &str = "empower";
const ENGINE_GROUP: &str = "engines";

/// Builds the whole graph, then binds its channels into `devices`. On error
/// nothing is bound and the caller keeps its previous system.
pub fn build_empower_system(
    config: &N2kConfiguration,
    devices: &N2kDevices,
) -> Result<EmpowerSystem> {
    let system = ConfigProcessor::new(config).run()?;

    for stale in devices.mobile_mapping_keys() {
        if !system.mobile_mappings.iter().any(|m| m.key == stale) {
            devices.remove_mobile_channel_mapping(&stale);
        }
    }
    devices.bind_channels(
        EMPOWER_GROUP,
        system
            .channels()
            .filter_map(|c| c.source.as_ref().map(|s| (c.id.as_str(), s, c.filter))),
    );
    for mapping in &system.mobile_mappings {
        devices.add_mobile_channel_mapping(mapping.clone());
    }

    info!(
        "built empower system: {} things, {} mobile mappings",
        system.things.len(),
        system.mobile_mappings.len()
    );

    Ok(system)
}

/// One `MarineEngine` Thing per engine device.
pub fn build_engine_list(config: &EngineConfiguration, devices: &N2kDevices) -> Result<EngineList> {
    let mut list = EngineList::default();

    for (instance, engine) in &config.devices {
        let source = |channel: &str| ChannelSource::device(N2kDeviceType::Engine, *instance, channel);

        let mut thing = Thing::new(ThingType::MarineEngine, *instance, &engine.name_utf8)
            .with_channel(
                Channel::new("speed", "Speed", ChannelType::Number)
                    .unit(Unit::Rpm)
                    .tag("empower:marineEngine.speed")
                    .source(source("Speed"), FilterSpec::instrument(0)),
            )
            .with_channel(
                Channel::new("coolantTemperature", "Coolant Temperature", ChannelType::Number)
                    .unit(Unit::Celsius)
                    .tag("empower:marineEngine.coolantTemperature")
                    .source(source("CoolantTemperature"), FilterSpec::instrument(1)),
            )
            .with_channel(
                Channel::new("oilPressure", "Oil Pressure", ChannelType::Number)
                    .unit(Unit::Pascal)
                    .tag("empower:marineEngine.oilPressure")
                    .source(source("OilPressure"), FilterSpec::instrument(0)),
            )
            .with_channel(
                Channel::new("engineHours", "Engine Hours", ChannelType::Number)
                    .unit(Unit::Hour)
                    .tag("empower:marineEngine.engineHours")
                    .source(source("EngineHours"), FilterSpec::round(1)),
            )
            .with_channel(
                Channel::new("status", "Status", ChannelType::String)
                    .tag("empower:marineEngine.status")
                    .source(source("Status"), FilterSpec::NONE),
            );

        thing.add_metadata("serialNumber", engine.serial_number.clone());
        thing.add_metadata("softwareId", engine.software_id.clone());
        if let Some(engine_type) = engine.engine_type {
            thing.add_metadata("engineType", format!("{:?}", engine_type));
        }

        if list.engines.insert(thing.id.clone(), thing).is_some() {
            bail!("duplicate engine instance {}", instance);
        }
    }

    devices.bind_channels(
        ENGINE_GROUP,
        list.engines
            .values()
            .flat_map(|t| t.channels.values())
            .filter_map(|c| c.source.as_ref().map(|s| (c.id.as_str(), s, c.filter))),
    );

    Ok(list)
}

pub(crate) struct ConfigProcessor<'a> {
    config: &'a N2kConfiguration,
    system: EmpowerSystem,
    ac_meter_inverter_instances: BTreeSet<u32>,
    dc_meter_charger_instances: BTreeSet<u32>,
    associated_circuit_instances: BTreeSet<u32>,
    // charger component-status source per AC instance, for shore power
    ic_component_status: BTreeMap<u32, ChannelSource>,
}

impl<'a> ConfigProcessor<'a> {
    pub(crate) fn new(config: &'a N2kConfiguration) -> Self {
        Self {
            config,
            system: EmpowerSystem::new(),
            ac_meter_inverter_instances: BTreeSet::new(),
            dc_meter_charger_instances: BTreeSet::new(),
            associated_circuit_instances: BTreeSet::new(),
            ic_component_status: BTreeMap::new(),
        }
    }

    pub(crate) fn run(mut self) -> Result<EmpowerSystem> {
        self.process_devices()?;
        self.process_inverter_chargers()?;
        self.process_batteries()?;
        self.process_gnss()?;
        self.process_ac_meters()?;
        self.process_tanks()?;
        self.process_hvacs()?;
        self.process_circuits()?;
        self.prune_dangling_links();

        if let Some(metadata) = &self.config.config_metadata {
            self.system.metadata.insert("configId".into(), metadata.id.into());
            self.system
                .metadata
                .insert("configName".into(), metadata.config_name.clone().into());
            self.system
                .metadata
                .insert("configVersion".into(), metadata.version.into());
        }

        Ok(self.system)
    }

    // a link may name a thing a later step claimed under another type, or
    // never built at all
    fn prune_dangling_links(&mut self) {
        let ids: BTreeSet<String> = self.system.things.keys().cloned().collect();
        for Thing { id, links, .. } in self.system.things.values_mut() {
            links.retain(|link| {
                let keep = ids.contains(&link.target_thing_id);
                if !keep {
                    debug!("{}: dropping link to missing {}", id, link.target_thing_id);
                }
                keep
            });
        }
    }

    fn process_devices(&mut self) -> Result<()> {
        for (dipswitch, device) in &self.config.device {
            let source = |channel: &str| ChannelSource::device(N2kDeviceType::Device, *dipswitch, channel);

            let mut thing = Thing::new(ThingType::Hub, *dipswitch, &device.name_utf8)
                .with_channel(
                    Channel::new("connected", "Connected", ChannelType::Boolean)
                        .tag("empower:hub.connected")
                        .source(source("Connected"), FilterSpec::NONE),
                )
                .with_channel(
                    Channel::new("signalStrength", "Signal Strength", ChannelType::Number)
                        .unit(Unit::Decibel)
                        .tag("empower:hub.signalStrength")
                        .source(source("SignalStrength"), FilterSpec::round(0)),
                );
            thing.add_metadata("sourceAddress", device.source_address);
            if let Some(device_type) = device.device_type {
                thing.add_metadata("deviceType", format!("{:?}", device_type));
            }

            self.system.add_thing(thing)?;
        }

        Ok(())
    }

    fn process_gnss(&mut self) -> Result<()> {
        for (instance, gnss) in &self.config.gnss {
            let source = |channel: &str| ChannelSource::device(N2kDeviceType::Gnss, *instance, channel);

            let mut thing = Thing::new(ThingType::Gnss, *instance, &gnss.name_utf8)
                .with_channel(
                    Channel::new("position", "Position", ChannelType::Point)
                        .tag("empower:location.position")
                        .source(source("Position"), FilterSpec::round(6)),
                )
                .with_channel(
                    Channel::new("fixType", "Fix Type", ChannelType::String)
                        .tag("empower:location.fixType")
                        .source(source("FixType"), FilterSpec::NONE),
                )
                .with_channel(
                    Channel::new("speedOverGround", "Speed Over Ground", ChannelType::Number)
                        .tag("empower:location.speedOverGround")
                        .source(source("Sog"), FilterSpec::instrument(1)),
                );
            thing.add_metadata("isExternal", gnss.is_external);

            self.system.add_thing(thing)?;
        }

        Ok(())
    }

    fn process_hvacs(&mut self) -> Result<()> {
        for (instance, hvac) in &self.config.hvac {
            let source = |channel: &str| ChannelSource::device(N2kDeviceType::Hvac, *instance, channel);

            let mut thing = Thing::new(ThingType::Climate, *instance, &hvac.name_utf8)
                .with_channel(
                    Channel::new("mode", "Mode", ChannelType::String)
                        .writable()
                        .tag("empower:climate.mode")
                        .source(source("OperatingMode"), FilterSpec::NONE),
                )
                .with_channel(
                    Channel::new("fanMode", "Fan Mode", ChannelType::String)
                        .writable()
                        .tag("empower:climate.fanMode")
                        .source(source("FanMode"), FilterSpec::NONE),
                )
                .with_channel(
                    Channel::new("fanSpeed", "Fan Speed", ChannelType::Number)
                        .writable()
                        .tag("empower:climate.fanSpeed")
                        .source(source("FanSpeed"), FilterSpec::round(0)),
                )
                .with_channel(
                    Channel::new("setPoint", "Set Point", ChannelType::Number)
                        .unit(Unit::Celsius)
                        .writable()
                        .tag("empower:climate.setPoint")
                        .source(source("SetPoint"), FilterSpec::round(1)),
                )
                .with_channel(
                    Channel::new("ambientTemperature", "Ambient Temperature", ChannelType::Number)
                        .unit(Unit::Celsius)
                        .tag("empower:climate.ambientTemperature")
                        .source(source("AmbientTemperature"), FilterSpec::instrument(1)),
                );
            thing.add_metadata("fanSpeedCount", hvac.fan_speed_count);
            thing.add_metadata("setPointMin", hvac.setpoint_temperature_min);
            thing.add_metadata("setPointMax", hvac.setpoint_temperature_max);

            self.system.add_thing(thing)?;
        }

        Ok(())
    }

    fn category_names(&self, item: ItemType, id: u32) -> Vec<String> {
        self.config
            .categories_for(item, id)
            .into_iter()
            .map(|c| c.name_utf8.clone())
            .collect()
    }

    /// An "enabled" switch channel driven by a circuit; the circuit is then
    /// claimed so it does not also become a Thing of its own.
    fn circuit_switch_channel(&mut self, circuit: &Circuit, tag: &str) -> Channel {
        self.associated_circuit_instances.insert(circuit.control_id);

        Channel::new("enabled", "Enabled", ChannelType::Boolean)
            .writable()
            .tag(tag)
            .source(
                ChannelSource::device(N2kDeviceType::Circuit, circuit.control_id, "On"),
                FilterSpec::NONE,
            )
    }
}
