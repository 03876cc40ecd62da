use super::ConfigProcessor;
use crate::devices::mapping::{most_recent_valid, shore_power_connected};
use crate::devices::{
    device_key, ChannelSource, FilterSpec, MappingSource, MobileChannelMapping, MobileTransform,
    N2kDeviceType,
};
use crate::empower::*;
use crate::model::*;
use crate::prelude::*;

struct DcMetric {
    local_id: &'static str,
    name: &'static str,
    channel_key: &'static str,
    unit: Option<Unit>,
    filter: FilterSpec,
}

const DC_METRICS: [DcMetric; 5] = [
    DcMetric {
        local_id: "voltage",
        name: "Voltage",
        channel_key: "Voltage",
        unit: Some(Unit::Volt),
        filter: FilterSpec::instrument(1),
    },
    DcMetric {
        local_id: "current",
        name: "Current",
        channel_key: "Current",
        unit: Some(Unit::Ampere),
        filter: FilterSpec::instrument(1),
    },
    DcMetric {
        local_id: "stateOfCharge",
        name: "State of Charge",
        channel_key: "StateOfCharge",
        unit: Some(Unit::Percent),
        filter: FilterSpec::round(0),
    },
    DcMetric {
        local_id: "temperature",
        name: "Temperature",
        channel_key: "Temperature",
        unit: Some(Unit::Celsius),
        filter: FilterSpec::instrument(1),
    },
    DcMetric {
        local_id: "timeRemaining",
        name: "Time Remaining",
        channel_key: "TimeRemaining",
        unit: Some(Unit::Second),
        filter: FilterSpec::round(0),
    },
];

impl DcMetric {
    fn shown(&self, dc: &Dc) -> bool {
        match self.local_id {
            "voltage" => dc.show_voltage,
            "current" => dc.show_current,
            "stateOfCharge" => dc.show_state_of_charge,
            "temperature" => dc.show_temperature,
            "timeRemaining" => dc.show_time_of_remaining,
            _ => false,
        }
    }

    fn channel(&self, source: ChannelSource) -> Channel {
        let mut channel = Channel::new(self.local_id, self.name, ChannelType::Number)
            .tag(&format!("empower:battery.{}", self.local_id))
            .source(source, self.filter);
        channel.unit = self.unit;
        channel
    }
}

/// Per-line AC channels, `line{n}.voltage` and so on.
fn ac_line_channels(thing: &mut Thing, instance: u32, meter: &AcMeter, tag_prefix: &str) {
    for number in meter.line.keys() {
        let source = |metric: &str| {
            ChannelSource::device(
                N2kDeviceType::Ac,
                instance,
                &format!("Line{}.{}", number, metric),
            )
        };
        let local = |metric: &str| format!("line{}.{}", number, metric);

        thing.add_channel(
            Channel::new(&local("voltage"), &format!("Line {} Voltage", number), ChannelType::Number)
                .unit(Unit::Volt)
                .tag(&format!("{}.voltage", tag_prefix))
                .source(source("Voltage"), FilterSpec::instrument(0)),
        );
        thing.add_channel(
            Channel::new(&local("current"), &format!("Line {} Current", number), ChannelType::Number)
                .unit(Unit::Ampere)
                .tag(&format!("{}.current", tag_prefix))
                .source(source("Current"), FilterSpec::instrument(1)),
        );
        thing.add_channel(
            Channel::new(
                &local("frequency"),
                &format!("Line {} Frequency", number),
                ChannelType::Number,
            )
            .unit(Unit::Hertz)
            .tag(&format!("{}.frequency", tag_prefix))
            .source(source("Frequency"), FilterSpec::instrument(1)),
        );
        thing.add_channel(
            Channel::new(&local("power"), &format!("Line {} Power", number), ChannelType::Number)
                .unit(Unit::Watt)
                .tag(&format!("{}.power", tag_prefix))
                .source(source("Power"), FilterSpec::instrument(0)),
        );
    }
}

impl<'a> ConfigProcessor<'a> {
    // Inverter/chargers {{{
    pub(super) fn process_inverter_chargers(&mut self) -> Result<()> {
        let config = self.config;

        for (instance, ic) in &config.inverter_charger {
            let source =
                |channel: &str| ChannelSource::device(N2kDeviceType::InverterCharger, *instance, channel);

            // toggle circuits are only ever driven through the combi things
            for toggle in [&ic.inverter_toggle_circuit_id, &ic.charger_toggle_circuit_id] {
                if let Some(circuit) = toggle.get().and_then(|id| config.visible_circuit_for_hidden(id)) {
                    self.associated_circuit_instances.insert(circuit.control_id);
                }
            }

            // inverter side
            let mut inverter = Thing::new(ThingType::CombiInverter, *instance, &ic.name_utf8)
                .with_channel(
                    Channel::new("state", "Inverter State", ChannelType::String)
                        .tag("empower:inverter.state")
                        .source(source("InverterState"), FilterSpec::NONE),
                );
            if let Some(circuit) = ic
                .inverter_circuit_id
                .get()
                .and_then(|id| config.visible_circuit_for_hidden(id))
            {
                let channel = self.circuit_switch_channel(circuit, "empower:inverter.enabled");
                inverter.add_channel(channel);
            }
            if let Some(ac_instance) = ic.inverter_ac_id.get() {
                if let Some(meter) = config.ac.get(&ac_instance) {
                    ac_line_channels(&mut inverter, ac_instance, meter, "empower:inverter.ac");
                    inverter.add_metadata("acInstance", ac_instance);
                    self.ac_meter_inverter_instances.insert(ac_instance);
                }
            }
            inverter.categories = self.category_names(ItemType::InverterCharger, *instance);
            inverter.add_metadata("dipswitch", ic.dipswitch);
            inverter.add_metadata("channelIndex", ic.channel_index);

            // charger side
            let mut charger = Thing::new(ThingType::CombiCharger, *instance, &ic.name_utf8)
                .with_channel(
                    Channel::new("state", "Charger State", ChannelType::String)
                        .tag("empower:charger.state")
                        .source(source("ChargerState"), FilterSpec::NONE),
                )
                .with_channel(
                    Channel::new("componentStatus", "Component Status", ChannelType::String)
                        .tag("empower:charger.componentStatus")
                        .source(source("ComponentStatus"), FilterSpec::NONE),
                );
            if let Some(circuit) = ic
                .charger_circuit_id
                .get()
                .and_then(|id| config.visible_circuit_for_hidden(id))
            {
                let channel = self.circuit_switch_channel(circuit, "empower:charger.enabled");
                charger.add_channel(channel);
            }
            for (index, bank) in ic.battery_banks().enumerate() {
                if !config.dc.contains_key(&bank) {
                    continue;
                }
                let dc_source = |channel: &str| ChannelSource::device(N2kDeviceType::Dc, bank, channel);
                let n = index + 1;

                charger.add_channel(
                    Channel::new(
                        &format!("batteryBank{}.voltage", n),
                        &format!("Battery Bank {} Voltage", n),
                        ChannelType::Number,
                    )
                    .unit(Unit::Volt)
                    .tag("empower:charger.batteryVoltage")
                    .source(dc_source("Voltage"), FilterSpec::instrument(1)),
                );
                charger.add_channel(
                    Channel::new(
                        &format!("batteryBank{}.current", n),
                        &format!("Battery Bank {} Current", n),
                        ChannelType::Number,
                    )
                    .unit(Unit::Ampere)
                    .tag("empower:charger.batteryCurrent")
                    .source(dc_source("Current"), FilterSpec::instrument(1)),
                );
                self.dc_meter_charger_instances.insert(bank);
            }
            if let Some(ac_instance) = ic.charger_ac_id.get() {
                self.ic_component_status
                    .insert(ac_instance, source("ComponentStatus"));
                charger.add_metadata("acInstance", ac_instance);
            }
            charger.categories = inverter.categories.clone();
            charger.add_link(Link::new(&inverter.id, "empower:charger.inverter"));
            inverter.add_link(Link::new(&charger.id, "empower:inverter.charger"));

            self.system.add_thing(inverter)?;
            self.system.add_thing(charger)?;
        }

        Ok(())
    } // }}}

    // Batteries {{{
    pub(super) fn process_batteries(&mut self) -> Result<()> {
        let config = self.config;

        for (instance, dc) in &config.dc {
            if self.dc_meter_charger_instances.contains(instance) {
                debug!("DC {} belongs to a charger, no battery thing", instance);
                continue;
            }

            // this meter is the secondary of a Duplicates pair -> primary
            let primary = config
                .relationships_to(ItemType::DcMeter, *instance)
                .find(|r| {
                    r.primary_type == Some(ItemType::DcMeter)
                        && r.relationship_type == Some(RelationshipType::Duplicates)
                })
                .map(|r| r.primary_id)
                .filter(|id| config.dc.contains_key(id));
            let fallback = config
                .relationships_from(ItemType::DcMeter, *instance)
                .find(|r| {
                    r.secondary_type == Some(ItemType::DcMeter)
                        && r.relationship_type == Some(RelationshipType::Duplicates)
                })
                .map(|r| r.secondary_id)
                .filter(|id| config.dc.contains_key(id));

            let mut thing = Thing::new(ThingType::Battery, *instance, &dc.name_utf8);
            thing.add_channel(
                Channel::new("status", "Status", ChannelType::String)
                    .tag("empower:battery.status")
                    .source(
                        ChannelSource::device(N2kDeviceType::Dc, *instance, "Status"),
                        FilterSpec::NONE,
                    ),
            );

            for metric in DC_METRICS.iter().filter(|m| m.shown(dc)) {
                let own = ChannelSource::device(N2kDeviceType::Dc, *instance, metric.channel_key);

                if primary.is_none() && fallback.is_none() {
                    thing.add_channel(metric.channel(own));
                    continue;
                }

                let mobile_key = format!("{}.{}", thing.id, metric.local_id);
                let mut sources = vec![MappingSource::new(
                    "self",
                    &device_key(N2kDeviceType::Dc, *instance),
                    metric.channel_key,
                )];
                for (label, other) in [("primary", primary), ("fallback", fallback)] {
                    if let Some(other) = other {
                        sources.push(MappingSource::new(
                            label,
                            &device_key(N2kDeviceType::Dc, other),
                            metric.channel_key,
                        ));
                    }
                }
                self.system.mobile_mappings.push(MobileChannelMapping::new(
                    &mobile_key,
                    sources,
                    most_recent_valid as MobileTransform,
                ));
                thing.add_channel(metric.channel(ChannelSource::Mobile { key: mobile_key }));
            }

            if let Some(circuit) = config
                .relationships_from(ItemType::DcMeter, *instance)
                .filter(|r| {
                    r.secondary_type == Some(ItemType::Circuit)
                        && r.relationship_type == Some(RelationshipType::Normal)
                })
                .find_map(|r| config.circuit_by_id(r.secondary_id))
            {
                let channel = self.circuit_switch_channel(circuit, "empower:battery.enabled");
                thing.add_channel(channel);
            }

            if let Some(primary) = primary {
                thing.add_link(Link::new(
                    &ThingType::Battery.thing_id(primary),
                    "empower:battery.primary",
                ));
            }
            if let Some(fallback) = fallback {
                thing.add_link(Link::new(
                    &ThingType::Battery.thing_id(fallback),
                    "empower:battery.fallback",
                ));
            }

            thing.categories = self.category_names(ItemType::DcMeter, *instance);
            thing.add_metadata("capacity", dc.capacity);
            if let Some(battery_type) = dc.battery_type {
                thing.add_metadata("batteryType", format!("{:?}", battery_type));
            }

            self.system.add_thing(thing)?;
        }

        Ok(())
    } // }}}

    // AC meters {{{
    pub(super) fn process_ac_meters(&mut self) -> Result<()> {
        let config = self.config;

        for (instance, meter) in &config.ac {
            if self.ac_meter_inverter_instances.contains(instance) {
                continue;
            }
            let Some(line1) = meter.line1() else {
                debug!("AC {} has no line 1, skipping", instance);
                continue;
            };

            let mut thing = match line1.ac_type {
                Some(AcType::ShorePower) => self.shore_power(*instance, meter, line1),
                Some(AcType::Inverter) => {
                    let mut thing = Thing::new(ThingType::AcMeterInverter, *instance, &line1.name_utf8);
                    ac_line_channels(&mut thing, *instance, meter, "empower:acMeter");
                    thing
                }
                Some(AcType::Charger) => {
                    let mut thing = Thing::new(ThingType::AcMeterCharger, *instance, &line1.name_utf8);
                    ac_line_channels(&mut thing, *instance, meter, "empower:acMeter");
                    thing
                }
                other => {
                    debug!("AC {}: type {:?} is not surfaced", instance, other);
                    continue;
                }
            };

            thing.categories = self.category_names(ItemType::AcMeter, *instance);
            thing.add_metadata("nominalVoltage", line1.nominal_voltage);
            thing.add_metadata("nominalFrequency", line1.nominal_frequency);
            thing.add_metadata("lineCount", meter.line.len());

            self.system.add_thing(thing)?;
        }

        Ok(())
    }

    fn shore_power(&mut self, instance: u32, meter: &AcMeter, line1: &Ac) -> Thing {
        let mut thing = Thing::new(ThingType::ShorePower, instance, &line1.name_utf8);
        ac_line_channels(&mut thing, instance, meter, "empower:shorePower");

        let mobile_key = format!("{}.connected", thing.id);
        let mut sources = vec![MappingSource::new(
            "voltage",
            &device_key(N2kDeviceType::Ac, instance),
            &format!("Line{}.Voltage", AcLine::Line1.number()),
        )];

        if let Some(bls) = self
            .config
            .binary_logic_state_for(ItemType::AcMeter, instance)
        {
            sources.push(MappingSource::new(
                "bls",
                &device_key(N2kDeviceType::BinaryLogicState, bls.address),
                "State",
            ));
            thing.add_metadata("binaryLogicState", bls.address);
        }

        if let Some(ChannelSource::Device {
            device_key,
            channel_key,
        }) = self.ic_component_status.get(&instance)
        {
            sources.push(MappingSource::new("componentStatus", device_key, channel_key));
        }

        self.system.mobile_mappings.push(MobileChannelMapping::new(
            &mobile_key,
            sources,
            shore_power_connected as MobileTransform,
        ));
        thing.add_channel(
            Channel::new("connected", "Connected", ChannelType::Boolean)
                .tag("empower:shorePower.connected")
                .source(ChannelSource::Mobile { key: mobile_key }, FilterSpec::NONE),
        );

        thing
    } // }}}
}
