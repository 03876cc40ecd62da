use super::ConfigProcessor;
use crate::devices::{ChannelSource, FilterSpec, N2kDeviceType};
use crate::empower::*;
use crate::model::*;
use crate::prelude::*;

fn tank_thing_type(tank_type: TankType) -> Option<ThingType> {
    match tank_type {
        TankType::Fuel | TankType::Oil => Some(ThingType::FuelTank),
        TankType::FreshWater => Some(ThingType::WaterTank),
        TankType::WasteWater => Some(ThingType::WasteWaterTank),
        TankType::BlackWater => Some(ThingType::BlackWaterTank),
        TankType::LiveWell => None,
    }
}

fn has_pump(tank_type: TankType) -> bool {
    matches!(
        tank_type,
        TankType::FreshWater | TankType::WasteWater | TankType::BlackWater
    )
}

impl<'a> ConfigProcessor<'a> {
    pub(super) fn process_tanks(&mut self) -> Result<()> {
        let config = self.config;

        for (instance, tank) in &config.tank {
            let Some(tank_type) = tank.tank_type else {
                warn!("tank {} has no usable type", instance);
                continue;
            };
            let Some(thing_type) = tank_thing_type(tank_type) else {
                debug!("tank {}: {:?} is not surfaced", instance, tank_type);
                continue;
            };

            let source = |channel: &str| ChannelSource::device(N2kDeviceType::Tank, *instance, channel);
            let mut thing = Thing::new(thing_type, *instance, &tank.name_utf8)
                .with_channel(
                    Channel::new("level", "Level", ChannelType::Number)
                        .unit(Unit::Percent)
                        .tag("empower:tank.level")
                        .source(source("Level"), FilterSpec::instrument(0)),
                )
                .with_channel(
                    Channel::new("volume", "Volume", ChannelType::Number)
                        .unit(Unit::Liter)
                        .tag("empower:tank.volume")
                        .source(source("Volume"), FilterSpec::instrument(0)),
                );
            thing.add_metadata("capacity", tank.tank_capacity);
            thing.add_metadata("tankType", format!("{:?}", tank_type));
            thing.categories = self.category_names(ItemType::FluidLevel, *instance);

            if has_pump(tank_type) {
                if let Some(pump_id) = self.tank_pump(*instance)? {
                    thing.add_link(Link::new(&pump_id, "empower:tank.pump"));
                }
            }

            self.system.add_thing(thing)?;
        }

        Ok(())
    }

    /// Resolves the tank's pump circuit and makes sure its Thing exists.
    /// A pump shared by several tanks is emitted once.
    fn tank_pump(&mut self, tank_instance: u32) -> Result<Option<String>> {
        let config = self.config;

        let Some(circuit) = config
            .relationships_from(ItemType::FluidLevel, tank_instance)
            .filter(|r| r.secondary_type == Some(ItemType::Circuit))
            .find_map(|r| config.circuit_by_id(r.secondary_id))
        else {
            return Ok(None);
        };

        if !circuit.is_remote_visible() {
            return Ok(None);
        }

        let pump_id = ThingType::WaterPump.thing_id(circuit.control_id);
        if self.associated_circuit_instances.insert(circuit.control_id) {
            let pump = self.circuit_thing(circuit, ThingType::WaterPump);
            self.system.add_thing(pump)?;
        } else if self.system.thing(&pump_id).is_none() {
            // claimed by an inverter/charger or battery, not a pump of ours
            return Ok(None);
        }

        Ok(Some(pump_id))
    }
}
