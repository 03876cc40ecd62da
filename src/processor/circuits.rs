use super::ConfigProcessor;
use crate::devices::{ChannelSource, FilterSpec, N2kDeviceType};
use crate::empower::*;
use crate::model::*;
use crate::prelude::*;

// first match wins
const CATEGORY_PRIORITY: [(&str, ThingType); 4] = [
    ("Lighting", ThingType::Light),
    ("Bilge Pumps", ThingType::BilgePump),
    ("Water Pumps", ThingType::WaterPump),
    ("Power", ThingType::GenericCircuit),
];

/// Thing type for a visible circuit by category membership, or `None` when
/// the circuit is in none of the recognised categories.
pub fn classify_circuit(config: &N2kConfiguration, circuit: &Circuit) -> Option<ThingType> {
    let id = circuit.id.get()?;
    let categories = config.categories_for(ItemType::Circuit, id);

    CATEGORY_PRIORITY
        .iter()
        .find(|(name, _)| {
            categories
                .iter()
                .any(|c| c.name_utf8.eq_ignore_ascii_case(name))
        })
        .map(|(_, thing_type)| *thing_type)
}

fn tag_prefix(thing_type: ThingType) -> &'static str {
    match thing_type {
        ThingType::Light => "empower:light",
        ThingType::BilgePump => "empower:bilgePump",
        ThingType::WaterPump => "empower:waterPump",
        _ => "empower:circuit",
    }
}

impl<'a> ConfigProcessor<'a> {
    pub(super) fn process_circuits(&mut self) -> Result<()> {
        let config = self.config;

        for (control_id, circuit) in &config.circuit {
            if self.associated_circuit_instances.contains(control_id) {
                continue;
            }
            if !circuit.is_remote_visible() {
                debug!("circuit {} is not remote visible", control_id);
                continue;
            }
            let Some(thing_type) = classify_circuit(config, circuit) else {
                debug!("circuit {} is in no known category", control_id);
                continue;
            };

            let thing = self.circuit_thing(circuit, thing_type);
            self.system.add_thing(thing)?;
        }

        Ok(())
    }

    /// Thing for one circuit, instance `control_id`. Used by the circuit
    /// step and for tank pumps.
    pub(super) fn circuit_thing(&self, circuit: &Circuit, thing_type: ThingType) -> Thing {
        let config = self.config;
        let prefix = tag_prefix(thing_type);
        let source =
            |channel: &str| ChannelSource::device(N2kDeviceType::Circuit, circuit.control_id, channel);

        let mut thing = Thing::new(thing_type, circuit.control_id, &circuit.name_utf8)
            .with_channel(
                Channel::new("power", "Power", ChannelType::Boolean)
                    .writable()
                    .tag(&format!("{}.power", prefix))
                    .source(source("On"), FilterSpec::NONE),
            )
            .with_channel(
                Channel::new("current", "Current", ChannelType::Number)
                    .unit(Unit::Ampere)
                    .tag(&format!("{}.current", prefix))
                    .source(source("Current"), FilterSpec::instrument(1)),
            );

        if circuit.dimmable {
            thing.add_channel(
                Channel::new("level", "Level", ChannelType::Number)
                    .unit(Unit::Percent)
                    .writable()
                    .tag(&format!("{}.level", prefix))
                    .source(source("Level"), FilterSpec::round(0)),
            );
            thing.add_metadata("minLevel", circuit.min_level);
            thing.add_metadata("maxLevel", circuit.max_level);
        }

        if let Some(switch_type) = circuit.switch_type {
            thing.add_metadata("switchType", format!("{:?}", switch_type));
        }
        thing.add_metadata("dimmable", circuit.dimmable);

        if let Some(id) = circuit.id.get() {
            thing.categories = self.category_names(ItemType::Circuit, id);

            for child in config
                .relationships_from(ItemType::Circuit, id)
                .filter(|r| r.links(ItemType::Circuit, ItemType::Circuit, RelationshipType::Normal))
                .filter_map(|r| config.circuit_by_id(r.secondary_id))
            {
                if child.control_id == circuit.control_id || !child.is_remote_visible() {
                    continue;
                }
                if let Some(child_type) = classify_circuit(config, child) {
                    thing.add_link(Link::new(
                        &child_type.thing_id(child.control_id),
                        "empower:circuit.child",
                    ));
                }
            }
        }

        thing
    }
}
