//! Alarm correlation: maps an inbound alarm and its resolved channel id to
//! every configuration entity it concerns.
//!
//! Each `process_*` function only ever appends to the shared accumulator and
//! never appends a component that is already in it, so processors can be
//! chained and re-run freely.

pub mod component;

pub use component::{push_unique, ComponentReference, ComponentType};

use crate::model::*;
use crate::prelude::*;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Combi devices report some DC alarms three channels below where the
/// inverter/charger actually sits.
pub const DC_ALARM_CHANNEL_OFFSET: u32 = 3;

/// Extra passes `process_device_alarms` makes for DC alarms it can't place.
pub const DEVICE_ALARM_MAX_RETRIES: u32 = 1;

const SMARTCRAFT_ENGINES: [(u32, &str); 4] = [
    (0, "StarboardEngine"),
    (1, "PortEngine"),
    (2, "StartboardInnerEngine"),
    (3, "PortInnerEngine"),
];

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive,
)]
#[serde(try_from = "u32", into = "u32")]
#[repr(u32)]
pub enum AlarmType {
    External = 0,
    TypeSleepWarning = 1,
    TypeLimit = 2,
    TypeDeviceMissing = 3,
    TypeSmartcraft = 4,
}

impl std::fmt::Display for AlarmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Alarm {
    pub alarm_type: AlarmType,
    #[serde(default)]
    pub channel_id: u32,
    #[serde(default)]
    pub unique_id: u32,
    #[serde(default)]
    pub title: String,
}

impl Alarm {
    pub fn new(alarm_type: AlarmType, channel_id: u32, unique_id: u32, title: &str) -> Self {
        Self {
            alarm_type,
            channel_id,
            unique_id,
            title: title.to_string(),
        }
    }

    /// Alarms must carry a known `AlarmType`; anything else is refused here
    /// rather than guessed at by the processors.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| anyhow!("invalid alarm: {}", e))
    }
}

// Device alarms {{{
/// Correlates sleep-warning and external alarms by dipswitch. If a DC alarm
/// matches nothing, it is retried once at `DC_ALARM_CHANNEL_OFFSET` channels
/// further on as a non-DC alarm. Returns the number of matching components,
/// including ones already in `affected`.
pub fn process_device_alarms<'a>(
    resolved_alarm_channel_id: u32,
    config: &'a N2kConfiguration,
    affected: &mut Vec<ComponentReference<'a>>,
    alarm: &mut Alarm,
    is_dc_alarm: bool,
) -> usize {
    if !matches!(
        alarm.alarm_type,
        AlarmType::TypeSleepWarning | AlarmType::External
    ) {
        debug!("device alarms: ignoring {} alarm", alarm.alarm_type);
        return 0;
    }

    let mut channel_id = resolved_alarm_channel_id;
    let mut is_dc = is_dc_alarm;

    for attempt in 0..=DEVICE_ALARM_MAX_RETRIES {
        let found = device_alarm_pass(channel_id, config, affected, alarm);
        if found > 0 || !is_dc {
            return found;
        }
        if attempt < DEVICE_ALARM_MAX_RETRIES {
            debug!(
                "device alarms: nothing at {:#06x}, retrying at +{}",
                channel_id, DC_ALARM_CHANNEL_OFFSET
            );
        }
        channel_id = channel_id.wrapping_add(DC_ALARM_CHANNEL_OFFSET);
        is_dc = false;
    }

    0
}

fn device_alarm_pass<'a>(
    channel_id: u32,
    config: &'a N2kConfiguration,
    affected: &mut Vec<ComponentReference<'a>>,
    alarm: &mut Alarm,
) -> usize {
    let dipswitch = channel_id >> 8;
    let mut found = 0;

    if alarm.alarm_type == AlarmType::TypeSleepWarning {
        for circuit in config.circuit.values() {
            if circuit
                .circuit_loads
                .iter()
                .any(|load| load.channel_address >> 8 == dipswitch)
            {
                push_unique(affected, ComponentReference::Circuit(circuit));
                found += 1;
            }
        }

        for (instance, meter) in &config.ac {
            for line in meter.line.values() {
                if line.address >> 8 == dipswitch {
                    push_unique(
                        affected,
                        ComponentReference::AcMeter {
                            instance: *instance,
                            line,
                        },
                    );
                    found += 1;
                }
            }
        }

        for (instance, dc) in &config.dc {
            if dc.address >> 8 == dipswitch {
                push_unique(
                    affected,
                    ComponentReference::DcMeter {
                        instance: *instance,
                        dc,
                    },
                );
                found += 1;
            }
        }
    }

    for (instance, device) in &config.inverter_charger {
        if dipswitch == device.dipswitch && channel_id & 0xFF == device.channel_index {
            push_unique(
                affected,
                ComponentReference::InverterCharger {
                    instance: *instance,
                    device,
                },
            );
            found += 1;

            if let Some(title) = inverter_charger_title(config, device) {
                alarm.title = title;
            }
        }
    }

    for device in config.device.values() {
        if device.device_type != Some(DeviceType::Battery) || device.dipswitch != dipswitch {
            continue;
        }
        let dc_meter = config
            .relationships_from(ItemType::DcMeter, device.instance_number)
            .filter(|r| r.links(ItemType::DcMeter, ItemType::DcMeter, RelationshipType::Normal))
            .find_map(|r| config.dc.get_key_value(&r.secondary_id));

        if let Some((instance, dc)) = dc_meter {
            push_unique(
                affected,
                ComponentReference::DcMeter {
                    instance: *instance,
                    dc,
                },
            );
            found += 1;
        }
    }

    found
}

/// Display title for an inverter/charger alarm: the device name, else the
/// name of its inverter circuit.
fn inverter_charger_title(
    config: &N2kConfiguration,
    device: &InverterChargerDevice,
) -> Option<String> {
    if !device.name_utf8.is_empty() {
        return Some(device.name_utf8.clone());
    }
    device
        .inverter_circuit_id
        .get()
        .and_then(|id| config.visible_circuit_for_hidden(id))
        .map(|c| c.name_utf8.clone())
        .filter(|name| !name.is_empty())
} // }}}

pub fn process_dc_meter_alarms<'a>(
    resolved_alarm_channel_id: u32,
    config: &'a N2kConfiguration,
    affected: &mut Vec<ComponentReference<'a>>,
    alarm: &Alarm,
    _is_dc_alarm: bool,
) {
    for (instance, dc) in &config.dc {
        let by_limit = dc.alarm_limits().iter().any(|l| l.matches(alarm.unique_id));
        if by_limit || dc.address == resolved_alarm_channel_id {
            push_unique(
                affected,
                ComponentReference::DcMeter {
                    instance: *instance,
                    dc,
                },
            );
        }
    }
}

/// Address matches only count for AC alarms; a DC alarm's channel lives in
/// the DC address space.
pub fn process_ac_meter_alarms<'a>(
    resolved_alarm_channel_id: u32,
    config: &'a N2kConfiguration,
    affected: &mut Vec<ComponentReference<'a>>,
    alarm: &Alarm,
    is_dc_alarm: bool,
) {
    for (instance, meter) in &config.ac {
        for line in meter.line.values() {
            let by_limit = line.alarm_limits().iter().any(|l| l.matches(alarm.unique_id));
            let by_address = !is_dc_alarm && line.address == resolved_alarm_channel_id;
            if by_limit || by_address {
                push_unique(
                    affected,
                    ComponentReference::AcMeter {
                        instance: *instance,
                        line,
                    },
                );
            }
        }
    }
}

pub fn process_tank_alarms<'a>(
    resolved_alarm_channel_id: u32,
    config: &'a N2kConfiguration,
    affected: &mut Vec<ComponentReference<'a>>,
    alarm: &Alarm,
    _is_dc_alarm: bool,
) {
    for (instance, tank) in &config.tank {
        let by_limit = tank.alarm_limits().iter().any(|l| l.matches(alarm.unique_id));
        if by_limit || tank.address == resolved_alarm_channel_id {
            push_unique(
                affected,
                ComponentReference::Tank {
                    instance: *instance,
                    tank,
                },
            );
        }
    }
}

/// Circuits owning a configured load on the alarm channel.
pub fn process_circuit_load_alarms<'a>(
    resolved_alarm_channel_id: u32,
    config: &'a N2kConfiguration,
    affected: &mut Vec<ComponentReference<'a>>,
    _alarm: &Alarm,
    _is_dc_alarm: bool,
) {
    for circuit in config.circuit.values() {
        if circuit
            .circuit_loads
            .iter()
            .any(|load| load.level > 0 && load.channel_address == resolved_alarm_channel_id)
        {
            push_unique(affected, ComponentReference::Circuit(circuit));
        }
    }
}

/// The binary logic state behind the alarm channel, plus every entity it
/// stands in for.
pub fn process_bls_alarms<'a>(
    _resolved_alarm_channel_id: u32,
    config: &'a N2kConfiguration,
    affected: &mut Vec<ComponentReference<'a>>,
    alarm: &Alarm,
    _is_dc_alarm: bool,
) {
    let Some(mapping) = config
        .bls_alarm_mappings
        .values()
        .find(|m| m.alarm_channel == alarm.channel_id)
    else {
        return;
    };
    let bls = &mapping.binary_logic_state;
    push_unique(affected, ComponentReference::BinaryLogicState(bls));

    for relationship in config
        .relationships_to(ItemType::BinaryLogicState, bls.address)
        .filter(|r| {
            matches!(
                r.relationship_type,
                Some(RelationshipType::Normal) | Some(RelationshipType::Duplicates)
            )
        })
    {
        let id = relationship.primary_id;
        let component = match relationship.primary_type {
            Some(ItemType::AcMeter) => config
                .ac
                .get_key_value(&id)
                .and_then(|(instance, meter)| {
                    meter.primary_line().map(|line| ComponentReference::AcMeter {
                        instance: *instance,
                        line,
                    })
                }),
            Some(ItemType::DcMeter) => config
                .dc
                .get_key_value(&id)
                .map(|(instance, dc)| ComponentReference::DcMeter {
                    instance: *instance,
                    dc,
                }),
            Some(ItemType::FluidLevel) => config
                .tank
                .get_key_value(&id)
                .map(|(instance, tank)| ComponentReference::Tank {
                    instance: *instance,
                    tank,
                }),
            Some(ItemType::Circuit) => config.circuit_by_id(id).map(ComponentReference::Circuit),
            _ => None,
        };

        if let Some(component) = component {
            push_unique(affected, component);
        }
    }
}

/// SmartCraft engine instance (low byte of the channel) to engine, by name.
pub fn process_smartcraft_alarms<'a>(
    resolved_alarm_channel_id: u32,
    engines: &'a EngineConfiguration,
    affected: &mut Vec<ComponentReference<'a>>,
    _alarm: &Alarm,
    _is_dc_alarm: bool,
) {
    let engine_instance = resolved_alarm_channel_id & 0xFF;
    let Some((_, name)) = SMARTCRAFT_ENGINES
        .iter()
        .find(|(instance, _)| *instance == engine_instance)
    else {
        return;
    };

    if let Some((instance, engine)) = engines
        .devices
        .iter()
        .find(|(_, engine)| engine.name_utf8 == *name)
    {
        push_unique(
            affected,
            ComponentReference::Engine {
                instance: *instance,
                engine,
            },
        );
    }
}

/// Runs every processor over one alarm in a fixed order. SmartCraft engines
/// are only consulted for SmartCraft alarms.
pub fn correlate_alarm<'a>(
    config: &'a N2kConfiguration,
    engines: &'a EngineConfiguration,
    alarm: &mut Alarm,
    is_dc_alarm: bool,
) -> Vec<ComponentReference<'a>> {
    let channel_id = alarm.channel_id;
    let mut affected = Vec::new();

    process_device_alarms(channel_id, config, &mut affected, alarm, is_dc_alarm);
    process_dc_meter_alarms(channel_id, config, &mut affected, alarm, is_dc_alarm);
    process_ac_meter_alarms(channel_id, config, &mut affected, alarm, is_dc_alarm);
    process_tank_alarms(channel_id, config, &mut affected, alarm, is_dc_alarm);
    process_circuit_load_alarms(channel_id, config, &mut affected, alarm, is_dc_alarm);
    process_bls_alarms(channel_id, config, &mut affected, alarm, is_dc_alarm);
    if alarm.alarm_type == AlarmType::TypeSmartcraft {
        process_smartcraft_alarms(channel_id, engines, &mut affected, alarm, is_dc_alarm);
    }

    debug!(
        "alarm {} ({}) on {:#06x}: {} component(s)",
        alarm.unique_id,
        alarm.alarm_type,
        channel_id,
        affected.len()
    );

    affected
}
