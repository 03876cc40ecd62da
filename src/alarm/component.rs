use crate::model::*;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ComponentType {
    Circuit,
    AcMeter,
    DcMeter,
    Tank,
    InverterCharger,
    BinaryLogicState,
    Engine,
}

/// A configuration entity an alarm pertains to. Borrows from the
/// configuration snapshot the alarm was correlated against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ComponentReference<'a> {
    Circuit(&'a Circuit),
    AcMeter { instance: u32, line: &'a Ac },
    DcMeter { instance: u32, dc: &'a Dc },
    Tank { instance: u32, tank: &'a Tank },
    InverterCharger {
        instance: u32,
        device: &'a InverterChargerDevice,
    },
    BinaryLogicState(&'a BinaryLogicState),
    Engine { instance: u32, engine: &'a EngineDevice },
}

impl<'a> ComponentReference<'a> {
    pub fn component_type(&self) -> ComponentType {
        match self {
            Self::Circuit(_) => ComponentType::Circuit,
            Self::AcMeter { .. } => ComponentType::AcMeter,
            Self::DcMeter { .. } => ComponentType::DcMeter,
            Self::Tank { .. } => ComponentType::Tank,
            Self::InverterCharger { .. } => ComponentType::InverterCharger,
            Self::BinaryLogicState(_) => ComponentType::BinaryLogicState,
            Self::Engine { .. } => ComponentType::Engine,
        }
    }

    /// The field that tells two components of the same type apart.
    pub fn discriminator(&self) -> u64 {
        match self {
            Self::Circuit(circuit) => circuit.control_id.into(),
            // one alarm per meter line
            Self::AcMeter { instance, line } => {
                (u64::from(*instance) << 8) | u64::from(line.line.map(|l| l.number()).unwrap_or(0))
            }
            Self::DcMeter { instance, .. }
            | Self::Tank { instance, .. }
            | Self::InverterCharger { instance, .. }
            | Self::Engine { instance, .. } => (*instance).into(),
            Self::BinaryLogicState(bls) => bls.address.into(),
        }
    }

    pub fn key(&self) -> (ComponentType, u64) {
        (self.component_type(), self.discriminator())
    }

    pub fn name(&self) -> &'a str {
        match self {
            Self::Circuit(circuit) => &circuit.name_utf8,
            Self::AcMeter { line, .. } => &line.name_utf8,
            Self::DcMeter { dc, .. } => &dc.name_utf8,
            Self::Tank { tank, .. } => &tank.name_utf8,
            Self::InverterCharger { device, .. } => &device.name_utf8,
            Self::BinaryLogicState(bls) => &bls.name_utf8,
            Self::Engine { engine, .. } => &engine.name_utf8,
        }
    }
}

/// Appends `component` unless one with the same key is already there.
/// Returns whether it was appended.
pub fn push_unique<'a>(
    affected: &mut Vec<ComponentReference<'a>>,
    component: ComponentReference<'a>,
) -> bool {
    let key = component.key();
    if affected.iter().any(|c| c.key() == key) {
        return false;
    }
    affected.push(component);
    true
}
