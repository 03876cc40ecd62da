use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum SwitchType {
    None = 0,
    LatchOn = 1,
    LatchOff = 2,
    OnOff = 3,
    Toggle = 4,
    MomentaryOn = 5,
    MomentaryOff = 6,
    StepUp = 7,
    StepDown = 8,
    Forward = 9,
    Reverse = 10,
    DimLinearUp = 11,
    DimLinearDown = 12,
    DimExponentialUp = 13,
    DimExponentialDown = 14,
    SingleDimUpDownLinear = 15,
    SingleDimUpDownExponential = 16,
    Sequential1 = 17,
    Sequential2 = 18,
    Sequential3 = 19,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum CircuitType {
    Circuit = 0,
    ModeGroup1 = 1,
    ModeGroup2 = 2,
    ModeGroup3 = 3,
    ModeGroupExclusive = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum AcLine {
    Line1 = 1,
    Line2 = 2,
    Line3 = 3,
}

impl AcLine {
    pub fn number(self) -> u32 {
        self.into()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum AcType {
    Unknown = 0,
    Generator = 1,
    ShorePower = 2,
    Inverter = 3,
    Parallel = 4,
    Charger = 5,
    Outlet = 6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum TankType {
    Fuel = 0,
    FreshWater = 1,
    WasteWater = 2,
    LiveWell = 3,
    Oil = 4,
    BlackWater = 5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum BatteryType {
    Flooded = 0,
    Gel = 1,
    Agm = 2,
    LiFePo4 = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum DeviceType {
    None = 0,
    Europa = 1,
    UnknownDevice = 2,
    Virtual = 3,
    Quick = 4,
    Lexnet = 5,
    Battery = 6,
    Chargers = 7,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum PressureType {
    Atmospheric = 0,
    Water = 1,
    Steam = 2,
    CompressedAir = 3,
    Hydraulic = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum EngineType {
    Nmea2000 = 0,
    Smartcraft = 1,
}

/// Kind of entity on either end of a UI relationship.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum ItemType {
    None = 0,
    Circuit = 1,
    FluidLevel = 2,
    AcMeter = 3,
    DcMeter = 4,
    BinaryLogicState = 5,
    InverterCharger = 6,
    Category = 7,
    Pressure = 8,
    Hvac = 9,
    Device = 10,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum RelationshipType {
    Normal = 0,
    Duplicates = 1,
}
