use crate::prelude::*;

use serde::{Deserialize, Deserializer, Serialize};

// Instance {{{
/// Bus instance slot. A disabled slot means "not present on this bus".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub instance: u32,
}

impl Instance {
    pub fn new(instance: u32) -> Self {
        Self {
            enabled: true,
            instance,
        }
    }

    /// The instance number, but only if the slot is enabled.
    pub fn enabled_instance(&self) -> Option<u32> {
        self.enabled.then_some(self.instance)
    }
} // }}}

// ValueU32 {{{
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValueU32 {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub value: u32,
}

impl ValueU32 {
    pub fn new(value: u32) -> Self {
        Self { valid: true, value }
    }

    pub fn get(&self) -> Option<u32> {
        self.valid.then_some(self.value)
    }
} // }}}

// DataId {{{
/// Reference to another configuration entity by id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataId {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub id: u32,
}

impl DataId {
    pub fn new(id: u32) -> Self {
        Self { enabled: true, id }
    }

    pub fn get(&self) -> Option<u32> {
        self.enabled.then_some(self.id)
    }
} // }}}

// AlarmLimit {{{
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlarmLimit {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub on: f64,
    #[serde(default)]
    pub off: f64,
    #[serde(default)]
    pub id: u32,
}

impl AlarmLimit {
    /// True when this limit is configured and carries the given alarm id.
    pub fn matches(&self, unique_id: u32) -> bool {
        self.enabled && self.id > 0 && self.id == unique_id
    }
} // }}}

/// Coerces an integer field into a `num_enum` enum. Missing, non-numeric or
/// out-of-range values are logged and become `None`; this never fails.
pub fn de_lenient_enum<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u32>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;

    let Some(raw) = raw else {
        return Ok(None);
    };

    let coerced = raw
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .and_then(|n| T::try_from(n).ok());

    if coerced.is_none() {
        warn!(
            "ignoring invalid {} value {}",
            std::any::type_name::<T>().rsplit("::").next().unwrap_or("enum"),
            raw
        );
    }

    Ok(coerced)
}
