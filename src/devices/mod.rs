//! Live device state: the per-device channel store, per-channel subjects,
//! derived "mobile" values and the filtered channels bound to Things.

pub mod filter;
pub mod mapping;

use crate::prelude::*;
use crate::subject::{lock, Subject, Subscription};

pub use filter::{ChannelFilter, FilterSpec};
pub use mapping::{MappingSource, MobileChannelMapping, MobileTransform};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

// ChannelValue {{{
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChannelValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Point { latitude: f64, longitude: f64 },
}

impl ChannelValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }

    pub fn rounded(&self, precision: u32) -> Self {
        let factor = 10f64.powi(precision as i32);
        let round = |v: f64| (v * factor).round() / factor;
        match self {
            Self::Number(n) => Self::Number(round(*n)),
            Self::Point {
                latitude,
                longitude,
            } => Self::Point {
                latitude: round(*latitude),
                longitude: round(*longitude),
            },
            other => other.clone(),
        }
    }
} // }}}

// N2kDeviceType {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum N2kDeviceType {
    Circuit,
    Dc,
    Ac,
    Tank,
    InverterCharger,
    Engine,
    Gnss,
    Hvac,
    AudioStereo,
    BinaryLogicState,
    Pressure,
    Device,
}

impl N2kDeviceType {
    pub fn as_str(&self) -> &'static str {
        use N2kDeviceType::*;
        match self {
            Circuit => "Circuit",
            Dc => "DC",
            Ac => "AC",
            Tank => "Tank",
            InverterCharger => "InverterCharger",
            Engine => "Engine",
            Gnss => "GNSS",
            Hvac => "HVAC",
            AudioStereo => "AudioStereo",
            BinaryLogicState => "BinaryLogicState",
            Pressure => "Pressure",
            Device => "Device",
        }
    }
}

impl std::fmt::Display for N2kDeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for N2kDeviceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use N2kDeviceType::*;
        let t = match s {
            "Circuit" => Circuit,
            "DC" => Dc,
            "AC" => Ac,
            "Tank" => Tank,
            "InverterCharger" => InverterCharger,
            "Engine" => Engine,
            "GNSS" => Gnss,
            "HVAC" => Hvac,
            "AudioStereo" => AudioStereo,
            "BinaryLogicState" => BinaryLogicState,
            "Pressure" => Pressure,
            "Device" => Device,
            _ => bail!("unknown device type {}", s),
        };
        Ok(t)
    }
} // }}}

/// `"{type}.{instance}"`, the bus's own device id format.
pub fn device_key(device_type: N2kDeviceType, instance: u32) -> String {
    format!("{}.{}", device_type, instance)
}

/// Index key for one channel of one device.
pub fn source_key(device_key: &str, channel_key: &str) -> String {
    format!("{}.{}", device_key, channel_key)
}

fn mobile_source_key(mobile_key: &str) -> String {
    format!("mobile:{}", mobile_key)
}

/// Where a Thing channel takes its value from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ChannelSource {
    Device {
        device_key: String,
        channel_key: String,
    },
    Mobile {
        key: String,
    },
}

impl ChannelSource {
    pub fn device(device_type: N2kDeviceType, instance: u32, channel_key: &str) -> Self {
        Self::Device {
            device_key: device_key(device_type, instance),
            channel_key: channel_key.to_string(),
        }
    }

    fn index_key(&self) -> String {
        match self {
            Self::Device {
                device_key,
                channel_key,
            } => source_key(device_key, channel_key),
            Self::Mobile { key } => mobile_source_key(key),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct N2kDevice {
    pub device_type: N2kDeviceType,
    pub channels: BTreeMap<String, ChannelValue>,
    pub channel_last_updated: BTreeMap<String, DateTime<Utc>>,
}

impl N2kDevice {
    pub fn new(device_type: N2kDeviceType) -> Self {
        Self {
            device_type,
            channels: BTreeMap::new(),
            channel_last_updated: BTreeMap::new(),
        }
    }
}

pub type DeviceMap = BTreeMap<String, N2kDevice>;

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelUpdate {
    pub device_key: String,
    pub channel_key: String,
    pub value: ChannelValue,
}

impl ChannelUpdate {
    pub fn new(device_key: &str, channel_key: &str, value: ChannelValue) -> Self {
        Self {
            device_key: device_key.to_string(),
            channel_key: channel_key.to_string(),
            value,
        }
    }
}

#[derive(Default)]
struct MappingIndex {
    by_key: HashMap<String, MobileChannelMapping>,
    by_source: HashMap<String, BTreeSet<String>>,
}

impl MappingIndex {
    fn insert(&mut self, mapping: MobileChannelMapping) {
        self.remove(&mapping.key);
        for source in &mapping.sources {
            self.by_source
                .entry(source.source_key())
                .or_default()
                .insert(mapping.key.clone());
        }
        self.by_key.insert(mapping.key.clone(), mapping);
    }

    fn remove(&mut self, key: &str) {
        if let Some(old) = self.by_key.remove(key) {
            for source in &old.sources {
                if let Some(keys) = self.by_source.get_mut(&source.source_key()) {
                    keys.remove(key);
                }
            }
        }
    }
}

struct Binding {
    group: String,
    source: ChannelSource,
    filter: ChannelFilter,
}

#[derive(Default)]
struct Bindings {
    by_channel: HashMap<String, Binding>,
    by_source: HashMap<String, BTreeSet<String>>,
    // kept across rebinds so subscribers survive a config rebuild
    subjects: HashMap<String, Subject<Option<ChannelValue>>>,
}

impl Bindings {
    fn clear_group(&mut self, group: &str) {
        let stale: Vec<String> = self
            .by_channel
            .iter()
            .filter(|(_, b)| b.group == group)
            .map(|(id, _)| id.clone())
            .collect();

        for channel_id in stale {
            if let Some(binding) = self.by_channel.remove(&channel_id) {
                if let Some(ids) = self.by_source.get_mut(&binding.source.index_key()) {
                    ids.remove(&channel_id);
                }
            }
        }
    }

    fn subject(&mut self, channel_id: &str) -> Subject<Option<ChannelValue>> {
        self.subjects
            .entry(channel_id.to_string())
            .or_insert_with(|| Subject::new(None))
            .clone()
    }
}

/// Live runtime state store. Cheap to clone; clones share state.
///
/// The device map is copy-on-write: writers copy the current snapshot,
/// mutate the copy without holding the lock, then swap it in. Readers
/// always get a whole snapshot, old or new.
#[derive(Clone)]
pub struct N2kDevices {
    devices: Arc<RwLock<Arc<DeviceMap>>>,
    published: Subject<Arc<DeviceMap>>,
    subjects: Arc<Mutex<HashMap<String, Subject<Option<ChannelValue>>>>>,
    mappings: Arc<Mutex<MappingIndex>>,
    mobile_cache: Arc<Mutex<BTreeMap<String, ChannelValue>>>,
    // held across a whole mapping recompute so an older result never
    // overwrites a newer one
    mapping_update: Arc<Mutex<()>>,
    bindings: Arc<Mutex<Bindings>>,
}

impl Default for N2kDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl N2kDevices {
    pub fn new() -> Self {
        Self {
            devices: Arc::new(RwLock::new(Arc::new(DeviceMap::new()))),
            published: Subject::new(Arc::new(DeviceMap::new())),
            subjects: Arc::new(Mutex::new(HashMap::new())),
            mappings: Arc::new(Mutex::new(MappingIndex::default())),
            mobile_cache: Arc::new(Mutex::new(BTreeMap::new())),
            mapping_update: Arc::new(Mutex::new(())),
            bindings: Arc::new(Mutex::new(Bindings::default())),
        }
    }

    /// Point-in-time view of every device.
    pub fn snapshot(&self) -> Arc<DeviceMap> {
        self.devices
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe(&self) -> Subscription<Arc<DeviceMap>> {
        self.published.subscribe()
    }

    pub fn contains(&self, device_key: &str) -> bool {
        self.snapshot().contains_key(device_key)
    }

    pub fn channel_value(&self, device_key: &str, channel_key: &str) -> Option<ChannelValue> {
        self.snapshot()
            .get(device_key)?
            .channels
            .get(channel_key)
            .cloned()
    }

    /// Adds devices not already known. Publishes only if something was added.
    pub fn add_devices(&self, discovered: &[(String, N2kDeviceType)]) -> usize {
        let (added, _) = self.swap(
            |map| {
                let mut added = 0;
                for (key, device_type) in discovered {
                    if !map.contains_key(key) {
                        map.insert(key.clone(), N2kDevice::new(*device_type));
                        added += 1;
                    }
                }
                added
            },
            |added| *added > 0,
        );

        if added > 0 {
            debug!("added {} devices", added);
        }
        added
    }

    /// Merges one poll cycle's worth of channel values into a single new
    /// snapshot and always publishes it. Each cycle also releases bound
    /// values the stability window held back.
    pub fn merge_state(&self, updates: &[ChannelUpdate], timestamp: Option<DateTime<Utc>>) {
        let timestamp = timestamp.unwrap_or_else(Utc::now);
        let (changed, _) = self.swap(|map| apply_updates(map, updates, timestamp), |_| true);
        self.notify(&changed, timestamp);
        self.flush_bindings(timestamp);
    }

    /// Sets one channel. No-op for an unknown device or an unchanged value.
    pub fn update_channel(
        &self,
        device_key: &str,
        channel_key: &str,
        value: ChannelValue,
        timestamp: Option<DateTime<Utc>>,
    ) -> bool {
        let timestamp = timestamp.unwrap_or_else(Utc::now);
        let update = [ChannelUpdate::new(device_key, channel_key, value)];
        let (changed, _) = self.swap(
            |map| apply_updates(map, &update, timestamp),
            |changed| !changed.is_empty(),
        );
        self.notify(&changed, timestamp);
        !changed.is_empty()
    }

    // copy, mutate the copy with no lock held, then swap it in if nobody
    // else swapped first; otherwise redo against the newer snapshot
    fn swap<R, F, P>(&self, mutate: F, should_publish: P) -> (R, Arc<DeviceMap>)
    where
        F: Fn(&mut DeviceMap) -> R,
        P: Fn(&R) -> bool,
    {
        loop {
            let current = self.snapshot();
            let mut next = (*current).clone();
            let result = mutate(&mut next);

            if !should_publish(&result) {
                return (result, current);
            }

            let mut guard = self
                .devices
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if Arc::ptr_eq(&guard, &current) {
                let next = Arc::new(next);
                *guard = next.clone();
                // publish under the write lock so snapshots go out in swap order
                self.published.publish(next.clone());
                return (result, next);
            }
        }
    }

    fn notify(&self, changed: &[ChannelUpdate], timestamp: DateTime<Utc>) {
        for update in changed {
            let key = source_key(&update.device_key, &update.channel_key);

            let subject = lock(&self.subjects).get(&key).cloned();
            if let Some(subject) = subject {
                subject.publish(Some(update.value.clone()));
            }

            self.feed_bindings(&key, &update.value, timestamp);

            let affected: Vec<String> = lock(&self.mappings)
                .by_source
                .get(&key)
                .map(|keys| keys.iter().cloned().collect())
                .unwrap_or_default();
            for mobile_key in affected {
                self.update_mapping(&mobile_key, timestamp);
            }
        }
    }

    /// Persistent stream handle for one raw channel; created on first use.
    pub fn get_channel_subject(
        &self,
        device_key: &str,
        channel_key: &str,
    ) -> Subject<Option<ChannelValue>> {
        let key = source_key(device_key, channel_key);
        let current = self.channel_value(device_key, channel_key);
        lock(&self.subjects)
            .entry(key)
            .or_insert_with(|| Subject::new(current))
            .clone()
    }

    pub fn get_channel_subject_for(
        &self,
        device_type: N2kDeviceType,
        instance: u32,
        channel_key: &str,
    ) -> Subject<Option<ChannelValue>> {
        self.get_channel_subject(&device_key(device_type, instance), channel_key)
    }

    /// Registers a mapping in the source index and computes it once.
    pub fn add_mobile_channel_mapping(&self, mapping: MobileChannelMapping) {
        let key = mapping.key.clone();
        lock(&self.mappings).insert(mapping);
        self.update_mapping(&key, Utc::now());
    }

    pub fn remove_mobile_channel_mapping(&self, key: &str) {
        lock(&self.mappings).remove(key);
        lock(&self.mobile_cache).remove(key);
    }

    pub fn mobile_mapping_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.mappings).by_key.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn update_mapping(&self, mobile_key: &str, timestamp: DateTime<Utc>) {
        let _serial = lock(&self.mapping_update);

        let Some(mapping) = lock(&self.mappings).by_key.get(mobile_key).cloned() else {
            return;
        };

        let snapshot = self.snapshot();
        let mut values = mapping::SourceValues::new();
        let mut updated = mapping::SourceTimestamps::new();
        for source in &mapping.sources {
            let Some(device) = snapshot.get(&source.device_key) else {
                continue;
            };
            if let Some(value) = device.channels.get(&source.channel_key) {
                values.insert(source.label.clone(), value.clone());
                if let Some(at) = device.channel_last_updated.get(&source.channel_key) {
                    updated.insert(source.label.clone(), *at);
                }
            }
        }

        if values.is_empty() {
            return;
        }

        let Some(value) = (mapping.transform)(&values, &updated) else {
            return;
        };

        let changed = {
            let mut cache = lock(&self.mobile_cache);
            if cache.get(mobile_key) == Some(&value) {
                false
            } else {
                cache.insert(mobile_key.to_string(), value.clone());
                true
            }
        };

        if changed {
            self.feed_bindings(&mobile_source_key(mobile_key), &value, timestamp);
        }
    }

    pub fn mobile_value(&self, mobile_key: &str) -> Option<ChannelValue> {
        lock(&self.mobile_cache).get(mobile_key).cloned()
    }

    /// Flat map of mobile key to latest derived value. Keys whose sources
    /// never had data are absent.
    pub fn to_mobile_dict(&self) -> BTreeMap<String, ChannelValue> {
        lock(&self.mobile_cache).clone()
    }

    /// Replaces the Thing channel bindings of `group` with `channels`.
    /// Subjects for channel ids that survive keep their subscribers.
    pub fn bind_channels<'a, I>(&self, group: &str, channels: I)
    where
        I: IntoIterator<Item = (&'a str, &'a ChannelSource, FilterSpec)>,
    {
        let snapshot = self.snapshot();
        let now = Utc::now();
        let mut primed = Vec::new();

        {
            let mut bindings = lock(&self.bindings);
            bindings.clear_group(group);

            for (channel_id, source, spec) in channels {
                let mut filter = ChannelFilter::new(spec);

                let current = match source {
                    ChannelSource::Device {
                        device_key,
                        channel_key,
                    } => snapshot
                        .get(device_key)
                        .and_then(|d| d.channels.get(channel_key))
                        .cloned(),
                    ChannelSource::Mobile { key } => lock(&self.mobile_cache).get(key).cloned(),
                };
                if let Some(value) = current.and_then(|v| filter.apply(&v, now)) {
                    primed.push((bindings.subject(channel_id), value));
                }

                bindings
                    .by_source
                    .entry(source.index_key())
                    .or_default()
                    .insert(channel_id.to_string());
                bindings.by_channel.insert(
                    channel_id.to_string(),
                    Binding {
                        group: group.to_string(),
                        source: source.clone(),
                        filter,
                    },
                );
            }
        }

        for (subject, value) in primed {
            subject.publish(Some(value));
        }
    }

    pub fn bound_source(&self, channel_id: &str) -> Option<ChannelSource> {
        lock(&self.bindings)
            .by_channel
            .get(channel_id)
            .map(|b| b.source.clone())
    }

    /// Filtered value stream for one Thing channel, keyed by channel id.
    pub fn thing_channel_subject(&self, channel_id: &str) -> Subject<Option<ChannelValue>> {
        lock(&self.bindings).subject(channel_id)
    }

    /// Publishes every held-back Thing channel value whose stability window
    /// has passed by `at`.
    pub fn flush_bindings(&self, at: DateTime<Utc>) {
        let mut emit = Vec::new();
        {
            let mut bindings = lock(&self.bindings);
            let ready: Vec<(String, ChannelValue)> = bindings
                .by_channel
                .iter_mut()
                .filter(|(_, b)| b.filter.has_pending())
                .filter_map(|(id, b)| b.filter.flush(at).map(|v| (id.clone(), v)))
                .collect();
            for (channel_id, value) in ready {
                emit.push((bindings.subject(&channel_id), value));
            }
        }

        for (subject, value) in emit {
            subject.publish(Some(value));
        }
    }

    fn feed_bindings(&self, index_key: &str, value: &ChannelValue, at: DateTime<Utc>) {
        let mut emit = Vec::new();
        {
            let mut bindings = lock(&self.bindings);
            let channel_ids: Vec<String> = bindings
                .by_source
                .get(index_key)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default();

            for channel_id in channel_ids {
                let filtered = bindings
                    .by_channel
                    .get_mut(&channel_id)
                    .and_then(|b| b.filter.apply(value, at));
                if let Some(filtered) = filtered {
                    emit.push((bindings.subject(&channel_id), filtered));
                }
            }
        }

        for (subject, value) in emit {
            subject.publish(Some(value));
        }
    }
}

fn apply_updates(
    map: &mut DeviceMap,
    updates: &[ChannelUpdate],
    timestamp: DateTime<Utc>,
) -> Vec<ChannelUpdate> {
    let mut changed = Vec::new();

    for update in updates {
        let Some(device) = map.get_mut(&update.device_key) else {
            continue;
        };
        if device.channels.get(&update.channel_key) == Some(&update.value) {
            continue;
        }
        device
            .channels
            .insert(update.channel_key.clone(), update.value.clone());
        device
            .channel_last_updated
            .insert(update.channel_key.clone(), timestamp);
        changed.push(update.clone());
    }

    changed
}
