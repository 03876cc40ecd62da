use n2k_gateway::devices::mapping::{most_recent_valid, shore_power_connected};
use n2k_gateway::devices::*;
use n2k_gateway::prelude::*;

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

fn dc_devices() -> N2kDevices {
    let devices = N2kDevices::new();
    devices.add_devices(&[
        ("DC.0".to_string(), N2kDeviceType::Dc),
        ("DC.1".to_string(), N2kDeviceType::Dc),
    ]);
    devices
}

#[test]
fn test_add_devices_publishes_only_new() {
    let devices = N2kDevices::new();
    let mut sub = devices.subscribe();
    // initial empty map
    assert_eq!(sub.try_recv().map(|m| m.len()), Some(0));

    let added = devices.add_devices(&[("Tank.0".to_string(), N2kDeviceType::Tank)]);
    assert_eq!(added, 1);
    assert_eq!(sub.try_recv().map(|m| m.len()), Some(1));

    let added = devices.add_devices(&[("Tank.0".to_string(), N2kDeviceType::Tank)]);
    assert_eq!(added, 0);
    assert!(sub.try_recv().is_none());

    assert!(devices.contains("Tank.0"));
    assert_eq!(devices.snapshot()["Tank.0"].device_type, N2kDeviceType::Tank);
}

#[test]
fn test_update_channel_noops() {
    let devices = dc_devices();

    assert!(!devices.update_channel("DC.9", "Voltage", ChannelValue::Number(12.0), None));
    assert!(!devices.contains("DC.9"));

    assert!(devices.update_channel("DC.0", "Voltage", ChannelValue::Number(12.0), None));
    let before = devices.snapshot();
    assert!(!devices.update_channel("DC.0", "Voltage", ChannelValue::Number(12.0), None));
    assert!(Arc::ptr_eq(&before, &devices.snapshot()));

    assert_eq!(
        devices.channel_value("DC.0", "Voltage"),
        Some(ChannelValue::Number(12.0))
    );
}

#[test]
fn test_merge_state_is_one_snapshot() {
    let devices = dc_devices();
    let mut sub = devices.subscribe();
    sub.try_recv();

    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    devices.merge_state(
        &[
            ChannelUpdate::new("DC.0", "Voltage", ChannelValue::Number(12.1)),
            ChannelUpdate::new("DC.1", "Voltage", ChannelValue::Number(13.2)),
            ChannelUpdate::new("Nope.0", "Voltage", ChannelValue::Number(1.0)),
        ],
        Some(at),
    );

    let published = sub.try_recv().unwrap();
    assert!(sub.try_recv().is_none());
    assert_eq!(
        published["DC.1"].channels["Voltage"],
        ChannelValue::Number(13.2)
    );
    assert_eq!(published["DC.0"].channel_last_updated["Voltage"], at);
    assert!(!published.contains_key("Nope.0"));
}

#[test]
fn test_snapshots_are_isolated() {
    let devices = dc_devices();
    devices.update_channel("DC.0", "Voltage", ChannelValue::Number(12.0), None);
    let held = devices.snapshot();

    let writers: Vec<_> = (0..4)
        .map(|i| {
            let devices = devices.clone();
            std::thread::spawn(move || {
                for n in 0..50 {
                    devices.update_channel(
                        &format!("DC.{}", i % 2),
                        &format!("Channel{}", i),
                        ChannelValue::Number(n as f64),
                        None,
                    );
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    // the old snapshot never changes under us
    assert_eq!(held["DC.0"].channels.len(), 1);

    // and no concurrent write was lost
    let now = devices.snapshot();
    for i in 0..4 {
        assert_eq!(
            now[&format!("DC.{}", i % 2)].channels[&format!("Channel{}", i)],
            ChannelValue::Number(49.0)
        );
    }
}

#[test]
fn test_channel_subjects_are_memoized() {
    let devices = dc_devices();
    devices.update_channel("DC.0", "Voltage", ChannelValue::Number(12.0), None);

    let subject = devices.get_channel_subject("DC.0", "Voltage");
    let again = devices.get_channel_subject_for(N2kDeviceType::Dc, 0, "Voltage");
    let mut sub = subject.subscribe();
    assert_eq!(again.subscriber_count(), 1);
    assert_eq!(sub.try_recv(), Some(Some(ChannelValue::Number(12.0))));

    devices.update_channel("DC.0", "Voltage", ChannelValue::Number(12.5), None);
    assert_eq!(sub.try_recv(), Some(Some(ChannelValue::Number(12.5))));
    assert_eq!(again.latest(), Some(ChannelValue::Number(12.5)));
}

#[test]
fn test_mobile_value_absent_until_data() {
    let devices = dc_devices();
    devices.add_mobile_channel_mapping(MobileChannelMapping::new(
        "battery.0.voltage",
        vec![
            MappingSource::new("self", "DC.0", "Voltage"),
            MappingSource::new("primary", "DC.1", "Voltage"),
        ],
        most_recent_valid,
    ));

    assert_eq!(devices.mobile_value("battery.0.voltage"), None);
    assert!(devices.to_mobile_dict().is_empty());

    devices.update_channel("DC.1", "Voltage", ChannelValue::Number(13.0), None);
    assert_eq!(
        devices.to_mobile_dict().get("battery.0.voltage"),
        Some(&ChannelValue::Number(13.0))
    );

    devices.remove_mobile_channel_mapping("battery.0.voltage");
    assert_eq!(devices.mobile_value("battery.0.voltage"), None);
    assert!(devices.mobile_mapping_keys().is_empty());

    // no longer tracked
    devices.update_channel("DC.1", "Voltage", ChannelValue::Number(13.1), None);
    assert_eq!(devices.mobile_value("battery.0.voltage"), None);
}

#[test]
fn test_most_recent_valid_prefers_latest_source() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut values = mapping::SourceValues::new();
    let mut updated = mapping::SourceTimestamps::new();

    assert_eq!(most_recent_valid(&values, &updated), None);

    values.insert("self".into(), ChannelValue::Number(1.0));
    values.insert("primary".into(), ChannelValue::Number(2.0));
    updated.insert("self".into(), t0 + Duration::seconds(1));
    updated.insert("primary".into(), t0);
    assert_eq!(
        most_recent_valid(&values, &updated),
        Some(ChannelValue::Number(1.0))
    );
}

#[test]
fn test_shore_power_indicators() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut values = mapping::SourceValues::new();
    let mut updated = mapping::SourceTimestamps::new();

    values.insert("voltage".into(), ChannelValue::Number(120.0));
    updated.insert("voltage".into(), t0);
    assert_eq!(
        shore_power_connected(&values, &updated),
        Some(ChannelValue::Bool(true))
    );

    // the BLS bit spoke last
    values.insert("bls".into(), ChannelValue::Bool(false));
    updated.insert("bls".into(), t0 + Duration::seconds(2));
    assert_eq!(
        shore_power_connected(&values, &updated),
        Some(ChannelValue::Bool(false))
    );

    values.insert("componentStatus".into(), ChannelValue::Text("Disconnected".into()));
    updated.insert("componentStatus".into(), t0 + Duration::seconds(3));
    assert_eq!(
        shore_power_connected(&values, &updated),
        Some(ChannelValue::Bool(false))
    );
}

#[test]
fn test_filter_round_and_distinct() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut filter = ChannelFilter::new(FilterSpec::round(1));

    assert_eq!(
        filter.apply(&ChannelValue::Number(12.34), t0),
        Some(ChannelValue::Number(12.3))
    );
    // rounds to the same value
    assert_eq!(filter.apply(&ChannelValue::Number(12.31), t0), None);
    assert_eq!(
        filter.apply(&ChannelValue::Number(12.36), t0),
        Some(ChannelValue::Number(12.4))
    );
    assert_eq!(
        filter.apply(&ChannelValue::Text("x".into()), t0),
        Some(ChannelValue::Text("x".into()))
    );
}

#[test]
fn test_filter_stability_window() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut filter = ChannelFilter::new(FilterSpec::instrument(0));

    assert!(filter.apply(&ChannelValue::Number(100.0), t0).is_some());
    assert_eq!(
        filter.apply(&ChannelValue::Number(101.0), t0 + Duration::milliseconds(100)),
        None
    );
    assert_eq!(
        filter.apply(&ChannelValue::Number(102.0), t0 + Duration::milliseconds(600)),
        Some(ChannelValue::Number(102.0))
    );
}

#[test]
fn test_filter_flushes_held_back_value() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut filter = ChannelFilter::new(FilterSpec::instrument(1));

    assert!(filter.apply(&ChannelValue::Number(12.0), t0).is_some());
    assert_eq!(
        filter.apply(&ChannelValue::Number(13.5), t0 + Duration::milliseconds(100)),
        None
    );
    assert!(filter.has_pending());

    // still inside the window
    assert_eq!(filter.flush(t0 + Duration::milliseconds(300)), None);
    assert_eq!(
        filter.flush(t0 + Duration::milliseconds(500)),
        Some(ChannelValue::Number(13.5))
    );
    assert!(!filter.has_pending());
    assert_eq!(filter.flush(t0 + Duration::seconds(2)), None);

    // going back to the emitted value cancels the held one
    filter.apply(&ChannelValue::Number(14.0), t0 + Duration::milliseconds(600));
    assert!(filter.has_pending());
    filter.apply(&ChannelValue::Number(13.5), t0 + Duration::milliseconds(700));
    assert!(!filter.has_pending());
}

#[test]
fn test_bound_channel_settles_on_last_value() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let devices = dc_devices();
    let source = ChannelSource::device(N2kDeviceType::Dc, 0, "Voltage");
    devices.bind_channels(
        "empower",
        [("battery.0.voltage", &source, FilterSpec::instrument(1))],
    );
    let subject = devices.thing_channel_subject("battery.0.voltage");

    devices.update_channel("DC.0", "Voltage", ChannelValue::Number(12.0), Some(t0));
    devices.update_channel(
        "DC.0",
        "Voltage",
        ChannelValue::Number(13.5),
        Some(t0 + Duration::milliseconds(100)),
    );
    assert_eq!(subject.latest(), Some(ChannelValue::Number(12.0)));

    // the bus keeps reporting the same value on later polls
    for secs in 1..4 {
        devices.merge_state(
            &[ChannelUpdate::new("DC.0", "Voltage", ChannelValue::Number(13.5))],
            Some(t0 + Duration::seconds(secs)),
        );
    }

    assert_eq!(
        devices.channel_value("DC.0", "Voltage"),
        Some(ChannelValue::Number(13.5))
    );
    assert_eq!(subject.latest(), Some(ChannelValue::Number(13.5)));
}

#[test]
fn test_concurrent_mapping_updates_keep_newest() {
    let devices = dc_devices();
    devices.add_mobile_channel_mapping(MobileChannelMapping::new(
        "battery.0.voltage",
        vec![
            MappingSource::new("self", "DC.0", "Voltage"),
            MappingSource::new("primary", "DC.1", "Voltage"),
        ],
        most_recent_valid,
    ));

    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let writers: Vec<_> = (0..4)
        .map(|i| {
            let devices = devices.clone();
            std::thread::spawn(move || {
                for n in 0..100 {
                    let at = t0 + Duration::milliseconds(n * 4 + i);
                    devices.update_channel(
                        &format!("DC.{}", i % 2),
                        "Voltage",
                        ChannelValue::Number((n * 4 + i) as f64),
                        Some(at),
                    );
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    // whatever the interleaving, the cached value matches the final map
    let snapshot = devices.snapshot();
    let mut values = mapping::SourceValues::new();
    let mut updated = mapping::SourceTimestamps::new();
    for (label, key) in [("self", "DC.0"), ("primary", "DC.1")] {
        values.insert(label.into(), snapshot[key].channels["Voltage"].clone());
        updated.insert(label.into(), snapshot[key].channel_last_updated["Voltage"]);
    }
    assert_eq!(
        devices.mobile_value("battery.0.voltage"),
        most_recent_valid(&values, &updated)
    );
}

#[test]
fn test_bound_channel_subject() {
    let devices = dc_devices();
    devices.update_channel("DC.0", "Voltage", ChannelValue::Number(12.04), None);

    let source = ChannelSource::device(N2kDeviceType::Dc, 0, "Voltage");
    devices.bind_channels(
        "empower",
        [("battery.0.voltage", &source, FilterSpec::round(1))],
    );

    let subject = devices.thing_channel_subject("battery.0.voltage");
    // primed from the current value
    assert_eq!(subject.latest(), Some(ChannelValue::Number(12.0)));
    assert_eq!(devices.bound_source("battery.0.voltage"), Some(source.clone()));

    devices.update_channel("DC.0", "Voltage", ChannelValue::Number(12.66), None);
    assert_eq!(subject.latest(), Some(ChannelValue::Number(12.7)));

    // rebinding the group without it drops the binding, subject survives
    devices.bind_channels("empower", std::iter::empty());
    assert_eq!(devices.bound_source("battery.0.voltage"), None);
    devices.update_channel("DC.0", "Voltage", ChannelValue::Number(11.0), None);
    assert_eq!(subject.latest(), Some(ChannelValue::Number(12.7)));
}

#[test]
fn test_device_keys() {
    assert_eq!(device_key(N2kDeviceType::Dc, 3), "DC.3");
    assert_eq!(device_key(N2kDeviceType::Gnss, 0), "GNSS.0");
    assert_eq!("HVAC".parse::<N2kDeviceType>().ok(), Some(N2kDeviceType::Hvac));
    assert!("Toaster".parse::<N2kDeviceType>().is_err());
}
