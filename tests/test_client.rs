mod common;
use common::*;
use n2k_gateway::client::{poll_devices, poll_state, ClientState, N2kClient};
use n2k_gateway::config::Polling;
use n2k_gateway::prelude::*;

use serde_json::json;
use std::sync::Arc;

fn fast_polling() -> Polling {
    Polling {
        device_interval_ms: 10,
        state_interval_ms: 10,
    }
}

fn scripted_boat() -> Arc<ScriptedBus> {
    let bus = Arc::new(ScriptedBus::new());
    bus.set(
        "factory",
        json!({ "FactoryDataSettings": { "SerialNumber": "GW-0042" } }).to_string(),
    );
    bus.set(
        "config",
        json!({
            "ACs": [{ "Instance": instance(1), "Line": 1, "AcType": 2, "NameUTF8": "Shore" }],
        })
        .to_string(),
    );
    bus.set("config/categories", "");
    bus.set(
        "config/engines",
        json!({ "Engines": [{ "Instance": instance(0), "NameUTF8": "StarboardEngine" }] }).to_string(),
    );
    bus.set("devices", json!([{ "id": "AC.1", "type": "AC" }]).to_string());
    bus.set(
        "devices/AC.1/state",
        json!({ "Line1.Voltage": { "Valid": true, "Value": 229.5 } }).to_string(),
    );
    bus
}

#[tokio::test]
async fn test_start_publishes_and_polls() -> Result<()> {
    let bus = scripted_boat();
    let client = N2kClient::new(bus.clone(), fast_polling());
    assert_eq!(client.state(), ClientState::Stopped);

    client.start().await?;
    assert_eq!(client.state(), ClientState::Running);

    let system = client.empower_system().unwrap();
    assert!(system.thing("shorePower.1").is_some());
    assert!(client.config().is_some());
    assert_eq!(client.factory_metadata().unwrap().serial_number, "GW-0042");
    assert!(client.engine_list().unwrap().engines.contains_key("marineEngine.0"));
    assert!(client.devices().contains("AC.1"));

    let devices = client.devices().clone();
    assert!(
        eventually(|| {
            devices.mobile_value("shorePower.1.connected") == Some(ChannelValue::Bool(true))
        })
        .await
    );
    assert!(bus.calls("devices") >= 2);
    assert!(bus.calls("devices/AC.1/state") >= 1);

    client.stop().await;
    assert_eq!(client.state(), ClientState::Stopped);

    // loops are gone
    let calls = bus.calls("devices/AC.1/state");
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(bus.calls("devices/AC.1/state"), calls);

    Ok(())
}

#[tokio::test]
async fn test_start_twice_fails() -> Result<()> {
    let client = N2kClient::new(scripted_boat(), fast_polling());

    client.start().await?;
    assert!(client.start().await.is_err());
    assert_eq!(client.state(), ClientState::Running);

    client.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_bad_config_fails_start() {
    let bus = scripted_boat();
    bus.set("config", "{ definitely not json");
    let client = N2kClient::new(bus.clone(), fast_polling());

    assert!(client.start().await.is_err());
    assert_eq!(client.state(), ClientState::Stopped);
    assert!(client.config().is_none());
    assert!(client.empower_system().is_none());
}

#[tokio::test]
async fn test_optional_calls_may_fail() -> Result<()> {
    let bus = scripted_boat();
    bus.remove("factory");
    bus.remove("config/engines");
    let client = N2kClient::new(bus.clone(), fast_polling());

    client.start().await?;

    assert!(client.factory_metadata().is_none());
    assert!(client.engine_list().is_none());
    assert!(client.empower_system().is_some());

    client.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_config() -> Result<()> {
    let bus = scripted_boat();
    let client = N2kClient::new(bus.clone(), fast_polling());
    client.start().await?;
    let before = client.config().unwrap();
    let mut updates = client.subscribe_empower_system();
    assert!(updates.recv().await.unwrap().is_some());

    bus.set("config", json!({ "DCs": [{ "Instance": 5 }] }).to_string());
    assert!(client.refresh_config().await.is_err());

    assert!(Arc::ptr_eq(&before, &client.config().unwrap()));
    assert!(client.empower_system().unwrap().thing("shorePower.1").is_some());
    assert!(updates.try_recv().is_none());

    client.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_refresh_engines_merges() -> Result<()> {
    let bus = scripted_boat();
    let client = N2kClient::new(bus.clone(), fast_polling());
    client.start().await?;

    bus.set(
        "config/engines",
        json!({ "Engines": [{ "Instance": instance(1), "NameUTF8": "PortEngine" }] }).to_string(),
    );
    client.refresh_engines().await?;

    assert_eq!(client.engine_config().devices.len(), 2);
    assert_eq!(client.engine_list().unwrap().engines.len(), 2);

    client.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_poll_state_skips_silent_devices() -> Result<()> {
    let bus = scripted_boat();
    bus.set(
        "devices",
        json!([{ "id": "AC.1", "type": "AC" }, { "id": "Tank.3", "type": "Tank" }]).to_string(),
    );
    let devices = N2kDevices::new();

    assert_eq!(poll_devices(bus.as_ref(), &devices).await?, 2);
    assert_eq!(poll_devices(bus.as_ref(), &devices).await?, 0);

    // Tank.3 has no state scripted
    assert_eq!(poll_state(bus.as_ref(), &devices).await?, 1);
    assert_eq!(
        devices.channel_value("AC.1", "Line1.Voltage"),
        Some(ChannelValue::Number(229.5))
    );
    assert!(devices.snapshot()["Tank.3"].channels.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_dump_json() -> Result<()> {
    let client = N2kClient::new(scripted_boat(), fast_polling());
    assert!(client.to_dump_json()["system"].is_null());

    client.start().await?;
    let dump = client.to_dump_json();
    client.stop().await;

    assert!(dump["system"]["things"]["shorePower.1"].is_object());
    assert!(dump["engines"]["engines"]["marineEngine.0"].is_object());
    assert!(dump["mobile"].is_object());

    Ok(())
}
