mod common;
use common::*;
use n2k_gateway::devices::{ChannelValue, N2kDeviceType};
use n2k_gateway::model::*;
use n2k_gateway::parser::{self, get_bls_alarm_channel};
use n2k_gateway::prelude::*;

use serde_json::json;

fn sample_config() -> serde_json::Value {
    json!({
        "Circuits": [circuit(10, 1, "Cabin Lights"), hidden_circuit(200, 1)],
        "DCs": [{ "Instance": instance(0), "NameUTF8": "House", "Address": 0x0301 }],
        "ACs": [
            { "Instance": instance(1), "Line": 1, "AcType": 2, "NameUTF8": "Shore L1", "Address": 0x0401 },
            { "Instance": instance(1), "Line": 2, "AcType": 2, "NameUTF8": "Shore L2", "Address": 0x0402 },
        ],
        "Tanks": [{ "Instance": instance(2), "TankType": 1, "NameUTF8": "Fresh" }],
        "UiRelationships": [in_categories(1, 10, 0b1000)],
    })
}

#[test]
fn test_reparse_is_idempotent() -> Result<()> {
    let json = sample_config().to_string();

    let first = parser::parse_config(&json, &standard_categories(), "")?;
    let second = parser::parse_config(&json, &standard_categories(), "")?;

    assert_eq!(first, second);
    assert_eq!(first.to_dict(), second.to_dict());

    Ok(())
}

#[test]
fn test_missing_sections_are_empty() -> Result<()> {
    let config = parser::parse_config("{}", "", "")?;

    assert_eq!(config, N2kConfiguration::default());
    assert!(config.config_metadata.is_none());

    Ok(())
}

#[test]
fn test_disabled_instances_are_excluded() -> Result<()> {
    let json = json!({
        "DCs": [{ "Instance": { "Enabled": false, "Instance": 5 } }],
        "Tanks": [{ "Instance": disabled_instance(1), "TankType": 0 }],
        "GNSS": [{ "NameUTF8": "no instance at all" }],
    });

    let config = parser::parse_config(&json.to_string(), "", "")?;

    assert!(config.dc.is_empty());
    assert!(config.tank.is_empty());
    assert!(config.gnss.is_empty());

    Ok(())
}

#[test]
fn test_inverter_charger_instance_synthesis() -> Result<()> {
    assert_eq!(
        calculate_inverter_charger_instance(&Instance::new(3), &Instance::new(7)),
        Some(775)
    );

    let json = json!({
        "InverterChargers": [
            { "InverterInstance": instance(3), "ChargerInstance": instance(7), "NameUTF8": "Combi" },
            { "InverterInstance": instance(4), "ChargerInstance": disabled_instance(8), "NameUTF8": "Half" },
        ],
    });
    let config = parser::parse_config(&json.to_string(), "", "")?;

    assert_eq!(config.inverter_charger.len(), 1);
    assert_eq!(config.inverter_charger[&775].name_utf8, "Combi");

    Ok(())
}

#[test]
fn test_circuits_bucketed_by_visibility() -> Result<()> {
    let json = json!({
        "Circuits": [
            circuit(10, 1, "Visible"),
            hidden_circuit(200, 1),
            { "Id": { "Valid": false, "Value": 11 }, "ControlId": 2, "NameUTF8": "No id" },
        ],
    });
    let config = parser::parse_config(&json.to_string(), "", "")?;

    assert_eq!(config.circuit.len(), 1);
    assert_eq!(config.circuit[&1].name_utf8, "Visible");
    assert_eq!(config.hidden_circuit.len(), 1);
    assert!(config.hidden_circuit.contains_key(&200));
    assert_eq!(
        config.visible_circuit_for_hidden(200).map(|c| c.name_utf8.as_str()),
        Some("Visible")
    );

    Ok(())
}

#[test]
fn test_ac_lines_grouped_per_meter() -> Result<()> {
    let config = parser::parse_config(&sample_config().to_string(), "", "")?;

    assert_eq!(config.ac.len(), 1);
    let meter = &config.ac[&1];
    assert_eq!(meter.line.len(), 2);
    assert_eq!(meter.line1().map(|l| l.address), Some(0x0401));
    assert_eq!(config.ac_line(1, 2).map(|l| l.name_utf8.as_str()), Some("Shore L2"));

    Ok(())
}

#[test]
fn test_bad_enum_value_is_dropped_not_fatal() -> Result<()> {
    let json = json!({
        "Tanks": [{ "Instance": instance(0), "TankType": 99, "NameUTF8": "Mystery" }],
    });
    let config = parser::parse_config(&json.to_string(), "", "")?;

    assert_eq!(config.tank.len(), 1);
    assert_eq!(config.tank[&0].tank_type, None);

    Ok(())
}

#[test]
fn test_malformed_element_aborts_parse() {
    let json = json!({
        "Circuits": [circuit(10, 1, "ok")],
        "DCs": [{ "Instance": "not an object" }],
    });

    let err = parser::parse_config(&json.to_string(), "", "").unwrap_err();

    assert!(matches!(err, ParseError::InvalidSection { .. }));
    assert_eq!(err.section(), "DCs");
}

#[test]
fn test_invalid_json_is_reported() {
    let err = parser::parse_config("{not json", "", "").unwrap_err();
    assert!(matches!(err, ParseError::InvalidJson { .. }));

    let err = parser::parse_config("[]", "", "").unwrap_err();
    assert!(matches!(err, ParseError::InvalidJson { .. }));
}

#[test]
fn test_parse_error_message_and_downcast() {
    let err = ParseError::invalid_section("DCs", "missing field `Instance`");
    assert_eq!(err.to_string(), "failed to parse section DCs: missing field `Instance`");

    let err: anyhow::Error = parser::parse_config("{not json", "", "").unwrap_err().into();
    assert!(err.to_string().starts_with("invalid json in "));
    let parse_error = err.downcast_ref::<ParseError>().unwrap();
    assert!(matches!(parse_error, ParseError::InvalidJson { .. }));
}

#[test]
fn test_bls_alarm_channel_from_primary() {
    let bls = BinaryLogicState {
        address: 0x1234,
        name_utf8: "Shore".to_string(),
    };
    let relationships = vec![UiRelationShipMsg {
        primary_type: Some(ItemType::BinaryLogicState),
        primary_id: 0x1234,
        primary_config_address: 0x1200,
        primary_channel_index: 0x34,
        ..Default::default()
    }];

    assert_eq!(get_bls_alarm_channel(&bls, &relationships), Some(0x1234));
}

#[test]
fn test_bls_alarm_channel_primary_wins_over_secondary() {
    let bls = BinaryLogicState {
        address: 7,
        name_utf8: String::new(),
    };
    let relationships = vec![
        UiRelationShipMsg {
            secondary_type: Some(ItemType::BinaryLogicState),
            secondary_id: 7,
            secondary_config_address: 0x0500,
            secondary_channel_index: 0x02,
            ..Default::default()
        },
        UiRelationShipMsg {
            primary_type: Some(ItemType::BinaryLogicState),
            primary_id: 7,
            primary_config_address: 0x0AFF,
            primary_channel_index: 0x1FF,
            ..Default::default()
        },
    ];

    assert_eq!(get_bls_alarm_channel(&bls, &relationships), Some(0x0AFF));
    assert_eq!(get_bls_alarm_channel(&bls, &relationships[..1]), Some(0x0502));
    assert_eq!(get_bls_alarm_channel(&bls, &[]), None);
}

#[test]
fn test_bls_alarm_mappings_derived() -> Result<()> {
    let json = json!({
        "BinaryLogicStates": [{ "Address": 0x1234, "NameUTF8": "Shore" }, { "Address": 9 }],
        "UiRelationships": [{
            "PrimaryType": 3, "PrimaryId": 1,
            "SecondaryType": 5, "SecondaryId": 0x1234,
            "RelationshipType": 0,
            "SecondaryConfigAddress": 0x1200, "SecondaryChannelIndex": 0x34,
        }],
    });
    let config = parser::parse_config(&json.to_string(), "", "")?;

    assert_eq!(config.bls_alarm_mappings.len(), 1);
    assert_eq!(config.bls_alarm_mappings[&0x1234].alarm_channel, 0x1234);

    Ok(())
}

#[test]
fn test_categories_and_metadata() -> Result<()> {
    let metadata = json!({ "Id": 4, "ConfigName": "Boat", "Version": 2, "Timestamp": "now" });
    let config = parser::parse_config(
        &sample_config().to_string(),
        &standard_categories(),
        &metadata.to_string(),
    )?;

    assert_eq!(config.category.len(), 4);
    let names: Vec<&str> = config
        .categories_for(ItemType::Circuit, 10)
        .iter()
        .map(|c| c.name_utf8.as_str())
        .collect();
    assert_eq!(names, vec!["Power"]);

    let metadata = config.config_metadata.unwrap();
    assert_eq!(metadata.config_name, "Boat");
    assert_eq!(metadata.version, 2);

    Ok(())
}

#[test]
fn test_engine_configuration_merges() -> Result<()> {
    let first = json!({ "Engines": [{ "Instance": instance(0), "NameUTF8": "StarboardEngine" }] });
    let second = json!({ "Engines": [{ "Instance": instance(1), "NameUTF8": "PortEngine", "EngineType": 1 }] });

    let engines = parser::parse_engine_configuration(&first.to_string(), &EngineConfiguration::default())?;
    let engines = parser::parse_engine_configuration(&second.to_string(), &engines)?;

    assert_eq!(engines.devices.len(), 2);
    assert_eq!(
        engines.find_by_name("PortEngine").and_then(|e| e.engine_type),
        Some(EngineType::Smartcraft)
    );

    Ok(())
}

#[test]
fn test_factory_metadata() -> Result<()> {
    let json = json!({
        "FactoryDataSettings": { "RTFirmwareVersion": "1.2.3", "SerialNumber": "SN1" }
    });
    let factory = parser::parse_factory_metadata(&json.to_string())?;

    assert_eq!(factory.rt_firmware_version, "1.2.3");
    assert_eq!(factory.serial_number, "SN1");

    Ok(())
}

#[test]
fn test_device_list_skips_unknown_types() -> Result<()> {
    let json = json!([
        { "id": "DC.0", "type": "DC" },
        { "id": "Toaster.1", "type": "Toaster" },
        { "id": "Circuit.5", "type": "Circuit" },
    ]);
    let devices = parser::parse_device_list(&json.to_string())?;

    assert_eq!(
        devices,
        vec![
            ("DC.0".to_string(), N2kDeviceType::Dc),
            ("Circuit.5".to_string(), N2kDeviceType::Circuit),
        ]
    );

    Ok(())
}

#[test]
fn test_device_state_values() -> Result<()> {
    let json = json!({
        "Voltage": { "Valid": true, "Value": 12.5 },
        "Current": { "Valid": false, "Value": 3 },
        "Status": "ok",
        "On": true,
        "Position": { "Latitude": 50.1, "Longitude": -1.2 },
        "Nothing": null,
    });
    let mut updates = parser::parse_device_state("DC.0", &json.to_string())?;
    updates.sort_by(|a, b| a.channel_key.cmp(&b.channel_key));

    let values: Vec<(&str, &ChannelValue)> = updates
        .iter()
        .map(|u| (u.channel_key.as_str(), &u.value))
        .collect();
    assert_eq!(
        values,
        vec![
            ("On", &ChannelValue::Bool(true)),
            (
                "Position",
                &ChannelValue::Point {
                    latitude: 50.1,
                    longitude: -1.2
                }
            ),
            ("Status", &ChannelValue::Text("ok".to_string())),
            ("Voltage", &ChannelValue::Number(12.5)),
        ]
    );
    assert!(updates.iter().all(|u| u.device_key == "DC.0"));

    Ok(())
}
