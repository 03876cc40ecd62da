use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FactoryMetadata {
    #[serde(default, rename = "RTFirmwareVersion")]
    pub rt_firmware_version: String,
    #[serde(default, rename = "MenderArtifactInfo")]
    pub mender_artifact_info: String,
    #[serde(default, rename = "SerialNumber")]
    pub serial_number: String,
    #[serde(default, rename = "RTSerialNumber")]
    pub rt_serial_number: String,
    #[serde(default, rename = "ProductId")]
    pub product_id: u32,
}
