use serde::{Deserialize, Serialize};

use super::macros::{
    impl_deserialize_from_empty_map_and_into_unit, impl_serialize_as_empty_map, impl_smp_request,
};

/// [Read Setting](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_groups/smp_group_3.html#read-setting) command
#[derive(Debug, Serialize, Eq, PartialEq)]
pub struct ReadSetting<'a> {
    /// fully qualified name of the setting, e.g. `"bt/id"`
    pub name: &'a str,
    /// maximum number of bytes to read back, when the setting is larger than a single SMP frame can carry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
}

/// Response for [`ReadSetting`] command
#[derive(Debug, Deserialize, Eq, PartialEq)]
pub struct ReadSettingResponse {
    /// raw value currently stored for the setting
    #[serde(with = "serde_bytes")]
    pub val: Vec<u8>,
    /// total size of the value, present when it was truncated by `max_size`
    #[serde(default)]
    pub max_size: Option<u64>,
}

impl_smp_request!((read, MGMT_GROUP_ID_SETTINGS, 0): ReadSetting<'_> => ReadSettingResponse);

/// [Write Setting](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_groups/smp_group_3.html#write-setting) command
#[derive(Debug, Serialize, Eq, PartialEq)]
pub struct WriteSetting<'a> {
    /// fully qualified name of the setting to write
    pub name: &'a str,
    /// raw value to store
    #[serde(with = "serde_bytes")]
    pub val: &'a [u8],
}

/// Response for [`WriteSetting`] command
#[derive(Default, Debug, Eq, PartialEq)]
pub struct WriteSettingResponse;
impl_deserialize_from_empty_map_and_into_unit!(WriteSettingResponse);

impl_smp_request!((write, MGMT_GROUP_ID_SETTINGS, 1): WriteSetting<'_> => WriteSettingResponse);

/// [Save Settings](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_groups/smp_group_3.html#save-settings) command
///
/// Persists the in-memory settings tree to the backing store (flash, EEPROM, ...).
#[derive(Debug, Eq, PartialEq)]
pub struct SaveSettings;
impl_serialize_as_empty_map!(SaveSettings);

/// Response for [`SaveSettings`] command
#[derive(Default, Debug, Eq, PartialEq)]
pub struct SaveSettingsResponse;
impl_deserialize_from_empty_map_and_into_unit!(SaveSettingsResponse);

impl_smp_request!((write, MGMT_GROUP_ID_SETTINGS, 4): SaveSettings => SaveSettingsResponse);

#[cfg(test)]
mod tests {
    use super::super::macros::command_encode_decode_test;
    use super::*;
    use ciborium::cbor;

    command_encode_decode_test! {
        read_setting_without_max_size,
        (0, 3, 0),
        ReadSetting{ name: "bt/id", max_size: None },
        cbor!({
            "name" => "bt/id"
        }),
        cbor!({
            "val" => b"\x01\x02\x03\x04"
        }),
        ReadSettingResponse{
            val: vec![1, 2, 3, 4],
            max_size: None,
        },
    }

    command_encode_decode_test! {
        read_setting_with_max_size,
        (0, 3, 0),
        ReadSetting{ name: "bt/id", max_size: Some(16) },
        cbor!({
            "name" => "bt/id",
            "max_size" => 16
        }),
        cbor!({
            "val" => b"\x01\x02",
            "max_size" => 16
        }),
        ReadSettingResponse{
            val: vec![1, 2],
            max_size: Some(16),
        },
    }

    command_encode_decode_test! {
        write_setting,
        (2, 3, 1),
        WriteSetting{ name: "bt/id", val: &[1, 2, 3, 4] },
        cbor!({
            "name" => "bt/id",
            "val" => b"\x01\x02\x03\x04"
        }),
        cbor!({}),
        WriteSettingResponse,
    }

    command_encode_decode_test! {
        save_settings,
        (2, 3, 4),
        SaveSettings,
        cbor!({}),
        cbor!({}),
        SaveSettingsResponse,
    }
}
