use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::macros::{impl_serialize_as_empty_map, impl_smp_request};

/// [List of Groups](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_groups/smp_group_2.html#list-of-groups) command
#[derive(Debug, Default, Eq, PartialEq)]
pub struct StatGroupList;
impl_serialize_as_empty_map!(StatGroupList);

/// Response for [`StatGroupList`] command
#[derive(Debug, Deserialize, Eq, PartialEq)]
pub struct StatGroupListResponse {
    /// names of statistic groups registered on the device
    pub stat_list: Vec<String>,
}

impl_smp_request!((read, MGMT_GROUP_ID_STAT, 1): StatGroupList => StatGroupListResponse);

/// [Group Data](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_groups/smp_group_2.html#group-data) command
#[derive(Debug, Serialize, Eq, PartialEq)]
pub struct StatGroupData<'a> {
    /// name of the statistic group to read
    pub name: &'a str,
}

/// Response for [`StatGroupData`] command
#[derive(Debug, Deserialize, Eq, PartialEq)]
pub struct StatGroupDataResponse {
    /// name of the statistic group that was read
    pub name: String,
    /// counter name to current value, in registration order
    pub fields: BTreeMap<String, u64>,
}

impl_smp_request!((read, MGMT_GROUP_ID_STAT, 0): StatGroupData<'_> => StatGroupDataResponse);
