use serde::{Deserialize, Serialize};

use super::macros::impl_smp_request;

/// [Shell command line execute](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_groups/smp_group_9.html#shell-command-line-execute) command
#[derive(Debug, Serialize)]
pub struct ShellCommandLineExecute<'a> {
    /// array consisting of strings representing command and its arguments
    pub argv: &'a [String],
}

/// Response for [`ShellCommandLineExecute`] command
#[derive(Debug, Deserialize, Eq, PartialEq)]
pub struct ShellCommandLineExecuteResponse {
    /// command output
    pub o: String,
    /// return code from shell command execution
    pub ret: i32,
}

impl_smp_request!((write, MGMT_GROUP_ID_SHELL, 0): ShellCommandLineExecute<'_> => ShellCommandLineExecuteResponse);
