//! [MCUmgr command group](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_protocol.html#specifications-of-management-groups-supported-by-zephyr) definitions.

/// [Config/settings management](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_groups/smp_group_3.html) group commands
pub mod config;
/// [File management](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_groups/smp_group_8.html) group commands
pub mod fs;
/// [Application/software image management](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_groups/smp_group_1.html) group commands
pub mod image;
pub(crate) mod macros;
/// [Default/OS management](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_groups/smp_group_0.html) group commands
pub mod os;
/// [Shell management](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_groups/smp_group_9.html) group commands
pub mod shell;
/// [Statistics management](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_groups/smp_group_2.html) group commands
pub mod stat;
/// [Zephyr management](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_groups/smp_group_63.html) group commands
pub mod zephyr;

use std::io::Write;

use serde::{Deserialize, Serialize};

/// SMP version 2 group based error message
#[derive(Debug, Deserialize, Eq, PartialEq)]
pub struct ErrResponseV2 {
    /// group of the group-based error code
    pub group: u16,
    /// contains the index of the group-based error code
    pub rc: i32,
}

/// [SMP error message](https://docs.zephyrproject.org/latest/services/device_mgmt/smp_protocol.html#minimal-response-smp-data)
#[derive(Debug, Deserialize, Eq, PartialEq)]
pub struct ErrResponse {
    /// SMP version 1 error code
    pub rc: Option<i32>,
    /// SMP version 1 error string
    pub rsn: Option<String>,
    /// SMP version 2 error message
    pub err: Option<ErrResponseV2>,
}

/// A single CBOR-encodable SMP command, dispatched through
/// [`Connection::request`](crate::connection::Connection::request).
pub trait SmpRequest: Serialize {
    /// the response type of the command
    type Response: for<'a> Deserialize<'a>;
    /// whether this command is a read or write operation
    const WRITE_OPERATION: bool;
    /// the group ID of the command
    const GROUP_ID: u16;
    /// the command ID
    const COMMAND_ID: u8;
}

/// Checks if a value is the default value
pub(crate) fn is_default<T: Default + PartialEq>(val: &T) -> bool {
    val == &T::default()
}

/// A [`Write`] sink that only counts bytes, used to measure the CBOR
/// encoding size of a request without allocating the encoded bytes.
pub(crate) struct CountingWriter {
    pub bytes_written: usize,
}

impl CountingWriter {
    pub(crate) fn new() -> Self {
        Self { bytes_written: 0 }
    }
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes_written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Builds the `std::io::Error` returned when a chunk-size calculation
/// cannot fit any payload bytes within the given frame size.
pub(crate) fn data_too_large_error() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        "SMP frame size is too small to carry any payload bytes",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::cbor;

    #[test]
    fn decode_error_none() {
        let mut cbor_data = vec![];
        ciborium::into_writer(
            &cbor!({
                "foo" => 42,
            })
            .unwrap(),
            &mut cbor_data,
        )
        .unwrap();
        let err: ErrResponse = ciborium::from_reader(cbor_data.as_slice()).unwrap();
        assert_eq!(
            err,
            ErrResponse {
                rc: None,
                rsn: None,
                err: None,
            }
        );
    }

    #[test]
    fn decode_error_v1() {
        let mut cbor_data = vec![];
        ciborium::into_writer(
            &cbor!({
                "rc" => 10,
            })
            .unwrap(),
            &mut cbor_data,
        )
        .unwrap();
        let err: ErrResponse = ciborium::from_reader(cbor_data.as_slice()).unwrap();
        assert_eq!(
            err,
            ErrResponse {
                rc: Some(10),
                rsn: None,
                err: None,
            }
        );
    }

    #[test]
    fn decode_error_v1_with_msg() {
        let mut cbor_data = vec![];
        ciborium::into_writer(
            &cbor!({
                "rc" => 1,
                "rsn" => "Test Reason!",
            })
            .unwrap(),
            &mut cbor_data,
        )
        .unwrap();
        let err: ErrResponse = ciborium::from_reader(cbor_data.as_slice()).unwrap();
        assert_eq!(
            err,
            ErrResponse {
                rc: Some(1),
                rsn: Some("Test Reason!".to_string()),
                err: None,
            }
        );
    }

    #[test]
    fn decode_error_v2() {
        let mut cbor_data = vec![];
        ciborium::into_writer(
            &cbor!({
                "err" => {
                    "group" => 4,
                    "rc" => 20,
                }
            })
            .unwrap(),
            &mut cbor_data,
        )
        .unwrap();
        let err: ErrResponse = ciborium::from_reader(cbor_data.as_slice()).unwrap();
        assert_eq!(
            err,
            ErrResponse {
                rc: None,
                rsn: None,
                err: Some(ErrResponseV2 { group: 4, rc: 20 })
            }
        );
    }

    #[test]
    fn is_default() {
        assert!(super::is_default(&0));
        assert!(!super::is_default(&5));
    }

    #[test]
    fn counting_writer_counts_bytes() {
        let mut w = CountingWriter::new();
        w.write_all(&[1, 2, 3]).unwrap();
        w.write_all(&[4, 5]).unwrap();
        assert_eq!(w.bytes_written, 5);
    }
}
