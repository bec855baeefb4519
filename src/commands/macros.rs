//! Boilerplate generators shared by the per-group command modules.

/// Implements [`Serialize`](serde::Serialize) for a unit-like request struct
/// as an empty CBOR map, for commands that carry no request payload.
macro_rules! impl_serialize_as_empty_map {
    ($ty:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                use serde::ser::SerializeMap;
                serializer.serialize_map(Some(0))?.end()
            }
        }
    };
}

/// Implements [`Deserialize`](serde::Deserialize) for a unit-like response
/// struct, accepting and discarding whatever map the device replies with.
macro_rules! impl_deserialize_from_empty_map_and_into_unit {
    ($ty:ty) => {
        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                #[derive(serde::Deserialize)]
                struct Empty {}
                Empty::deserialize(deserializer)?;
                Ok(<$ty>::default())
            }
        }
    };
}

/// Implements [`SmpRequest`](super::SmpRequest) for a request/response pair,
/// recording the operation kind and the group/command ids it is dispatched
/// under.
macro_rules! impl_smp_request {
    (($op:ident, $group:ident, $command:literal): $req:ty => $resp:ty) => {
        impl $crate::commands::SmpRequest for $req {
            type Response = $resp;
            const WRITE_OPERATION: bool = impl_smp_request!(@op $op);
            const GROUP_ID: u16 = $crate::MCUmgrGroup::$group as u16;
            const COMMAND_ID: u8 = $command;
        }
    };
    (@op read) => {
        false
    };
    (@op write) => {
        true
    };
}

/// Builds a test that CBOR-encodes a request and compares it against an
/// expected CBOR value, then CBOR-decodes a response value into the
/// response type and compares it against an expected Rust value.
macro_rules! command_encode_decode_test {
    (
        $name:ident,
        ($op:expr, $group:expr, $command:expr),
        $request:expr,
        $expected_request_cbor:expr,
        $response_cbor:expr,
        $expected_response:expr $(,)?
    ) => {
        #[test]
        fn $name() {
            let request = $request;

            fn wiring<R: $crate::commands::SmpRequest>(_request: &R) -> (u8, u16, u8) {
                let op = if R::WRITE_OPERATION {
                    $crate::header::op::WRITE
                } else {
                    $crate::header::op::READ
                };
                (op, R::GROUP_ID, R::COMMAND_ID)
            }
            assert_eq!(($op, $group, $command), wiring(&request));

            let mut encoded = Vec::new();
            ciborium::into_writer(&request, &mut encoded).unwrap();

            let mut expected = Vec::new();
            ciborium::into_writer(&$expected_request_cbor.unwrap(), &mut expected).unwrap();
            assert_eq!(encoded, expected);

            let mut response_bytes = Vec::new();
            ciborium::into_writer(&$response_cbor.unwrap(), &mut response_bytes).unwrap();

            fn decode<R: $crate::commands::SmpRequest>(_request: &R, bytes: &[u8]) -> R::Response {
                ciborium::from_reader(bytes).unwrap()
            }
            let decoded = decode(&request, response_bytes.as_slice());
            assert_eq!(decoded, $expected_response);
        }
    };
}

pub(crate) use command_encode_decode_test;
pub(crate) use impl_deserialize_from_empty_map_and_into_unit;
pub(crate) use impl_serialize_as_empty_map;
pub(crate) use impl_smp_request;
