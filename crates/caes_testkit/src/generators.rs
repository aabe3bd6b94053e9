//! Property-based test generators using proptest.

use caes_model::{Payload, RecordId, Timestamp, Value};
use proptest::prelude::*;

/// Strategy for generating record ids.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    prop::array::uniform16(any::<u8>()).prop_map(RecordId::from_bytes)
}

/// Strategy for generating plausible epoch-second timestamps.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    1_000_000_000i64..2_000_000_000i64
}

/// Strategy for generating field names.
///
/// Never yields `did` or `timestamp`, the default id and timestamp fields,
/// which adapters strip from payloads.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}")
        .expect("Invalid regex")
        .prop_filter("reserved field name", |name| name != "did" && name != "timestamp")
}

/// Strategy for generating scalar field values.
///
/// Floats are kept finite so they survive a JSON round trip.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e6f64..1.0e6f64).prop_map(Value::Float),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Text),
    ]
}

/// Strategy for generating payloads.
pub fn payload_strategy() -> impl Strategy<Value = Payload> {
    prop::collection::btree_map(field_name_strategy(), value_strategy(), 1..6)
}
