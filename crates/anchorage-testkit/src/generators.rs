//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Number, Value};

use anchorage_core::{DeviceKeypair, SensorData};

/// A valid device signing key.
pub fn device_keypair() -> impl Strategy<Value = DeviceKeypair> {
    any::<[u8; 32]>().prop_filter_map("not a valid scalar", |seed| {
        DeviceKeypair::from_seed(&seed).ok()
    })
}

/// A payload key: short field names, occasionally with non-ASCII or escapes.
pub fn field_name() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-z_]{1,12}",
        1 => "[A-Za-z0-9\"\\\\é°µ]{1,8}",
    ]
}

/// A finite JSON number, integer or float.
pub fn number() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        any::<u64>().prop_map(|n| Value::Number(n.into())),
        (-1.0e9f64..1.0e9f64).prop_filter_map("finite", |f| Number::from_f64(f).map(Value::Number)),
    ]
}

/// A scalar sensor reading.
pub fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        number(),
        "[ -~\n\t]{0,16}".prop_map(Value::String),
    ]
}

/// Any JSON value up to a small nesting depth.
pub fn value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name(), inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// A sensor payload with up to `max_fields` top-level entries.
pub fn sensor_data(max_fields: usize) -> impl Strategy<Value = SensorData> {
    prop::collection::btree_map(field_name(), value(), 0..=max_fields)
        .prop_map(|m| m.into_iter().collect())
}

/// A payload together with the same entries in reversed insertion order.
pub fn reordered_pair(max_fields: usize) -> impl Strategy<Value = (SensorData, SensorData)> {
    prop::collection::vec((field_name(), value()), 0..=max_fields).prop_map(|entries| {
        let forward: SensorData = entries.iter().cloned().collect();
        // Later duplicates win in `forward`; keep the same winner in reverse.
        let reversed: SensorData = forward
            .iter()
            .rev()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        (forward, reversed)
    })
}
