//! Conversion between native values and store wire values
//!
//! Both directions are recursive over lists and maps. Mappings:
//!
//! | native                 | wire                                    |
//! |------------------------|-----------------------------------------|
//! | `Timestamp(DateTime)`  | `DateTime { seconds, nanoseconds, 0 }`  |
//! | `BigInt(i128)`         | `Integer(i64)` (out of range is an error) |
//! | `Number(f64)`          | `Float(f64)`                            |
//! | `Node` / `Relationship`| `Node` / `Relationship`                 |
//! | `Opaque`               | `Opaque` (passed through unchanged)     |
//!
//! Everything else maps to the variant of the same name.

use chrono::{DateTime, Utc};

use crate::driver::{WireDateTime, WireEdge, WireMap, WireNode, WireValue};
use crate::error::{MapperError, Result};

use super::{EdgeValue, NodeValue, PropertyMap, Value};

/// Convert a native value into the store's value system
pub fn to_wire(value: &Value) -> Result<WireValue> {
    Ok(match value {
        Value::Null => WireValue::Null,
        Value::Bool(b) => WireValue::Bool(*b),
        Value::Number(n) => WireValue::Float(*n),
        Value::BigInt(i) => WireValue::Integer(i64::try_from(*i).map_err(|_| {
            MapperError::Conversion(format!("integer {} does not fit the store's 64-bit integer", i))
        })?),
        Value::String(s) => WireValue::String(s.clone()),
        Value::Timestamp(t) => WireValue::DateTime(timestamp_to_wire(t)),
        Value::List(items) => WireValue::List(items.iter().map(to_wire).collect::<Result<_>>()?),
        Value::Map(map) => WireValue::Map(map_to_wire(map)?),
        Value::Node(node) => WireValue::Node(WireNode {
            labels: node.labels.clone(),
            properties: map_to_wire(&node.properties)?,
        }),
        Value::Relationship(edge) => WireValue::Relationship(WireEdge {
            rel_type: edge.rel_type.clone(),
            properties: map_to_wire(&edge.properties)?,
        }),
        Value::Opaque(opaque) => WireValue::Opaque(opaque.clone()),
    })
}

/// Convert a store value into its native form
pub fn from_wire(value: WireValue) -> Result<Value> {
    Ok(match value {
        WireValue::Null => Value::Null,
        WireValue::Bool(b) => Value::Bool(b),
        WireValue::Integer(i) => Value::BigInt(i128::from(i)),
        WireValue::Float(n) => Value::Number(n),
        WireValue::String(s) => Value::String(s),
        WireValue::DateTime(dt) => Value::Timestamp(timestamp_from_wire(dt)?),
        WireValue::List(items) => {
            Value::List(items.into_iter().map(from_wire).collect::<Result<_>>()?)
        }
        WireValue::Map(map) => Value::Map(map_from_wire(map)?),
        WireValue::Node(node) => Value::Node(NodeValue {
            labels: node.labels,
            properties: map_from_wire(node.properties)?,
        }),
        WireValue::Relationship(edge) => Value::Relationship(EdgeValue {
            rel_type: edge.rel_type,
            properties: map_from_wire(edge.properties)?,
        }),
        WireValue::Opaque(opaque) => Value::Opaque(opaque),
    })
}

pub fn map_to_wire(map: &PropertyMap) -> Result<WireMap> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), to_wire(value)?)))
        .collect()
}

pub fn map_from_wire(map: WireMap) -> Result<PropertyMap> {
    map.into_iter()
        .map(|(key, value)| Ok((key, from_wire(value)?)))
        .collect()
}

fn timestamp_to_wire(t: &DateTime<Utc>) -> WireDateTime {
    WireDateTime {
        seconds: t.timestamp(),
        nanoseconds: t.timestamp_subsec_nanos(),
        offset_seconds: 0,
    }
}

// `seconds` is already UTC, so the offset only affects presentation.
fn timestamp_from_wire(dt: WireDateTime) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.seconds, dt.nanoseconds).ok_or_else(|| {
        MapperError::Conversion(format!(
            "timestamp {}s {}ns is outside the representable range",
            dt.seconds, dt.nanoseconds
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 5, 17, 8, 30, 15).unwrap()
            + chrono::Duration::nanoseconds(123_456_789)
    }

    fn nested_sample() -> Value {
        let inner = crate::props! {
            "a" => 1,
            "b" => "2",
            "c" => true,
            "d" => sample_time(),
            "e" => Value::BigInt(123),
            "f" => vec![1, 2, 3],
            "g" => PropertyMap::new(),
        };
        let mut outer = inner.clone();
        outer.insert("g".into(), Value::Map(inner));
        Value::Map(outer)
    }

    #[test]
    fn test_to_wire_nested() {
        let wire = to_wire(&nested_sample()).unwrap();
        let WireValue::Map(map) = wire else { panic!("expected map") };

        assert_eq!(map["a"], WireValue::Integer(1));
        assert_eq!(map["b"], WireValue::String("2".into()));
        assert!(matches!(map["d"], WireValue::DateTime(_)));
        assert_eq!(map["e"], WireValue::Integer(123));
        assert_eq!(
            map["f"],
            WireValue::List(vec![WireValue::Integer(1), WireValue::Integer(2), WireValue::Integer(3)])
        );

        let WireValue::Map(inner) = &map["g"] else { panic!("expected nested map") };
        assert!(matches!(inner["d"], WireValue::DateTime(_)));
        assert_eq!(inner["g"], WireValue::Map(WireMap::new()));
    }

    #[test]
    fn test_round_trip_nested() {
        let value = nested_sample();
        assert_eq!(from_wire(to_wire(&value).unwrap()).unwrap(), value);
    }

    #[test]
    fn test_round_trip_timestamps() {
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let before_epoch = Utc.with_ymd_and_hms(1912, 6, 23, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(1);
        for t in [epoch, before_epoch, sample_time()] {
            let value = Value::Timestamp(t);
            assert_eq!(from_wire(to_wire(&value).unwrap()).unwrap(), value);
        }
    }

    #[test]
    fn test_round_trip_integers() {
        for i in [0i128, 1, -1, i64::MAX as i128, i64::MIN as i128, 12345] {
            let value = Value::BigInt(i);
            assert_eq!(from_wire(to_wire(&value).unwrap()).unwrap(), value);
        }
    }

    #[test]
    fn test_out_of_range_integer_fails() {
        let too_big = Value::BigInt(i128::from(i64::MAX) + 1);
        assert!(matches!(to_wire(&too_big), Err(MapperError::Conversion(_))));

        let nested = Value::List(vec![Value::BigInt(i128::from(i64::MIN) - 1)]);
        assert!(matches!(to_wire(&nested), Err(MapperError::Conversion(_))));
    }

    #[test]
    fn test_offset_timestamp_decodes_same_instant() {
        let t = sample_time();
        let wire = WireValue::DateTime(WireDateTime {
            seconds: t.timestamp(),
            nanoseconds: t.timestamp_subsec_nanos(),
            offset_seconds: 3600,
        });
        assert_eq!(from_wire(wire).unwrap(), Value::Timestamp(t));
    }

    #[test]
    fn test_invalid_wire_timestamp_fails() {
        let wire = WireValue::DateTime(WireDateTime {
            seconds: i64::MAX,
            nanoseconds: 0,
            offset_seconds: 0,
        });
        assert!(matches!(from_wire(wire), Err(MapperError::Conversion(_))));
    }

    #[test]
    fn test_opaque_values_pass_through() {
        let point = crate::driver::OpaqueValue::new("Point2D", (4326_i64, 13.4_f64, 52.5_f64));
        let wire = WireValue::Map(
            [
                ("at".to_string(), WireValue::Opaque(point.clone())),
                ("name".to_string(), WireValue::from("office")),
            ]
            .into_iter()
            .collect(),
        );

        let native = from_wire(wire.clone()).unwrap();
        let Value::Map(map) = &native else { panic!("expected map") };
        let opaque = map["at"].as_opaque().unwrap();
        assert_eq!(opaque.type_name(), "Point2D");
        assert_eq!(opaque.downcast_ref::<(i64, f64, f64)>(), Some(&(4326, 13.4, 52.5)));

        assert_eq!(to_wire(&native).unwrap(), wire);
    }

    #[test]
    fn test_node_cells_convert_properties() {
        let wire = WireValue::Node(WireNode {
            labels: vec!["User".into()],
            properties: [("size".to_string(), WireValue::Integer(12345))].into_iter().collect(),
        });
        let Value::Node(node) = from_wire(wire).unwrap() else { panic!("expected node") };
        assert_eq!(node.labels, vec!["User".to_string()]);
        assert_eq!(node.properties["size"], Value::BigInt(12345));
    }
}
