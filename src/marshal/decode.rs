//! Tag-directed deserialization.
//!
//! No descriptor on this path: the wire tag alone decides reconstruction.
//! Only the tags callers send are accepted - `int` (hex escape), `array`,
//! and `union` are encode-only and fail here by design.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::value::Value;

use super::Marshaler;

pub(super) fn decode(m: &Marshaler, wire: &Json) -> Result<Value> {
    match wire {
        Json::Null => Ok(Value::none()),
        Json::Bool(b) => Ok(Value::bool(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::float(f))
            } else {
                Err(Error::marshal(format!("unrepresentable number: {}", n)))
            }
        }
        Json::String(s) => Ok(Value::str(s.clone())),
        Json::Array(items) => {
            let decoded: Result<Vec<Value>> = items.iter().map(|x| decode(m, x)).collect();
            Ok(Value::list(decoded?))
        }
        Json::Object(obj) => {
            let tag = obj
                .get("type")
                .and_then(Json::as_str)
                .ok_or_else(|| Error::marshal("wire object has no type tag"))?;
            match tag {
                "list" => Ok(Value::list(decode_items(m, obj)?)),
                "tuple" => Ok(Value::tuple(decode_items(m, obj)?)),
                "set" => Ok(Value::set(decode_items(m, obj)?)),
                "dict" => {
                    let val = tagged_val(obj)?;
                    let pairs = val
                        .as_array()
                        .ok_or_else(|| Error::marshal("dict val must be an array of pairs"))?;
                    let mut out = Vec::with_capacity(pairs.len());
                    for pair in pairs {
                        match pair.as_array().map(Vec::as_slice) {
                            Some([k, v]) => out.push((decode(m, k)?, decode(m, v)?)),
                            _ => {
                                return Err(Error::marshal(
                                    "dict entry must be a [key, value] pair",
                                ))
                            }
                        }
                    }
                    Ok(Value::dict(out))
                }
                "bytes" => {
                    let val = tagged_val(obj)?;
                    let text = val
                        .as_str()
                        .ok_or_else(|| Error::marshal("bytes val must be a base64 string"))?;
                    let data = BASE64
                        .decode(text)
                        .map_err(|e| Error::marshal(format!("bad base64 payload: {}", e)))?;
                    Ok(Value::bytes(data))
                }
                "ref" => {
                    let val = tagged_val(obj)?;
                    let handle = val
                        .as_str()
                        .ok_or_else(|| Error::marshal("ref val must be a handle string"))?;
                    m.refs.lookup(handle)
                }
                other => Err(Error::marshal(format!("unhandled wire tag: {}", other))),
            }
        }
    }
}

fn tagged_val<'a>(obj: &'a serde_json::Map<String, Json>) -> Result<&'a Json> {
    obj.get("val")
        .ok_or_else(|| Error::marshal("wire object has no val field"))
}

fn decode_items(m: &Marshaler, obj: &serde_json::Map<String, Json>) -> Result<Vec<Value>> {
    let val = tagged_val(obj)?;
    let items = val
        .as_array()
        .ok_or_else(|| Error::marshal("container val must be an array"))?;
    items.iter().map(|x| decode(m, x)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::Format;
    use crate::value::Repr;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn primitives_round_trip_through_any() {
        let mut m = Marshaler::new();
        for v in [
            Value::none(),
            Value::bool(false),
            Value::int((1 << 30) - 1),
            Value::int(-5),
            Value::float(2.25),
            Value::str("héllo"),
        ] {
            let wire = m.encode(&v, &Format::Any).unwrap();
            assert_eq!(m.decode(&wire).unwrap(), v);
        }
    }

    #[test]
    fn containers_round_trip_through_any() {
        let mut m = Marshaler::new();
        let v = Value::list(vec![
            Value::int(1),
            Value::tuple(vec![Value::int(2), Value::int(3)]),
            Value::dict(vec![(Value::str("k"), Value::int(4))]),
            Value::set(vec![Value::int(5), Value::int(6)]),
            Value::bytes(vec![0, 1, 2]),
        ]);
        let wire = m.encode(&v, &Format::Any).unwrap();
        assert_eq!(m.decode(&wire).unwrap(), v);
    }

    #[test]
    fn plain_json_arrays_decode_as_lists() {
        let m = Marshaler::new();
        let v = m.decode(&json!([1, "x", null])).unwrap();
        assert_eq!(
            v,
            Value::list(vec![Value::int(1), Value::str("x"), Value::none()])
        );
    }

    #[test]
    fn hex_int_escape_is_not_reversed() {
        // Deliberate asymmetry: the encode-only tags fail on decode.
        let m = Marshaler::new();
        let err = m
            .decode(&json!({"type": "int", "val": "0x40000000"}))
            .unwrap_err();
        assert!(err.to_string().contains("unhandled wire tag"), "{}", err);
        assert!(m.decode(&json!({"type": "array", "val": []})).is_err());
        assert!(m.decode(&json!({"type": "union", "val": []})).is_err());
    }

    #[test]
    fn ref_decodes_to_the_identical_value() {
        let mut m = Marshaler::new();
        let original = Value::list(vec![Value::int(1)]);
        let wire = m.encode(&original, &Format::Ref).unwrap();
        let back = m.decode(&wire).unwrap();
        assert_eq!(back.identity(), original.identity());
    }

    #[test]
    fn unknown_ref_fails() {
        let m = Marshaler::new();
        let err = m
            .decode(&json!({"type": "ref", "val": "h00000099"}))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownReference(_)));
    }

    #[test]
    fn decoded_floats_and_ints_split_on_integrality() {
        let m = Marshaler::new();
        assert!(matches!(m.decode(&json!(3)).unwrap().repr_ref(), Repr::Int(3)));
        assert!(matches!(
            m.decode(&json!(3.5)).unwrap().repr_ref(),
            Repr::Float(_)
        ));
    }
}
