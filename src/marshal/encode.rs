//! Format-directed serialization.
//!
//! The `any` path dispatches on the runtime type through a fixed-priority
//! rule table, then through three array strategies, and finally wraps the
//! value as an opaque reference. Both tables are plain data so the
//! priority order is inspectable and testable rather than implicit
//! control flow.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value as Json};

use crate::error::{Error, Result};
use crate::value::{hex_int, ElemType, NdArray, Repr, Value};

use super::format::Format;
use super::Marshaler;

/// Integers at or beyond this magnitude are carried as hex strings to
/// avoid precision loss in hosts with double-width numbers.
const BIG_INT: i64 = 1 << 30;

type Predicate = fn(&Value) -> bool;
type Handler = fn(&mut Marshaler, &Value) -> Result<Json>;

/// Fixed priority order for `any` dispatch. The order is a wire contract:
/// identical runtime values must always marshal identically.
pub(crate) const ANY_RULES: &[(&str, Predicate, Handler)] = &[
    ("none", |v| matches!(v.repr_ref(), Repr::None), |_, _| Ok(Json::Null)),
    ("bool", |v| matches!(v.repr_ref(), Repr::Bool(_)), enc_bool),
    ("str", |v| matches!(v.repr_ref(), Repr::Str(_)), enc_str),
    ("int", |v| matches!(v.repr_ref(), Repr::Int(_)), enc_int_any),
    ("float", |v| matches!(v.repr_ref(), Repr::Float(_)), enc_float),
    ("list", |v| matches!(v.repr_ref(), Repr::List(_)), enc_list),
    ("tuple", |v| matches!(v.repr_ref(), Repr::Tuple(_)), enc_tuple),
    ("dict", |v| matches!(v.repr_ref(), Repr::Dict(_)), enc_dict),
    ("set", |v| matches!(v.repr_ref(), Repr::Set(_)), enc_set),
    ("bytes", |v| matches!(v.repr_ref(), Repr::Bytes(_)), enc_bytes_tagged),
];

/// Ordered fallback strategies for values no `any` rule claims. First
/// non-failing strategy wins.
pub(crate) const ARRAY_STRATEGIES: &[(&str, Handler)] = &[
    ("ndarray", strategy_ndarray),
    ("buffer", strategy_buffer),
    ("nested", strategy_nested),
];

pub(super) fn encode(m: &mut Marshaler, value: &Value, format: &Format) -> Result<Json> {
    match format {
        Format::Any => encode_any(m, value),
        Format::None => match value.repr_ref() {
            Repr::None => Ok(Json::Null),
            _ => Err(expecting("none", value)),
        },
        Format::Bool => match value.repr_ref() {
            Repr::Bool(b) => Ok(json!(b)),
            _ => Err(expecting("a bool", value)),
        },
        Format::Int => match value.repr_ref() {
            Repr::Int(v) => {
                if v.unsigned_abs() < BIG_INT as u64 {
                    Ok(json!(v))
                } else {
                    // Bare hex string under the explicit int descriptor.
                    Ok(json!(hex_int(*v)))
                }
            }
            Repr::Bool(b) => Ok(json!(*b as i64)),
            _ => Err(expecting("an int", value)),
        },
        Format::Float => match value.repr_ref() {
            Repr::Float(v) => float_json(*v),
            Repr::Int(v) => float_json(*v as f64),
            Repr::Bool(b) => float_json(*b as i64 as f64),
            _ => Err(expecting("a float", value)),
        },
        Format::Str => match value.repr_ref() {
            Repr::Str(s) => Ok(json!(s)),
            _ => Err(expecting("a str", value)),
        },
        Format::Bytes => match value.repr_ref() {
            Repr::Bytes(b) => Ok(json!(BASE64.encode(b))),
            _ => Err(expecting("bytes", value)),
        },
        Format::Buffer => match value.repr_ref() {
            Repr::Array(arr) => Ok(buffer_json(arr)),
            Repr::Bytes(b) => {
                let arr = NdArray::new(ElemType::U8, vec![b.len()], b.clone())
                    .map_err(Error::Marshal)?;
                Ok(buffer_json(&arr))
            }
            _ => Err(expecting("a buffer-exposing value", value)),
        },
        Format::Ref => Ok(ref_json(m, value)),
        Format::Tuple => {
            let items = value
                .seq_items()
                .ok_or_else(|| expecting("a sequence", value))?;
            let encoded = collect_encoded(m, &items, &Format::Any)?;
            Ok(Json::Array(encoded))
        }
        Format::Array { elem, ndim } => encode_array(m, value, elem, *ndim),
        Format::TupleOf(formats) => {
            let items = value
                .seq_items()
                .ok_or_else(|| expecting("a sequence", value))?;
            if items.len() != formats.len() {
                return Err(Error::marshal(format!(
                    "tuple format expects {} elements, value has {}",
                    formats.len(),
                    items.len()
                )));
            }
            let mut out = Vec::with_capacity(items.len());
            for (item, f) in items.iter().zip(formats) {
                out.push(encode(m, item, f)?);
            }
            Ok(Json::Array(out))
        }
        Format::Union(formats) => {
            let mut failures = Vec::new();
            for (idx, f) in formats.iter().enumerate() {
                match encode(m, value, f) {
                    Ok(wire) => return Ok(json!({ "idx": idx, "val": wire })),
                    Err(e) => failures.push(e.to_string()),
                }
            }
            Err(Error::marshal(format!(
                "could not convert: {}",
                failures.join(" / ")
            )))
        }
        Format::Media(mime) => {
            let data = m.media.render(value, mime)?;
            Ok(json!(BASE64.encode(data)))
        }
    }
}

fn encode_any(m: &mut Marshaler, value: &Value) -> Result<Json> {
    for (_, predicate, handler) in ANY_RULES {
        if predicate(value) {
            return handler(m, value);
        }
    }
    let mut failures = Vec::new();
    for (name, strategy) in ARRAY_STRATEGIES {
        match strategy(m, value) {
            Ok(wire) => return Ok(wire),
            Err(e) => failures.push(format!("{}: {}", name, e)),
        }
    }
    tracing::trace!(
        "value of type '{}' wrapped as reference ({})",
        value.type_name(),
        failures.join(" / ")
    );
    Ok(ref_json(m, value))
}

fn encode_array(
    m: &mut Marshaler,
    value: &Value,
    elem: &Format,
    ndim: Option<i64>,
) -> Result<Json> {
    let items = value
        .seq_items()
        .ok_or_else(|| expecting("a sequence", value))?;
    match ndim {
        Option::None | Some(1) => Ok(Json::Array(collect_encoded(m, &items, elem)?)),
        Some(n) if n > 1 => {
            // Rectangularity check at this level; deeper levels recurse.
            let mut width: Option<usize> = Option::None;
            for item in &items {
                let len = item.seq_items().map(|v| v.len());
                match (width, len) {
                    (_, Option::None) => {
                        return Err(expecting("a sequence", item));
                    }
                    (Option::None, Some(l)) => width = Some(l),
                    (Some(w), Some(l)) if w != l => {
                        return Err(Error::marshal("ragged array: row lengths differ"));
                    }
                    _ => {}
                }
            }
            let inner = Format::Array {
                elem: Box::new(elem.clone()),
                ndim: Some(n - 1),
            };
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(encode(m, item, &inner)?);
            }
            Ok(Json::Array(out))
        }
        Some(_) => Err(Error::marshal(
            "cannot serialize iterator to zero dimensions",
        )),
    }
}

fn collect_encoded(m: &mut Marshaler, items: &[Value], f: &Format) -> Result<Vec<Json>> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(encode(m, item, f)?);
    }
    Ok(out)
}

fn expecting(what: &str, value: &Value) -> Error {
    Error::marshal(format!("expecting {}, got '{}'", what, value.type_name()))
}

fn float_json(v: f64) -> Result<Json> {
    serde_json::Number::from_f64(v)
        .map(Json::Number)
        .ok_or_else(|| Error::marshal(format!("cannot serialize non-finite float {}", v)))
}

fn ref_json(m: &mut Marshaler, value: &Value) -> Json {
    json!({ "type": "ref", "val": m.refs.save(value) })
}

fn enc_bool(_: &mut Marshaler, v: &Value) -> Result<Json> {
    match v.repr_ref() {
        Repr::Bool(b) => Ok(json!(b)),
        _ => unreachable!("predicate gated"),
    }
}

fn enc_str(_: &mut Marshaler, v: &Value) -> Result<Json> {
    match v.repr_ref() {
        Repr::Str(s) => Ok(json!(s)),
        _ => unreachable!("predicate gated"),
    }
}

fn enc_int_any(_: &mut Marshaler, v: &Value) -> Result<Json> {
    match v.repr_ref() {
        Repr::Int(n) => {
            if n.unsigned_abs() < BIG_INT as u64 {
                Ok(json!(n))
            } else {
                Ok(json!({ "type": "int", "val": hex_int(*n) }))
            }
        }
        _ => unreachable!("predicate gated"),
    }
}

fn enc_float(_: &mut Marshaler, v: &Value) -> Result<Json> {
    match v.repr_ref() {
        Repr::Float(f) => float_json(*f),
        _ => unreachable!("predicate gated"),
    }
}

fn enc_list(m: &mut Marshaler, v: &Value) -> Result<Json> {
    let items = v.seq_items().expect("predicate gated");
    Ok(json!({ "type": "list", "val": collect_encoded(m, &items, &Format::Any)? }))
}

fn enc_tuple(m: &mut Marshaler, v: &Value) -> Result<Json> {
    let items = v.seq_items().expect("predicate gated");
    Ok(json!({ "type": "tuple", "val": collect_encoded(m, &items, &Format::Any)? }))
}

fn enc_set(m: &mut Marshaler, v: &Value) -> Result<Json> {
    let items = v.seq_items().expect("predicate gated");
    Ok(json!({ "type": "set", "val": collect_encoded(m, &items, &Format::Any)? }))
}

fn enc_dict(m: &mut Marshaler, v: &Value) -> Result<Json> {
    let entries = match v.repr_ref() {
        Repr::Dict(entries) => entries.borrow().clone(),
        _ => unreachable!("predicate gated"),
    };
    let mut out = Vec::with_capacity(entries.len());
    for (k, val) in &entries {
        out.push(Json::Array(vec![
            encode(m, k, &Format::Any)?,
            encode(m, val, &Format::Any)?,
        ]));
    }
    Ok(json!({ "type": "dict", "val": out }))
}

fn enc_bytes_tagged(_: &mut Marshaler, v: &Value) -> Result<Json> {
    match v.repr_ref() {
        Repr::Bytes(b) => Ok(json!({ "type": "bytes", "val": BASE64.encode(b) })),
        _ => unreachable!("predicate gated"),
    }
}

/// Strategy 1: structured homogeneous multi-dimensional arrays.
fn strategy_ndarray(_: &mut Marshaler, v: &Value) -> Result<Json> {
    match v.repr_ref() {
        Repr::Array(arr) => Ok(json!({
            "type": "array",
            "format": arr.elem().code(),
            "ndim": arr.ndim(),
            "shape": arr.shape(),
            "data": BASE64.encode(arr.column_major_bytes()),
        })),
        _ => Err(expecting("a structured array", v)),
    }
}

/// Strategy 2: generic linear-buffer exposure.
fn strategy_buffer(_: &mut Marshaler, v: &Value) -> Result<Json> {
    match v.repr_ref() {
        Repr::Array(arr) => Ok(buffer_json(arr)),
        _ => Err(expecting("a buffer-exposing value", v)),
    }
}

/// Strategy 3: plain nested-sequence fallback.
fn strategy_nested(_: &mut Marshaler, v: &Value) -> Result<Json> {
    match v.repr_ref() {
        Repr::Array(arr) => nested_json(arr),
        _ => Err(expecting("a sequence-convertible value", v)),
    }
}

fn buffer_json(arr: &NdArray) -> Json {
    json!({
        "format": arr.elem().code(),
        "itemsize": arr.itemsize(),
        "nbytes": arr.nbytes(),
        "ndim": arr.ndim(),
        "shape": arr.shape(),
        "data": BASE64.encode(arr.column_major_bytes()),
    })
}

/// Render an array as plain nested JSON lists, row-major.
fn nested_json(arr: &NdArray) -> Result<Json> {
    fn build(
        arr: &NdArray,
        axis: usize,
        offset: &mut usize,
    ) -> Result<Json> {
        if axis == arr.ndim() {
            let isz = arr.itemsize();
            let chunk = &arr.data()[*offset..*offset + isz];
            *offset += isz;
            return scalar_json(arr.elem(), chunk);
        }
        let len = arr.shape()[axis];
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(build(arr, axis + 1, offset)?);
        }
        Ok(Json::Array(out))
    }
    let mut offset = 0usize;
    build(arr, 0, &mut offset)
}

fn scalar_json(elem: ElemType, chunk: &[u8]) -> Result<Json> {
    let j = match elem {
        ElemType::I8 => json!(i8::from_ne_bytes(chunk.try_into().unwrap())),
        ElemType::U8 => json!(u8::from_ne_bytes(chunk.try_into().unwrap())),
        ElemType::I16 => json!(i16::from_ne_bytes(chunk.try_into().unwrap())),
        ElemType::U16 => json!(u16::from_ne_bytes(chunk.try_into().unwrap())),
        ElemType::I32 => json!(i32::from_ne_bytes(chunk.try_into().unwrap())),
        ElemType::U32 => json!(u32::from_ne_bytes(chunk.try_into().unwrap())),
        ElemType::I64 => json!(i64::from_ne_bytes(chunk.try_into().unwrap())),
        ElemType::U64 => json!(u64::from_ne_bytes(chunk.try_into().unwrap())),
        ElemType::Isize => json!(isize::from_ne_bytes(chunk.try_into().unwrap())),
        ElemType::Usize => json!(usize::from_ne_bytes(chunk.try_into().unwrap())),
        ElemType::F32 => {
            return float_json(f32::from_ne_bytes(chunk.try_into().unwrap()) as f64)
        }
        ElemType::F64 => return float_json(f64::from_ne_bytes(chunk.try_into().unwrap())),
        ElemType::Bool => json!(chunk[0] != 0),
        ElemType::F16 | ElemType::C32 | ElemType::C64 | ElemType::C128 => {
            return Err(Error::marshal(format!(
                "cannot render '{}' elements as nested values",
                elem.code()
            )))
        }
    };
    Ok(j)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Builtin;
    use pretty_assertions::assert_eq;

    fn enc(value: &Value, format: &Format) -> Result<Json> {
        Marshaler::new().encode(value, format)
    }

    #[test]
    fn any_priority_order_is_the_wire_contract() {
        let names: Vec<&str> = ANY_RULES.iter().map(|(n, _, _)| *n).collect();
        assert_eq!(
            names,
            vec!["none", "bool", "str", "int", "float", "list", "tuple", "dict", "set", "bytes"]
        );
        let strategies: Vec<&str> = ARRAY_STRATEGIES.iter().map(|(n, _)| *n).collect();
        assert_eq!(strategies, vec!["ndarray", "buffer", "nested"]);
    }

    #[test]
    fn primitives_pass_through_under_any() {
        assert_eq!(enc(&Value::none(), &Format::Any).unwrap(), json!(null));
        assert_eq!(enc(&Value::bool(true), &Format::Any).unwrap(), json!(true));
        assert_eq!(enc(&Value::int(42), &Format::Any).unwrap(), json!(42));
        assert_eq!(enc(&Value::float(1.5), &Format::Any).unwrap(), json!(1.5));
        assert_eq!(enc(&Value::str("x"), &Format::Any).unwrap(), json!("x"));
    }

    #[test]
    fn big_integers_escape_to_hex() {
        let small = Value::int((1 << 30) - 1);
        assert_eq!(enc(&small, &Format::Any).unwrap(), json!((1 << 30) - 1));

        let big = Value::int(1 << 30);
        assert_eq!(
            enc(&big, &Format::Any).unwrap(),
            json!({"type": "int", "val": "0x40000000"})
        );
        // Explicit int descriptor: bare hex string.
        assert_eq!(enc(&big, &Format::Int).unwrap(), json!("0x40000000"));

        let negative = Value::int(-(1 << 31));
        assert_eq!(
            enc(&negative, &Format::Int).unwrap(),
            json!("-0x80000000")
        );
    }

    #[test]
    fn containers_nest_recursively() {
        let v = Value::list(vec![
            Value::int(1),
            Value::tuple(vec![Value::int(2), Value::int(3)]),
            Value::dict(vec![(Value::str("k"), Value::int(4))]),
        ]);
        assert_eq!(
            enc(&v, &Format::Any).unwrap(),
            json!({"type": "list", "val": [
                1,
                {"type": "tuple", "val": [2, 3]},
                {"type": "dict", "val": [["k", 4]]},
            ]})
        );
    }

    #[test]
    fn type_mismatches_fail() {
        assert!(enc(&Value::int(1), &Format::None).is_err());
        assert!(enc(&Value::str("x"), &Format::Int).is_err());
        assert!(enc(&Value::int(1), &Format::Str).is_err());
        assert!(enc(&Value::float(1.0), &Format::Bool).is_err());
    }

    #[test]
    fn union_returns_first_matching_variant() {
        let f = Format::Union(vec![Format::Int, Format::Str]);
        assert_eq!(
            enc(&Value::str("x"), &f).unwrap(),
            json!({"idx": 1, "val": "x"})
        );
        assert_eq!(enc(&Value::int(3), &f).unwrap(), json!({"idx": 0, "val": 3}));
    }

    #[test]
    fn union_aggregates_every_failure() {
        let f = Format::Union(vec![Format::Int, Format::Str]);
        let err = enc(&Value::none(), &f).unwrap_err().to_string();
        assert!(err.contains("could not convert"), "{}", err);
        assert!(err.contains("expecting an int"), "{}", err);
        assert!(err.contains("expecting a str"), "{}", err);
        assert!(err.contains(" / "), "{}", err);
    }

    #[test]
    fn array_descriptor_recurses_and_rejects_ragged() {
        let grid = Value::list(vec![
            Value::list(vec![Value::int(1), Value::int(2), Value::int(3)]),
            Value::list(vec![Value::int(4), Value::int(5), Value::int(6)]),
        ]);
        let f = Format::Array {
            elem: Box::new(Format::Int),
            ndim: Some(2),
        };
        assert_eq!(enc(&grid, &f).unwrap(), json!([[1, 2, 3], [4, 5, 6]]));

        let ragged = Value::list(vec![
            Value::list(vec![Value::int(1), Value::int(2)]),
            Value::list(vec![Value::int(3)]),
        ]);
        assert!(enc(&ragged, &f).is_err());

        let zero = Format::Array {
            elem: Box::new(Format::Int),
            ndim: Some(0),
        };
        assert!(enc(&grid, &zero).is_err());
    }

    #[test]
    fn buffer_payload_is_column_major() {
        let mut data = Vec::new();
        for v in [1i32, 2, 3, 4, 5, 6] {
            data.extend_from_slice(&v.to_ne_bytes());
        }
        let arr = Value::array(NdArray::new(ElemType::I32, vec![2, 3], data).unwrap());
        let wire = enc(&arr, &Format::Buffer).unwrap();
        assert_eq!(wire["format"], json!("i"));
        assert_eq!(wire["itemsize"], json!(4));
        assert_eq!(wire["nbytes"], json!(24));
        assert_eq!(wire["shape"], json!([2, 3]));
        let raw = BASE64.decode(wire["data"].as_str().unwrap()).unwrap();
        let elems: Vec<i32> = raw
            .chunks_exact(4)
            .map(|c| i32::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(elems, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn ndarray_takes_the_structured_strategy_under_any() {
        let mut data = Vec::new();
        for v in [1.0f64, 2.0] {
            data.extend_from_slice(&v.to_ne_bytes());
        }
        let arr = Value::array(NdArray::new(ElemType::F64, vec![2], data).unwrap());
        let wire = enc(&arr, &Format::Any).unwrap();
        assert_eq!(wire["type"], json!("array"));
        assert_eq!(wire["format"], json!("d"));
        assert_eq!(wire["ndim"], json!(1));
    }

    #[test]
    fn unclaimed_values_fall_back_to_references() {
        let mut m = Marshaler::new();
        let v = Value::builtin(Builtin::Print);
        let wire = m.encode(&v, &Format::Any).unwrap();
        assert_eq!(wire["type"], json!("ref"));
        let handle = wire["val"].as_str().unwrap();
        assert_eq!(m.refs.count(handle), Some(1));
    }

    #[test]
    fn identical_values_marshal_identically() {
        let v = Value::set(vec![Value::int(1), Value::int(2)]);
        let mut m = Marshaler::new();
        let a = m.encode(&v, &Format::Any).unwrap();
        let b = m.encode(&v, &Format::Any).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ref_descriptor_wraps_unconditionally() {
        let mut m = Marshaler::new();
        let v = Value::int(5);
        let wire = m.encode(&v, &Format::Ref).unwrap();
        assert_eq!(wire["type"], json!("ref"));
        // Same value again: same handle, bumped count.
        let wire2 = m.encode(&v, &Format::Ref).unwrap();
        assert_eq!(wire, wire2);
        assert_eq!(m.refs.count(wire["val"].as_str().unwrap()), Some(2));
    }

    #[test]
    fn media_descriptor_renders_to_base64_bytes() {
        let mut m = Marshaler::new();
        let v = Value::media(crate::value::MediaBundle::new("image/png", vec![9, 8, 7]));
        let wire = m
            .encode(&v, &Format::Media("image/png".to_string()))
            .unwrap();
        assert_eq!(wire, json!(BASE64.encode([9u8, 8, 7])));
        // No renderer succeeds: marshal error.
        assert!(m
            .encode(&Value::int(1), &Format::Media("image/png".to_string()))
            .is_err());
    }

    #[test]
    fn positional_tuple_formats_apply_per_element() {
        let v = Value::tuple(vec![Value::int(1), Value::str("x")]);
        let f = Format::TupleOf(vec![Format::Int, Format::Str]);
        assert_eq!(enc(&v, &f).unwrap(), json!([1, "x"]));
        let short = Format::TupleOf(vec![Format::Int]);
        assert!(enc(&v, &short).is_err());
    }
}
