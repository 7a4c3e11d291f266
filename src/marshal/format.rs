//! Format descriptors: the caller-supplied recursive specification that
//! directs encoding.

use serde_json::Value as Json;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Format {
    /// Runtime-type dispatch in fixed priority order.
    Any,
    None,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    /// Linear-buffer exposure: format, itemsize, shape, column-major data.
    Buffer,
    /// Unconditional opaque handle.
    Ref,
    /// Bare `tuple`: each element encoded with `any`.
    Tuple,
    /// `["array", elem, ndim]`; `ndim` null means unconstrained.
    Array {
        elem: Box<Format>,
        ndim: Option<i64>,
    },
    /// `["tuple", [f, ...]]`: positional per-element formats.
    TupleOf(Vec<Format>),
    /// `["union", [f, ...]]`: ordered candidates, first success wins.
    Union(Vec<Format>),
    /// `["media", mime]`: render through the strategy chain.
    Media(String),
}

impl Format {
    pub fn parse(v: &Json) -> Result<Format> {
        match v {
            Json::String(name) => Ok(match name.as_str() {
                "any" => Format::Any,
                "none" => Format::None,
                "bool" => Format::Bool,
                "int" => Format::Int,
                "float" => Format::Float,
                "str" => Format::Str,
                "bytes" => Format::Bytes,
                "buffer" => Format::Buffer,
                "ref" => Format::Ref,
                "tuple" => Format::Tuple,
                other => {
                    return Err(Error::marshal(format!("unexpected format: {}", other)))
                }
            }),
            Json::Array(items) => Self::parse_compound(items),
            other => Err(Error::marshal(format!("unexpected format: {}", other))),
        }
    }

    fn parse_compound(items: &[Json]) -> Result<Format> {
        let name = items
            .first()
            .and_then(Json::as_str)
            .ok_or_else(|| Error::marshal("compound format must start with a name"))?;
        match name {
            "array" => {
                if items.len() != 3 {
                    return Err(Error::marshal("array format takes [array, elem, ndim]"));
                }
                let elem = Box::new(Format::parse(&items[1])?);
                let ndim = match &items[2] {
                    Json::Null => Option::None,
                    n => Some(n.as_i64().ok_or_else(|| {
                        Error::marshal(format!("array ndim must be an integer, got {}", n))
                    })?),
                };
                Ok(Format::Array { elem, ndim })
            }
            "tuple" => Ok(Format::TupleOf(Self::parse_list(items, "tuple")?)),
            "union" => Ok(Format::Union(Self::parse_list(items, "union")?)),
            "media" => {
                let mime = items
                    .get(1)
                    .and_then(Json::as_str)
                    .ok_or_else(|| Error::marshal("media format takes [media, mime]"))?;
                if items.len() != 2 {
                    return Err(Error::marshal("media format takes [media, mime]"));
                }
                Ok(Format::Media(mime.to_string()))
            }
            other => Err(Error::marshal(format!("unexpected format: {}", other))),
        }
    }

    fn parse_list(items: &[Json], what: &str) -> Result<Vec<Format>> {
        let inner = match items {
            [_, Json::Array(inner)] => inner,
            _ => {
                return Err(Error::marshal(format!(
                    "{} format takes [{}, [fmt, ...]]",
                    what, what
                )))
            }
        };
        inner.iter().map(Format::parse).collect()
    }
}
