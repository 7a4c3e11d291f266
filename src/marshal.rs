//! Marshaling engine: format-directed encoding of runtime values into the
//! typed JSON wire representation, and tag-directed decoding back.
//!
//! The two directions are deliberately asymmetric. Encoding is driven by a
//! caller-supplied [`Format`] descriptor; decoding is driven purely by the
//! wire tags and accepts only the subset of tags callers are expected to
//! send (`list`, `tuple`, `set`, `dict`, `bytes`, `ref`). In particular
//! the big-integer, `array`, and `union` encodings are not reversed on the
//! decode path.

mod decode;
mod encode;
mod format;

pub use format::Format;

use crate::error::Result;
use crate::media::RendererChain;
use crate::refs::RefTable;
use crate::value::Value;

/// Owns the state marshaling needs: the reference table for the `ref`
/// format/tag and the renderer chain for `media`.
pub struct Marshaler {
    pub refs: RefTable,
    pub media: RendererChain,
}

impl Default for Marshaler {
    fn default() -> Self {
        Marshaler {
            refs: RefTable::new(),
            media: RendererChain::new(),
        }
    }
}

impl Marshaler {
    pub fn new() -> Marshaler {
        Marshaler::default()
    }

    /// Serialize `value` as directed by `format`.
    pub fn encode(&mut self, value: &Value, format: &Format) -> Result<serde_json::Value> {
        encode::encode(self, value, format)
    }

    /// Reconstruct a runtime value from its wire form.
    pub fn decode(&self, wire: &serde_json::Value) -> Result<Value> {
        decode::decode(self, wire)
    }
}
