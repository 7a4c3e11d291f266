//! replink library
//!
//! A request/response bridge that lets an external caller drive an
//! embedded interpreter: submit source text for execution against a
//! persistent session scope, and receive back a value marshaled into a
//! typed JSON wire format - or a live opaque handle when the value cannot
//! be copied.
//!
//! - `value` - runtime value model with stable identity
//! - `refs` - refcounted handle table behind opaque references
//! - `marshal` - format-directed encoder / tag-directed decoder
//! - `media` - renderer-strategy chain for MIME representations
//! - `interp` - the embedded guest language
//! - `exec` - executor over persistent named scopes
//! - `redirect` - guest output capture
//! - `report` - fault-to-error-frame conversion, last-fault state
//! - `protocol` - wire frame models
//! - `transport` - stdio and socket bindings
//! - `session` - the command loop

pub mod error;
pub mod exec;
pub mod interp;
pub mod marshal;
pub mod media;
pub mod protocol;
pub mod redirect;
pub mod refs;
pub mod report;
pub mod session;
pub mod transport;
pub mod value;
