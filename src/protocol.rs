//! Wire protocol models.
//!
//! One JSON object per frame in both directions. Inbound frames are
//! commands dispatched by their `tag`; outbound frames are `result`,
//! `error`, and (socket binding only) the asynchronous `stdout`/`stderr`
//! notifications.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::exec::LocalsSpec;

/// Inbound command, decoded from one frame.
#[derive(Debug)]
pub enum Command {
    Echo(EchoCommand),
    Exec(ExecCommand),
    Decref(DecrefCommand),
    Stop,
}

impl Command {
    /// Decode a raw frame. A missing or unknown tag, or malformed fields,
    /// is a protocol error - recoverable, unlike transport-level garbage.
    pub fn parse(frame: &Json) -> Result<Command> {
        let tag = frame
            .get("tag")
            .and_then(Json::as_str)
            .ok_or_else(|| Error::Protocol("missing command tag".to_string()))?;
        let bad = |e: serde_json::Error| Error::Protocol(format!("bad {} command: {}", tag, e));
        match tag {
            "echo" => Ok(Command::Echo(
                serde_json::from_value(frame.clone()).map_err(bad)?,
            )),
            "exec" => Ok(Command::Exec(
                serde_json::from_value(frame.clone()).map_err(bad)?,
            )),
            "decref" => Ok(Command::Decref(
                serde_json::from_value(frame.clone()).map_err(bad)?,
            )),
            "stop" => Ok(Command::Stop),
            other => Err(Error::Protocol(format!("unexpected tag: {}", other))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EchoCommand {
    /// The payload; `value` is accepted as an alias.
    #[serde(alias = "value")]
    pub msg: Json,
}

#[derive(Debug, Deserialize)]
pub struct ExecCommand {
    pub code: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default, deserialize_with = "locals_spec")]
    pub locals: LocalsSpec,
    /// Format descriptor for the result; `any` when omitted.
    #[serde(default)]
    pub format: Option<Json>,
}

#[derive(Debug, Deserialize)]
pub struct DecrefCommand {
    pub refs: Vec<String>,
}

/// Distinguishes a present-but-null `locals` from an absent one; absence
/// is handled by `#[serde(default)]`.
fn locals_spec<'de, D>(deserializer: D) -> std::result::Result<LocalsSpec, D::Error>
where
    D: Deserializer<'de>,
{
    let bindings: Option<serde_json::Map<String, Json>> = Option::deserialize(deserializer)?;
    Ok(match bindings {
        Some(map) => LocalsSpec::Bindings(map),
        None => LocalsSpec::Null,
    })
}

/// Outbound frame.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "tag", rename_all = "lowercase")]
pub enum Frame {
    Result { value: Json },
    Error { msg: String, trace: Vec<String> },
    Stdout { text: String },
    Stderr { text: String },
}
