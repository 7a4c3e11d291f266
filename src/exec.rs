//! The executor: compiles and runs guest source against a persistent named
//! scope plus transient locals, then reads back the reserved `ans` binding
//! and serializes it as directed.

use std::collections::HashMap;

use serde_json::Value as Json;

use crate::error::{Error, Result, TraceFrame};
use crate::interp;
use crate::marshal::{Format, Marshaler};
use crate::redirect::OutputSink;
use crate::value::{new_namespace, Namespace, Value};

/// Scope used when an `exec` command names none.
pub const DEFAULT_SCOPE: &str = "main";

/// The reserved result binding.
pub const RESULT_BINDING: &str = "ans";

/// The `locals` field of an `exec` command. Absent and explicit-null are
/// distinct: absent gets an empty transient mapping whose `ans` is read
/// back; null executes directly in the scope and yields `none`.
#[derive(Debug, Default)]
pub enum LocalsSpec {
    #[default]
    Absent,
    Null,
    Bindings(serde_json::Map<String, Json>),
}

/// Process-wide table of named persistent namespaces. Scopes are created
/// lazily and live for the process lifetime. Shared mutable state with
/// single-threaded access only.
#[derive(Default)]
pub struct ScopeRegistry {
    scopes: HashMap<String, Namespace>,
}

impl ScopeRegistry {
    pub fn namespace(&mut self, name: &str) -> Namespace {
        self.scopes
            .entry(name.to_string())
            .or_insert_with(new_namespace)
            .clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scopes.contains_key(name)
    }
}

#[derive(Default)]
pub struct Executor {
    pub scopes: ScopeRegistry,
}

impl Executor {
    pub fn new() -> Executor {
        Executor::default()
    }

    /// Run `code` and return the encoded `ans`.
    ///
    /// Compile and run faults come back as [`Error::Guest`]; the caller
    /// converts them into `error` frames. The scope accumulates bindings
    /// only when `locals` is [`LocalsSpec::Null`] - otherwise assignments
    /// land in the transient mapping and are discarded with it.
    pub fn execute(
        &mut self,
        code: &str,
        scope: Option<&str>,
        locals: LocalsSpec,
        format: &Format,
        marshaler: &mut Marshaler,
        sink: &mut dyn OutputSink,
    ) -> Result<Json> {
        let stmts = interp::parse(code).map_err(|e| Error::Guest {
            msg: format!("syntax error: {}", e.msg),
            frames: vec![TraceFrame::new("<input>", e.line)],
        })?;

        let globals = self.scopes.namespace(scope.unwrap_or(DEFAULT_SCOPE));

        let (locals_ns, read_ans) = match locals {
            LocalsSpec::Absent => (Some(new_namespace()), true),
            LocalsSpec::Null => (None, false),
            LocalsSpec::Bindings(bindings) => {
                let ns = new_namespace();
                {
                    let mut map = ns.borrow_mut();
                    for (name, wire) in &bindings {
                        map.insert(name.clone(), marshaler.decode(wire)?);
                    }
                }
                (Some(ns), true)
            }
        };

        interp::run(&stmts, globals, locals_ns.clone(), sink)
            .map_err(|f| Error::Guest {
                msg: f.msg,
                frames: f.frames,
            })?;

        let ans = if read_ans {
            locals_ns
                .expect("read_ans implies locals")
                .borrow()
                .get(RESULT_BINDING)
                .cloned()
                .unwrap_or_else(Value::none)
        } else {
            Value::none()
        };
        marshaler.encode(&ans, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redirect::CaptureSink;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn exec(
        executor: &mut Executor,
        marshaler: &mut Marshaler,
        code: &str,
        scope: Option<&str>,
        locals: LocalsSpec,
        format: &Format,
    ) -> Result<Json> {
        let mut sink = CaptureSink::default();
        executor.execute(code, scope, locals, format, marshaler, &mut sink)
    }

    #[test]
    fn ans_is_read_back_and_formatted() {
        let mut ex = Executor::new();
        let mut m = Marshaler::new();
        let out = exec(
            &mut ex,
            &mut m,
            "ans = 1 + 1",
            None,
            LocalsSpec::Absent,
            &Format::Int,
        )
        .unwrap();
        assert_eq!(out, json!(2));
    }

    #[test]
    fn missing_ans_yields_none() {
        let mut ex = Executor::new();
        let mut m = Marshaler::new();
        let out = exec(
            &mut ex,
            &mut m,
            "x = 1",
            None,
            LocalsSpec::Absent,
            &Format::Any,
        )
        .unwrap();
        assert_eq!(out, json!(null));
    }

    #[test]
    fn null_locals_persist_into_the_scope_and_yield_none() {
        let mut ex = Executor::new();
        let mut m = Marshaler::new();
        let out = exec(
            &mut ex,
            &mut m,
            "counter = 41",
            None,
            LocalsSpec::Null,
            &Format::Any,
        )
        .unwrap();
        assert_eq!(out, json!(null));

        // A later exec in the same scope observes the binding.
        let out = exec(
            &mut ex,
            &mut m,
            "ans = counter + 1",
            None,
            LocalsSpec::Absent,
            &Format::Any,
        )
        .unwrap();
        assert_eq!(out, json!(42));
    }

    #[test]
    fn transient_locals_do_not_leak_into_the_scope() {
        let mut ex = Executor::new();
        let mut m = Marshaler::new();
        exec(
            &mut ex,
            &mut m,
            "ans = 1",
            None,
            LocalsSpec::Absent,
            &Format::Any,
        )
        .unwrap();
        let err = exec(
            &mut ex,
            &mut m,
            "ans2 = ans",
            None,
            LocalsSpec::Absent,
            &Format::Any,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not defined"));
    }

    #[test]
    fn scopes_are_independent_and_lazily_created() {
        let mut ex = Executor::new();
        let mut m = Marshaler::new();
        assert!(!ex.scopes.contains("alt"));
        exec(
            &mut ex,
            &mut m,
            "x = 1",
            Some("alt"),
            LocalsSpec::Null,
            &Format::Any,
        )
        .unwrap();
        assert!(ex.scopes.contains("alt"));

        let err = exec(
            &mut ex,
            &mut m,
            "ans = x",
            None,
            LocalsSpec::Absent,
            &Format::Any,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not defined"));
    }

    #[test]
    fn supplied_bindings_are_decoded_including_refs() {
        let mut ex = Executor::new();
        let mut m = Marshaler::new();
        let shared = Value::list(vec![Value::int(10), Value::int(20)]);
        let handle = m.refs.save(&shared);

        let mut bindings = serde_json::Map::new();
        bindings.insert("xs".to_string(), json!({"type": "ref", "val": handle}));
        bindings.insert("k".to_string(), json!(1));

        let out = exec(
            &mut ex,
            &mut m,
            "ans = xs[k]",
            None,
            LocalsSpec::Bindings(bindings),
            &Format::Any,
        )
        .unwrap();
        assert_eq!(out, json!(20));
    }

    #[test]
    fn syntax_errors_surface_as_guest_faults() {
        let mut ex = Executor::new();
        let mut m = Marshaler::new();
        let err = exec(
            &mut ex,
            &mut m,
            "ans = (1 +",
            None,
            LocalsSpec::Absent,
            &Format::Any,
        )
        .unwrap_err();
        match err {
            Error::Guest { msg, frames } => {
                assert!(msg.contains("syntax error"), "{}", msg);
                assert_eq!(frames.len(), 1);
            }
            other => panic!("unexpected: {}", other),
        }
    }
}
