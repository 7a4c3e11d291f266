//! Renderer strategies for the `["media", mime]` format descriptor.
//!
//! Rendering is an ordered chain of fallible strategies. Each strategy's
//! failure is swallowed and the next one tried; only when the whole chain
//! is exhausted does marshaling fail. Library-specific backends (figure
//! renderers, document/layout renderers) are outside this crate - they
//! plug in through [`Renderer`] and are tried ahead of the two generic
//! built-ins:
//!
//! 1. the bundle strategy, for values carrying pre-rendered MIME
//!    representations, and
//! 2. the plain-text strategy, which can represent any value as
//!    `text/plain`.

use crate::error::{Error, Result};
use crate::value::{Repr, Value};

/// One pluggable attempt to produce a MIME representation of a value.
pub trait Renderer {
    fn name(&self) -> &'static str;

    /// Produce `mime`-typed bytes for `value`, or an error describing why
    /// this strategy does not apply.
    fn render(&self, value: &Value, mime: &str) -> Result<Vec<u8>>;
}

/// Ordered chain of renderer strategies; first success wins.
pub struct RendererChain {
    strategies: Vec<Box<dyn Renderer>>,
    /// How many externally registered strategies sit ahead of the
    /// built-ins.
    external: usize,
}

impl Default for RendererChain {
    fn default() -> Self {
        RendererChain {
            strategies: vec![Box::new(BundleRenderer), Box::new(PlainTextRenderer)],
            external: 0,
        }
    }
}

impl RendererChain {
    pub fn new() -> RendererChain {
        RendererChain::default()
    }

    /// Register a backend strategy. Registered strategies are tried before
    /// the generic built-ins, in registration order.
    pub fn register(&mut self, renderer: Box<dyn Renderer>) {
        self.strategies.insert(self.external, renderer);
        self.external += 1;
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn render(&self, value: &Value, mime: &str) -> Result<Vec<u8>> {
        let mut failures = Vec::new();
        for strategy in &self.strategies {
            match strategy.render(value, mime) {
                Ok(data) => return Ok(data),
                Err(e) => {
                    tracing::trace!("renderer '{}' declined: {}", strategy.name(), e);
                    failures.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }
        Err(Error::marshal(format!(
            "no renderer produced '{}' ({})",
            mime,
            failures.join(" / ")
        )))
    }
}

/// Serves values that carry a bundle of pre-rendered representations.
struct BundleRenderer;

impl Renderer for BundleRenderer {
    fn name(&self) -> &'static str {
        "bundle"
    }

    fn render(&self, value: &Value, mime: &str) -> Result<Vec<u8>> {
        match value.repr_ref() {
            Repr::Media(bundle) => bundle
                .get(mime)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| Error::marshal(format!("bundle has no '{}' representation", mime))),
            _ => Err(Error::marshal("value carries no media bundle")),
        }
    }
}

/// Any value can be represented as `text/plain` via its source-style
/// rendering.
struct PlainTextRenderer;

impl Renderer for PlainTextRenderer {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn render(&self, value: &Value, mime: &str) -> Result<Vec<u8>> {
        if mime != "text/plain" {
            return Err(Error::marshal(format!(
                "plain-text renderer cannot produce '{}'",
                mime
            )));
        }
        Ok(value.repr().into_bytes())
    }
}
