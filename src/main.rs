//! replink - wire-protocol kernel for an embedded interpreter session.
//!
//! This is the main entry point. It initializes logging, selects the
//! transport binding, and runs the command loop until `stop` or a fatal
//! transport failure.

use std::path::PathBuf;

use anyhow::Result;

use replink::session::Session;
use replink::transport::{Transport, SOCKET_ENV};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize logging. Logs go to stderr so the stdio binding's frame
    // stream on stdout stays clean.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "replink=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    tracing::info!("Starting replink v{}", env!("CARGO_PKG_VERSION"));

    // Socket binding when a peer address is configured, stdio otherwise.
    let transport = match std::env::var(SOCKET_ENV) {
        Ok(addr) => {
            let path = PathBuf::from(addr);
            tracing::info!("Connecting to peer socket {}", path.display());
            Transport::connect(&path)?
        }
        Err(_) => {
            tracing::info!("Using stdio binding");
            Transport::stdio()
        }
    };

    let mut session = Session::new(transport);
    if let Err(e) = session.run() {
        // Transport-level failures are fatal by design: no retry.
        tracing::error!("Transport failure: {:#}", e);
        return Err(e);
    }

    tracing::info!("replink exited cleanly");
    Ok(())
}
