//! timecode-sync — a SMPTE timecode synchronization server.
//!
//! Hosts independent, drift-corrected timecode "sessions" and streams
//! frame-accurate updates to every client joined to one, over a
//! line-delimited JSON TCP protocol. See `SPEC_FULL.md` for the full
//! behavioral contract; this crate implements its core (timecode
//! arithmetic, session lifecycle, the wire protocol, and the server loop)
//! and leaves flag parsing, packaging, and an interactive client to
//! external callers.
//!
//! The library entry point is [`run`]; the [`timecode_sync` binary
//! target](../bin.timecode-syncd.html) is a minimal launcher built on top
//! of it for local/manual use.

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod timecode;
pub mod utils;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use server::Server;

use tokio_util::sync::CancellationToken;

/// Bind and run the server until `shutdown` is cancelled.
///
/// This is the whole of what an external launcher needs: build a
/// [`ServerConfig`], get a [`CancellationToken`] wired up to whatever
/// signal should stop the process, and await this. A real deployment can
/// ignore the shipped `timecode-syncd` binary entirely and call this
/// directly from its own launcher.
pub async fn run(config: ServerConfig, shutdown: CancellationToken) -> Result<()> {
    let server = Server::bind(&config).await?;
    server.run(shutdown).await
}
