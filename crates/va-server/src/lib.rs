//! va-server: the served surface of the virtual accelerator.
//!
//! [`SimServer`] ties a [`va_records::RecordStore`] to a
//! [`va_sim::Coordinator`]; [`protocol`] exposes it as a line-oriented JSON
//! protocol; [`MirrorModel`] is a model adapter for running without a
//! physics engine.

pub mod error;
pub mod mirror;
pub mod protocol;
pub mod server;

pub use error::{ServerError, ServerResult};
pub use mirror::{MirrorModel, MirrorRule};
pub use protocol::{Request, Response, handle_line, serve_listener, serve_stream, serve_tcp};
pub use server::SimServer;
