//! An asynchronous WebDAV client (RFC 4918, class 2).
//!
//! [`WebDavClient`] exposes one method per verb. Each resolves its
//! target, builds the typed headers and XML body from `dav_proto`, hands
//! the request to a [`Transport`] and classifies the answer. Lock tokens
//! are plain values owned by the caller; the client keeps no state
//! between calls.
pub mod client;
pub mod config;
pub mod error;
pub mod lock;
pub mod transfer;
pub mod transport;

pub use client::{DavResponse, WebDavClient};
pub use config::ClientConfig;
pub use error::{Cause, Error, Failure};
pub use lock::Lock;
pub use transfer::Progress;
pub use transport::{HyperTransport, Transport, TransportError};

pub use dav_proto;
pub use dav_proto::headers::Timeouts;
pub use dav_proto::types as dav;
