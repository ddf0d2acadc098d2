//! Errors surfaced by [`WebDavClient`](crate::WebDavClient).
//!
//! | Variant          | Raised when                                              | Network hit? |
//! |------------------|----------------------------------------------------------|--------------|
//! | `HeaderFormat`   | a typed header value cannot be put on the wire           | no           |
//! | `Uri`            | the target cannot be resolved against the base URL       | no           |
//! | `InvalidRequest` | the request itself is malformed (eg. empty named propfind)| no          |
//! | `Request`        | transport failure, or the server did not answer 2xx      | yes          |
//! | `Parse`          | a 2xx/207 body that should be XML does not parse         | yes          |
//! | `Cancelled`      | a transfer was stopped through its cancellation token    | maybe        |
//! | `Io`             | the local sink of a download failed                      | yes          |
use http::StatusCode;
use thiserror::Error;

use dav_proto::error::{HeaderFormatError, ParsingError, UriError};
use dav_proto::types as dav;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid header value: {0}")]
    HeaderFormat(#[from] HeaderFormatError),
    #[error(transparent)]
    Uri(#[from] UriError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unable to serialize request body: {0}")]
    Serialize(#[from] quick_xml::Error),
    #[error(transparent)]
    Request(#[from] Failure),
    #[error("unparseable response body: {0}")]
    Parse(#[from] ParsingError),
    #[error("transfer cancelled after {transferred} bytes")]
    Cancelled { transferred: u64 },
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The normalized request failure, if that is what this is.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Request(f) => Some(f),
            _ => None,
        }
    }
}

/// Why a request did not succeed.
#[derive(Error, Debug)]
pub enum Cause {
    /// The transport gave up, usually before any status line was read
    #[error("transport failure: {0}")]
    Transport(#[source] TransportError),
    /// The server answered with a non-2xx status
    #[error("server answered {0}")]
    Status(StatusCode),
    /// A 207 whose responses or propstats carry non-2xx statuses,
    /// only raised on demand by `DavResponse::ensure_success`
    #[error("{0} entries of the multi-status response failed")]
    PartialFailure(usize),
}

/// One failure kind for "could not reach the server" and "the server
/// said no". The original cause stays available for diagnostics, as
/// well as whatever the server explained in its body.
#[derive(Error, Debug)]
#[error("{cause}")]
pub struct Failure {
    #[source]
    pub cause: Cause,
    pub status: Option<StatusCode>,
    pub multistatus: Option<dav::Multistatus>,
    pub error: Option<dav::Error>,
}

impl Failure {
    pub fn transport(err: TransportError) -> Self {
        Self {
            cause: Cause::Transport(err),
            status: None,
            multistatus: None,
            error: None,
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self {
            cause: Cause::Status(status),
            status: Some(status),
            multistatus: None,
            error: None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self.cause, Cause::Transport(_))
    }

    /// 423 Locked
    pub fn is_locked(&self) -> bool {
        self.status == Some(StatusCode::LOCKED)
    }

    /// 412 Precondition Failed
    pub fn is_precondition_failed(&self) -> bool {
        self.status == Some(StatusCode::PRECONDITION_FAILED)
    }
}
