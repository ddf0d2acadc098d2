//! WebDAV (RFC 4918) wire formats for a client: header grammars, URI
//! joining and the XML request/response bodies.

// utils
pub mod error;
pub mod uri;
pub mod xml;

// webdav
pub mod decoder;
pub mod encoder;
pub mod headers;
pub mod types;
