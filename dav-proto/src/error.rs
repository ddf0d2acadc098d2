use quick_xml::events::attributes::AttrError;

/// Failure while turning a WebDAV XML body into typed values.
///
/// `Recoverable` is internal plumbing: a decoder returns it when the
/// current tag is not the one it handles, so that the caller can try
/// another decoder or skip the tag. It never escapes `Reader::find`.
#[derive(Debug)]
pub enum ParsingError {
    Recoverable,
    MissingChild,
    WrongToken,
    TagNotFound,
    InvalidValue,
    Utf8Error(std::str::Utf8Error),
    QuickXml(quick_xml::Error),
    Chrono(chrono::format::ParseError),
    Int(std::num::ParseIntError),
    Eof,
}
impl std::fmt::Display for ParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recoverable => write!(f, "Recoverable"),
            Self::MissingChild => write!(f, "Missing child"),
            Self::WrongToken => write!(f, "Wrong token"),
            Self::TagNotFound => write!(f, "Tag not found"),
            Self::InvalidValue => write!(f, "Invalid value"),
            Self::Utf8Error(e) => write!(f, "Utf8 Error: {}", e),
            Self::QuickXml(e) => write!(f, "Quick XML error: {}", e),
            Self::Chrono(e) => write!(f, "Chrono error: {}", e),
            Self::Int(e) => write!(f, "Number parsing error: {}", e),
            Self::Eof => write!(f, "Found EOF while expecting data"),
        }
    }
}
impl std::error::Error for ParsingError {}
impl From<AttrError> for ParsingError {
    fn from(value: AttrError) -> Self {
        Self::QuickXml(value.into())
    }
}
impl From<quick_xml::Error> for ParsingError {
    fn from(value: quick_xml::Error) -> Self {
        Self::QuickXml(value)
    }
}
impl From<std::str::Utf8Error> for ParsingError {
    fn from(value: std::str::Utf8Error) -> Self {
        Self::Utf8Error(value)
    }
}
impl From<chrono::format::ParseError> for ParsingError {
    fn from(value: chrono::format::ParseError) -> Self {
        Self::Chrono(value)
    }
}
impl From<std::num::ParseIntError> for ParsingError {
    fn from(value: std::num::ParseIntError) -> Self {
        Self::Int(value)
    }
}

/// A typed header value that cannot be put on (or read from) the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderFormatError {
    /// Unknown token for a header with a closed vocabulary (Depth, Overwrite)
    UnknownToken { header: &'static str, token: String },
    /// `Second-0`, or a number that does not fit the protocol maximum
    TimeoutOutOfRange(String),
    /// An empty list where at least one element is required
    Empty(&'static str),
    /// A header value that is not a valid absolute URI
    NotAbsolute(String),
    /// A value the verb does not accept, eg. `Depth: 1` on LOCK
    Forbidden { header: &'static str, value: String },
    /// A malformed coded URL or parenthesized list
    Malformed { header: &'static str, value: String },
}
impl std::fmt::Display for HeaderFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownToken { header, token } => {
                write!(f, "unknown token {:?} for header {}", token, header)
            }
            Self::TimeoutOutOfRange(v) => write!(f, "timeout {:?} is out of range", v),
            Self::Empty(header) => write!(f, "header {} requires at least one value", header),
            Self::NotAbsolute(v) => write!(f, "{:?} is not an absolute URI", v),
            Self::Forbidden { header, value } => {
                write!(f, "value {:?} is not allowed for header {} here", value, header)
            }
            Self::Malformed { header, value } => {
                write!(f, "malformed value {:?} for header {}", value, header)
            }
        }
    }
}
impl std::error::Error for HeaderFormatError {}

/// The base URI handed to `uri::combine` cannot be used as a base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriError(pub String);
impl std::fmt::Display for UriError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed base URI: {}", self.0)
    }
}
impl std::error::Error for UriError {}
