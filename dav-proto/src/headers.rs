//! Text grammar of the WebDAV request/response headers (RFC 4918 §10).
//!
//! Every header value type implements [`DavHeader`]: a pure
//! encode/decode pair with no network nor XML concern. Encoding fails
//! with [`HeaderFormatError`] before anything is sent.
use http::header::{HeaderName, HeaderValue};
use http::Method;
use lazy_static::lazy_static;

use super::error::HeaderFormatError;
use super::types::{Depth, LockToken, Timeout};

pub const DEPTH: HeaderName = HeaderName::from_static("depth");
pub const DESTINATION: HeaderName = HeaderName::from_static("destination");
pub const OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
pub const TIMEOUT: HeaderName = HeaderName::from_static("timeout");
pub const IF: HeaderName = HeaderName::from_static("if");
pub const LOCK_TOKEN: HeaderName = HeaderName::from_static("lock-token");

lazy_static! {
    pub static ref PROPFIND: Method = extension_method(b"PROPFIND");
    pub static ref PROPPATCH: Method = extension_method(b"PROPPATCH");
    pub static ref MKCOL: Method = extension_method(b"MKCOL");
    pub static ref COPY: Method = extension_method(b"COPY");
    pub static ref MOVE: Method = extension_method(b"MOVE");
    pub static ref LOCK: Method = extension_method(b"LOCK");
    pub static ref UNLOCK: Method = extension_method(b"UNLOCK");
}

fn extension_method(token: &'static [u8]) -> Method {
    Method::from_bytes(token).expect("extension method tokens are valid")
}

pub trait DavHeader: Sized {
    /// Lowercase header name
    const NAME: &'static str;

    fn encode(&self) -> Result<String, HeaderFormatError>;
    fn decode(value: &str) -> Result<Self, HeaderFormatError>;

    fn name() -> HeaderName {
        HeaderName::from_static(Self::NAME)
    }

    fn to_header(&self) -> Result<(HeaderName, HeaderValue), HeaderFormatError> {
        let txt = self.encode()?;
        let value = HeaderValue::from_str(&txt).map_err(|_| HeaderFormatError::Malformed {
            header: Self::NAME,
            value: txt.clone(),
        })?;
        Ok((Self::name(), value))
    }

    fn from_header(value: &HeaderValue) -> Result<Self, HeaderFormatError> {
        let txt = value.to_str().map_err(|_| HeaderFormatError::Malformed {
            header: Self::NAME,
            value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
        })?;
        Self::decode(txt)
    }
}

// ---- Depth ----

impl DavHeader for Depth {
    const NAME: &'static str = "depth";

    fn encode(&self) -> Result<String, HeaderFormatError> {
        let txt = match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        };
        Ok(txt.into())
    }

    fn decode(value: &str) -> Result<Self, HeaderFormatError> {
        match value {
            "0" => Ok(Depth::Zero),
            "1" => Ok(Depth::One),
            "infinity" => Ok(Depth::Infinity),
            other => Err(HeaderFormatError::UnknownToken {
                header: Self::NAME,
                token: other.into(),
            }),
        }
    }
}

/// A Depth header restricted to `0` and `infinity`, the only values
/// LOCK (RFC 4918 §9.10.3) and COPY (§9.8.3) accept.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ScopeDepth(pub Depth);

impl DavHeader for ScopeDepth {
    const NAME: &'static str = "depth";

    fn encode(&self) -> Result<String, HeaderFormatError> {
        match self.0 {
            Depth::One => Err(HeaderFormatError::Forbidden {
                header: Self::NAME,
                value: "1".into(),
            }),
            depth => depth.encode(),
        }
    }

    fn decode(value: &str) -> Result<Self, HeaderFormatError> {
        match Depth::decode(value)? {
            Depth::One => Err(HeaderFormatError::Forbidden {
                header: Self::NAME,
                value: value.into(),
            }),
            depth => Ok(ScopeDepth(depth)),
        }
    }
}

// ---- Timeout ----

/// Ordered list of acceptable lock timeouts, preferred one first.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Timeouts(pub Vec<Timeout>);

impl From<Timeout> for Timeouts {
    fn from(timeout: Timeout) -> Self {
        Timeouts(vec![timeout])
    }
}

impl DavHeader for Timeouts {
    const NAME: &'static str = "timeout";

    fn encode(&self) -> Result<String, HeaderFormatError> {
        if self.0.is_empty() {
            return Err(HeaderFormatError::Empty(Self::NAME));
        }
        let tokens = self
            .0
            .iter()
            .map(|t| match t {
                Timeout::Infinite => Ok("Infinite".to_string()),
                Timeout::Seconds(0) => Err(HeaderFormatError::TimeoutOutOfRange("0".into())),
                Timeout::Seconds(n) => Ok(format!("Second-{}", n)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tokens.join(", "))
    }

    fn decode(value: &str) -> Result<Self, HeaderFormatError> {
        let list = value
            .split(',')
            .map(str::trim)
            .filter(|tok| !tok.is_empty())
            .map(decode_timeout)
            .collect::<Result<Vec<_>, _>>()?;
        if list.is_empty() {
            return Err(HeaderFormatError::Empty(Self::NAME));
        }
        Ok(Timeouts(list))
    }
}

fn decode_timeout(tok: &str) -> Result<Timeout, HeaderFormatError> {
    if tok.eq_ignore_ascii_case("Infinite") {
        return Ok(Timeout::Infinite);
    }
    let secs = match tok.get(..7) {
        Some(pfx) if pfx.eq_ignore_ascii_case("Second-") => &tok[7..],
        _ => {
            return Err(HeaderFormatError::UnknownToken {
                header: Timeouts::NAME,
                token: tok.into(),
            })
        }
    };
    if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HeaderFormatError::UnknownToken {
            header: Timeouts::NAME,
            token: tok.into(),
        });
    }
    match secs.parse::<u32>() {
        Ok(0) | Err(_) => Err(HeaderFormatError::TimeoutOutOfRange(secs.into())),
        Ok(n) => Ok(Timeout::Seconds(n)),
    }
}

// ---- Destination / Overwrite ----

/// Target of a COPY or MOVE, always an absolute URI.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Destination(pub String);

fn ensure_absolute(value: &str) -> Result<(), HeaderFormatError> {
    match value.parse::<http::Uri>() {
        Ok(uri) if uri.scheme().is_some() && uri.authority().is_some() => Ok(()),
        _ => Err(HeaderFormatError::NotAbsolute(value.into())),
    }
}

impl DavHeader for Destination {
    const NAME: &'static str = "destination";

    fn encode(&self) -> Result<String, HeaderFormatError> {
        ensure_absolute(&self.0)?;
        Ok(self.0.clone())
    }

    fn decode(value: &str) -> Result<Self, HeaderFormatError> {
        ensure_absolute(value)?;
        Ok(Destination(value.into()))
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Overwrite(pub bool);

impl DavHeader for Overwrite {
    const NAME: &'static str = "overwrite";

    fn encode(&self) -> Result<String, HeaderFormatError> {
        Ok(if self.0 { "T" } else { "F" }.into())
    }

    fn decode(value: &str) -> Result<Self, HeaderFormatError> {
        match value {
            "T" => Ok(Overwrite(true)),
            "F" => Ok(Overwrite(false)),
            other => Err(HeaderFormatError::UnknownToken {
                header: Self::NAME,
                token: other.into(),
            }),
        }
    }
}

// ---- Lock tokens ----

const OPAQUE_PFX: &str = "opaquelocktoken:";

/// A bare token (no URI scheme) is assumed to be an opaquelocktoken,
/// surrounding angle brackets are dropped.
fn token_uri(token: &LockToken) -> Result<String, HeaderFormatError> {
    let raw = token.as_str().trim();
    let raw = raw
        .strip_prefix('<')
        .and_then(|r| r.strip_suffix('>'))
        .unwrap_or(raw);
    if raw.is_empty() || raw.contains(|c: char| c.is_whitespace() || c == '<' || c == '>') {
        return Err(HeaderFormatError::Malformed {
            header: LockToken::NAME,
            value: token.as_str().into(),
        });
    }
    match raw.contains(':') {
        true => Ok(raw.into()),
        false => Ok(format!("{}{}", OPAQUE_PFX, raw)),
    }
}

/// Lock-Token = "Lock-Token" ":" Coded-URL
impl DavHeader for LockToken {
    const NAME: &'static str = "lock-token";

    fn encode(&self) -> Result<String, HeaderFormatError> {
        Ok(format!("<{}>", token_uri(self)?))
    }

    fn decode(value: &str) -> Result<Self, HeaderFormatError> {
        let inner = value
            .trim()
            .strip_prefix('<')
            .and_then(|r| r.strip_suffix('>'))
            .filter(|r| !r.is_empty())
            .ok_or_else(|| HeaderFormatError::Malformed {
                header: Self::NAME,
                value: value.into(),
            })?;
        Ok(LockToken::new(inner))
    }
}

/// The `If` header restricted to untagged lists of lock tokens:
/// `(<token-1>) (<token-2>)`, one parenthesized group per token.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LockCondition(pub Vec<LockToken>);

impl From<LockToken> for LockCondition {
    fn from(token: LockToken) -> Self {
        LockCondition(vec![token])
    }
}

impl DavHeader for LockCondition {
    const NAME: &'static str = "if";

    fn encode(&self) -> Result<String, HeaderFormatError> {
        if self.0.is_empty() {
            return Err(HeaderFormatError::Empty(Self::NAME));
        }
        let groups = self
            .0
            .iter()
            .map(|t| token_uri(t).map(|uri| format!("(<{}>)", uri)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups.join(" "))
    }

    fn decode(value: &str) -> Result<Self, HeaderFormatError> {
        let malformed = || HeaderFormatError::Malformed {
            header: Self::NAME,
            value: value.into(),
        };

        let mut tokens = vec![];
        let mut rest = value.trim_start();
        while !rest.is_empty() {
            let group = rest.strip_prefix('(').ok_or_else(malformed)?;
            let end = group.find(')').ok_or_else(malformed)?;
            for coded in group[..end].split_whitespace() {
                let uri = coded
                    .strip_prefix('<')
                    .and_then(|r| r.strip_suffix('>'))
                    .filter(|r| !r.is_empty())
                    .ok_or_else(malformed)?;
                tokens.push(LockToken::new(uri));
            }
            rest = group[end + 1..].trim_start();
        }

        if tokens.is_empty() {
            return Err(HeaderFormatError::Empty(Self::NAME));
        }
        Ok(LockCondition(tokens))
    }
}
