//! The HTTP seam: "send a request, get status, headers and a body stream".
//!
//! Connection pooling, TLS and redirects belong to the implementation.
//! `HyperTransport` is the production one, tests plug their own.
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use http::header::{HeaderValue, AUTHORIZATION};
use http::{Request, Response};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client as HttpClient};
use hyper_util::rt::TokioExecutor;

pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Request body handed to the transport
pub type Body = UnsyncBoxBody<Bytes, std::io::Error>;
/// Response body handed back by the transport, left untouched
pub type ResponseBody = UnsyncBoxBody<Bytes, TransportError>;

pub fn empty_body() -> Body {
    Empty::<Bytes>::new()
        .map_err(|e| match e {})
        .boxed_unsync()
}

pub fn full_body(content: impl Into<Bytes>) -> Body {
    Full::new(content.into())
        .map_err(|e| match e {})
        .boxed_unsync()
}

/// Must be usable concurrently by every in-flight call of a client.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: Request<Body>) -> Result<Response<ResponseBody>, TransportError>;
}

pub struct HyperTransport {
    http: HttpClient<HttpsConnector<HttpConnector>, Body>,
    authorization: Option<HeaderValue>,
}

impl HyperTransport {
    pub fn new() -> Result<Self, TransportError> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let http = HttpClient::builder(TokioExecutor::new()).build(connector);
        Ok(Self {
            http,
            authorization: None,
        })
    }

    /// Stamp every request with HTTP Basic credentials.
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Result<Self, TransportError> {
        let creds = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", username, password));
        self.authorization = Some(HeaderValue::from_str(&format!("Basic {}", creds))?);
        Ok(self)
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, mut req: Request<Body>) -> Result<Response<ResponseBody>, TransportError> {
        if let Some(auth) = &self.authorization {
            req.headers_mut()
                .entry(AUTHORIZATION)
                .or_insert_with(|| auth.clone());
        }

        let resp = self.http.request(req).await?;
        Ok(resp.map(|body| {
            body.map_err(|e| Box::new(e) as TransportError)
                .boxed_unsync()
        }))
    }
}
