//! Scripted transport: every request must match one expected exchange
//! (method, URI, the listed headers and, when given, the exact body),
//! otherwise it fails the way an unreachable server would.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;

use dav_client::transport::{Body, ResponseBody, Transport, TransportError};
use dav_client::{ClientConfig, WebDavClient};

pub const BASE: &str = "http://localhost:8080/dav/";

pub struct Exchange {
    method: Method,
    uri: String,
    headers: Vec<(HeaderName, String)>,
    body: Option<Vec<u8>>,
    status: StatusCode,
    reply_headers: Vec<(HeaderName, String)>,
    reply: Vec<Bytes>,
}

impl Exchange {
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            headers: vec![],
            body: None,
            status: StatusCode::OK,
            reply_headers: vec![],
            reply: vec![],
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((HeaderName::from_bytes(name.as_bytes()).unwrap(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn status(mut self, code: u16) -> Self {
        self.status = StatusCode::from_u16(code).unwrap();
        self
    }

    pub fn reply_header(mut self, name: &str, value: &str) -> Self {
        self.reply_headers
            .push((HeaderName::from_bytes(name.as_bytes()).unwrap(), value.to_string()));
        self
    }

    pub fn reply(mut self, body: impl Into<Bytes>) -> Self {
        self.reply = vec![body.into()];
        self
    }

    /// The reply body is streamed back one frame per chunk.
    pub fn reply_chunks(mut self, chunks: Vec<Bytes>) -> Self {
        self.reply = chunks;
        self
    }

    fn matches(&self, method: &Method, uri: &str, headers: &HeaderMap, body: &[u8]) -> bool {
        self.method == method
            && self.uri == uri
            && self
                .headers
                .iter()
                .all(|(k, v)| headers.get(k).and_then(|h| h.to_str().ok()) == Some(v.as_str()))
            && self.body.as_deref().map_or(true, |b| b == body)
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Default)]
pub struct MockTransport {
    script: Mutex<Vec<Exchange>>,
    seen: Mutex<Vec<Recorded>>,
}

impl MockTransport {
    pub fn new(script: Vec<Exchange>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            seen: Mutex::new(vec![]),
        })
    }

    /// Requests received so far, matched or not.
    pub fn seen(&self) -> Vec<Recorded> {
        self.seen.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, req: Request<Body>) -> Result<Response<ResponseBody>, TransportError> {
        let (parts, body) = req.into_parts();
        let body = body.collect().await?.to_bytes();
        let uri = parts.uri.to_string();

        self.seen.lock().unwrap().push(Recorded {
            method: parts.method.clone(),
            uri: uri.clone(),
            headers: parts.headers.clone(),
            body: body.clone(),
        });

        let exchange = {
            let mut script = self.script.lock().unwrap();
            let pos = script
                .iter()
                .position(|ex| ex.matches(&parts.method, &uri, &parts.headers, &body));
            pos.map(|p| script.remove(p))
        };
        let Some(exchange) = exchange else {
            return Err(format!("connection refused: {} {}", parts.method, uri).into());
        };

        let mut resp = Response::builder().status(exchange.status);
        for (k, v) in exchange.reply_headers {
            resp = resp.header(k, HeaderValue::from_str(&v)?);
        }
        let frames = futures::stream::iter(
            exchange
                .reply
                .into_iter()
                .map(|c| Ok::<_, TransportError>(Frame::data(c))),
        );
        Ok(resp.body(StreamBody::new(frames).boxed_unsync())?)
    }
}

pub fn client(transport: Arc<MockTransport>) -> WebDavClient {
    WebDavClient::new(transport, ClientConfig::with_base_url(BASE))
}

pub fn multistatus(inner: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><D:multistatus xmlns:D="DAV:">{}</D:multistatus>"#,
        inner
    )
}
