use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;

use dav_proto::decoder::deserialize;
use dav_proto::encoder::serialize;
use dav_proto::error::UriError;
use dav_proto::headers::{self, DavHeader, Destination, LockCondition, Overwrite, ScopeDepth};
use dav_proto::types as dav;
use dav_proto::uri;
use dav_proto::xml::QWrite;

use crate::config::ClientConfig;
use crate::error::{Cause, Error, Failure};
use crate::transport::{empty_body, full_body, Body, ResponseBody, Transport};

pub(crate) const XML_CONTENT_TYPE: &str = "application/xml; charset=\"utf-8\"";

/// Status and headers of a successful call, next to its decoded body.
#[derive(Debug)]
pub struct DavResponse<T> {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: T,
}

impl<T> DavResponse<T> {
    pub(crate) fn map<U>(self, f: impl FnOnce(T) -> U) -> DavResponse<U> {
        DavResponse {
            status: self.status,
            headers: self.headers,
            body: f(self.body),
        }
    }
}

impl DavResponse<dav::Multistatus> {
    /// A 207 is a success even when some of its entries failed. Turn
    /// those entries into an error for callers who want all or nothing.
    pub fn ensure_success(self) -> Result<Self, Error> {
        let count = self.body.failures().len();
        if count == 0 {
            return Ok(self);
        }
        Err(Error::Request(Failure {
            cause: Cause::PartialFailure(count),
            status: Some(self.status),
            multistatus: Some(self.body),
            error: None,
        }))
    }
}

/// A WebDAV client. Holds the transport and its configuration only, so
/// one instance can serve any number of concurrent calls.
#[derive(Clone)]
pub struct WebDavClient {
    transport: Arc<dyn Transport>,
    pub(crate) config: ClientConfig,
}

impl WebDavClient {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Absolute targets are used as is, anything else is joined to the
    /// configured base URL. A trailing slash on the target keeps it
    /// addressed as a collection.
    pub fn resolve(&self, target: &str, is_folder: bool) -> Result<String, Error> {
        if uri::has_scheme(target) {
            return match uri::is_absolute(target) {
                true => Ok(target.to_string()),
                false => Err(UriError(target.to_string()).into()),
            };
        }
        let is_folder = is_folder || target.ends_with('/');
        match &self.config.base_url {
            Some(base) => Ok(uri::combine(base, target, is_folder)?),
            None => Err(UriError(target.to_string()).into()),
        }
    }

    // ---- plumbing ----

    /// Send a request and split off non-2xx answers as failures.
    pub(crate) async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: Vec<(HeaderName, HeaderValue)>,
        body: Body,
    ) -> Result<Response<ResponseBody>, Error> {
        let mut builder = Request::builder().method(method.clone()).uri(url);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let req = builder
            .body(body)
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;

        tracing::debug!(method=%method, uri=%url, "sending request");
        let resp = match self.transport.send(req).await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(method=%method, uri=%url, err=%err, "transport failure");
                return Err(Failure::transport(err).into());
            }
        };

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(method=%method, uri=%url, status=%status, "request succeeded");
            return Ok(resp);
        }

        tracing::warn!(method=%method, uri=%url, status=%status, "request failed");
        Err(rejection(resp).await.into())
    }

    pub(crate) async fn send_xml<T: QWrite + Sync>(
        &self,
        method: Method,
        url: &str,
        mut headers: Vec<(HeaderName, HeaderValue)>,
        elem: &T,
    ) -> Result<Response<ResponseBody>, Error> {
        let payload = serialize(elem).await?;
        headers.push((CONTENT_TYPE, HeaderValue::from_static(XML_CONTENT_TYPE)));
        self.execute(method, url, headers, full_body(payload)).await
    }

    pub(crate) async fn collect(resp: Response<ResponseBody>) -> Result<DavResponse<Bytes>, Error> {
        let (parts, body) = resp.into_parts();
        let content = body
            .collect()
            .await
            .map_err(|e| Failure {
                status: Some(parts.status),
                ..Failure::transport(e)
            })?
            .to_bytes();
        Ok(DavResponse {
            status: parts.status,
            headers: parts.headers,
            body: content,
        })
    }

    async fn discard(resp: Response<ResponseBody>) -> Result<DavResponse<()>, Error> {
        Ok(Self::collect(resp).await?.map(|_| ()))
    }

    /// 204 or an empty body yields an empty Multistatus, anything else
    /// must parse.
    async fn multistatus(resp: Response<ResponseBody>) -> Result<DavResponse<dav::Multistatus>, Error> {
        let resp = Self::collect(resp).await?;
        if resp.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(resp.map(|_| dav::Multistatus::default()));
        }
        let parsed = deserialize::<dav::Multistatus>(&resp.body).await?;
        Ok(resp.map(|_| parsed))
    }

    // ---- properties ----

    /// PROPFIND with one of the three request shapes.
    pub async fn propfind(
        &self,
        target: &str,
        depth: dav::Depth,
        req: &dav::PropFind,
    ) -> Result<DavResponse<dav::Multistatus>, Error> {
        if !req.is_valid() {
            return Err(Error::InvalidRequest(
                "a named propfind must list at least one property".into(),
            ));
        }
        let url = self.resolve(target, false)?;
        let headers = vec![depth.to_header()?];
        let resp = self
            .send_xml(headers::PROPFIND.clone(), &url, headers, req)
            .await?;
        Self::multistatus(resp).await
    }

    /// PROPFIND with a caller-authored XML body, sent verbatim.
    pub async fn propfind_raw(
        &self,
        target: &str,
        depth: dav::Depth,
        xml: impl Into<String>,
    ) -> Result<DavResponse<dav::Multistatus>, Error> {
        let url = self.resolve(target, false)?;
        let headers = vec![
            depth.to_header()?,
            (CONTENT_TYPE, HeaderValue::from_static(XML_CONTENT_TYPE)),
        ];
        let resp = self
            .execute(headers::PROPFIND.clone(), &url, headers, full_body(xml.into()))
            .await?;
        Self::multistatus(resp).await
    }

    /// PROPPATCH. Instructions reach the server in the given order.
    pub async fn proppatch(
        &self,
        target: &str,
        update: &dav::PropertyUpdate,
        lock: Option<&dav::LockToken>,
    ) -> Result<DavResponse<dav::Multistatus>, Error> {
        if update.0.is_empty() {
            return Err(Error::InvalidRequest(
                "a propertyupdate needs at least one set or remove".into(),
            ));
        }
        let url = self.resolve(target, false)?;
        let headers = conditional(lock)?;
        let resp = self
            .send_xml(headers::PROPPATCH.clone(), &url, headers, update)
            .await?;
        Self::multistatus(resp).await
    }

    // ---- namespace ----

    pub async fn mkcol(
        &self,
        target: &str,
        lock: Option<&dav::LockToken>,
    ) -> Result<DavResponse<()>, Error> {
        let url = self.resolve(target, true)?;
        let resp = self
            .execute(headers::MKCOL.clone(), &url, conditional(lock)?, empty_body())
            .await?;
        Self::discard(resp).await
    }

    /// COPY only knows depth `0` and `infinity`.
    pub async fn copy_to(
        &self,
        source: &str,
        destination: &str,
        depth: dav::Depth,
        overwrite: Option<bool>,
    ) -> Result<DavResponse<()>, Error> {
        let url = self.resolve(source, false)?;
        let mut headers = vec![
            Destination(self.resolve(destination, false)?).to_header()?,
            ScopeDepth(depth).to_header()?,
        ];
        if let Some(flag) = overwrite {
            headers.push(Overwrite(flag).to_header()?);
        }
        let resp = self
            .execute(headers::COPY.clone(), &url, headers, empty_body())
            .await?;
        Self::discard(resp).await
    }

    /// MOVE always applies to the whole subtree.
    pub async fn move_to(
        &self,
        source: &str,
        destination: &str,
        overwrite: Option<bool>,
        lock: Option<&dav::LockToken>,
    ) -> Result<DavResponse<()>, Error> {
        let url = self.resolve(source, false)?;
        let mut headers = vec![
            Destination(self.resolve(destination, false)?).to_header()?,
            dav::Depth::Infinity.to_header()?,
        ];
        if let Some(flag) = overwrite {
            headers.push(Overwrite(flag).to_header()?);
        }
        headers.extend(conditional(lock)?);
        let resp = self
            .execute(headers::MOVE.clone(), &url, headers, empty_body())
            .await?;
        Self::discard(resp).await
    }

    pub async fn delete(
        &self,
        target: &str,
        lock: Option<&dav::LockToken>,
    ) -> Result<DavResponse<()>, Error> {
        let url = self.resolve(target, false)?;
        let resp = self
            .execute(Method::DELETE, &url, conditional(lock)?, empty_body())
            .await?;
        Self::discard(resp).await
    }

    // ---- content ----

    /// GET buffered in memory, for small payloads.
    pub async fn get(&self, target: &str) -> Result<DavResponse<Bytes>, Error> {
        let url = self.resolve(target, false)?;
        let resp = self
            .execute(Method::GET, &url, vec![], empty_body())
            .await?;
        Self::collect(resp).await
    }

    /// GET handing back the body stream untouched.
    pub async fn get_stream(&self, target: &str) -> Result<DavResponse<ResponseBody>, Error> {
        let url = self.resolve(target, false)?;
        let resp = self
            .execute(Method::GET, &url, vec![], empty_body())
            .await?;
        let (parts, body) = resp.into_parts();
        Ok(DavResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    pub async fn head(&self, target: &str) -> Result<DavResponse<()>, Error> {
        let url = self.resolve(target, false)?;
        let resp = self
            .execute(Method::HEAD, &url, vec![], empty_body())
            .await?;
        Self::discard(resp).await
    }

    pub async fn put(
        &self,
        target: &str,
        content: impl Into<Bytes>,
        content_type: Option<&str>,
        lock: Option<&dav::LockToken>,
    ) -> Result<DavResponse<()>, Error> {
        let url = self.resolve(target, false)?;
        let content = content.into();
        let mut headers = conditional(lock)?;
        headers.push((CONTENT_LENGTH, HeaderValue::from(content.len())));
        headers.push(content_type_header(content_type)?);
        let resp = self
            .execute(Method::PUT, &url, headers, full_body(content))
            .await?;
        Self::discard(resp).await
    }
}

/// `If` header for an optional lock token.
pub(crate) fn conditional(
    lock: Option<&dav::LockToken>,
) -> Result<Vec<(HeaderName, HeaderValue)>, Error> {
    match lock {
        Some(token) => Ok(vec![LockCondition::from(token.clone()).to_header()?]),
        None => Ok(vec![]),
    }
}

pub(crate) fn content_type_header(
    content_type: Option<&str>,
) -> Result<(HeaderName, HeaderValue), Error> {
    let value = content_type.unwrap_or("application/octet-stream");
    let value = HeaderValue::from_str(value)
        .map_err(|_| Error::InvalidRequest(format!("invalid content type {:?}", value)))?;
    Ok((CONTENT_TYPE, value))
}

/// Build the failure for a non-2xx answer, keeping whatever structured
/// explanation the server put in the body.
async fn rejection(resp: Response<ResponseBody>) -> Failure {
    let (parts, body) = resp.into_parts();
    let mut failure = Failure::status(parts.status);

    let content = match body.collect().await {
        Ok(c) => c.to_bytes(),
        Err(err) => {
            tracing::debug!(err=%err, "unable to read the body of a failed request");
            return failure;
        }
    };
    if content.iter().all(u8::is_ascii_whitespace) {
        return failure;
    }

    match deserialize::<dav::Error>(&content).await {
        Ok(err) => failure.error = Some(err),
        Err(_) => match deserialize::<dav::Multistatus>(&content).await {
            Ok(ms) => failure.multistatus = Some(ms),
            Err(_) => tracing::trace!("failure body is not a WebDAV document"),
        },
    }
    failure
}
