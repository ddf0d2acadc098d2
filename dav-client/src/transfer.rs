//! Streaming GET and PUT with progress reports and cooperative
//! cancellation, checked at chunk granularity.
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use http::header::CONTENT_LENGTH;
use http::Method;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use dav_proto::types as dav;

use crate::client::{conditional, content_type_header, DavResponse, WebDavClient};
use crate::error::{Error, Failure};
use crate::transport::{empty_body, Body};

/// Snapshot handed to the progress callback after every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub transferred: u64,
    /// Unknown when the server sent no Content-Length
    pub total: Option<u64>,
}

impl WebDavClient {
    /// GET `source` into `sink`. On success the sink holds exactly the
    /// response body and the byte count is returned. On cancellation it
    /// holds the whole chunks written before the token was seen.
    pub async fn download<W, F>(
        &self,
        source: &str,
        sink: &mut W,
        cancel: &CancellationToken,
        mut progress: F,
    ) -> Result<DavResponse<u64>, Error>
    where
        W: AsyncWrite + Unpin,
        F: FnMut(Progress),
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { transferred: 0 });
        }
        let url = self.resolve(source, false)?;
        let resp = self
            .execute(Method::GET, &url, vec![], empty_body())
            .await?;
        let (parts, mut body) = resp.into_parts();

        let total = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let chunk_size = self.config.chunk_size.max(1);
        let mut transferred = 0u64;

        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| Failure {
                status: Some(parts.status),
                ..Failure::transport(e)
            })?;
            let Ok(data) = frame.into_data() else {
                // trailers
                continue;
            };

            for slice in data.chunks(chunk_size) {
                if cancel.is_cancelled() {
                    tracing::info!(uri=%url, transferred, "download cancelled");
                    sink.flush().await?;
                    return Err(Error::Cancelled { transferred });
                }
                sink.write_all(slice).await?;
                transferred += slice.len() as u64;
                tracing::trace!(uri=%url, transferred, "chunk written");
                progress(Progress { transferred, total });
            }
        }
        sink.flush().await?;

        tracing::debug!(uri=%url, transferred, "download complete");
        Ok(DavResponse {
            status: parts.status,
            headers: parts.headers,
            body: transferred,
        })
    }

    /// PUT the content of `source` without buffering it. When `cancel`
    /// fires the body stream ends with an error, so the server never
    /// sees a truncated entity as a complete one.
    pub async fn upload<R, F>(
        &self,
        destination: &str,
        source: R,
        content_type: Option<&str>,
        lock: Option<&dav::LockToken>,
        cancel: &CancellationToken,
        progress: F,
    ) -> Result<DavResponse<u64>, Error>
    where
        R: AsyncRead + Send + 'static,
        F: FnMut(Progress) + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { transferred: 0 });
        }
        let url = self.resolve(destination, false)?;
        let mut headers = conditional(lock)?;
        headers.push(content_type_header(content_type)?);

        let sent = Arc::new(AtomicU64::new(0));
        let body = upload_body(
            source,
            self.config.chunk_size.max(1),
            cancel.clone(),
            sent.clone(),
            progress,
        );

        let result = self.execute(Method::PUT, &url, headers, body).await;
        let transferred = sent.load(Ordering::Acquire);
        let resp = match result {
            Ok(resp) => resp,
            Err(_) if cancel.is_cancelled() => {
                tracing::info!(uri=%url, transferred, "upload cancelled");
                return Err(Error::Cancelled { transferred });
            }
            Err(e) => return Err(e),
        };

        let resp = Self::collect(resp).await?;
        tracing::debug!(uri=%url, transferred, "upload complete");
        Ok(resp.map(|_| transferred))
    }
}

fn upload_body<R, F>(
    source: R,
    chunk_size: usize,
    cancel: CancellationToken,
    sent: Arc<AtomicU64>,
    mut progress: F,
) -> Body
where
    R: AsyncRead + Send + 'static,
    F: FnMut(Progress) + Send + 'static,
{
    let stream = ReaderStream::with_capacity(source, chunk_size).map(
        move |chunk: io::Result<Bytes>| {
            if cancel.is_cancelled() {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "upload cancelled"));
            }
            let chunk = chunk?;
            let transferred =
                sent.fetch_add(chunk.len() as u64, Ordering::AcqRel) + chunk.len() as u64;
            tracing::trace!(transferred, "chunk read");
            progress(Progress {
                transferred,
                total: None,
            });
            Ok(Frame::data(chunk))
        },
    );
    StreamBody::new(stream).boxed_unsync()
}
