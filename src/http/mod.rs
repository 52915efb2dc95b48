/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! HTTP transport abstraction.
//!
//! The client core builds fully signed [`Request`]s and hands them to an
//! [`HttpTransport`]; the default implementation rides on `reqwest`. The
//! transport owns connection pooling, TLS and timeouts, and must be safe
//! for concurrent use. Tests swap in the recording transport from
//! [`test_util`].

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::error::BoxError;

pub mod header;
#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

/// A boxed stream of byte chunks.
pub type BoxByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + 'static>>;

/// Default for the connect, read and write timeouts.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Request body handed to the transport.
pub enum Body {
    /// No body
    Empty,
    /// Buffered body
    Bytes(Bytes),
    /// Streaming body of exactly `length` bytes
    Stream {
        /// The byte chunks to send
        stream: BoxByteStream,
        /// Total number of bytes the stream yields
        length: u64,
    },
}

impl Body {
    pub(crate) fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::Stream { length, .. } => *length,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Body::Stream { length, .. } => f.debug_tuple("Stream").field(length).finish(),
        }
    }
}

/// A signed request ready to go on the wire.
#[derive(Debug)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL, path and query already percent-encoded
    pub url: Url,
    /// Complete header set including `Host` and `Authorization`
    pub headers: HeaderMap,
    /// Request body
    pub body: Body,
}

/// Response as seen by the client core.
#[derive(Debug)]
pub struct Response {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: ResponseBody,
}

/// Lazily consumed response body.
pub struct ResponseBody {
    inner: BoxByteStream,
}

impl ResponseBody {
    /// Wrap an in-memory body.
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self {
            inner: Box::pin(futures_util::stream::iter(
                (!bytes.is_empty()).then_some(Ok(bytes)),
            )),
        }
    }

    /// Wrap a streaming body.
    pub fn from_stream(stream: BoxByteStream) -> Self {
        Self { inner: stream }
    }

    /// Collect the whole body into memory.
    pub async fn bytes(mut self) -> std::io::Result<Bytes> {
        let mut buf = bytes::BytesMut::new();
        while let Some(chunk) = self.inner.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Turn the body into the underlying chunk stream.
    pub fn into_stream(self) -> BoxByteStream {
        self.inner
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseBody")
    }
}

/// An injectable HTTP client.
///
/// Implementations execute exactly one request per call: retries, redirect
/// following and response decompression are deliberately left out, the
/// core depends on seeing the wire-level exchange.
#[async_trait]
pub trait HttpTransport: fmt::Debug + Send + Sync + 'static {
    /// Execute `request`, returning the raw response.
    async fn send(&self, request: Request) -> Result<Response, BoxError>;
}

/// Timeouts applied by the default transport.
#[derive(Clone, Copy, Debug)]
pub struct TransportConfig {
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Timeout between successive read events on a response
    pub read_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Default transport on top of a pooled `reqwest` client.
#[derive(Debug)]
pub(crate) struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub(crate) fn new(config: &TransportConfig, user_agent: &str) -> Result<Self, crate::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .tcp_nodelay(true)
            .user_agent(user_agent)
            .build()
            .map_err(crate::error::transport)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response, BoxError> {
        let mut builder = self
            .client
            .request(request.method, request.url.as_str())
            .headers(request.headers);
        builder = match request.body {
            Body::Empty => builder,
            Body::Bytes(bytes) => builder.body(bytes),
            Body::Stream { stream, .. } => builder.body(reqwest::Body::wrap_stream(stream)),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let stream = response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed();
        Ok(Response {
            status,
            headers,
            body: ResponseBody::from_stream(stream),
        })
    }
}
