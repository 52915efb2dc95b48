/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! In-memory mock transport for tests.
//!
//! Responses are enqueued ahead of time and handed out in order; every
//! request is recorded with its fully collected body so tests can assert
//! on exactly what would have gone on the wire.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use super::{Body, HttpTransport, Request, Response, ResponseBody};
use crate::error::BoxError;

/// A request as the transport saw it, body fully collected.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    /// Request method
    pub method: Method,
    /// Request URL
    pub url: Url,
    /// Request headers
    pub headers: HeaderMap,
    /// Collected request body, framing included for streaming bodies
    pub body: Bytes,
}

impl RecordedRequest {
    /// Header value as a string, empty when missing.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    /// The query string, empty when absent.
    pub fn query(&self) -> &str {
        self.url.query().unwrap_or_default()
    }
}

/// A canned response.
#[derive(Clone, Debug)]
pub struct MockResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl MockResponse {
    /// A response with the given status and no body.
    pub fn new(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).expect("valid status code"),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Add a response header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(
            name.parse::<http::header::HeaderName>().expect("valid header name"),
            value.parse().expect("valid header value"),
        );
        self
    }

    /// Set the response body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set an XML response body with the matching content type.
    pub fn xml(self, body: impl Into<Bytes>) -> Self {
        self.header("content-type", "application/xml").body(body)
    }
}

enum Scripted {
    Respond(MockResponse),
    Fail(String),
}

/// Transport that replays a scripted sequence of responses.
#[derive(Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockTransport {
    /// An empty transport; every request fails until responses are queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response.
    pub fn enqueue(&self, response: MockResponse) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Respond(response));
    }

    /// Queue a transport-level failure (connection reset, timeout, ...).
    pub fn enqueue_error(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(message.to_string()));
    }

    /// All requests seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().unwrap().clone()
    }

    /// The `index`th request seen.
    pub fn request(&self, index: usize) -> RecordedRequest {
        self.recorded.lock().unwrap()[index].clone()
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.recorded.lock().unwrap().len()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("recorded", &self.recorded.lock().unwrap().len())
            .finish()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response, BoxError> {
        let body = match request.body {
            Body::Empty => Bytes::new(),
            Body::Bytes(bytes) => bytes,
            Body::Stream { stream, .. } => {
                ResponseBody::from_stream(stream).bytes().await?
            }
        };
        self.recorded.lock().unwrap().push(RecordedRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body,
        });

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Respond(response)) => Ok(Response {
                status: response.status,
                headers: response.headers,
                body: ResponseBody::from_bytes(response.body),
            }),
            Some(Scripted::Fail(message)) => {
                Err(std::io::Error::other(message).into())
            }
            None => Err(std::io::Error::other("no scripted response left").into()),
        }
    }
}
