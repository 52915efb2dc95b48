/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Bucket notification long-polling.
//!
//! The `?notification` subresource answers with a never-ending stream of
//! newline-delimited JSON records; blank lines are keep-alive beats.
//! Dropping the stream releases the connection.

use bytes::BytesMut;
use futures_util::StreamExt;
use http::Method;
use serde::Deserialize;

use crate::client::{Client, OperationRequest};
use crate::error::{self, Error};
use crate::http::BoxByteStream;

/// Options for [`Client::listen_bucket_notification`].
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct ListenOptions {
    /// Only events for keys beginning with this prefix
    pub prefix: Option<String>,
    /// Only events for keys ending with this suffix
    pub suffix: Option<String>,
    /// Event names to subscribe to, for example `s3:ObjectCreated:*`
    pub events: Vec<String>,
}

/// One line of the notification stream.
///
/// Record content beyond the wrapping array is service defined and
/// surfaced as raw JSON values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationRecords {
    /// The event records carried by this line
    #[serde(rename = "Records", default)]
    pub records: Vec<serde_json::Value>,
}

/// Long-poll stream of bucket notifications.
pub struct NotificationStream {
    stream: BoxByteStream,
    buffer: BytesMut,
    ended: bool,
}

impl NotificationStream {
    /// The next batch of notification records.
    ///
    /// Blocks until the service sends a line; returns `None` when the
    /// service closes the stream.
    pub async fn next(&mut self) -> Option<Result<NotificationRecords, Error>> {
        loop {
            if let Some(line) = self.take_line() {
                if line.is_empty() {
                    // keep-alive
                    continue;
                }
                return Some(
                    serde_json::from_slice::<NotificationRecords>(&line)
                        .map_err(error::protocol),
                );
            }
            if self.ended {
                return None;
            }
            match self.stream.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    self.ended = true;
                    return Some(Err(error::transport(err)));
                }
                None => {
                    self.ended = true;
                    if self.buffer.iter().all(|b| b.is_ascii_whitespace()) {
                        return None;
                    }
                    let rest = self.buffer.split().freeze();
                    return Some(
                        serde_json::from_slice::<NotificationRecords>(&rest)
                            .map_err(error::protocol),
                    );
                }
            }
        }
    }

    /// Release the connection.
    pub fn close(self) {}

    fn take_line(&mut self) -> Option<BytesMut> {
        let newline = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line = self.buffer.split_to(newline + 1);
        line.truncate(newline);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(line)
    }
}

impl std::fmt::Debug for NotificationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStream")
            .field("buffered", &self.buffer.len())
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Subscribe to bucket event notifications.
    ///
    /// This long-poll endpoint is served by MinIO compatible services;
    /// call [`NotificationStream::close`] or drop the stream to release
    /// the connection.
    pub async fn listen_bucket_notification(
        &self,
        bucket: &str,
        options: &ListenOptions,
    ) -> Result<NotificationStream, Error> {
        let mut request = OperationRequest::new(Method::GET)
            .bucket(bucket)
            .query("notification", "");
        if let Some(prefix) = &options.prefix {
            request = request.query("prefix", prefix);
        }
        if let Some(suffix) = &options.suffix {
            request = request.query("suffix", suffix);
        }
        for event in &options.events {
            request = request.query("events", event);
        }

        let response = self.execute(request).await?;
        Ok(NotificationStream {
            stream: response.body.into_stream(),
            buffer: BytesMut::new(),
            ended: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn stream_of(lines: &[&str]) -> NotificationStream {
        let chunks: Vec<std::io::Result<Bytes>> = lines
            .iter()
            .map(|l| Ok(Bytes::from(l.to_string())))
            .collect();
        NotificationStream {
            stream: Box::pin(futures_util::stream::iter(chunks)),
            buffer: BytesMut::new(),
            ended: false,
        }
    }

    #[tokio::test]
    async fn skips_keepalive_lines() {
        let mut stream = stream_of(&[
            "\n",
            "{\"Records\":[{\"eventName\":\"s3:ObjectCreated:Put\"}]}\n",
            "\n",
        ]);
        let records = stream.next().await.unwrap().unwrap();
        assert_eq!(records.records.len(), 1);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn reassembles_split_lines() {
        let mut stream = stream_of(&["{\"Records\"", ":[]}\n"]);
        let records = stream.next().await.unwrap().unwrap();
        assert!(records.records.is_empty());
    }
}
