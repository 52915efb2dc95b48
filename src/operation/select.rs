/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! SQL selection over object content.
//!
//! The response body is a stream of binary event-stream messages: a
//! fixed prelude with CRC, typed headers, payload, trailing CRC. Records
//! surface as raw byte chunks, progress and stats are retained on the
//! reader, and the `End` message marks a complete response. A response
//! dropped before `End` simply closes the connection.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::Method;

use crate::client::{Client, OperationRequest};
use crate::error::{self, Error, ErrorContext, ErrorKind};
use crate::http::BoxByteStream;
use crate::xml;

/// A `SelectObjectContent` request.
#[derive(Debug, Clone)]
pub struct SelectRequest {
    expression: String,
    input_serialization: String,
    output_serialization: String,
    request_progress: bool,
}

impl SelectRequest {
    /// Select with an SQL `expression`.
    ///
    /// The serialization arguments are the inner XML of the
    /// `InputSerialization` and `OutputSerialization` request elements,
    /// for example `<CSV><FileHeaderInfo>USE</FileHeaderInfo></CSV>` and
    /// `<CSV/>`; their content is passed through uninterpreted.
    pub fn new(
        expression: impl Into<String>,
        input_serialization: impl Into<String>,
        output_serialization: impl Into<String>,
    ) -> Self {
        Self {
            expression: expression.into(),
            input_serialization: input_serialization.into(),
            output_serialization: output_serialization.into(),
            request_progress: false,
        }
    }

    /// Ask the service to interleave progress messages.
    pub fn with_progress(mut self) -> Self {
        self.request_progress = true;
        self
    }
}

/// Scan metrics from a `Progress` or `Stats` message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct SelectMetrics {
    /// Bytes of object data scanned so far
    pub bytes_scanned: u64,
    /// Bytes decompressed and processed
    pub bytes_processed: u64,
    /// Bytes of records emitted
    pub bytes_returned: u64,
}

impl From<xml::SelectMetrics> for SelectMetrics {
    fn from(doc: xml::SelectMetrics) -> Self {
        Self {
            bytes_scanned: doc.bytes_scanned,
            bytes_processed: doc.bytes_processed,
            bytes_returned: doc.bytes_returned,
        }
    }
}

/// Streaming reader over a select response.
pub struct SelectObjectReader {
    stream: BoxByteStream,
    buffer: BytesMut,
    progress: Option<SelectMetrics>,
    stats: Option<SelectMetrics>,
    complete: bool,
}

impl SelectObjectReader {
    /// The next chunk of record data, or `None` once the response ended.
    ///
    /// Progress and stats messages are absorbed into [`progress`] and
    /// [`stats`] as they arrive.
    ///
    /// [`progress`]: Self::progress
    /// [`stats`]: Self::stats
    pub async fn next_records(&mut self) -> Result<Option<Bytes>, Error> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buffer)? {
                match self.handle_frame(frame)? {
                    FrameOutcome::Records(data) => return Ok(Some(data)),
                    FrameOutcome::End => return Ok(None),
                    FrameOutcome::Continue => continue,
                }
            }
            if self.complete {
                return Ok(None);
            }
            match self.stream.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => return Err(error::transport(err)),
                None => {
                    return Err(error::transport(
                        "select stream ended before the End message",
                    ))
                }
            }
        }
    }

    /// Collect all remaining record data into one buffer.
    pub async fn read_all(mut self) -> Result<Bytes, Error> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.next_records().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    /// The latest progress message, when progress was requested.
    pub fn progress(&self) -> Option<SelectMetrics> {
        self.progress
    }

    /// The final stats message, present once the response completed.
    pub fn stats(&self) -> Option<SelectMetrics> {
        self.stats
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<FrameOutcome, Error> {
        let message_type = frame.header(":message-type");
        if message_type == "error" {
            let code = frame.header(":error-code").to_string();
            let message = frame.header(":error-message").to_string();
            return Err(Error::new(ErrorKind::Protocol, message).with_context(ErrorContext {
                code: Some(code),
                ..Default::default()
            }));
        }
        match frame.header(":event-type") {
            "Records" => Ok(FrameOutcome::Records(frame.payload)),
            "Progress" => {
                let doc: xml::SelectMetrics = xml::from_xml(&frame.payload)?;
                self.progress = Some(doc.into());
                Ok(FrameOutcome::Continue)
            }
            "Stats" => {
                let doc: xml::SelectMetrics = xml::from_xml(&frame.payload)?;
                self.stats = Some(doc.into());
                Ok(FrameOutcome::Continue)
            }
            "Cont" => Ok(FrameOutcome::Continue),
            "End" => {
                self.complete = true;
                Ok(FrameOutcome::End)
            }
            other => Err(error::protocol(format!(
                "unknown select event type {other:?}"
            ))),
        }
    }
}

impl std::fmt::Debug for SelectObjectReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectObjectReader")
            .field("buffered", &self.buffer.len())
            .field("complete", &self.complete)
            .finish_non_exhaustive()
    }
}

enum FrameOutcome {
    Records(Bytes),
    Continue,
    End,
}

struct Frame {
    headers: HashMap<String, String>,
    payload: Bytes,
}

impl Frame {
    fn header(&self, name: &str) -> &str {
        self.headers.get(name).map(String::as_str).unwrap_or_default()
    }
}

/// Minimum message size: prelude, prelude CRC and message CRC.
const FRAME_OVERHEAD: usize = 16;

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Decode one event-stream message from the front of `buf`, or `None`
/// when more bytes are needed.
fn decode_frame(buf: &mut BytesMut) -> Result<Option<Frame>, Error> {
    if buf.len() < FRAME_OVERHEAD {
        return Ok(None);
    }
    let total_len = read_u32(&buf[0..4]) as usize;
    if total_len < FRAME_OVERHEAD {
        return Err(error::protocol(format!(
            "select frame of {total_len} bytes is too short"
        )));
    }
    if buf.len() < total_len {
        return Ok(None);
    }

    let prelude_crc = read_u32(&buf[8..12]);
    if crc32fast::hash(&buf[0..8]) != prelude_crc {
        return Err(error::protocol("select frame prelude checksum mismatch"));
    }
    let message_crc = read_u32(&buf[total_len - 4..total_len]);
    if crc32fast::hash(&buf[..total_len - 4]) != message_crc {
        return Err(error::protocol("select frame message checksum mismatch"));
    }

    let headers_len = read_u32(&buf[4..8]) as usize;
    if FRAME_OVERHEAD + headers_len > total_len {
        return Err(error::protocol("select frame header block overruns frame"));
    }

    let frame = buf.split_to(total_len).freeze();
    let headers = parse_frame_headers(&frame[12..12 + headers_len])?;
    let payload = frame.slice(12 + headers_len..total_len - 4);
    Ok(Some(Frame { headers, payload }))
}

/// Header block: repeated (name length, name, value type, value). The
/// select stream only carries string-typed (7) headers.
fn parse_frame_headers(mut data: &[u8]) -> Result<HashMap<String, String>, Error> {
    let mut headers = HashMap::new();
    while !data.is_empty() {
        let name_len = data[0] as usize;
        data = &data[1..];
        if data.len() < name_len + 3 {
            return Err(error::protocol("truncated select frame header"));
        }
        let name = std::str::from_utf8(&data[..name_len])
            .map_err(error::protocol)?
            .to_string();
        data = &data[name_len..];
        let value_type = data[0];
        if value_type != 7 {
            return Err(error::protocol(format!(
                "unsupported select header value type {value_type}"
            )));
        }
        let value_len = u16::from_be_bytes([data[1], data[2]]) as usize;
        data = &data[3..];
        if data.len() < value_len {
            return Err(error::protocol("truncated select frame header value"));
        }
        let value = std::str::from_utf8(&data[..value_len])
            .map_err(error::protocol)?
            .to_string();
        data = &data[value_len..];
        headers.insert(name, value);
    }
    Ok(headers)
}

impl Client {
    /// Run an SQL expression over an object's content.
    ///
    /// The returned reader must be consumed or dropped; an unread reader
    /// holds its connection open.
    pub async fn select_object_content(
        &self,
        bucket: &str,
        key: &str,
        select: &SelectRequest,
    ) -> Result<SelectObjectReader, Error> {
        let doc = xml::select_request_doc(
            &select.expression,
            &select.input_serialization,
            &select.output_serialization,
            select.request_progress,
        );
        let request = OperationRequest::new(Method::POST)
            .bucket(bucket)
            .object(key)
            .query("select", "")
            .query("select-type", "2")
            .header("content-type", "application/xml")?
            .body_bytes(Bytes::from(doc));

        let response = self.execute(request).await?;
        Ok(SelectObjectReader {
            stream: response.body.into_stream(),
            buffer: BytesMut::new(),
            progress: None,
            stats: None,
            complete: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
        let mut header_block = Vec::new();
        for (name, value) in headers {
            header_block.push(name.len() as u8);
            header_block.extend_from_slice(name.as_bytes());
            header_block.push(7u8);
            header_block.extend_from_slice(&(value.len() as u16).to_be_bytes());
            header_block.extend_from_slice(value.as_bytes());
        }
        let total_len = 16 + header_block.len() + payload.len();
        let mut frame = Vec::with_capacity(total_len);
        frame.extend_from_slice(&(total_len as u32).to_be_bytes());
        frame.extend_from_slice(&(header_block.len() as u32).to_be_bytes());
        frame.extend_from_slice(&crc32fast::hash(&frame[0..8]).to_be_bytes());
        frame.extend_from_slice(&header_block);
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&crc32fast::hash(&frame).to_be_bytes());
        frame
    }

    fn records_frame(payload: &[u8]) -> Vec<u8> {
        encode_frame(
            &[(":message-type", "event"), (":event-type", "Records")],
            payload,
        )
    }

    #[test]
    fn decodes_whole_frames_only() {
        let wire = records_frame(b"a,b,c\n");
        let mut buf = BytesMut::from(&wire[..wire.len() - 1]);
        assert!(decode_frame(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&wire[wire.len() - 1..]);
        let frame = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame.header(":event-type"), "Records");
        assert_eq!(&frame.payload[..], b"a,b,c\n");
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_corrupted_crc() {
        let mut wire = records_frame(b"data");
        let last = wire.len() - 1;
        wire[last] ^= 0xff;
        let mut buf = BytesMut::from(&wire[..]);
        assert!(decode_frame(&mut buf).is_err());
    }

    #[tokio::test]
    async fn reader_yields_records_until_end() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&records_frame(b"row1\n"));
        wire.extend_from_slice(&encode_frame(
            &[(":message-type", "event"), (":event-type", "Stats")],
            b"<Stats><BytesScanned>100</BytesScanned>\
              <BytesProcessed>100</BytesProcessed>\
              <BytesReturned>5</BytesReturned></Stats>",
        ));
        wire.extend_from_slice(&encode_frame(
            &[(":message-type", "event"), (":event-type", "End")],
            b"",
        ));

        let stream: BoxByteStream =
            Box::pin(futures_util::stream::iter(vec![Ok(Bytes::from(wire))]));
        let mut reader = SelectObjectReader {
            stream,
            buffer: BytesMut::new(),
            progress: None,
            stats: None,
            complete: false,
        };
        assert_eq!(&reader.next_records().await.unwrap().unwrap()[..], b"row1\n");
        assert!(reader.next_records().await.unwrap().is_none());
        assert_eq!(reader.stats().unwrap().bytes_returned, 5);
    }

    #[tokio::test]
    async fn error_event_surfaces_code() {
        let wire = encode_frame(
            &[
                (":message-type", "error"),
                (":error-code", "OverMaxRecordSize"),
                (":error-message", "record too large"),
            ],
            b"",
        );
        let stream: BoxByteStream =
            Box::pin(futures_util::stream::iter(vec![Ok(Bytes::from(wire))]));
        let mut reader = SelectObjectReader {
            stream,
            buffer: BytesMut::new(),
            progress: None,
            stats: None,
            complete: false,
        };
        let err = reader.next_records().await.unwrap_err();
        assert_eq!(err.code(), Some("OverMaxRecordSize"));
    }
}
