/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use futures_util::Stream;

use crate::error::Error;
use crate::http::BoxByteStream;
use crate::io::path_body::{PathBody, PathBodyBuilder};
use crate::io::SizeHint;

/// Source of binary data for an upload.
///
/// Wraps the supported body shapes: an in-memory buffer, a file read with
/// positional reads, or a caller supplied byte stream with a known or
/// unknown total length.
#[derive(Debug)]
pub struct InputStream {
    pub(crate) inner: RawInputStream,
}

impl InputStream {
    /// Create a new `InputStream` from a static byte slice.
    pub fn from_static(bytes: &'static [u8]) -> Self {
        RawInputStream::Buf(bytes.into()).into()
    }

    /// Returns a [`PathBodyBuilder`] for building a file backed stream
    /// with an explicit offset or length.
    pub fn read_from() -> PathBodyBuilder {
        PathBodyBuilder::new()
    }

    /// Create a new `InputStream` that reads the whole file at `path`.
    ///
    /// The length is captured up front; the file must not change while
    /// the stream is in use.
    pub fn from_path(path: impl AsRef<Path>) -> Result<InputStream, Error> {
        Self::read_from().path(path).build()
    }

    /// Create a new `InputStream` from a byte stream.
    ///
    /// Pass the total length when it is known up front: uploads of known
    /// length go out as a single signed streaming request where possible,
    /// unknown lengths force multipart probing.
    pub fn from_stream<S>(stream: S, length: Option<u64>) -> Self
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    {
        RawInputStream::Dyn(DynBody {
            stream: Box::pin(stream),
            length,
        })
        .into()
    }

    pub(crate) fn from_path_body(body: PathBody) -> Self {
        RawInputStream::Fs(body).into()
    }

    /// Return the bounds on the remaining length of the stream.
    pub fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }

    /// Convert into a raw chunk stream plus its known length, if any.
    pub(crate) fn into_byte_stream(self) -> (BoxByteStream, Option<u64>) {
        match self.inner {
            RawInputStream::Buf(bytes) => {
                let length = bytes.len() as u64;
                let stream = futures_util::stream::iter((!bytes.is_empty()).then_some(Ok(bytes)));
                (Box::pin(stream), Some(length))
            }
            RawInputStream::Fs(body) => {
                let length = body.length;
                (Box::pin(file_chunk_stream(body)), Some(length))
            }
            RawInputStream::Dyn(body) => (body.stream, body.length),
        }
    }
}

const FILE_READ_CHUNK: usize = 64 * 1024;

/// Stream a file region as byte chunks.
fn file_chunk_stream(body: PathBody) -> impl Stream<Item = std::io::Result<Bytes>> + Send {
    struct State {
        body: PathBody,
        file: Option<tokio::fs::File>,
        remaining: u64,
    }

    futures_util::stream::try_unfold(
        State {
            remaining: body.length,
            body,
            file: None,
        },
        |mut state| async move {
            use tokio::io::{AsyncReadExt, AsyncSeekExt};

            if state.remaining == 0 {
                return Ok(None);
            }
            if state.file.is_none() {
                let mut file = tokio::fs::File::open(&state.body.path).await?;
                file.seek(std::io::SeekFrom::Start(state.body.offset)).await?;
                state.file = Some(file);
            }
            let want = state.remaining.min(FILE_READ_CHUNK as u64) as usize;
            let mut buf = vec![0u8; want];
            let file = state.file.as_mut().expect("file opened above");
            let n = file.read(&mut buf).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "file shrank while streaming",
                ));
            }
            buf.truncate(n);
            state.remaining -= n as u64;
            Ok(Some((Bytes::from(buf), state)))
        },
    )
}

impl Default for InputStream {
    fn default() -> Self {
        RawInputStream::Buf(Bytes::default()).into()
    }
}

impl From<Bytes> for InputStream {
    fn from(value: Bytes) -> Self {
        RawInputStream::Buf(value).into()
    }
}

impl From<Vec<u8>> for InputStream {
    fn from(value: Vec<u8>) -> Self {
        RawInputStream::Buf(value.into()).into()
    }
}

impl From<String> for InputStream {
    fn from(value: String) -> Self {
        RawInputStream::Buf(value.into()).into()
    }
}

impl From<RawInputStream> for InputStream {
    fn from(inner: RawInputStream) -> Self {
        Self { inner }
    }
}

pub(crate) enum RawInputStream {
    /// In-memory buffer
    Buf(Bytes),
    /// File based input
    Fs(PathBody),
    /// Caller provided stream
    Dyn(DynBody),
}

pub(crate) struct DynBody {
    pub(crate) stream: BoxByteStream,
    pub(crate) length: Option<u64>,
}

impl RawInputStream {
    pub(crate) fn size_hint(&self) -> SizeHint {
        match self {
            RawInputStream::Buf(bytes) => SizeHint::exact(bytes.len() as u64),
            RawInputStream::Fs(body) => SizeHint::exact(body.length),
            RawInputStream::Dyn(body) => match body.length {
                Some(length) => SizeHint::exact(length),
                None => SizeHint::at_least(0),
            },
        }
    }
}

impl fmt::Debug for RawInputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawInputStream::Buf(bytes) => f.debug_tuple("Buf").field(&bytes.len()).finish(),
            RawInputStream::Fs(body) => f.debug_tuple("Fs").field(body).finish(),
            RawInputStream::Dyn(body) => f.debug_tuple("Dyn").field(&body.length).finish(),
        }
    }
}
