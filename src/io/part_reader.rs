/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::cmp;
use std::path::Path;
use std::sync::Mutex;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

use crate::error::{self, Error};
use crate::http::BoxByteStream;
use crate::io::path_body::PathBody;
use crate::io::stream::RawInputStream;
use crate::io::InputStream;

/// Builder for creating a `PartReader`
#[derive(Debug)]
pub(crate) struct Builder {
    stream: Option<RawInputStream>,
    part_size: usize,
}

impl Builder {
    pub(crate) fn new() -> Self {
        Self {
            stream: None,
            part_size: crate::types::MIN_PART_SIZE as usize,
        }
    }

    /// Set the input stream to read from.
    pub(crate) fn stream(mut self, stream: InputStream) -> Self {
        self.stream = Some(stream.inner);
        self
    }

    /// Set the target part size.
    ///
    /// All parts except the last one are exactly this size.
    pub(crate) fn part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size;
        self
    }

    pub(crate) fn build(self) -> PartReader {
        let stream = self.stream.expect("input stream set");
        PartReader::new(stream, self.part_size)
    }
}

/// Cuts an input stream into numbered parts.
///
/// `next_part` may be called from several workers; each call hands out
/// the next part exactly once.
#[derive(Debug)]
pub(crate) struct PartReader {
    inner: Inner,
    part_size: usize,
}

impl PartReader {
    fn new(raw: RawInputStream, part_size: usize) -> Self {
        let inner = match raw {
            RawInputStream::Buf(buf) => Inner::Bytes(BytesPartReader::new(buf)),
            RawInputStream::Fs(body) => Inner::Fs(PathBodyPartReader::new(body)),
            RawInputStream::Dyn(body) => Inner::Dyn(DynPartReader::new(body.stream)),
        };
        Self { inner, part_size }
    }

    pub(crate) async fn next_part(&self) -> Result<Option<PartData>, Error> {
        match &self.inner {
            Inner::Bytes(reader) => reader.next_part(self.part_size),
            Inner::Fs(reader) => reader.next_part(self.part_size).await,
            Inner::Dyn(reader) => reader.next_part(self.part_size).await,
        }
    }
}

#[derive(Debug)]
enum Inner {
    Bytes(BytesPartReader),
    Fs(PathBodyPartReader),
    Dyn(DynPartReader),
}

/// Contents of a single part.
#[derive(Debug, Clone)]
pub(crate) struct PartData {
    /// 1-indexed part number
    pub(crate) part_number: u64,
    pub(crate) data: Bytes,
}

#[derive(Debug)]
struct PartReaderState {
    offset: u64,
    part_number: u64,
    remaining: u64,
}

impl PartReaderState {
    fn new(content_length: u64) -> Self {
        Self {
            offset: 0,
            part_number: 1,
            remaining: content_length,
        }
    }

    fn with_offset(self, offset: u64) -> Self {
        Self { offset, ..self }
    }
}

/// Implementation for in-memory input streams.
#[derive(Debug)]
struct BytesPartReader {
    buf: Bytes,
    state: Mutex<PartReaderState>,
}

impl BytesPartReader {
    fn new(buf: Bytes) -> Self {
        let content_length = buf.len() as u64;
        Self {
            buf,
            state: Mutex::new(PartReaderState::new(content_length)),
        }
    }

    fn next_part(&self, part_size: usize) -> Result<Option<PartData>, Error> {
        let mut state = self.state.lock().expect("lock valid");
        if state.remaining == 0 {
            return Ok(None);
        }
        let start = state.offset as usize;
        let end = cmp::min(start + part_size, self.buf.len());
        let data = self.buf.slice(start..end);
        let part_number = state.part_number;
        state.part_number += 1;
        state.offset += data.len() as u64;
        state.remaining -= data.len() as u64;
        Ok(Some(PartData { part_number, data }))
    }
}

/// Implementation for file based input streams, using positional reads so
/// parts can be fetched by concurrent workers.
#[derive(Debug)]
struct PathBodyPartReader {
    body: PathBody,
    state: Mutex<PartReaderState>,
}

impl PathBodyPartReader {
    fn new(body: PathBody) -> Self {
        let offset = body.offset;
        let content_length = body.length;
        Self {
            body,
            state: Mutex::new(PartReaderState::new(content_length).with_offset(offset)),
        }
    }

    async fn next_part(&self, part_size: usize) -> Result<Option<PartData>, Error> {
        let (offset, part_number, part_size) = {
            let mut state = self.state.lock().expect("lock valid");
            if state.remaining == 0 {
                return Ok(None);
            }
            let offset = state.offset;
            let part_number = state.part_number;
            let part_size = cmp::min(part_size as u64, state.remaining);
            state.offset += part_size;
            state.part_number += 1;
            state.remaining -= part_size;
            (offset, part_number, part_size)
        };

        let path = self.body.path.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let data = read_chunk_at(&path, offset, part_size as usize)?;
            Ok::<PartData, Error>(PartData { part_number, data })
        });

        handle.await?.map(Some)
    }
}

/// Read exactly `len` bytes of `path` starting at `offset`.
///
/// Positional reads keep no shared cursor, so concurrent workers can pull
/// their parts from one file independently.
#[cfg(unix)]
fn read_chunk_at(path: &Path, offset: u64, len: usize) -> Result<Bytes, Error> {
    use std::os::unix::fs::FileExt as _;

    let file = std::fs::File::open(path)?;
    let mut buf = BytesMut::zeroed(len);
    file.read_exact_at(&mut buf, offset)?;
    Ok(buf.freeze())
}

/// Windows has no pread equivalent in std; each chunk opens its own
/// handle and seeks, which keeps the workers independent all the same.
#[cfg(windows)]
fn read_chunk_at(path: &Path, offset: u64, len: usize) -> Result<Bytes, Error> {
    use std::io::{Read as _, Seek as _, SeekFrom};

    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = BytesMut::zeroed(len);
    file.read_exact(&mut buf)?;
    Ok(buf.freeze())
}

/// Implementation for caller supplied streams. Chunks are buffered until a
/// full part is available; a short final part marks the end of input.
struct DynPartReader {
    state: tokio::sync::Mutex<DynState>,
}

struct DynState {
    stream: BoxByteStream,
    leftover: BytesMut,
    part_number: u64,
    done: bool,
}

impl DynPartReader {
    fn new(stream: BoxByteStream) -> Self {
        Self {
            state: tokio::sync::Mutex::new(DynState {
                stream,
                leftover: BytesMut::new(),
                part_number: 1,
                done: false,
            }),
        }
    }

    async fn next_part(&self, part_size: usize) -> Result<Option<PartData>, Error> {
        let mut state = self.state.lock().await;
        while !state.done && state.leftover.len() < part_size {
            match state.stream.next().await {
                Some(Ok(chunk)) => state.leftover.extend_from_slice(&chunk),
                Some(Err(err)) => return Err(error::transport(err)),
                None => state.done = true,
            }
        }
        if state.leftover.is_empty() {
            return Ok(None);
        }
        let take = cmp::min(part_size, state.leftover.len());
        let data = state.leftover.split_to(take).freeze();
        let part_number = state.part_number;
        state.part_number += 1;
        Ok(Some(PartData { part_number, data }))
    }
}

impl std::fmt::Debug for DynPartReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DynPartReader")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    async fn collect_parts(reader: &PartReader) -> Vec<PartData> {
        let mut parts = Vec::new();
        while let Some(part) = reader.next_part().await.unwrap() {
            parts.push(part);
        }
        parts
    }

    #[tokio::test]
    async fn bytes_reader_cuts_numbered_parts() {
        let reader = Builder::new()
            .stream(InputStream::from(vec![1u8; 10]))
            .part_size(4)
            .build();
        let parts = collect_parts(&reader).await;
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].part_number, 1);
        assert_eq!(parts[0].data.len(), 4);
        assert_eq!(parts[2].part_number, 3);
        assert_eq!(parts[2].data.len(), 2);
    }

    #[tokio::test]
    async fn file_reader_reads_at_offsets() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"abcdefghij").unwrap();
        let reader = Builder::new()
            .stream(InputStream::from_path(tmp.path()).unwrap())
            .part_size(4)
            .build();
        let mut parts = Vec::new();
        while let Some(part) = reader.next_part().await.unwrap() {
            parts.push(part);
        }
        assert_eq!(parts.len(), 3);
        assert_eq!(&parts[0].data[..], b"abcd");
        assert_eq!(&parts[1].data[..], b"efgh");
        assert_eq!(&parts[2].data[..], b"ij");
    }

    #[tokio::test]
    async fn dyn_reader_coalesces_small_chunks() {
        let chunks = vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cde")),
            Ok(Bytes::from_static(b"f")),
        ];
        let stream = InputStream::from_stream(futures_util::stream::iter(chunks), None);
        let reader = Builder::new().stream(stream).part_size(4).build();
        let first = reader.next_part().await.unwrap().unwrap();
        assert_eq!(&first.data[..], b"abcd");
        let second = reader.next_part().await.unwrap().unwrap();
        assert_eq!(&second.data[..], b"ef");
        assert!(reader.next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_stream_yields_no_parts() {
        let stream = InputStream::from_stream(
            futures_util::stream::iter(Vec::<std::io::Result<Bytes>>::new()),
            None,
        );
        let reader = Builder::new().stream(stream).part_size(4).build();
        assert!(reader.next_part().await.unwrap().is_none());
    }
}
