/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::StreamExt;
use http::Method;
use tokio::io::AsyncWriteExt;

use crate::client::{Client, OperationRequest};
use crate::error::{self, Error};
use crate::http::{header, BoxByteStream, ResponseBody};
use crate::operation::stat_object::{object_stat_from_headers, StatObjectOptions};
use crate::types::ObjectStat;

/// Suffix of the temporary file used by resumable downloads.
const PART_FILE_SUFFIX: &str = ".part.minio";

/// Options for [`Client::get_object`].
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct GetObjectOptions {
    /// Conditional read and encryption settings
    pub stat: StatObjectOptions,
    /// Byte offset to start reading from
    pub offset: Option<u64>,
    /// Number of bytes to read from `offset`
    pub length: Option<u64>,
}

impl GetObjectOptions {
    /// Read a specific object version.
    pub fn version(version_id: impl Into<String>) -> Self {
        Self {
            stat: StatObjectOptions {
                version_id: Some(version_id.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// A retrieved object: its metadata and the streaming body.
#[derive(Debug)]
pub struct ObjectContent {
    stat: ObjectStat,
    body: ResponseBody,
}

impl ObjectContent {
    /// Metadata parsed from the response headers.
    pub fn stat(&self) -> &ObjectStat {
        &self.stat
    }

    /// Collect the whole body into memory.
    pub async fn bytes(self) -> Result<Bytes, Error> {
        self.body.bytes().await.map_err(error::transport)
    }

    /// The body as a stream of byte chunks.
    pub fn into_stream(self) -> BoxByteStream {
        self.body.into_stream()
    }
}

impl Client {
    /// Retrieve an object, or a byte range of it.
    ///
    /// The returned body must be consumed or dropped; holding it keeps
    /// the underlying connection busy.
    pub async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        options: &GetObjectOptions,
    ) -> Result<ObjectContent, Error> {
        if let Some(length) = options.length {
            if length == 0 {
                return Err(error::invalid_argument("length must be greater than zero"));
            }
        }

        let mut request = OperationRequest::new(Method::GET).bucket(bucket).object(key);
        options.stat.apply(self, &mut request.headers)?;
        if let Some(version_id) = &options.stat.version_id {
            request = request.query("versionId", version_id);
        }
        if options.offset.is_some() || options.length.is_some() {
            header::insert(
                &mut request.headers,
                "range",
                &header::format_range(options.offset.unwrap_or(0), options.length),
            )?;
        }

        let response = self.execute(request).await?;
        Ok(ObjectContent {
            stat: object_stat_from_headers(bucket, key, &response.headers),
            body: response.body,
        })
    }

    /// Download an object to `path`, resuming an earlier interrupted
    /// download when its temporary file is still present.
    ///
    /// Partial content accumulates in `<path>.<etag>.part.minio`; on
    /// success the temporary file is atomically renamed over `path`. When
    /// `path` already holds the full object the download is skipped.
    pub async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        path: impl AsRef<Path>,
        options: &GetObjectOptions,
    ) -> Result<ObjectStat, Error> {
        if options.offset.is_some() || options.length.is_some() {
            return Err(error::invalid_argument(
                "ranged downloads cannot be resumed to a file",
            ));
        }
        let path = path.as_ref();
        let stat = self.stat_object(bucket, key, &options.stat).await?;

        if let Ok(existing) = tokio::fs::metadata(path).await {
            if existing.len() == stat.size {
                tracing::debug!(path = %path.display(), "destination already complete");
                return Ok(stat);
            }
            if existing.len() > stat.size {
                return Err(error::invalid_argument(format!(
                    "destination file is {} bytes, larger than the {} byte object",
                    existing.len(),
                    stat.size
                )));
            }
        }

        let temp_path = part_file_path(path, &stat.etag);
        let mut offset = match tokio::fs::metadata(&temp_path).await {
            Ok(meta) if meta.len() <= stat.size => meta.len(),
            Ok(_) => {
                // A stale temp file larger than the object restarts clean.
                tokio::fs::remove_file(&temp_path).await?;
                0
            }
            Err(_) => 0,
        };

        if offset < stat.size {
            let mut get_options = options.clone();
            if offset > 0 {
                tracing::debug!(offset, path = %temp_path.display(), "resuming download");
                get_options.offset = Some(offset);
            }
            // Pin the version resumed across requests to the ETag seen at
            // the start; a changed object restarts with a fresh temp file.
            get_options.stat.match_etag = Some(stat.etag.clone());

            let object = self.get_object(bucket, key, &get_options).await?;
            let mut stream = object.into_stream();
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&temp_path)
                .await?;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(error::transport)?;
                file.write_all(&chunk).await?;
                offset += chunk.len() as u64;
            }
            file.flush().await?;
            drop(file);

            if offset != stat.size {
                return Err(error::transport(format!(
                    "download ended early: got {offset} of {} bytes",
                    stat.size
                )));
            }
        }

        tokio::fs::rename(&temp_path, path).await?;
        Ok(stat)
    }
}

fn part_file_path(destination: &Path, etag: &str) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(format!(".{etag}{PART_FILE_SUFFIX}"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_file_name_includes_etag() {
        let path = part_file_path(Path::new("/tmp/data.bin"), "9b2cf535f27731c974343645a3985328");
        assert_eq!(
            path,
            PathBuf::from("/tmp/data.bin.9b2cf535f27731c974343645a3985328.part.minio")
        );
    }
}
