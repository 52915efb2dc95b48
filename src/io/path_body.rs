/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::path::{Path, PathBuf};

use crate::error::{self, Error};
use crate::io::InputStream;

/// File based body, read with positional reads from `offset`.
#[derive(Clone, Debug)]
pub(crate) struct PathBody {
    pub(crate) path: PathBuf,
    pub(crate) length: u64,
    pub(crate) offset: u64,
}

/// Builder for creating an [`InputStream`] from a file, with control over
/// the starting offset and the number of bytes read.
#[derive(Debug, Default)]
pub struct PathBodyBuilder {
    path: Option<PathBuf>,
    length: Option<u64>,
    offset: Option<u64>,
}

impl PathBodyBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Path of the file to read from.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Number of bytes to read. Defaults to everything after `offset`.
    pub fn length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Byte offset to start reading from. Defaults to the start of the file.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Construct the [`InputStream`].
    ///
    /// The file size is read here when no explicit length was given; the
    /// contents must not change while the stream is in use.
    pub fn build(self) -> Result<InputStream, Error> {
        let path = self
            .path
            .ok_or_else(|| error::invalid_argument("path is required"))?;
        let offset = self.offset.unwrap_or_default();
        let file_size = std::fs::metadata(&path)?.len();
        if offset > file_size {
            return Err(error::invalid_argument(format!(
                "offset {offset} is beyond the end of the {file_size} byte file"
            )));
        }
        let length = match self.length {
            Some(length) => {
                if offset + length > file_size {
                    return Err(error::invalid_argument(format!(
                        "{length} bytes at offset {offset} exceed the {file_size} byte file"
                    )));
                }
                length
            }
            None => file_size - offset,
        };

        Ok(InputStream::from_path_body(PathBody {
            path,
            length,
            offset,
        }))
    }
}
