/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::HashMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use md5::{Digest as _, Md5};
use time::OffsetDateTime;

use crate::error::{self, Error};
use crate::{GIBIBYTE, MEBIBYTE};

/// Minimum size of a multipart part (except the last one).
pub const MIN_PART_SIZE: u64 = 5 * MEBIBYTE;

/// Maximum size of a single uploaded part.
pub const MAX_PART_SIZE: u64 = 5 * GIBIBYTE;

/// Maximum size of an object assembled from multipart uploads.
pub const MAX_OBJECT_SIZE: u64 = 5 * 1024 * GIBIBYTE;

/// Maximum number of parts in a single multipart upload.
pub const MAX_MULTIPART_COUNT: u64 = 10_000;

/// Longest lifetime of a presigned URL, in seconds (7 days).
pub const MAX_EXPIRY_SECONDS: u64 = 604_800;

/// Static access credentials.
///
/// Either both keys are present or the client runs anonymously; a session
/// token is only meaningful alongside the keys.
#[derive(Clone)]
pub struct Credentials {
    pub(crate) access_key: String,
    pub(crate) secret_key: String,
    pub(crate) session_token: Option<String>,
}

impl Credentials {
    /// Create credentials from an access/secret key pair.
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token,
        }
    }

    /// The access key id.
    pub fn access_key(&self) -> &str {
        &self.access_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Server-side encryption to apply to a write request.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Sse {
    /// SSE-S3: service managed keys (`AES256`)
    S3,
    /// SSE-KMS with an optional key id and encryption context
    Kms {
        /// KMS key id, service default key when absent
        key_id: Option<String>,
        /// JSON encryption context, passed through base64-encoded
        context: Option<String>,
    },
    /// SSE-C: caller supplied key, requires TLS
    Customer(SseCustomerKey),
}

impl Sse {
    /// Whether this variant may only travel over TLS.
    pub fn requires_tls(&self) -> bool {
        matches!(self, Sse::Customer(_))
    }

    pub(crate) fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            Sse::S3 => vec![("x-amz-server-side-encryption", "AES256".to_string())],
            Sse::Kms { key_id, context } => {
                let mut headers = vec![("x-amz-server-side-encryption", "aws:kms".to_string())];
                if let Some(key_id) = key_id {
                    headers.push(("x-amz-server-side-encryption-aws-kms-key-id", key_id.clone()));
                }
                if let Some(context) = context {
                    headers.push((
                        "x-amz-server-side-encryption-context",
                        BASE64.encode(context.as_bytes()),
                    ));
                }
                headers
            }
            Sse::Customer(key) => key.headers(false),
        }
    }
}

/// A customer supplied 256-bit encryption key (SSE-C).
#[derive(Clone)]
pub struct SseCustomerKey {
    key: [u8; 32],
}

impl SseCustomerKey {
    /// Wrap a raw 256-bit key.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Request headers for this key; `copy_source` selects the
    /// `x-amz-copy-source-*` variants used when the key protects the
    /// source of a server-side copy.
    pub(crate) fn headers(&self, copy_source: bool) -> Vec<(&'static str, String)> {
        let md5 = BASE64.encode(Md5::digest(self.key));
        if copy_source {
            vec![
                (
                    "x-amz-copy-source-server-side-encryption-customer-algorithm",
                    "AES256".to_string(),
                ),
                (
                    "x-amz-copy-source-server-side-encryption-customer-key",
                    BASE64.encode(self.key),
                ),
                (
                    "x-amz-copy-source-server-side-encryption-customer-key-md5",
                    md5,
                ),
            ]
        } else {
            vec![
                ("x-amz-server-side-encryption-customer-algorithm", "AES256".to_string()),
                (
                    "x-amz-server-side-encryption-customer-key",
                    BASE64.encode(self.key),
                ),
                ("x-amz-server-side-encryption-customer-key-md5", md5),
            ]
        }
    }
}

impl fmt::Debug for SseCustomerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseCustomerKey").finish_non_exhaustive()
    }
}

/// A single part of a multipart upload, identified by its client-assigned
/// number and the ETag the service returned for it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Part {
    /// Part number, 1 through 10000
    pub number: u16,
    /// ETag the service returned when the part was uploaded
    pub etag: String,
}

/// Metadata of a stored object as returned by a HEAD request.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct ObjectStat {
    /// Bucket holding the object
    pub bucket: String,
    /// Object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Entity tag, quotes stripped
    pub etag: String,
    /// `Content-Type` of the stored object
    pub content_type: Option<String>,
    /// Last modification time
    pub last_modified: Option<OffsetDateTime>,
    /// Version id when versioning is enabled
    pub version_id: Option<String>,
    /// User metadata (`x-amz-meta-*`, prefix stripped)
    pub metadata: HashMap<String, String>,
}

/// A bucket owned by the authenticated user.
#[derive(Clone, Debug)]
pub struct Bucket {
    /// Bucket name
    pub name: String,
    /// Creation time reported by the service
    pub creation_date: Option<OffsetDateTime>,
}

/// One entry of an object listing.
///
/// When listing non-recursively, common prefixes are surfaced as synthetic
/// directory entries: `is_prefix` set, zero size and a trailing `/`.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct ObjectEntry {
    /// Object key, or the common prefix for directory entries
    pub key: String,
    /// Object size, zero for directory entries
    pub size: u64,
    /// Entity tag, empty for directory entries
    pub etag: String,
    /// Last modification time
    pub last_modified: Option<OffsetDateTime>,
    /// Storage class reported by the service
    pub storage_class: Option<String>,
    /// Marks a synthetic directory entry derived from a common prefix
    pub is_prefix: bool,
}

/// One entry of a multipart upload listing.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct MultipartUploadEntry {
    /// Object key the upload targets
    pub key: String,
    /// Upload id issued at initiation
    pub upload_id: String,
    /// Initiation time
    pub initiated: Option<OffsetDateTime>,
    /// Sum of the sizes of the parts uploaded so far, when requested
    pub aggregated_part_size: Option<u64>,
}

/// One entry of a part listing.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct PartEntry {
    /// Part number
    pub number: u16,
    /// Part ETag
    pub etag: String,
    /// Part size in bytes
    pub size: u64,
    /// Upload time of the part
    pub last_modified: Option<OffsetDateTime>,
}

/// Result of an object write: a put, copy or compose.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ObjectWriteOutput {
    /// Bucket written to
    pub bucket: String,
    /// Object key written
    pub key: String,
    /// ETag of the stored object, quotes stripped
    pub etag: String,
    /// Version id when versioning is enabled
    pub version_id: Option<String>,
    /// Multipart upload id, absent for single-request writes
    pub upload_id: Option<String>,
}

/// Object lock retention mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetentionMode {
    /// Can be bypassed with `s3:BypassGovernanceRetention`
    Governance,
    /// Cannot be shortened or removed until expiry
    Compliance,
}

impl RetentionMode {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            RetentionMode::Governance => "GOVERNANCE",
            RetentionMode::Compliance => "COMPLIANCE",
        }
    }

    pub(crate) fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "GOVERNANCE" => Ok(RetentionMode::Governance),
            "COMPLIANCE" => Ok(RetentionMode::Compliance),
            other => Err(error::protocol(format!("unknown retention mode {other:?}"))),
        }
    }
}

/// Multipart partitioning for a payload of known total size.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct MultipartSizing {
    pub(crate) part_size: u64,
    pub(crate) part_count: u64,
    pub(crate) last_part_size: u64,
}

/// Compute part size, part count and last part size for `size` bytes.
///
/// The part size is the smallest multiple of [`MIN_PART_SIZE`] that keeps
/// the upload within [`MAX_MULTIPART_COUNT`] parts.
pub(crate) fn calculate_multipart_size(size: u64) -> Result<MultipartSizing, Error> {
    if size > MAX_OBJECT_SIZE {
        return Err(error::invalid_argument(format!(
            "object size {size} exceeds maximum of {MAX_OBJECT_SIZE} bytes"
        )));
    }

    let part_size = size
        .div_ceil(MAX_MULTIPART_COUNT)
        .div_ceil(MIN_PART_SIZE)
        .max(1)
        * MIN_PART_SIZE;
    let part_count = size.div_ceil(part_size).max(1);
    let mut last_part_size = part_size - (part_size * part_count - size);
    if last_part_size == 0 {
        last_part_size = part_size;
    }

    Ok(MultipartSizing {
        part_size,
        part_count,
        last_part_size,
    })
}

/// Strip the surrounding quotes the wire format puts on ETags.
pub(crate) fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_sizing_properties() {
        for size in [
            MIN_PART_SIZE,
            MIN_PART_SIZE + 1,
            100 * MEBIBYTE,
            10 * GIBIBYTE,
            10 * GIBIBYTE + 3,
            MAX_OBJECT_SIZE,
        ] {
            let sizing = calculate_multipart_size(size).unwrap();
            assert_eq!(sizing.part_size % MIN_PART_SIZE, 0, "size {size}");
            assert!(sizing.part_count <= MAX_MULTIPART_COUNT, "size {size}");
            assert!(sizing.last_part_size <= sizing.part_size, "size {size}");
            assert_eq!(
                (sizing.part_count - 1) * sizing.part_size + sizing.last_part_size,
                size,
                "size {size}"
            );
        }
    }

    #[test]
    fn ten_gibibytes_use_2048_parts() {
        let sizing = calculate_multipart_size(10 * GIBIBYTE).unwrap();
        assert_eq!(sizing.part_size, 5 * MEBIBYTE);
        assert_eq!(sizing.part_count, 2048);
        assert_eq!(sizing.last_part_size, 5 * MEBIBYTE);
    }

    #[test]
    fn oversized_object_rejected() {
        let err = calculate_multipart_size(MAX_OBJECT_SIZE + 1).unwrap_err();
        assert_eq!(*err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
