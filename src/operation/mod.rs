/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

/// Bucket lifecycle and subresource operations
pub mod bucket;

/// Server-side compose and copy
pub mod compose;

/// Object reads, including resumable downloads to disk
pub mod get_object;

/// Paginated listings
pub mod list;

/// Bucket notification long-polling
pub mod listen;

/// Presigned URLs and POST policies
pub mod presign;

/// Object and bulk deletion
pub mod remove;

/// SQL selection over object content
pub mod select;

/// Object metadata reads
pub mod stat_object;

/// Uploads, single-put and multipart
pub mod upload;
