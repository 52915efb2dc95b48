/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Client for Amazon S3 compatible object storage services.
//!
//! The crate covers the full request lifecycle against an S3 endpoint:
//! AWS Signature V4 signing (including the streaming chunked variant used
//! for uploads of known length), multipart uploads with automatic part
//! sizing and cleanup on failure, server-side compose/copy, paginated
//! listings as async streams, presigned URLs and POST policies, and the
//! framed `SelectObjectContent` response stream.
//!
//! # Crate Features
//!
//! - `rustls-tls` *(default)*: TLS through `rustls`.
//! - `native-tls`: TLS through the platform library.
//! - `test-util`: Enables the in-memory mock transport. DO NOT ENABLE IN
//!   PRODUCTION.

#![warn(
    missing_debug_implementations,
    missing_docs,
    rustdoc::missing_crate_level_docs,
    unreachable_pub,
    rust_2018_idioms
)]

pub(crate) const KIBIBYTE: u64 = 1024;
pub(crate) const MEBIBYTE: u64 = 1024 * KIBIBYTE;
pub(crate) const GIBIBYTE: u64 = 1024 * MEBIBYTE;

pub(crate) const DEFAULT_CONCURRENCY: usize = 8;

/// Error types emitted by `s3-object-client`
pub mod error;

/// Common types used across operations
pub mod types;

/// Endpoint parsing, bucket/object name validation and URL construction
pub mod endpoint;

/// HTTP transport abstraction and header handling
pub mod http;

/// AWS Signature V4 (header, query and chunked-payload variants)
pub(crate) mod sign;

/// Bucket region discovery and caching
pub mod region;

/// Types and helpers for I/O
pub mod io;

/// Wire documents exchanged with the service
pub(crate) mod xml;

/// Client configuration
pub mod config;

/// The service client
pub mod client;

/// Client operations
pub mod operation;

pub use client::Client;
pub use config::Config;
pub use error::Error;
