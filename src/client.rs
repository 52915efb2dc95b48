/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The service client and its request pipeline.
//!
//! Every operation funnels through [`Client::execute`]: the pipeline
//! resolves the bucket region, builds the URL in the right addressing
//! style, categorizes the payload into one of the four signing modes,
//! signs, dispatches through the transport and converts failures into
//! typed errors.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use md5::{Digest as _, Md5};
use time::OffsetDateTime;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::error::{self, Error, ErrorContext, ErrorKind};
use crate::http::{header, Body, BoxByteStream, HttpTransport, Request, Response};
use crate::region::{normalize_location, RegionCache, DEFAULT_REGION};
use crate::sign::chunked::{signed_stream_length, ChunkSigner, SignedChunkStream, CHUNK_SIZE};
use crate::sign::v4;
use crate::xml;

/// Client for an S3 compatible object storage service.
///
/// The client is cheap to clone; clones share the transport, the
/// credentials and the region cache.
#[derive(Clone, Debug)]
pub struct Client {
    pub(crate) handle: Arc<Handle>,
}

/// State shared across clones of a client.
#[derive(Debug)]
pub(crate) struct Handle {
    pub(crate) config: Config,
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) region_cache: RegionCache,
}

impl Handle {
    pub(crate) fn concurrency(&self) -> usize {
        self.config.concurrency
    }
}

/// A not yet signed operation request.
#[derive(Debug)]
pub(crate) struct OperationRequest {
    pub(crate) method: Method,
    pub(crate) bucket: Option<String>,
    pub(crate) object: Option<String>,
    /// Pre-resolved region; `None` resolves through the cache.
    pub(crate) region: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Payload,
    /// Force a `Content-MD5` header even when the payload hash already
    /// covers the body (bulk delete and a few bucket subresources).
    pub(crate) md5_required: bool,
}

/// Request payload shapes the pipeline dispatches on.
pub(crate) enum Payload {
    None,
    Bytes(Bytes),
    /// Raw payload of exactly `length` bytes, eligible for streaming
    /// chunked signing.
    Stream { stream: BoxByteStream, length: u64 },
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::None => f.write_str("Payload::None"),
            Payload::Bytes(bytes) => f.debug_tuple("Payload::Bytes").field(bytes).finish(),
            Payload::Stream { length, .. } => f
                .debug_struct("Payload::Stream")
                .field("length", length)
                .finish(),
        }
    }
}

impl Payload {
    pub(crate) fn len(&self) -> u64 {
        match self {
            Payload::None => 0,
            Payload::Bytes(bytes) => bytes.len() as u64,
            Payload::Stream { length, .. } => *length,
        }
    }
}

impl OperationRequest {
    pub(crate) fn new(method: Method) -> Self {
        Self {
            method,
            bucket: None,
            object: None,
            region: None,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: Payload::None,
            md5_required: false,
        }
    }

    pub(crate) fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub(crate) fn object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub(crate) fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub(crate) fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub(crate) fn header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        header::append(&mut self.headers, name, value)?;
        Ok(self)
    }

    pub(crate) fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub(crate) fn body_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = Payload::Bytes(bytes.into());
        self
    }

    pub(crate) fn body_stream(mut self, stream: BoxByteStream, length: u64) -> Self {
        self.body = Payload::Stream { stream, length };
        self
    }

    pub(crate) fn md5_required(mut self) -> Self {
        self.md5_required = true;
        self
    }
}

enum PayloadMode {
    /// Streaming chunked signing for credentialed object PUTs
    Chunked,
    /// TLS carries integrity, the payload stays unsigned
    UnsignedTls,
    /// Full SHA-256 over the payload (credentials over plain HTTP)
    Signed,
    /// No credentials, nothing to sign
    Anonymous,
}

impl Client {
    /// Construct a client from its configuration.
    pub fn new(config: Config) -> Result<Self, Error> {
        let transport: Arc<dyn HttpTransport> = match &config.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(crate::http::ReqwestTransport::new(
                &config.transport_config,
                &config.user_agent(),
            )?),
        };
        let region_cache = config
            .region_cache
            .clone()
            .unwrap_or_else(RegionCache::shared);
        Ok(Self {
            handle: Arc::new(Handle {
                config,
                transport,
                region_cache,
            }),
        })
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &Config {
        &self.handle.config
    }

    /// Whether requests travel over TLS.
    pub fn is_secure(&self) -> bool {
        self.handle.config.endpoint.is_secure()
    }

    pub(crate) fn credentials(&self) -> Option<&crate::types::Credentials> {
        self.handle.config.credentials.as_ref()
    }

    /// Resolve the region to use for `bucket`.
    ///
    /// A configured region always wins; otherwise the cache answers, and
    /// on a miss the `?location` subresource is queried with the default
    /// region and the answer cached.
    pub(crate) async fn resolve_region(&self, bucket: Option<&str>) -> Result<String, Error> {
        if let Some(region) = &self.handle.config.region {
            return Ok(region.clone());
        }
        let Some(bucket) = bucket else {
            return Ok(DEFAULT_REGION.to_string());
        };
        if let Some(region) = self.handle.region_cache.get(bucket) {
            return Ok(region);
        }

        tracing::debug!(bucket, "discovering bucket region");
        let request = OperationRequest::new(Method::GET)
            .bucket(bucket)
            .query("location", "")
            .region(DEFAULT_REGION);
        let response = self.execute(request).await?;
        let body = response.body.bytes().await.map_err(error::transport)?;
        let constraint: xml::LocationConstraint = xml::from_xml(&body)?;
        let region = normalize_location(&constraint.location);
        self.handle.region_cache.set(bucket, &region);
        tracing::debug!(bucket, region = %region, "bucket region discovered");
        Ok(region)
    }

    /// Execute an operation request and return the raw response.
    ///
    /// Non-2xx responses become typed errors; a `NoSuchBucket` answer
    /// additionally drops the bucket from the region cache.
    pub(crate) async fn execute(&self, request: OperationRequest) -> Result<Response, Error> {
        let OperationRequest {
            method,
            bucket,
            object,
            region,
            mut headers,
            query,
            mut body,
            md5_required,
        } = request;

        let region = match region {
            Some(region) => region,
            None => Box::pin(self.resolve_region(bucket.as_deref())).await?,
        };
        let url = self.handle.config.endpoint.build_url(
            &method,
            bucket.as_deref(),
            object.as_deref(),
            &query,
            &region,
        )?;

        header::insert(&mut headers, "host", &Endpoint::host_header(&url))?;
        header::insert(&mut headers, "user-agent", &self.handle.config.user_agent())?;

        // A zero length stream degrades to an empty buffered body.
        if matches!(body, Payload::Stream { length: 0, .. }) {
            body = Payload::Bytes(Bytes::new());
        }

        let creds = self.handle.config.credentials.clone();
        let mode = match (&creds, &body) {
            (Some(_), Payload::Stream { .. })
                if method == Method::PUT && object.is_some() =>
            {
                PayloadMode::Chunked
            }
            (Some(_), _) if url.scheme() == "https" => PayloadMode::UnsignedTls,
            (Some(_), _) => PayloadMode::Signed,
            (None, _) => PayloadMode::Anonymous,
        };

        let mut content_sha256: Option<String> = None;
        let mut content_md5: Option<String> = None;
        let mut chunked = false;
        match mode {
            PayloadMode::Chunked => {
                chunked = true;
                let encoding = match header::get_str(&headers, "content-encoding") {
                    Some(existing) if !existing.is_empty() => format!("aws-chunked,{existing}"),
                    _ => "aws-chunked".to_string(),
                };
                header::insert(&mut headers, "content-encoding", &encoding)?;
                header::insert(
                    &mut headers,
                    "x-amz-decoded-content-length",
                    &body.len().to_string(),
                )?;
                content_sha256 = Some(v4::STREAMING_PAYLOAD.to_string());
            }
            PayloadMode::UnsignedTls => {
                content_sha256 = Some(v4::UNSIGNED_PAYLOAD.to_string());
                if let Payload::Bytes(bytes) = &body {
                    content_md5 = Some(BASE64.encode(Md5::digest(bytes)));
                }
            }
            PayloadMode::Signed => {
                // Keep the response bytes exactly as signed on the wire.
                header::insert(&mut headers, "accept-encoding", "identity")?;
                content_sha256 = Some(match &body {
                    Payload::None => v4::EMPTY_SHA256.to_string(),
                    Payload::Bytes(bytes) => {
                        if md5_required {
                            content_md5 = Some(BASE64.encode(Md5::digest(bytes)));
                        }
                        v4::sha256_hex(bytes)
                    }
                    Payload::Stream { .. } => v4::UNSIGNED_PAYLOAD.to_string(),
                });
            }
            PayloadMode::Anonymous => {
                if let Payload::Bytes(bytes) = &body {
                    content_md5 = Some(BASE64.encode(Md5::digest(bytes)));
                }
            }
        }

        if let Some(md5) = &content_md5 {
            header::insert(&mut headers, "content-md5", md5)?;
        }

        let content_length = match &body {
            Payload::Stream { length, .. } if chunked => {
                Some(signed_stream_length(*length, CHUNK_SIZE))
            }
            Payload::Stream { length, .. } => Some(*length),
            Payload::Bytes(bytes) => Some(bytes.len() as u64),
            Payload::None if method == Method::PUT || method == Method::POST => Some(0),
            Payload::None => None,
        };
        if let Some(content_length) = content_length {
            header::insert(&mut headers, "content-length", &content_length.to_string())?;
        }

        if let Some(sha) = &content_sha256 {
            header::insert(&mut headers, "x-amz-content-sha256", sha)?;
        }
        let date = OffsetDateTime::now_utc();
        header::insert(&mut headers, "x-amz-date", &v4::amz_date(date))?;

        if let Some(creds) = &creds {
            if let Some(token) = &creds.session_token {
                header::insert(&mut headers, "x-amz-security-token", token)?;
            }
            let payload_hash = content_sha256.as_deref().unwrap_or(v4::UNSIGNED_PAYLOAD);
            let seed = v4::sign_request(
                &method,
                &url,
                &mut headers,
                &region,
                creds,
                payload_hash,
                date,
            )?;
            if chunked {
                let Payload::Stream { stream, length } = body else {
                    unreachable!("chunked mode implies a stream payload")
                };
                let signer = ChunkSigner::new(&creds.secret_key, &region, date, seed);
                let framed = SignedChunkStream::new(stream, signer);
                body = Payload::Stream {
                    stream: Box::pin(framed),
                    length: signed_stream_length(length, CHUNK_SIZE),
                };
            }
        }

        let wire_body = match body {
            Payload::None => Body::Empty,
            Payload::Bytes(bytes) => Body::Bytes(bytes),
            Payload::Stream { stream, length } => Body::Stream { stream, length },
        };

        tracing::trace!(
            target: "s3_object_client::wire",
            method = %method,
            url = %url,
            "sending request"
        );
        let response = self
            .handle
            .transport
            .send(Request {
                method: method.clone(),
                url,
                headers,
                body: wire_body,
            })
            .await
            .map_err(|err| {
                error::transport(err).with_context(ErrorContext {
                    bucket: bucket.clone(),
                    key: object.clone(),
                    ..Default::default()
                })
            })?;
        tracing::trace!(
            target: "s3_object_client::wire",
            status = %response.status,
            "received response"
        );

        if response.status.is_success() {
            return Ok(response);
        }

        let status = response.status;
        let response_headers = response.headers;
        let body = if method == Method::HEAD {
            Bytes::new()
        } else {
            response
                .body
                .bytes()
                .await
                .map_err(error::transport)?
        };
        Err(self.error_from_response(
            status,
            &response_headers,
            body,
            bucket.as_deref(),
            object.as_deref(),
        ))
    }

    /// Execute and collect the full response body.
    pub(crate) async fn execute_collect(
        &self,
        request: OperationRequest,
    ) -> Result<(HeaderMap, Bytes), Error> {
        let response = self.execute(request).await?;
        let headers = response.headers;
        let body = response.body.bytes().await.map_err(error::transport)?;
        Ok((headers, body))
    }

    fn error_from_response(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        body: Bytes,
        bucket: Option<&str>,
        object: Option<&str>,
    ) -> Error {
        let mut context = ErrorContext {
            bucket: bucket.map(str::to_string),
            key: object.map(str::to_string),
            request_id: header::get_str(headers, "x-amz-request-id").map(str::to_string),
            host_id: header::get_str(headers, "x-amz-id-2").map(str::to_string),
            ..Default::default()
        };

        let (code, message, kind) = if body.is_empty() {
            match synthesize_error(status, bucket, object) {
                Some(synthesized) => synthesized,
                None => {
                    context.code = None;
                    return error::internal(format!("unexpected HTTP status {status}"))
                        .with_context(context);
                }
            }
        } else {
            let content_type = header::get_str(headers, "content-type").unwrap_or_default();
            if !content_type.to_ascii_lowercase().contains("application/xml") {
                return Error::new(
                    ErrorKind::Transport,
                    format!("expected an XML error document, got {content_type:?} (HTTP {status})"),
                )
                .with_context(context);
            }
            match xml::from_xml::<xml::ErrorDocument>(&body) {
                Ok(doc) => {
                    if !doc.bucket_name.is_empty() {
                        context.bucket = Some(doc.bucket_name);
                    }
                    if !doc.key.is_empty() {
                        context.key = Some(doc.key);
                    }
                    if !doc.request_id.is_empty() {
                        context.request_id = Some(doc.request_id);
                    }
                    if !doc.host_id.is_empty() {
                        context.host_id = Some(doc.host_id);
                    }
                    let kind = kind_for_code(&doc.code);
                    (doc.code, doc.message, kind)
                }
                Err(err) => return err.with_context(context),
            }
        };

        if code == "NoSuchBucket" {
            if let Some(bucket) = &context.bucket {
                self.handle.region_cache.remove(bucket);
            }
        }

        context.code = Some(code);
        Error::new(kind, message).with_context(context)
    }
}

/// Map a bodyless failure status onto an error code the way the service
/// would have reported it.
fn synthesize_error(
    status: StatusCode,
    bucket: Option<&str>,
    object: Option<&str>,
) -> Option<(String, String, ErrorKind)> {
    let (code, message, kind) = match status.as_u16() {
        307 => ("Redirect", "temporary redirect", ErrorKind::Transport),
        400 => ("InvalidRequest", "bad request", ErrorKind::Protocol),
        403 => ("AccessDenied", "access denied", ErrorKind::Auth),
        404 => {
            if object.is_some() {
                ("NoSuchKey", "the specified key does not exist", ErrorKind::NotFound)
            } else if bucket.is_some() {
                ("NoSuchBucket", "the specified bucket does not exist", ErrorKind::NotFound)
            } else {
                ("ResourceNotFound", "requested resource not found", ErrorKind::NotFound)
            }
        }
        405 | 501 => (
            "MethodNotAllowed",
            "the specified method is not allowed against this resource",
            ErrorKind::Protocol,
        ),
        409 => {
            if bucket.is_some() {
                ("NoSuchBucket", "the specified bucket does not exist", ErrorKind::NotFound)
            } else {
                ("ResourceConflict", "request resource conflicts", ErrorKind::Conflict)
            }
        }
        _ => return None,
    };
    Some((code.to_string(), message.to_string(), kind))
}

/// The error category a service error code belongs to.
fn kind_for_code(code: &str) -> ErrorKind {
    match code {
        "NoSuchBucket"
        | "NoSuchKey"
        | "NoSuchUpload"
        | "NoSuchVersion"
        | "NoSuchLifecycleConfiguration"
        | "NoSuchBucketPolicy"
        | "NoSuchObjectLockConfiguration"
        | "ObjectLockConfigurationNotFoundError"
        | "ServerSideEncryptionConfigurationNotFoundError"
        | "NoSuchTagSet"
        | "ResourceNotFound"
        | "NotFound" => ErrorKind::NotFound,
        "AccessDenied"
        | "InvalidAccessKeyId"
        | "SignatureDoesNotMatch"
        | "ExpiredToken"
        | "InvalidToken" => ErrorKind::Auth,
        "BucketAlreadyExists"
        | "BucketAlreadyOwnedByYou"
        | "BucketNotEmpty"
        | "OperationAborted"
        | "InvalidBucketState"
        | "ResourceConflict" => ErrorKind::Conflict,
        "RequestTimeout" => ErrorKind::Transport,
        _ => ErrorKind::Protocol,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_kinds() {
        assert_eq!(kind_for_code("NoSuchKey"), ErrorKind::NotFound);
        assert_eq!(kind_for_code("SignatureDoesNotMatch"), ErrorKind::Auth);
        assert_eq!(kind_for_code("BucketAlreadyOwnedByYou"), ErrorKind::Conflict);
        assert_eq!(kind_for_code("SomethingNew"), ErrorKind::Protocol);
    }

    #[test]
    fn synthesized_404_distinguishes_bucket_and_key() {
        let (code, _, kind) =
            synthesize_error(StatusCode::NOT_FOUND, Some("b"), Some("k")).unwrap();
        assert_eq!(code, "NoSuchKey");
        assert_eq!(kind, ErrorKind::NotFound);

        let (code, _, _) = synthesize_error(StatusCode::NOT_FOUND, Some("b"), None).unwrap();
        assert_eq!(code, "NoSuchBucket");

        assert!(synthesize_error(StatusCode::IM_A_TEAPOT, None, None).is_none());
    }
}
