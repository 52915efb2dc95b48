/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Server-side copy and compose.
//!
//! A compose builds a destination object out of N source byte ranges
//! without moving data through the client: every fragment is an
//! `UploadPartCopy`, stitched together by a multipart completion. A
//! single small source degrades to one `CopyObject` request.

use http::{HeaderMap, Method};
use time::OffsetDateTime;

use crate::client::{Client, OperationRequest};
use crate::endpoint::uri_encode;
use crate::error::{self, Error};
use crate::http::header;
use crate::operation::stat_object::StatObjectOptions;
use crate::operation::upload::PutObjectOptions;
use crate::types::{
    trim_etag, ObjectWriteOutput, Part, Sse, SseCustomerKey, MAX_MULTIPART_COUNT,
    MAX_OBJECT_SIZE, MAX_PART_SIZE, MIN_PART_SIZE,
};
use crate::xml;

/// One source of a [`Client::compose_object`] or the source of a
/// [`Client::copy_object`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ComposeSource {
    /// Source bucket
    pub bucket: String,
    /// Source object key
    pub object: String,
    /// Source object version
    pub version_id: Option<String>,
    /// Byte offset into the source, start of object when unset
    pub offset: Option<u64>,
    /// Number of bytes contributed, rest of the source when unset
    pub length: Option<u64>,
    /// Copy only when the source ETag matches
    pub match_etag: Option<String>,
    /// Copy only when the source ETag does not match
    pub not_match_etag: Option<String>,
    /// Copy only when the source changed since this time
    pub modified_since: Option<OffsetDateTime>,
    /// Copy only when the source is unchanged since this time
    pub unmodified_since: Option<OffsetDateTime>,
    /// Key for sources stored with customer supplied encryption
    pub ssec: Option<SseCustomerKey>,
}

impl ComposeSource {
    /// A source covering the whole of `bucket`/`object`.
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
            version_id: None,
            offset: None,
            length: None,
            match_etag: None,
            not_match_etag: None,
            modified_since: None,
            unmodified_since: None,
            ssec: None,
        }
    }

    /// Contribute `length` bytes starting at `offset`.
    pub fn range(mut self, offset: u64, length: u64) -> Self {
        self.offset = Some(offset);
        self.length = Some(length);
        self
    }

    /// Contribute everything from `offset` to the end of the source.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn stat_options(&self) -> StatObjectOptions {
        StatObjectOptions {
            version_id: self.version_id.clone(),
            match_etag: self.match_etag.clone(),
            not_match_etag: self.not_match_etag.clone(),
            modified_since: self.modified_since,
            unmodified_since: self.unmodified_since,
            ssec: self.ssec.clone(),
        }
    }

    /// `x-amz-copy-source` value addressing this source.
    fn copy_source(&self) -> String {
        let mut value = format!(
            "/{}/{}",
            uri_encode(&self.bucket, true),
            uri_encode(&self.object, false)
        );
        if let Some(version_id) = &self.version_id {
            value.push_str("?versionId=");
            value.push_str(&uri_encode(version_id, true));
        }
        value
    }

    /// Copy-source headers: the address, the conditions pinning the copy
    /// to `etag`, and the source encryption key.
    fn copy_headers(&self, etag: &str) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        header::insert(&mut headers, "x-amz-copy-source", &self.copy_source())?;
        let match_etag = self.match_etag.clone().unwrap_or_else(|| etag.to_string());
        if !match_etag.is_empty() {
            header::insert(
                &mut headers,
                "x-amz-copy-source-if-match",
                &format!("\"{match_etag}\""),
            )?;
        }
        if let Some(etag) = &self.not_match_etag {
            header::insert(
                &mut headers,
                "x-amz-copy-source-if-none-match",
                &format!("\"{etag}\""),
            )?;
        }
        if let Some(t) = self.modified_since {
            header::insert(
                &mut headers,
                "x-amz-copy-source-if-modified-since",
                &header::format_http_date(t),
            )?;
        }
        if let Some(t) = self.unmodified_since {
            header::insert(
                &mut headers,
                "x-amz-copy-source-if-unmodified-since",
                &header::format_http_date(t),
            )?;
        }
        if let Some(ssec) = &self.ssec {
            for (name, value) in ssec.headers(true) {
                header::insert(&mut headers, name, &value)?;
            }
        }
        Ok(headers)
    }
}

/// A source with size and ETag resolved by a HEAD request.
#[derive(Debug)]
struct ResolvedSource {
    source: ComposeSource,
    etag: String,
    offset: u64,
    contribution: u64,
}

impl Client {
    /// Server-side copy of one object, optionally restricted to a byte
    /// range, into `bucket`/`key`.
    pub async fn copy_object(
        &self,
        bucket: &str,
        key: &str,
        source: &ComposeSource,
        options: &PutObjectOptions,
    ) -> Result<ObjectWriteOutput, Error> {
        if source.ssec.is_some() && !self.is_secure() {
            return Err(error::invalid_argument(
                "customer supplied encryption keys require TLS",
            ));
        }
        let mut headers = copy_destination_headers(self, options)?;
        let source_headers = source.copy_headers("")?;
        headers.extend(source_headers);
        if source.offset.is_some() || source.length.is_some() {
            let offset = source.offset.unwrap_or(0);
            header::insert(
                &mut headers,
                "x-amz-copy-source-range",
                &header::format_range(offset, source.length),
            )?;
        }

        self.copy_object_request(bucket, key, headers).await
    }

    /// Compose `sources` into `bucket`/`key` with server-side part
    /// copies; no object data travels through the client.
    pub async fn compose_object(
        &self,
        bucket: &str,
        key: &str,
        sources: &[ComposeSource],
        options: &PutObjectOptions,
    ) -> Result<ObjectWriteOutput, Error> {
        if sources.is_empty() {
            return Err(error::invalid_argument("compose needs at least one source"));
        }

        let (resolved, part_count) = self.resolve_compose_sources(sources).await?;

        if part_count == 1 {
            let src = &resolved[0];
            let mut headers = copy_destination_headers(self, options)?;
            headers.extend(src.source.copy_headers(&src.etag)?);
            if src.source.offset.is_some() || src.source.length.is_some() {
                header::insert(
                    &mut headers,
                    "x-amz-copy-source-range",
                    &header::format_range(src.offset, Some(src.contribution)),
                )?;
            }
            return self.copy_object_request(bucket, key, headers).await;
        }

        let upload_id = self
            .create_multipart_upload(bucket, key, options.build_headers(self)?)
            .await?;
        tracing::trace!(
            bucket,
            key,
            upload_id = %upload_id,
            part_count,
            "composing with server-side part copies"
        );
        let result = self
            .copy_compose_parts(bucket, key, &upload_id, &resolved, options)
            .await;
        match result {
            Ok(parts) => {
                self.complete_multipart_upload(bucket, key, &upload_id, &parts)
                    .await
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_multipart_upload(bucket, key, &upload_id).await {
                    tracing::warn!(
                        bucket,
                        key,
                        upload_id = %upload_id,
                        error = %abort_err,
                        "failed to abort compose upload"
                    );
                }
                Err(err)
            }
        }
    }

    /// HEAD every source and validate the batch: minimum fragment sizes,
    /// total object size, aggregate part count, and no client-side
    /// encryption metadata beyond the first source.
    async fn resolve_compose_sources(
        &self,
        sources: &[ComposeSource],
    ) -> Result<(Vec<ResolvedSource>, u64), Error> {
        let mut resolved = Vec::with_capacity(sources.len());
        let mut total_size: u64 = 0;
        let mut part_count: u64 = 0;

        for (i, source) in sources.iter().enumerate() {
            if source.ssec.is_some() && !self.is_secure() {
                return Err(error::invalid_argument(
                    "customer supplied encryption keys require TLS",
                ));
            }
            let stat = self
                .stat_object(&source.bucket, &source.object, &source.stat_options())
                .await?;
            if i != 0 && stat.metadata.contains_key("x-amz-key") {
                return Err(error::invalid_argument(format!(
                    "source {}/{} carries client-side encryption metadata and can only be the first source",
                    source.bucket, source.object
                )));
            }

            let offset = source.offset.unwrap_or(0);
            if offset > stat.size {
                return Err(error::invalid_argument(format!(
                    "offset {offset} is beyond the {} byte source {}/{}",
                    stat.size, source.bucket, source.object
                )));
            }
            let contribution = match source.length {
                Some(length) => {
                    if offset + length > stat.size {
                        return Err(error::invalid_argument(format!(
                            "{length} bytes at offset {offset} exceed the {} byte source {}/{}",
                            stat.size, source.bucket, source.object
                        )));
                    }
                    length
                }
                None => stat.size - offset,
            };

            let terminal = i == sources.len() - 1;
            if contribution < MIN_PART_SIZE && sources.len() != 1 && !terminal {
                return Err(error::invalid_argument(format!(
                    "source {}/{} contributes {contribution} bytes, below the {MIN_PART_SIZE} byte minimum for non-terminal sources",
                    source.bucket, source.object
                )));
            }

            total_size += contribution;
            if total_size > MAX_OBJECT_SIZE {
                return Err(error::invalid_argument(format!(
                    "composed size {total_size} exceeds maximum of {MAX_OBJECT_SIZE} bytes"
                )));
            }

            let fragments = if contribution > MAX_PART_SIZE {
                let full = contribution / MAX_PART_SIZE;
                let tail = contribution % MAX_PART_SIZE;
                if tail > 0 && tail < MIN_PART_SIZE && sources.len() != 1 && !terminal {
                    return Err(error::invalid_argument(format!(
                        "source {}/{} splits into a {tail} byte tail fragment, below the {MIN_PART_SIZE} byte minimum",
                        source.bucket, source.object
                    )));
                }
                full + u64::from(tail > 0)
            } else {
                1
            };
            part_count += fragments;
            if part_count > MAX_MULTIPART_COUNT {
                return Err(error::invalid_argument(format!(
                    "compose needs more than {MAX_MULTIPART_COUNT} parts"
                )));
            }

            resolved.push(ResolvedSource {
                source: source.clone(),
                etag: stat.etag,
                offset,
                contribution,
            });
        }

        Ok((resolved, part_count))
    }

    async fn copy_compose_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        sources: &[ResolvedSource],
        options: &PutObjectOptions,
    ) -> Result<Vec<Part>, Error> {
        let dest_ssec = destination_ssec_headers(options);
        let mut parts = Vec::new();
        let mut part_number: u16 = 0;

        for src in sources {
            let end = src.offset + src.contribution;
            let mut start = src.offset;
            while start < end {
                part_number += 1;
                let fragment_end = (start + MAX_PART_SIZE).min(end);
                let part = self
                    .upload_part_copy(
                        bucket,
                        key,
                        upload_id,
                        part_number,
                        src,
                        start,
                        fragment_end - 1,
                        &dest_ssec,
                    )
                    .await?;
                parts.push(part);
                start = fragment_end;
            }
        }
        Ok(parts)
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_part_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u16,
        source: &ResolvedSource,
        first_byte: u64,
        last_byte: u64,
        dest_ssec: &HeaderMap,
    ) -> Result<Part, Error> {
        let mut headers = source.source.copy_headers(&source.etag)?;
        header::insert(
            &mut headers,
            "x-amz-copy-source-range",
            &format!("bytes={first_byte}-{last_byte}"),
        )?;
        headers.extend(dest_ssec.clone());

        let request = OperationRequest::new(Method::PUT)
            .bucket(bucket)
            .object(key)
            .query("partNumber", part_number.to_string())
            .query("uploadId", upload_id)
            .headers(headers);
        let (_, body) = self.execute_collect(request).await?;
        let result: xml::CopyResult = xml::from_xml(&body)?;
        let etag = trim_etag(&result.etag);
        if etag.is_empty() {
            return Err(error::protocol(format!(
                "part copy {part_number} response carried no ETag"
            )));
        }
        Ok(Part {
            number: part_number,
            etag,
        })
    }

    async fn copy_object_request(
        &self,
        bucket: &str,
        key: &str,
        headers: HeaderMap,
    ) -> Result<ObjectWriteOutput, Error> {
        let request = OperationRequest::new(Method::PUT)
            .bucket(bucket)
            .object(key)
            .headers(headers);
        let (response_headers, body) = self.execute_collect(request).await?;
        let result: xml::CopyResult = xml::from_xml(&body)?;
        Ok(ObjectWriteOutput {
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag: trim_etag(&result.etag),
            version_id: header::get_str(&response_headers, "x-amz-version-id").map(str::to_string),
            upload_id: None,
        })
    }
}

/// Destination-side headers of a copy: metadata, storage class and
/// encryption, with the metadata directive set when metadata is replaced.
fn copy_destination_headers(
    client: &Client,
    options: &PutObjectOptions,
) -> Result<HeaderMap, Error> {
    let mut headers = options.build_headers(client)?;
    if !options.user_metadata.is_empty() || options.content_type.is_some() {
        header::insert(&mut headers, "x-amz-metadata-directive", "REPLACE")?;
    }
    Ok(headers)
}

fn destination_ssec_headers(options: &PutObjectOptions) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(Sse::Customer(key)) = &options.sse {
        for (name, value) in key.headers(false) {
            let _ = header::insert(&mut headers, name, &value);
        }
    }
    headers
}
