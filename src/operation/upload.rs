/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Uploads: single-put and the multipart orchestrator.
//!
//! Payloads of known size up to the maximum part size go out as one
//! request. Anything larger, and streams of unknown length, run the
//! three-step multipart protocol; any failure past initiation aborts the
//! upload before the error is surfaced.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{HeaderMap, Method};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tower::{service_fn, Service, ServiceBuilder, ServiceExt};
use tracing::Instrument;

use crate::client::{Client, OperationRequest};
use crate::error::{self, Error};
use crate::http::header;
use crate::io::part_reader::{Builder as PartReaderBuilder, PartData, PartReader};
use crate::io::InputStream;
use crate::types::{
    calculate_multipart_size, trim_etag, ObjectWriteOutput, Part, RetentionMode, Sse,
    MAX_MULTIPART_COUNT, MAX_OBJECT_SIZE, MAX_PART_SIZE, MIN_PART_SIZE,
};
use crate::xml;

/// Options for [`Client::put_object`].
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct PutObjectOptions {
    /// `Content-Type` of the object, `application/octet-stream` when unset
    pub content_type: Option<String>,
    /// User metadata stored with the object (`x-amz-meta-*`)
    pub user_metadata: Vec<(String, String)>,
    /// Additional headers; unrecognized names become user metadata
    pub headers: Vec<(String, String)>,
    /// Server-side encryption for the stored object
    pub sse: Option<Sse>,
    /// Storage class for the stored object
    pub storage_class: Option<String>,
    /// Fixed part size; computed from the payload size when unset
    pub part_size: Option<u64>,
    /// Put the object under legal hold
    pub legal_hold: bool,
    /// Object lock retention applied to the object
    pub retention: Option<(RetentionMode, OffsetDateTime)>,
}

impl PutObjectOptions {
    pub(crate) fn build_headers(&self, client: &Client) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        header::insert(
            &mut headers,
            "content-type",
            self.content_type.as_deref().unwrap_or("application/octet-stream"),
        )?;
        if let Some(sse) = &self.sse {
            if sse.requires_tls() && !client.is_secure() {
                return Err(error::invalid_argument(
                    "customer supplied encryption keys require TLS",
                ));
            }
            for (name, value) in sse.headers() {
                header::insert(&mut headers, name, &value)?;
            }
        }
        if let Some(storage_class) = &self.storage_class {
            header::insert(&mut headers, "x-amz-storage-class", storage_class)?;
        }
        for (name, value) in &self.user_metadata {
            header::insert(&mut headers, &format!("x-amz-meta-{name}"), value)?;
        }
        header::add_normalized(
            &mut headers,
            self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )?;
        if self.legal_hold {
            header::insert(&mut headers, "x-amz-object-lock-legal-hold", "ON")?;
        }
        if let Some((mode, retain_until)) = &self.retention {
            header::insert(&mut headers, "x-amz-object-lock-mode", mode.as_str())?;
            header::insert(
                &mut headers,
                "x-amz-object-lock-retain-until-date",
                &retain_until.format(&Rfc3339).map_err(error::internal)?,
            )?;
        }
        Ok(headers)
    }

    /// Headers repeated on every part upload: only SSE-C travels with the
    /// parts, the rest belongs to the initiation request.
    pub(crate) fn part_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(Sse::Customer(key)) = &self.sse {
            for (name, value) in key.headers(false) {
                let _ = header::insert(&mut headers, name, &value);
            }
        }
        headers
    }
}

impl Client {
    /// Store an object.
    ///
    /// Payloads above the maximum single part size, and streams of
    /// unknown length that turn out to span more than one part, are
    /// uploaded with the multipart protocol; on any failure the upload is
    /// aborted before the error is returned.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: InputStream,
        options: &PutObjectOptions,
    ) -> Result<ObjectWriteOutput, Error> {
        let headers = options.build_headers(self)?;

        if let Some(part_size) = options.part_size {
            if !(MIN_PART_SIZE..=MAX_PART_SIZE).contains(&part_size) {
                return Err(error::invalid_argument(format!(
                    "part size {part_size} outside of allowed range [{MIN_PART_SIZE}, {MAX_PART_SIZE}]"
                )));
            }
        }

        match body.size_hint().upper() {
            Some(size) if size > MAX_OBJECT_SIZE => Err(error::invalid_argument(format!(
                "object size {size} exceeds maximum of {MAX_OBJECT_SIZE} bytes"
            ))),
            Some(size) => {
                let (part_size, part_count) = match options.part_size {
                    Some(part_size) => {
                        let count = size.div_ceil(part_size).max(1);
                        if count > MAX_MULTIPART_COUNT {
                            return Err(error::invalid_argument(format!(
                                "part size {part_size} needs {count} parts, more than the allowed {MAX_MULTIPART_COUNT}"
                            )));
                        }
                        (part_size, count)
                    }
                    // Without an explicit part size anything that fits in
                    // one part goes out as a single request.
                    None if size <= MAX_PART_SIZE => (size.max(1), 1),
                    None => {
                        let sizing = calculate_multipart_size(size)?;
                        (sizing.part_size, sizing.part_count)
                    }
                };

                if part_count == 1 {
                    self.put_object_single(bucket, key, headers, body).await
                } else {
                    self.multipart_upload_sized(bucket, key, headers, options, body, part_size, part_count)
                        .await
                }
            }
            None => {
                let part_size = match options.part_size {
                    Some(part_size) => part_size,
                    None => calculate_multipart_size(MAX_OBJECT_SIZE)?.part_size,
                };
                self.multipart_upload_unsized(bucket, key, headers, options, body, part_size)
                    .await
            }
        }
    }

    /// Remove an in-progress multipart upload of `key`, aborting every
    /// upload id the service still tracks for it.
    pub async fn remove_incomplete_upload(&self, bucket: &str, key: &str) -> Result<(), Error> {
        use futures_util::StreamExt;

        let uploads = self.list_multipart_uploads(
            bucket,
            &crate::operation::list::ListMultipartUploadsOptions {
                prefix: Some(key.to_string()),
                recursive: true,
                ..Default::default()
            },
        );
        futures_util::pin_mut!(uploads);
        while let Some(upload) = uploads.next().await {
            let upload = upload?;
            if upload.key == key {
                self.abort_multipart_upload(bucket, key, &upload.upload_id).await?;
            }
        }
        Ok(())
    }

    async fn put_object_single(
        &self,
        bucket: &str,
        key: &str,
        headers: HeaderMap,
        body: InputStream,
    ) -> Result<ObjectWriteOutput, Error> {
        let (stream, length) = body.into_byte_stream();
        let length = length.unwrap_or_default();
        tracing::trace!(bucket, key, length, "uploading in a single request");

        let request = OperationRequest::new(Method::PUT)
            .bucket(bucket)
            .object(key)
            .headers(headers)
            .body_stream(stream, length);
        let (response_headers, _) = self.execute_collect(request).await?;

        Ok(ObjectWriteOutput {
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag: header::get_str(&response_headers, "etag")
                .map(trim_etag)
                .unwrap_or_default(),
            version_id: header::get_str(&response_headers, "x-amz-version-id").map(str::to_string),
            upload_id: None,
        })
    }

    /// Multipart upload of a payload with known size: parts are read
    /// concurrently and uploaded through a concurrency-limited service.
    async fn multipart_upload_sized(
        &self,
        bucket: &str,
        key: &str,
        headers: HeaderMap,
        options: &PutObjectOptions,
        body: InputStream,
        part_size: u64,
        part_count: u64,
    ) -> Result<ObjectWriteOutput, Error> {
        let upload_id = self.create_multipart_upload(bucket, key, headers).await?;
        tracing::trace!(bucket, key, upload_id = %upload_id, part_size, part_count, "multipart upload started");

        let result = self
            .upload_parts_sized(bucket, key, &upload_id, options, body, part_size, part_count)
            .await;
        match result {
            Ok(parts) => {
                self.complete_multipart_upload(bucket, key, &upload_id, &parts)
                    .await
            }
            Err(err) => {
                self.abort_on_failure(bucket, key, &upload_id).await;
                Err(err)
            }
        }
    }

    async fn upload_parts_sized(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        options: &PutObjectOptions,
        body: InputStream,
        part_size: u64,
        part_count: u64,
    ) -> Result<Vec<Part>, Error> {
        let part_reader = Arc::new(
            PartReaderBuilder::new()
                .stream(body)
                .part_size(part_size as usize)
                .build(),
        );
        let completed: Arc<Mutex<Vec<Part>>> = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::new(UploadPartContext {
            client: self.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            part_headers: options.part_headers(),
        });

        let n_workers = self.handle.concurrency().min(part_count as usize).max(1);
        let svc = upload_part_service(n_workers);
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..n_workers {
            let worker = read_and_upload(
                part_reader.clone(),
                shared.clone(),
                svc.clone(),
                completed.clone(),
            )
            .instrument(tracing::debug_span!("upload_part_worker", worker = i));
            tasks.spawn(worker);
        }

        let mut first_error: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                    tasks.abort_all();
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(join_err.into());
                    }
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        let mut parts = Arc::try_unwrap(completed)
            .map_err(|_| error::internal("part collector still shared"))?
            .into_inner()?;
        parts.sort_by_key(|part| part.number);
        if parts.len() as u64 != part_count {
            return Err(error::internal(format!(
                "uploaded {} parts, expected {part_count}",
                parts.len()
            )));
        }
        Ok(parts)
    }

    /// Multipart upload of a stream with unknown length. Each part is
    /// probed for a successor before upload; a stream that fits in the
    /// first part entirely degrades to a single-put request.
    async fn multipart_upload_unsized(
        &self,
        bucket: &str,
        key: &str,
        headers: HeaderMap,
        options: &PutObjectOptions,
        body: InputStream,
        part_size: u64,
    ) -> Result<ObjectWriteOutput, Error> {
        let reader = PartReaderBuilder::new()
            .stream(body)
            .part_size(part_size as usize)
            .build();

        let Some(first) = reader.next_part().await? else {
            return self
                .put_object_single(bucket, key, headers, InputStream::from(Bytes::new()))
                .await;
        };
        let second = reader.next_part().await?;
        let Some(second) = second else {
            tracing::trace!(bucket, key, "stream fits one part, using a single request");
            return self
                .put_object_single(bucket, key, headers, InputStream::from(first.data))
                .await;
        };

        let upload_id = self.create_multipart_upload(bucket, key, headers).await?;
        tracing::trace!(bucket, key, upload_id = %upload_id, part_size, "multipart upload of unsized stream");
        let result = self
            .upload_parts_unsized(bucket, key, &upload_id, options, &reader, first, second)
            .await;
        match result {
            Ok(parts) => {
                self.complete_multipart_upload(bucket, key, &upload_id, &parts)
                    .await
            }
            Err(err) => {
                self.abort_on_failure(bucket, key, &upload_id).await;
                Err(err)
            }
        }
    }

    async fn upload_parts_unsized(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        options: &PutObjectOptions,
        reader: &PartReader,
        first: PartData,
        second: PartData,
    ) -> Result<Vec<Part>, Error> {
        let part_headers = options.part_headers();
        let mut queue: VecDeque<PartData> = VecDeque::from([first, second]);
        let mut parts = Vec::new();
        let mut uploaded: u64 = 0;

        while let Some(part) = queue.pop_front() {
            if queue.is_empty() {
                if let Some(next) = reader.next_part().await? {
                    queue.push_back(next);
                }
            }

            if part.part_number > MAX_MULTIPART_COUNT {
                return Err(error::invalid_argument(format!(
                    "stream needs more than {MAX_MULTIPART_COUNT} parts"
                )));
            }
            uploaded += part.data.len() as u64;
            if uploaded > MAX_OBJECT_SIZE {
                return Err(error::invalid_argument(format!(
                    "stream exceeds maximum object size of {MAX_OBJECT_SIZE} bytes"
                )));
            }

            let uploaded_part = self
                .upload_part(
                    bucket,
                    key,
                    upload_id,
                    part.part_number as u16,
                    part.data,
                    &part_headers,
                )
                .await?;
            parts.push(uploaded_part);
        }
        Ok(parts)
    }

    /// Begin a multipart upload, returning the upload id.
    pub(crate) async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        headers: HeaderMap,
    ) -> Result<String, Error> {
        let request = OperationRequest::new(Method::POST)
            .bucket(bucket)
            .object(key)
            .query("uploads", "")
            .headers(headers);
        let (_, body) = self.execute_collect(request).await?;
        let result: xml::InitiateMultipartUploadResult = xml::from_xml(&body)?;
        if result.upload_id.is_empty() {
            return Err(error::protocol("initiation response carried no upload id"));
        }
        Ok(result.upload_id)
    }

    /// Upload one part of a multipart upload.
    pub(crate) async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u16,
        data: Bytes,
        extra_headers: &HeaderMap,
    ) -> Result<Part, Error> {
        let length = data.len() as u64;
        let stream: crate::http::BoxByteStream =
            Box::pin(futures_util::stream::iter((!data.is_empty()).then_some(Ok(data))));
        let request = OperationRequest::new(Method::PUT)
            .bucket(bucket)
            .object(key)
            .query("partNumber", part_number.to_string())
            .query("uploadId", upload_id)
            .headers(extra_headers.clone())
            .body_stream(stream, length);

        let (headers, _) = self.execute_collect(request).await?;
        let etag = header::get_str(&headers, "etag")
            .map(trim_etag)
            .unwrap_or_default();
        if etag.is_empty() {
            return Err(error::protocol(format!(
                "part {part_number} response carried no ETag"
            )));
        }
        tracing::trace!(part_number, "part uploaded");
        Ok(Part {
            number: part_number,
            etag,
        })
    }

    /// Complete a multipart upload from its collected parts, which must
    /// be in ascending part number order.
    pub(crate) async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[Part],
    ) -> Result<ObjectWriteOutput, Error> {
        let doc = xml::complete_multipart_upload_doc(parts);
        let request = OperationRequest::new(Method::POST)
            .bucket(bucket)
            .object(key)
            .query("uploadId", upload_id)
            .header("content-type", "application/xml")?
            .body_bytes(doc);
        let (headers, body) = self.execute_collect(request).await?;
        let result: xml::CompleteMultipartUploadResult = xml::from_xml(&body)?;
        Ok(ObjectWriteOutput {
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag: trim_etag(&result.etag),
            version_id: header::get_str(&headers, "x-amz-version-id").map(str::to_string),
            upload_id: Some(upload_id.to_string()),
        })
    }

    /// Abort a multipart upload, discarding its parts.
    pub async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), Error> {
        let request = OperationRequest::new(Method::DELETE)
            .bucket(bucket)
            .object(key)
            .query("uploadId", upload_id);
        self.execute(request).await?;
        Ok(())
    }

    /// Best-effort abort after a failed upload; the original error is
    /// what the caller sees.
    async fn abort_on_failure(&self, bucket: &str, key: &str, upload_id: &str) {
        if let Err(abort_err) = self.abort_multipart_upload(bucket, key, upload_id).await {
            tracing::warn!(
                bucket,
                key,
                upload_id,
                error = %abort_err,
                "failed to abort multipart upload"
            );
        }
    }
}

struct UploadPartContext {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    part_headers: HeaderMap,
}

#[derive(Clone)]
struct UploadPartRequest {
    ctx: Arc<UploadPartContext>,
    part: PartData,
}

async fn upload_part_handler(request: UploadPartRequest) -> Result<Part, Error> {
    let ctx = &request.ctx;
    ctx.client
        .upload_part(
            &ctx.bucket,
            &ctx.key,
            &ctx.upload_id,
            request.part.part_number as u16,
            request.part.data,
            &ctx.part_headers,
        )
        .await
}

/// Concurrency-limited service uploading individual parts.
fn upload_part_service(
    concurrency: usize,
) -> impl Service<UploadPartRequest, Response = Part, Error = Error, Future: Send> + Clone + Send {
    let svc = service_fn(upload_part_handler);
    ServiceBuilder::new().concurrency_limit(concurrency).service(svc)
}

async fn read_and_upload(
    part_reader: Arc<PartReader>,
    ctx: Arc<UploadPartContext>,
    svc: impl Service<UploadPartRequest, Response = Part, Error = Error, Future: Send> + Clone + Send,
    completed: Arc<Mutex<Vec<Part>>>,
) -> Result<(), Error> {
    loop {
        let part = match part_reader.next_part().await? {
            Some(part) => part,
            None => break,
        };
        if part.part_number > MAX_MULTIPART_COUNT {
            return Err(error::invalid_argument(format!(
                "payload needs more than {MAX_MULTIPART_COUNT} parts"
            )));
        }
        let request = UploadPartRequest {
            ctx: ctx.clone(),
            part,
        };
        let uploaded = svc.clone().oneshot(request).await?;
        completed.lock().expect("lock valid").push(uploaded);
    }
    Ok(())
}
