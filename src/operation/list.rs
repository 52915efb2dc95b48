/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Paginated listings exposed as lazy streams.
//!
//! Every listing drives the wire pagination behind a `Stream`: a page is
//! fetched only when the buffered entries run out and the previous page
//! said it was truncated. Errors surface as one terminal element, after
//! which the stream is exhausted.

use std::collections::VecDeque;

use futures_util::Stream;
use http::Method;

use crate::client::{Client, OperationRequest};
use crate::error::Error;
use crate::types::{trim_etag, Bucket, MultipartUploadEntry, ObjectEntry, PartEntry};
use crate::xml;

/// Options for [`Client::list_objects`].
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct ListObjectsOptions {
    /// List only keys beginning with this prefix
    pub prefix: Option<String>,
    /// Descend into the whole hierarchy instead of stopping at `/`
    pub recursive: bool,
    /// Start listing after this key
    pub start_after: Option<String>,
    /// Page size requested from the service
    pub max_keys: Option<u16>,
    /// Use the version 1 listing wire protocol
    pub use_v1: bool,
}

/// Options for [`Client::list_multipart_uploads`].
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct ListMultipartUploadsOptions {
    /// List only uploads for keys beginning with this prefix
    pub prefix: Option<String>,
    /// Descend into the whole hierarchy instead of stopping at `/`
    pub recursive: bool,
    /// Fetch every upload's parts and report their summed size
    pub with_aggregated_part_sizes: bool,
}

impl Client {
    /// List the buckets owned by the authenticated user.
    pub async fn list_buckets(&self) -> Result<Vec<Bucket>, Error> {
        let request = OperationRequest::new(Method::GET);
        let (_, body) = self.execute_collect(request).await?;
        let result: xml::ListAllMyBucketsResult = xml::from_xml(&body)?;
        Ok(result
            .buckets
            .bucket
            .into_iter()
            .map(|b| Bucket {
                name: b.name,
                creation_date: xml::parse_timestamp(&b.creation_date),
            })
            .collect())
    }

    /// List objects in `bucket` as a lazy stream.
    ///
    /// Non-recursive listings surface common prefixes as synthetic
    /// directory entries with a trailing `/` and zero size.
    pub fn list_objects(
        &self,
        bucket: &str,
        options: &ListObjectsOptions,
    ) -> impl Stream<Item = Result<ObjectEntry, Error>> + Send + 'static {
        let state = ObjectPages {
            client: self.clone(),
            bucket: bucket.to_string(),
            // Version 1 seeds its marker from `start_after`; version 2
            // sends `start-after` on the first page and opaque
            // continuation tokens afterwards.
            marker: options.use_v1.then(|| options.start_after.clone()).flatten(),
            options: options.clone(),
            buffer: VecDeque::new(),
            exhausted: false,
        };
        futures_util::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.buffer.pop_front() {
                    if item.is_err() {
                        state.exhausted = true;
                        state.buffer.clear();
                    }
                    return Some((item, state));
                }
                if state.exhausted {
                    return None;
                }
                state.fetch_page().await;
            }
        })
    }

    /// List in-progress multipart uploads in `bucket` as a lazy stream.
    pub fn list_multipart_uploads(
        &self,
        bucket: &str,
        options: &ListMultipartUploadsOptions,
    ) -> impl Stream<Item = Result<MultipartUploadEntry, Error>> + Send + 'static {
        let state = UploadPages {
            client: self.clone(),
            bucket: bucket.to_string(),
            options: options.clone(),
            key_marker: None,
            upload_id_marker: None,
            buffer: VecDeque::new(),
            exhausted: false,
        };
        futures_util::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.buffer.pop_front() {
                    if item.is_err() {
                        state.exhausted = true;
                        state.buffer.clear();
                    }
                    return Some((item, state));
                }
                if state.exhausted {
                    return None;
                }
                state.fetch_page().await;
            }
        })
    }

    /// List the parts uploaded so far for one multipart upload.
    pub fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> impl Stream<Item = Result<PartEntry, Error>> + Send + 'static {
        let state = PartPages {
            client: self.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            marker: None,
            buffer: VecDeque::new(),
            exhausted: false,
        };
        futures_util::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.buffer.pop_front() {
                    if item.is_err() {
                        state.exhausted = true;
                        state.buffer.clear();
                    }
                    return Some((item, state));
                }
                if state.exhausted {
                    return None;
                }
                state.fetch_page().await;
            }
        })
    }
}

struct ObjectPages {
    client: Client,
    bucket: String,
    options: ListObjectsOptions,
    marker: Option<String>,
    buffer: VecDeque<Result<ObjectEntry, Error>>,
    exhausted: bool,
}

impl ObjectPages {
    async fn fetch_page(&mut self) {
        let result = if self.options.use_v1 {
            self.fetch_page_v1().await
        } else {
            self.fetch_page_v2().await
        };
        if let Err(err) = result {
            self.buffer.push_back(Err(err));
        }
    }

    fn base_request(&self) -> OperationRequest {
        let mut request = OperationRequest::new(Method::GET).bucket(&self.bucket);
        if let Some(prefix) = &self.options.prefix {
            if !prefix.is_empty() {
                request = request.query("prefix", prefix);
            }
        }
        if !self.options.recursive {
            request = request.query("delimiter", "/");
        }
        if let Some(max_keys) = self.options.max_keys {
            request = request.query("max-keys", max_keys.to_string());
        }
        request
    }

    async fn fetch_page_v2(&mut self) -> Result<(), Error> {
        let mut request = self.base_request().query("list-type", "2");
        match &self.marker {
            Some(token) => request = request.query("continuation-token", token),
            None => {
                if let Some(start_after) = &self.options.start_after {
                    request = request.query("start-after", start_after);
                }
            }
        }
        let (_, body) = self.client.execute_collect(request).await?;
        let page: xml::ListBucketV2Result = xml::from_xml(&body)?;

        self.push_entries(page.contents, page.common_prefixes);
        self.advance(page.is_truncated, page.next_continuation_token);
        Ok(())
    }

    async fn fetch_page_v1(&mut self) -> Result<(), Error> {
        let mut request = self.base_request();
        if let Some(marker) = &self.marker {
            request = request.query("marker", marker);
        }
        let (_, body) = self.client.execute_collect(request).await?;
        let page: xml::ListBucketResult = xml::from_xml(&body)?;

        // Version 1 paginates by the last seen key unless the service
        // echoes an explicit next marker.
        let next_marker = if page.next_marker.is_empty() {
            page.contents.last().map(|o| o.key.clone()).unwrap_or_default()
        } else {
            page.next_marker.clone()
        };
        self.push_entries(page.contents, page.common_prefixes);
        self.advance(page.is_truncated, next_marker);
        Ok(())
    }

    fn push_entries(
        &mut self,
        contents: Vec<xml::ObjectDocument>,
        prefixes: Vec<xml::CommonPrefixDocument>,
    ) {
        for object in contents {
            self.buffer.push_back(Ok(ObjectEntry {
                key: object.key,
                size: object.size,
                etag: trim_etag(&object.etag),
                last_modified: xml::parse_timestamp(&object.last_modified),
                storage_class: (!object.storage_class.is_empty()).then_some(object.storage_class),
                is_prefix: false,
            }));
        }
        for prefix in prefixes {
            self.buffer.push_back(Ok(ObjectEntry {
                key: prefix.prefix,
                is_prefix: true,
                ..Default::default()
            }));
        }
    }

    fn advance(&mut self, is_truncated: bool, next_marker: String) {
        // A truncated page without a marker cannot make progress; treat
        // it like the final page.
        if is_truncated && !next_marker.is_empty() {
            self.marker = Some(next_marker);
        } else {
            self.marker = None;
            self.exhausted = true;
        }
    }
}

struct UploadPages {
    client: Client,
    bucket: String,
    options: ListMultipartUploadsOptions,
    key_marker: Option<String>,
    upload_id_marker: Option<String>,
    buffer: VecDeque<Result<MultipartUploadEntry, Error>>,
    exhausted: bool,
}

impl UploadPages {
    async fn fetch_page(&mut self) {
        if let Err(err) = self.try_fetch_page().await {
            self.buffer.push_back(Err(err));
        }
    }

    async fn try_fetch_page(&mut self) -> Result<(), Error> {
        let mut request = OperationRequest::new(Method::GET)
            .bucket(&self.bucket)
            .query("uploads", "");
        if let Some(prefix) = &self.options.prefix {
            if !prefix.is_empty() {
                request = request.query("prefix", prefix);
            }
        }
        if !self.options.recursive {
            request = request.query("delimiter", "/");
        }
        if let Some(marker) = &self.key_marker {
            request = request.query("key-marker", marker);
        }
        if let Some(marker) = &self.upload_id_marker {
            request = request.query("upload-id-marker", marker);
        }

        let (_, body) = self.client.execute_collect(request).await?;
        let page: xml::ListMultipartUploadsResult = xml::from_xml(&body)?;

        for upload in page.upload {
            let aggregated_part_size = if self.options.with_aggregated_part_sizes {
                Some(
                    self.client
                        .aggregated_part_size(&self.bucket, &upload.key, &upload.upload_id)
                        .await?,
                )
            } else {
                None
            };
            self.buffer.push_back(Ok(MultipartUploadEntry {
                key: upload.key,
                upload_id: upload.upload_id,
                initiated: xml::parse_timestamp(&upload.initiated),
                aggregated_part_size,
            }));
        }

        if page.is_truncated && !page.next_key_marker.is_empty() {
            self.key_marker = Some(page.next_key_marker);
            self.upload_id_marker =
                (!page.next_upload_id_marker.is_empty()).then_some(page.next_upload_id_marker);
        } else {
            self.exhausted = true;
        }
        Ok(())
    }
}

struct PartPages {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    marker: Option<String>,
    buffer: VecDeque<Result<PartEntry, Error>>,
    exhausted: bool,
}

impl PartPages {
    async fn fetch_page(&mut self) {
        if let Err(err) = self.try_fetch_page().await {
            self.buffer.push_back(Err(err));
        }
    }

    async fn try_fetch_page(&mut self) -> Result<(), Error> {
        let mut request = OperationRequest::new(Method::GET)
            .bucket(&self.bucket)
            .object(&self.key)
            .query("uploadId", &self.upload_id);
        if let Some(marker) = &self.marker {
            request = request.query("part-number-marker", marker);
        }

        let (_, body) = self.client.execute_collect(request).await?;
        let page: xml::ListPartsResult = xml::from_xml(&body)?;

        for part in page.part {
            self.buffer.push_back(Ok(PartEntry {
                number: part.part_number,
                etag: trim_etag(&part.etag),
                size: part.size,
                last_modified: xml::parse_timestamp(&part.last_modified),
            }));
        }

        if page.is_truncated && !page.next_part_number_marker.is_empty() {
            self.marker = Some(page.next_part_number_marker);
        } else {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Client {
    /// Sum of the sizes of all parts uploaded so far for one upload.
    async fn aggregated_part_size(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<u64, Error> {
        use futures_util::StreamExt;

        let parts = self.list_parts(bucket, key, upload_id);
        futures_util::pin_mut!(parts);
        let mut total = 0u64;
        while let Some(part) = parts.next().await {
            total += part?.size;
        }
        Ok(total)
    }
}
