/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use http::{HeaderMap, Method};
use time::OffsetDateTime;

use crate::client::{Client, OperationRequest};
use crate::error::{self, Error};
use crate::http::header;
use crate::types::{trim_etag, ObjectStat, SseCustomerKey};

/// Options for [`Client::stat_object`] and conditional reads.
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct StatObjectOptions {
    /// Address a specific object version
    pub version_id: Option<String>,
    /// Succeed only when the ETag matches
    pub match_etag: Option<String>,
    /// Succeed only when the ETag does not match
    pub not_match_etag: Option<String>,
    /// Succeed only when modified since this time
    pub modified_since: Option<OffsetDateTime>,
    /// Succeed only when not modified since this time
    pub unmodified_since: Option<OffsetDateTime>,
    /// Key for objects stored with customer supplied encryption
    pub ssec: Option<SseCustomerKey>,
}

impl StatObjectOptions {
    pub(crate) fn apply(
        &self,
        client: &Client,
        headers: &mut HeaderMap,
    ) -> Result<(), Error> {
        if self.ssec.is_some() && !client.is_secure() {
            return Err(error::invalid_argument(
                "customer supplied encryption keys require TLS",
            ));
        }
        if let Some(etag) = &self.match_etag {
            header::insert(headers, "if-match", &format!("\"{etag}\""))?;
        }
        if let Some(etag) = &self.not_match_etag {
            header::insert(headers, "if-none-match", &format!("\"{etag}\""))?;
        }
        if let Some(t) = self.modified_since {
            header::insert(headers, "if-modified-since", &header::format_http_date(t))?;
        }
        if let Some(t) = self.unmodified_since {
            header::insert(headers, "if-unmodified-since", &header::format_http_date(t))?;
        }
        if let Some(ssec) = &self.ssec {
            for (name, value) in ssec.headers(false) {
                header::insert(headers, name, &value)?;
            }
        }
        Ok(())
    }
}

impl Client {
    /// Fetch object metadata with a HEAD request.
    pub async fn stat_object(
        &self,
        bucket: &str,
        key: &str,
        options: &StatObjectOptions,
    ) -> Result<ObjectStat, Error> {
        let mut request = OperationRequest::new(Method::HEAD).bucket(bucket).object(key);
        options.apply(self, &mut request.headers)?;
        if let Some(version_id) = &options.version_id {
            request = request.query("versionId", version_id);
        }

        let response = self.execute(request).await?;
        Ok(object_stat_from_headers(bucket, key, &response.headers))
    }
}

pub(crate) fn object_stat_from_headers(
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
) -> ObjectStat {
    let mut metadata = std::collections::HashMap::new();
    for (name, value) in headers {
        if let Some(suffix) = name.as_str().strip_prefix("x-amz-meta-") {
            if let Ok(value) = value.to_str() {
                metadata.insert(suffix.to_string(), value.to_string());
            }
        }
    }

    ObjectStat {
        bucket: bucket.to_string(),
        key: key.to_string(),
        size: header::get_str(headers, "content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default(),
        etag: header::get_str(headers, "etag")
            .map(trim_etag)
            .unwrap_or_default(),
        content_type: header::get_str(headers, "content-type").map(str::to_string),
        last_modified: header::get_str(headers, "last-modified").and_then(header::parse_http_date),
        version_id: header::get_str(headers, "x-amz-version-id").map(str::to_string),
        metadata,
    }
}
