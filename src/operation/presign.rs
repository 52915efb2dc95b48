/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::HashMap;

use http::Method;
use time::OffsetDateTime;
use url::Url;

use crate::client::Client;
use crate::error::{self, Error, ErrorKind};
use crate::sign::v4;
use crate::types::MAX_EXPIRY_SECONDS;

pub use crate::sign::post_policy::PostPolicy;

impl Client {
    /// Produce a presigned URL for `method` on an object, valid for
    /// `expires_seconds` (1 second up to 7 days).
    ///
    /// `extra_query` is embedded in the signed URL; use it for response
    /// header overrides such as `response-content-type`.
    pub async fn presigned_url(
        &self,
        method: Method,
        bucket: &str,
        key: &str,
        expires_seconds: u64,
        extra_query: &[(String, String)],
    ) -> Result<Url, Error> {
        if expires_seconds == 0 || expires_seconds > MAX_EXPIRY_SECONDS {
            return Err(error::invalid_argument(format!(
                "expiry {expires_seconds} outside of allowed range [1, {MAX_EXPIRY_SECONDS}] seconds"
            )));
        }
        let Some(creds) = self.credentials() else {
            return Err(Error::new(
                ErrorKind::Auth,
                "anonymous clients cannot produce presigned URLs",
            ));
        };

        let region = self.resolve_region(Some(bucket)).await?;
        let url = self.config().endpoint().build_url(
            &method,
            Some(bucket),
            Some(key),
            extra_query,
            &region,
        )?;
        v4::presign(
            &method,
            &url,
            &region,
            creds,
            expires_seconds,
            OffsetDateTime::now_utc(),
        )
    }

    /// Presigned URL for downloading an object.
    pub async fn presigned_get_object(
        &self,
        bucket: &str,
        key: &str,
        expires_seconds: u64,
    ) -> Result<Url, Error> {
        self.presigned_url(Method::GET, bucket, key, expires_seconds, &[])
            .await
    }

    /// Presigned URL for uploading an object.
    pub async fn presigned_put_object(
        &self,
        bucket: &str,
        key: &str,
        expires_seconds: u64,
    ) -> Result<Url, Error> {
        self.presigned_url(Method::PUT, bucket, key, expires_seconds, &[])
            .await
    }

    /// Sign a POST upload policy, returning the form fields a browser
    /// submits with the upload.
    pub async fn presigned_post_policy(
        &self,
        policy: &PostPolicy,
    ) -> Result<HashMap<String, String>, Error> {
        let Some(creds) = self.credentials() else {
            return Err(Error::new(
                ErrorKind::Auth,
                "anonymous clients cannot sign POST policies",
            ));
        };
        let region = self.resolve_region(Some(policy.bucket())).await?;
        policy.form_data(creds, &region, OffsetDateTime::now_utc())
    }
}
