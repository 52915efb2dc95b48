/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Bucket lifecycle and subresource operations.
//!
//! Configuration documents whose content the client does not interpret
//! (policy JSON, lifecycle, encryption and notification XML) travel as
//! opaque strings; only fields the operations themselves need are typed.

use bytes::Bytes;
use http::Method;
use time::OffsetDateTime;

use crate::client::{Client, OperationRequest};
use crate::error::{self, Error, ErrorKind};
use crate::http::header;
use crate::region::DEFAULT_REGION;
use crate::types::RetentionMode;
use crate::xml;

/// Upper bound on a bucket policy document.
const MAX_POLICY_SIZE: usize = 12 * 1024;

/// Bucket versioning state as reported by the service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VersioningStatus {
    /// Versioning enabled
    Enabled,
    /// Versioning suspended
    Suspended,
    /// Versioning never configured
    Unset,
}

/// Default retention applied by a bucket's object lock configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DefaultRetention {
    /// Retention mode for new objects
    pub mode: RetentionMode,
    /// Retention duration
    pub duration: RetentionDuration,
}

/// Duration unit of a default retention.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetentionDuration {
    /// Retain for this many days
    Days(u32),
    /// Retain for this many years
    Years(u32),
}

impl Client {
    /// Create a bucket.
    ///
    /// `region` defaults to the client's configured region, or
    /// `us-east-1`; giving a region that contradicts the configured one
    /// is an error. `object_lock` enables object locking at creation
    /// time, the only moment it can be turned on.
    pub async fn make_bucket(
        &self,
        bucket: &str,
        region: Option<&str>,
        object_lock: bool,
    ) -> Result<(), Error> {
        let configured = self.handle.config.region.as_deref();
        let region = match (region, configured) {
            (Some(requested), Some(configured)) if requested != configured => {
                return Err(error::invalid_argument(format!(
                    "region {requested:?} contradicts the configured region {configured:?}"
                )));
            }
            (requested, configured) => requested
                .or(configured)
                .unwrap_or(DEFAULT_REGION)
                .to_string(),
        };

        let mut request = OperationRequest::new(Method::PUT)
            .bucket(bucket)
            .region(&region);
        if object_lock {
            header::insert(
                &mut request.headers,
                "x-amz-bucket-object-lock-enabled",
                "true",
            )?;
        }
        if let Some(doc) = xml::create_bucket_doc(&region) {
            request = request.body_bytes(Bytes::from(doc));
        }
        self.execute(request).await?;
        self.handle.region_cache.set(bucket, &region);
        Ok(())
    }

    /// Remove an empty bucket.
    pub async fn remove_bucket(&self, bucket: &str) -> Result<(), Error> {
        let request = OperationRequest::new(Method::DELETE).bucket(bucket);
        self.execute(request).await?;
        self.handle.region_cache.remove(bucket);
        Ok(())
    }

    /// Whether a bucket exists and is reachable with the configured
    /// credentials.
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool, Error> {
        let request = OperationRequest::new(Method::HEAD).bucket(bucket);
        match self.execute(request).await {
            Ok(_) => Ok(true),
            Err(err) if *err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// The region a bucket lives in, discovered and cached as needed.
    pub async fn get_bucket_location(&self, bucket: &str) -> Result<String, Error> {
        crate::endpoint::check_bucket_name(bucket)?;
        self.resolve_region(Some(bucket)).await
    }

    /// Fetch the bucket policy document, or an empty string when none is
    /// set.
    pub async fn get_bucket_policy(&self, bucket: &str) -> Result<String, Error> {
        match self.get_subresource(bucket, "policy").await {
            Ok(body) => {
                if body.len() > MAX_POLICY_SIZE {
                    return Err(error::protocol(format!(
                        "bucket policy of {} bytes exceeds the {MAX_POLICY_SIZE} byte limit",
                        body.len()
                    )));
                }
                String::from_utf8(body.to_vec()).map_err(error::protocol)
            }
            Err(err) if err.code() == Some("NoSuchBucketPolicy") => Ok(String::new()),
            Err(err) => Err(err),
        }
    }

    /// Set the bucket policy to the given JSON document.
    pub async fn set_bucket_policy(&self, bucket: &str, policy: &str) -> Result<(), Error> {
        let request = OperationRequest::new(Method::PUT)
            .bucket(bucket)
            .query("policy", "")
            .header("content-type", "application/json")?
            .body_bytes(Bytes::from(policy.to_string()));
        self.execute(request).await?;
        Ok(())
    }

    /// Delete the bucket policy; absent policies do not fail.
    pub async fn delete_bucket_policy(&self, bucket: &str) -> Result<(), Error> {
        self.delete_subresource(bucket, "policy", &["NoSuchBucketPolicy"])
            .await
    }

    /// Report the bucket versioning state.
    pub async fn get_bucket_versioning(&self, bucket: &str) -> Result<VersioningStatus, Error> {
        let body = self.get_subresource(bucket, "versioning").await?;
        let doc: xml::VersioningConfiguration = xml::from_xml(&body)?;
        Ok(match doc.status.as_str() {
            "Enabled" => VersioningStatus::Enabled,
            "Suspended" => VersioningStatus::Suspended,
            _ => VersioningStatus::Unset,
        })
    }

    /// Enable or suspend bucket versioning.
    pub async fn set_bucket_versioning(&self, bucket: &str, enabled: bool) -> Result<(), Error> {
        self.put_subresource(bucket, "versioning", xml::versioning_doc(enabled), false)
            .await
    }

    /// Fetch the lifecycle configuration, or `None` when none is set.
    pub async fn get_bucket_lifecycle(&self, bucket: &str) -> Result<Option<String>, Error> {
        match self.get_subresource(bucket, "lifecycle").await {
            Ok(body) => Ok(Some(
                String::from_utf8(body.to_vec()).map_err(error::protocol)?,
            )),
            Err(err) if err.code() == Some("NoSuchLifecycleConfiguration") => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Replace the lifecycle configuration with the given document.
    pub async fn set_bucket_lifecycle(&self, bucket: &str, lifecycle: &str) -> Result<(), Error> {
        self.put_subresource(bucket, "lifecycle", lifecycle.to_string(), true)
            .await
    }

    /// Delete the lifecycle configuration; absent configurations do not
    /// fail.
    pub async fn delete_bucket_lifecycle(&self, bucket: &str) -> Result<(), Error> {
        self.delete_subresource(bucket, "lifecycle", &["NoSuchLifecycleConfiguration"])
            .await
    }

    /// Fetch the encryption configuration, or `None` when none is set.
    pub async fn get_bucket_encryption(&self, bucket: &str) -> Result<Option<String>, Error> {
        match self.get_subresource(bucket, "encryption").await {
            Ok(body) => Ok(Some(
                String::from_utf8(body.to_vec()).map_err(error::protocol)?,
            )),
            Err(err)
                if err.code() == Some("ServerSideEncryptionConfigurationNotFoundError") =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Replace the encryption configuration with the given document.
    pub async fn set_bucket_encryption(&self, bucket: &str, encryption: &str) -> Result<(), Error> {
        self.put_subresource(bucket, "encryption", encryption.to_string(), false)
            .await
    }

    /// Delete the encryption configuration; absent configurations do not
    /// fail.
    pub async fn delete_bucket_encryption(&self, bucket: &str) -> Result<(), Error> {
        self.delete_subresource(
            bucket,
            "encryption",
            &["ServerSideEncryptionConfigurationNotFoundError"],
        )
        .await
    }

    /// Fetch the notification configuration document.
    pub async fn get_bucket_notification(&self, bucket: &str) -> Result<String, Error> {
        let body = self.get_subresource(bucket, "notification").await?;
        String::from_utf8(body.to_vec()).map_err(error::protocol)
    }

    /// Replace the notification configuration with the given document.
    pub async fn set_bucket_notification(
        &self,
        bucket: &str,
        notification: &str,
    ) -> Result<(), Error> {
        self.put_subresource(bucket, "notification", notification.to_string(), false)
            .await
    }

    /// Remove all notification targets by storing an empty configuration.
    pub async fn delete_bucket_notification(&self, bucket: &str) -> Result<(), Error> {
        self.set_bucket_notification(
            bucket,
            &format!("<NotificationConfiguration xmlns=\"{}\"/>", xml::S3_XMLNS),
        )
        .await
    }

    /// Fetch the object lock configuration of a bucket.
    pub async fn get_object_lock_config(
        &self,
        bucket: &str,
    ) -> Result<Option<DefaultRetention>, Error> {
        let body = match self.get_subresource(bucket, "object-lock").await {
            Ok(body) => body,
            Err(err) if *err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        let doc: xml::ObjectLockConfiguration = xml::from_xml(&body)?;
        let Some(retention) = doc.rule.and_then(|rule| rule.default_retention) else {
            return Ok(None);
        };
        let mode = RetentionMode::parse(&retention.mode)?;
        let duration = match (retention.days, retention.years) {
            (Some(days), _) => RetentionDuration::Days(days),
            (None, Some(years)) => RetentionDuration::Years(years),
            (None, None) => {
                return Err(error::protocol(
                    "object lock rule carries neither days nor years",
                ))
            }
        };
        Ok(Some(DefaultRetention { mode, duration }))
    }

    /// Set the object lock configuration of a bucket.
    pub async fn set_object_lock_config(
        &self,
        bucket: &str,
        retention: Option<DefaultRetention>,
    ) -> Result<(), Error> {
        let rule = match retention {
            Some(retention) => {
                let duration = match retention.duration {
                    RetentionDuration::Days(days) => format!("<Days>{days}</Days>"),
                    RetentionDuration::Years(years) => format!("<Years>{years}</Years>"),
                };
                format!(
                    "<Rule><DefaultRetention><Mode>{}</Mode>{duration}</DefaultRetention></Rule>",
                    retention.mode.as_str()
                )
            }
            None => String::new(),
        };
        let doc = format!(
            "<ObjectLockConfiguration xmlns=\"{}\">\
             <ObjectLockEnabled>Enabled</ObjectLockEnabled>{rule}\
             </ObjectLockConfiguration>",
            xml::S3_XMLNS
        );
        self.put_subresource(bucket, "object-lock", doc, false).await
    }

    /// Fetch the retention of an object, or `None` when none applies.
    pub async fn get_object_retention(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<Option<(RetentionMode, OffsetDateTime)>, Error> {
        let mut request = OperationRequest::new(Method::GET)
            .bucket(bucket)
            .object(key)
            .query("retention", "");
        if let Some(version_id) = version_id {
            request = request.query("versionId", version_id);
        }
        let body = match self.execute_collect(request).await {
            Ok((_, body)) => body,
            Err(err) if *err.kind() == ErrorKind::NotFound && err.code() != Some("NoSuchKey") => {
                return Ok(None)
            }
            Err(err) => return Err(err),
        };
        let doc: xml::RetentionDocument = xml::from_xml(&body)?;
        if doc.mode.is_empty() {
            return Ok(None);
        }
        let mode = RetentionMode::parse(&doc.mode)?;
        let retain_until = xml::parse_timestamp(&doc.retain_until_date)
            .ok_or_else(|| error::protocol("unparseable RetainUntilDate"))?;
        Ok(Some((mode, retain_until)))
    }

    /// Set the retention of an object.
    pub async fn set_object_retention(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        retention: Option<(RetentionMode, OffsetDateTime)>,
        bypass_governance_retention: bool,
    ) -> Result<(), Error> {
        let doc = match retention {
            Some((mode, retain_until)) => xml::retention_doc(mode, retain_until),
            None => "<Retention/>".to_string(),
        };
        let mut request = OperationRequest::new(Method::PUT)
            .bucket(bucket)
            .object(key)
            .query("retention", "")
            .body_bytes(Bytes::from(doc))
            .md5_required();
        if let Some(version_id) = version_id {
            request = request.query("versionId", version_id);
        }
        if bypass_governance_retention {
            header::insert(
                &mut request.headers,
                "x-amz-bypass-governance-retention",
                "true",
            )?;
        }
        self.execute(request).await?;
        Ok(())
    }

    /// Whether an object is under legal hold.
    pub async fn is_object_legal_hold_enabled(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<bool, Error> {
        let mut request = OperationRequest::new(Method::GET)
            .bucket(bucket)
            .object(key)
            .query("legal-hold", "");
        if let Some(version_id) = version_id {
            request = request.query("versionId", version_id);
        }
        match self.execute_collect(request).await {
            Ok((_, body)) => {
                let doc: xml::LegalHoldDocument = xml::from_xml(&body)?;
                Ok(doc.status == "ON")
            }
            Err(err) if *err.kind() == ErrorKind::NotFound && err.code() != Some("NoSuchKey") => {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Put an object under legal hold or release it.
    pub async fn set_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        enabled: bool,
    ) -> Result<(), Error> {
        let mut request = OperationRequest::new(Method::PUT)
            .bucket(bucket)
            .object(key)
            .query("legal-hold", "")
            .body_bytes(Bytes::from(xml::legal_hold_doc(enabled)))
            .md5_required();
        if let Some(version_id) = version_id {
            request = request.query("versionId", version_id);
        }
        self.execute(request).await?;
        Ok(())
    }

    async fn get_subresource(&self, bucket: &str, name: &str) -> Result<Bytes, Error> {
        let request = OperationRequest::new(Method::GET).bucket(bucket).query(name, "");
        let (_, body) = self.execute_collect(request).await?;
        Ok(body)
    }

    async fn put_subresource(
        &self,
        bucket: &str,
        name: &str,
        doc: String,
        md5_required: bool,
    ) -> Result<(), Error> {
        let mut request = OperationRequest::new(Method::PUT)
            .bucket(bucket)
            .query(name, "")
            .header("content-type", "application/xml")?
            .body_bytes(Bytes::from(doc));
        if md5_required {
            request = request.md5_required();
        }
        self.execute(request).await?;
        Ok(())
    }

    /// DELETE a subresource, absorbing the error codes that mean it was
    /// already absent.
    async fn delete_subresource(
        &self,
        bucket: &str,
        name: &str,
        absent_codes: &[&str],
    ) -> Result<(), Error> {
        let request = OperationRequest::new(Method::DELETE).bucket(bucket).query(name, "");
        match self.execute(request).await {
            Ok(_) => Ok(()),
            Err(err) if err.code().is_some_and(|code| absent_codes.contains(&code)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
