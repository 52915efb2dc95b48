/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use bytes::Bytes;
use http::Method;

use crate::client::{Client, OperationRequest};
use crate::error::Error;
use crate::http::header;
use crate::xml;

/// Largest number of keys one bulk delete request may carry.
const DELETE_BATCH_SIZE: usize = 1000;

/// Options for [`Client::remove_object`].
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct RemoveObjectOptions {
    /// Delete a specific object version
    pub version_id: Option<String>,
    /// Bypass governance-mode retention on the object
    pub bypass_governance_retention: bool,
}

/// One key of a bulk delete.
#[derive(Debug, Clone)]
pub struct ObjectToDelete {
    /// Object key
    pub key: String,
    /// Version to delete, the latest when unset
    pub version_id: Option<String>,
}

impl ObjectToDelete {
    /// Delete the latest version of `key`.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: None,
        }
    }
}

impl From<&str> for ObjectToDelete {
    fn from(key: &str) -> Self {
        Self::key(key)
    }
}

impl From<String> for ObjectToDelete {
    fn from(key: String) -> Self {
        Self::key(key)
    }
}

/// A key the service refused to delete in a bulk request.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct DeleteError {
    /// Object key
    pub key: String,
    /// Version the error refers to
    pub version_id: Option<String>,
    /// Service error code
    pub code: String,
    /// Human readable message
    pub message: String,
}

impl Client {
    /// Remove one object.
    pub async fn remove_object(
        &self,
        bucket: &str,
        key: &str,
        options: &RemoveObjectOptions,
    ) -> Result<(), Error> {
        let mut request = OperationRequest::new(Method::DELETE).bucket(bucket).object(key);
        if let Some(version_id) = &options.version_id {
            request = request.query("versionId", version_id);
        }
        if options.bypass_governance_retention {
            header::insert(
                &mut request.headers,
                "x-amz-bypass-governance-retention",
                "true",
            )?;
        }
        self.execute(request).await?;
        Ok(())
    }

    /// Remove many objects with bulk delete requests of up to 1000 keys,
    /// returning the per-key failures.
    ///
    /// The request runs in quiet mode: the service reports only the keys
    /// it could not delete.
    pub async fn remove_objects(
        &self,
        bucket: &str,
        objects: impl IntoIterator<Item = ObjectToDelete>,
        bypass_governance_retention: bool,
    ) -> Result<Vec<DeleteError>, Error> {
        let objects: Vec<ObjectToDelete> = objects.into_iter().collect();
        let mut failures = Vec::new();

        for batch in objects.chunks(DELETE_BATCH_SIZE) {
            let keys: Vec<(String, Option<String>)> = batch
                .iter()
                .map(|o| (o.key.clone(), o.version_id.clone()))
                .collect();
            let doc = xml::delete_objects_doc(&keys, true);

            let mut request = OperationRequest::new(Method::POST)
                .bucket(bucket)
                .query("delete", "")
                .header("content-type", "application/xml")?
                .body_bytes(Bytes::from(doc))
                .md5_required();
            if bypass_governance_retention {
                header::insert(
                    &mut request.headers,
                    "x-amz-bypass-governance-retention",
                    "true",
                )?;
            }

            let (_, body) = self.execute_collect(request).await?;
            let result: xml::DeleteResult = xml::from_xml(&body)?;
            for err in result.error {
                failures.push(DeleteError {
                    key: err.key,
                    version_id: (!err.version_id.is_empty()).then_some(err.version_id),
                    code: err.code,
                    message: err.message,
                });
            }
        }
        Ok(failures)
    }
}
