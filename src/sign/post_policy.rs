/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Browser POST upload policies.
//!
//! A policy document describes what a form upload may contain; the signed
//! document plus the derived form fields let an unauthenticated browser
//! submit objects directly to the service.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use time::macros::format_description;
use time::OffsetDateTime;

use super::v4::{amz_date, scope, signature_hex, signing_key, ALGORITHM};
use crate::error::{self, Error};
use crate::types::Credentials;

/// Policy for a browser form upload via HTTP POST.
#[derive(Clone, Debug)]
pub struct PostPolicy {
    bucket: String,
    expiration: OffsetDateTime,
    eq_conditions: Vec<(String, String)>,
    starts_with_conditions: Vec<(String, String)>,
    content_length_range: Option<(u64, u64)>,
}

impl PostPolicy {
    /// Create a policy for uploads into `bucket` that expires at
    /// `expiration`.
    pub fn new(bucket: impl Into<String>, expiration: OffsetDateTime) -> Self {
        Self {
            bucket: bucket.into(),
            expiration,
            eq_conditions: Vec::new(),
            starts_with_conditions: Vec::new(),
            content_length_range: None,
        }
    }

    /// The bucket this policy uploads into.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Restrict the upload to exactly this object key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.eq_conditions.push(("key".into(), key.into()));
        self
    }

    /// Restrict the upload to keys beginning with `prefix`.
    pub fn key_starts_with(mut self, prefix: impl Into<String>) -> Self {
        self.starts_with_conditions.push(("key".into(), prefix.into()));
        self
    }

    /// Require an exact `Content-Type` on the upload.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.eq_conditions
            .push(("Content-Type".into(), content_type.into()));
        self
    }

    /// Bound the size of the uploaded body.
    pub fn content_length_range(mut self, min: u64, max: u64) -> Self {
        self.content_length_range = Some((min, max));
        self
    }

    /// Require an exact match on an arbitrary form field.
    pub fn condition(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.eq_conditions.push((field.into(), value.into()));
        self
    }

    fn has_key_condition(&self) -> bool {
        self.eq_conditions.iter().any(|(f, _)| f == "key")
            || self.starts_with_conditions.iter().any(|(f, _)| f == "key")
    }

    /// Render, sign and convert the policy into the form field map a
    /// client submits with the POST request.
    pub(crate) fn form_data(
        &self,
        creds: &Credentials,
        region: &str,
        t: OffsetDateTime,
    ) -> Result<HashMap<String, String>, Error> {
        if !self.has_key_condition() {
            return Err(error::invalid_argument(
                "post policy requires a key or key prefix condition",
            ));
        }

        let credential = format!("{}/{}", creds.access_key, scope(region, t));
        let date = amz_date(t);

        let mut conditions: Vec<serde_json::Value> =
            vec![json!(["eq", "$bucket", self.bucket])];
        for (field, value) in &self.eq_conditions {
            conditions.push(json!(["eq", format!("${field}"), value]));
        }
        for (field, value) in &self.starts_with_conditions {
            conditions.push(json!(["starts-with", format!("${field}"), value]));
        }
        if let Some((min, max)) = self.content_length_range {
            conditions.push(json!(["content-length-range", min, max]));
        }
        conditions.push(json!(["eq", "$x-amz-algorithm", ALGORITHM]));
        conditions.push(json!(["eq", "$x-amz-credential", credential]));
        conditions.push(json!(["eq", "$x-amz-date", date]));
        if let Some(token) = &creds.session_token {
            conditions.push(json!(["eq", "$x-amz-security-token", token]));
        }

        let expiration = self
            .expiration
            .format(format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second].000Z"
            ))
            .expect("UTC datetime formats");
        let policy = json!({
            "expiration": expiration,
            "conditions": conditions,
        });
        let encoded = BASE64.encode(policy.to_string());
        let signature = signature_hex(&signing_key(&creds.secret_key, region, t), &encoded);

        let mut form: HashMap<String, String> = HashMap::new();
        for (field, value) in &self.eq_conditions {
            form.insert(field.clone(), value.clone());
        }
        form.insert("x-amz-algorithm".into(), ALGORITHM.into());
        form.insert("x-amz-credential".into(), credential);
        form.insert("x-amz-date".into(), date);
        if let Some(token) = &creds.session_token {
            form.insert("x-amz-security-token".into(), token.clone());
        }
        form.insert("policy".into(), encoded);
        form.insert("x-amz-signature".into(), signature);
        Ok(form)
    }
}
