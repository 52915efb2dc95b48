/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Wire documents exchanged with the service.
//!
//! Response documents deserialize through `quick-xml`; the handful of
//! request documents the client emits are small enough to render directly.
//! All documents live in the `http://s3.amazonaws.com/doc/2006-03-01/`
//! namespace.

use std::fmt::Write as _;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{self, Error};
use crate::types::Part;

pub(crate) const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Deserialize an XML document, mapping failures to protocol errors.
pub(crate) fn from_xml<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    let text = std::str::from_utf8(body).map_err(error::protocol)?;
    quick_xml::de::from_str(text).map_err(error::protocol)
}

pub(crate) fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).ok()
}

/// `<Error>` document carried by failed responses.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct ErrorDocument {
    pub(crate) code: String,
    pub(crate) message: String,
    pub(crate) bucket_name: String,
    pub(crate) key: String,
    pub(crate) resource: String,
    pub(crate) request_id: String,
    pub(crate) host_id: String,
}

/// `<LocationConstraint>` returned by the `?location` subresource.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct LocationConstraint {
    #[serde(rename = "$text", default)]
    pub(crate) location: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct OwnerDocument {
    pub(crate) display_name: String,
    #[serde(rename = "ID")]
    pub(crate) id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct BucketDocument {
    pub(crate) name: String,
    pub(crate) creation_date: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct BucketsDocument {
    pub(crate) bucket: Vec<BucketDocument>,
}

/// `<ListAllMyBucketsResult>` for the bucket listing.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct ListAllMyBucketsResult {
    pub(crate) owner: OwnerDocument,
    pub(crate) buckets: BucketsDocument,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct CommonPrefixDocument {
    pub(crate) prefix: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct ObjectDocument {
    pub(crate) key: String,
    pub(crate) last_modified: String,
    #[serde(rename = "ETag")]
    pub(crate) etag: String,
    pub(crate) size: u64,
    pub(crate) storage_class: String,
}

/// `<ListBucketResult>` for the version 1 object listing.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct ListBucketResult {
    pub(crate) is_truncated: bool,
    pub(crate) next_marker: String,
    pub(crate) contents: Vec<ObjectDocument>,
    pub(crate) common_prefixes: Vec<CommonPrefixDocument>,
}

/// `<ListBucketResult>` for the version 2 object listing.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct ListBucketV2Result {
    pub(crate) is_truncated: bool,
    pub(crate) next_continuation_token: String,
    pub(crate) contents: Vec<ObjectDocument>,
    pub(crate) common_prefixes: Vec<CommonPrefixDocument>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct UploadDocument {
    pub(crate) key: String,
    pub(crate) upload_id: String,
    pub(crate) initiated: String,
}

/// `<ListMultipartUploadsResult>` for the upload listing.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct ListMultipartUploadsResult {
    pub(crate) is_truncated: bool,
    pub(crate) next_key_marker: String,
    pub(crate) next_upload_id_marker: String,
    pub(crate) upload: Vec<UploadDocument>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct PartDocument {
    pub(crate) part_number: u16,
    #[serde(rename = "ETag")]
    pub(crate) etag: String,
    pub(crate) size: u64,
    pub(crate) last_modified: String,
}

/// `<ListPartsResult>` for the part listing of one upload.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct ListPartsResult {
    pub(crate) is_truncated: bool,
    pub(crate) next_part_number_marker: String,
    pub(crate) part: Vec<PartDocument>,
}

/// `<InitiateMultipartUploadResult>`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct InitiateMultipartUploadResult {
    pub(crate) upload_id: String,
}

/// `<CompleteMultipartUploadResult>`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct CompleteMultipartUploadResult {
    pub(crate) bucket: String,
    pub(crate) key: String,
    #[serde(rename = "ETag")]
    pub(crate) etag: String,
    pub(crate) location: String,
}

/// `<CopyObjectResult>` and `<CopyPartResult>`, which share a shape.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct CopyResult {
    #[serde(rename = "ETag")]
    pub(crate) etag: String,
    pub(crate) last_modified: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct DeleteErrorDocument {
    pub(crate) key: String,
    pub(crate) version_id: String,
    pub(crate) code: String,
    pub(crate) message: String,
}

/// `<DeleteResult>` of a bulk delete.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct DeleteResult {
    pub(crate) error: Vec<DeleteErrorDocument>,
}

/// `<VersioningConfiguration>` of a bucket.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct VersioningConfiguration {
    pub(crate) status: String,
}

/// `<LegalHold>` status of an object.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct LegalHoldDocument {
    pub(crate) status: String,
}

/// `<Retention>` of an object.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct RetentionDocument {
    pub(crate) mode: String,
    pub(crate) retain_until_date: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct DefaultRetentionDocument {
    pub(crate) mode: String,
    pub(crate) days: Option<u32>,
    pub(crate) years: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct ObjectLockRuleDocument {
    pub(crate) default_retention: Option<DefaultRetentionDocument>,
}

/// `<ObjectLockConfiguration>` of a bucket.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct ObjectLockConfiguration {
    pub(crate) object_lock_enabled: String,
    pub(crate) rule: Option<ObjectLockRuleDocument>,
}

/// `<Progress>` and `<Stats>` payloads of a select stream.
#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct SelectMetrics {
    pub(crate) bytes_scanned: u64,
    pub(crate) bytes_processed: u64,
    pub(crate) bytes_returned: u64,
}

pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// `<CreateBucketConfiguration>` body, or nothing for the default region.
pub(crate) fn create_bucket_doc(region: &str) -> Option<String> {
    if region == crate::region::DEFAULT_REGION {
        return None;
    }
    Some(format!(
        "<CreateBucketConfiguration xmlns=\"{S3_XMLNS}\">\
         <LocationConstraint>{}</LocationConstraint>\
         </CreateBucketConfiguration>",
        escape(region)
    ))
}

/// `<CompleteMultipartUpload>` body; `parts` must already be in ascending
/// part number order.
pub(crate) fn complete_multipart_upload_doc(parts: &[Part]) -> String {
    let mut doc = format!("<CompleteMultipartUpload xmlns=\"{S3_XMLNS}\">");
    for part in parts {
        let _ = write!(
            doc,
            "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
            part.number,
            escape(&part.etag)
        );
    }
    doc.push_str("</CompleteMultipartUpload>");
    doc
}

/// `<Delete>` body of a bulk delete.
pub(crate) fn delete_objects_doc(
    objects: &[(String, Option<String>)],
    quiet: bool,
) -> String {
    let mut doc = format!("<Delete xmlns=\"{S3_XMLNS}\">");
    if quiet {
        doc.push_str("<Quiet>true</Quiet>");
    }
    for (key, version_id) in objects {
        let _ = write!(doc, "<Object><Key>{}</Key>", escape(key));
        if let Some(version_id) = version_id {
            let _ = write!(doc, "<VersionId>{}</VersionId>", escape(version_id));
        }
        doc.push_str("</Object>");
    }
    doc.push_str("</Delete>");
    doc
}

/// `<VersioningConfiguration>` body.
pub(crate) fn versioning_doc(enabled: bool) -> String {
    format!(
        "<VersioningConfiguration xmlns=\"{S3_XMLNS}\"><Status>{}</Status></VersioningConfiguration>",
        if enabled { "Enabled" } else { "Suspended" }
    )
}

/// `<LegalHold>` body.
pub(crate) fn legal_hold_doc(enabled: bool) -> String {
    format!(
        "<LegalHold><Status>{}</Status></LegalHold>",
        if enabled { "ON" } else { "OFF" }
    )
}

/// `<Retention>` body.
pub(crate) fn retention_doc(mode: crate::types::RetentionMode, retain_until: OffsetDateTime) -> String {
    format!(
        "<Retention><Mode>{}</Mode><RetainUntilDate>{}</RetainUntilDate></Retention>",
        mode.as_str(),
        retain_until.format(&Rfc3339).expect("UTC datetime formats")
    )
}

/// `<SelectObjectContentRequest>` body.
pub(crate) fn select_request_doc(
    expression: &str,
    input_serialization: &str,
    output_serialization: &str,
    request_progress: bool,
) -> String {
    let mut doc = String::from("<SelectObjectContentRequest>");
    let _ = write!(
        doc,
        "<Expression>{}</Expression><ExpressionType>SQL</ExpressionType>",
        escape(expression)
    );
    let _ = write!(doc, "<InputSerialization>{input_serialization}</InputSerialization>");
    let _ = write!(doc, "<OutputSerialization>{output_serialization}</OutputSerialization>");
    if request_progress {
        doc.push_str("<RequestProgress><Enabled>true</Enabled></RequestProgress>");
    }
    doc.push_str("</SelectObjectContentRequest>");
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_error_document() {
        let body = br#"<?xml version="1.0" encoding="UTF-8"?>
            <Error>
              <Code>NoSuchKey</Code>
              <Message>The specified key does not exist.</Message>
              <Key>photos/2024/cat.jpg</Key>
              <BucketName>media</BucketName>
              <RequestId>4442587FB7D0A2F9</RequestId>
              <HostId>pOJ9xcWsL</HostId>
            </Error>"#;
        let doc: ErrorDocument = from_xml(body).unwrap();
        assert_eq!(doc.code, "NoSuchKey");
        assert_eq!(doc.bucket_name, "media");
        assert_eq!(doc.key, "photos/2024/cat.jpg");
        assert_eq!(doc.request_id, "4442587FB7D0A2F9");
    }

    #[test]
    fn parses_location_constraint() {
        let doc: LocationConstraint =
            from_xml(br#"<LocationConstraint>eu-central-1</LocationConstraint>"#).unwrap();
        assert_eq!(doc.location, "eu-central-1");
        let empty: LocationConstraint = from_xml(br#"<LocationConstraint/>"#).unwrap();
        assert_eq!(empty.location, "");
    }

    #[test]
    fn parses_v2_listing() {
        let body = br#"<ListBucketResult>
            <IsTruncated>true</IsTruncated>
            <NextContinuationToken>token-1</NextContinuationToken>
            <Contents>
              <Key>a.txt</Key>
              <Size>12</Size>
              <ETag>&quot;abc&quot;</ETag>
              <LastModified>2024-03-01T10:00:00.000Z</LastModified>
            </Contents>
            <Contents>
              <Key>b.txt</Key>
              <Size>3</Size>
            </Contents>
            <CommonPrefixes><Prefix>dir/</Prefix></CommonPrefixes>
        </ListBucketResult>"#;
        let doc: ListBucketV2Result = from_xml(body).unwrap();
        assert!(doc.is_truncated);
        assert_eq!(doc.next_continuation_token, "token-1");
        assert_eq!(doc.contents.len(), 2);
        assert_eq!(doc.contents[0].key, "a.txt");
        assert_eq!(doc.contents[0].size, 12);
        assert_eq!(doc.common_prefixes[0].prefix, "dir/");
        assert!(parse_timestamp(&doc.contents[0].last_modified).is_some());
    }

    #[test]
    fn complete_doc_renders_parts_in_given_order() {
        let parts = vec![
            Part { number: 1, etag: "etag-1".into() },
            Part { number: 2, etag: "etag-2".into() },
        ];
        let doc = complete_multipart_upload_doc(&parts);
        assert_eq!(
            doc,
            format!(
                "<CompleteMultipartUpload xmlns=\"{S3_XMLNS}\">\
                 <Part><PartNumber>1</PartNumber><ETag>etag-1</ETag></Part>\
                 <Part><PartNumber>2</PartNumber><ETag>etag-2</ETag></Part>\
                 </CompleteMultipartUpload>"
            )
        );
    }

    #[test]
    fn create_bucket_doc_empty_for_default_region() {
        assert!(create_bucket_doc("us-east-1").is_none());
        assert!(create_bucket_doc("ap-south-1")
            .unwrap()
            .contains("<LocationConstraint>ap-south-1</LocationConstraint>"));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
    }
}
