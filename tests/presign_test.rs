/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Presigned URL and POST policy behavior.

mod common;

use common::{anonymous_client, client};
use s3_object_client::error::ErrorKind;
use s3_object_client::operation::presign::PostPolicy;

#[tokio::test]
async fn presigned_get_embeds_the_credential_scope() {
    let (client, transport) = client("https://storage.example.com");

    let url = client
        .presigned_get_object("bucket", "path/to/file.bin", 3600)
        .await
        .unwrap();

    // Presigning is pure, nothing goes on the wire.
    assert_eq!(transport.request_count(), 0);
    assert_eq!(url.host_str(), Some("bucket.storage.example.com"));
    assert_eq!(url.path(), "/path/to/file.bin");
    let query = url.query().unwrap();
    assert!(query.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
    assert!(query.contains("X-Amz-Expires=3600"));
    assert!(query.contains("X-Amz-SignedHeaders=host"));
    assert!(query.contains("%2Fus-east-1%2Fs3%2Faws4_request"));
    assert!(query.contains("X-Amz-Signature="));
}

#[tokio::test]
async fn expiry_bounds_are_validated() {
    let (client, _) = client("https://storage.example.com");
    for expiry in [0u64, 604_801] {
        let err = client
            .presigned_get_object("bucket", "key", expiry)
            .await
            .unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::InvalidArgument, "{expiry}");
    }
}

#[tokio::test]
async fn anonymous_clients_cannot_presign() {
    let (client, _) = anonymous_client("https://storage.example.com");
    let err = client
        .presigned_get_object("bucket", "key", 3600)
        .await
        .unwrap_err();
    assert_eq!(*err.kind(), ErrorKind::Auth);
}

#[tokio::test]
async fn extra_query_parameters_are_signed_into_the_url() {
    let (client, _) = client("https://storage.example.com");
    let extra = vec![(
        "response-content-type".to_string(),
        "application/json".to_string(),
    )];
    let url = client
        .presigned_url(http::Method::GET, "bucket", "key", 600, &extra)
        .await
        .unwrap();
    assert!(url
        .query()
        .unwrap()
        .contains("response-content-type=application%2Fjson"));
}

#[tokio::test]
async fn post_policy_form_contains_signing_fields() {
    let (client, _) = client("https://storage.example.com");
    let expiration = time::OffsetDateTime::now_utc() + time::Duration::hours(1);
    let policy = PostPolicy::new("bucket", expiration)
        .key_starts_with("uploads/")
        .content_length_range(1, 1024);

    let form = client.presigned_post_policy(&policy).await.unwrap();
    assert!(form.contains_key("policy"));
    assert_eq!(form["x-amz-algorithm"], "AWS4-HMAC-SHA256");
    assert!(form["x-amz-credential"].contains("/us-east-1/s3/aws4_request"));
    assert_eq!(form["x-amz-signature"].len(), 64);
}
