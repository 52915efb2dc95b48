/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Resumable download behavior.

mod common;

use common::client;
use http::Method;
use s3_object_client::http::test_util::MockResponse;
use s3_object_client::operation::get_object::GetObjectOptions;

const KIB: usize = 1024;

fn head_response(size: usize, etag: &str) -> MockResponse {
    MockResponse::new(200)
        .header("content-length", &size.to_string())
        .header("etag", &format!("\"{etag}\""))
        .header("content-type", "application/octet-stream")
        .header("last-modified", "Mon, 01 Apr 2024 10:00:00 GMT")
}

#[tokio::test]
async fn resumes_from_an_existing_temp_file() {
    let (client, transport) = client("https://storage.example.com");
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("data.bin");

    // 10 KiB object, 4 KiB already downloaded.
    let full: Vec<u8> = (0..10 * KIB).map(|i| (i % 251) as u8).collect();
    let temp = dir.path().join("data.bin.etag42.part.minio");
    std::fs::write(&temp, &full[..4 * KIB]).unwrap();

    transport.enqueue(head_response(10 * KIB, "etag42"));
    transport.enqueue(
        MockResponse::new(206)
            .header("content-length", &(6 * KIB).to_string())
            .body(full[4 * KIB..].to_vec()),
    );

    let stat = client
        .get_object_to_file("bucket", "data.bin", &dest, &GetObjectOptions::default())
        .await
        .unwrap();
    assert_eq!(stat.size, 10 * KIB as u64);

    assert_eq!(transport.request_count(), 2);
    assert_eq!(transport.request(0).method, Method::HEAD);
    let get = transport.request(1);
    assert_eq!(get.method, Method::GET);
    assert_eq!(get.header("range"), "bytes=4096-");
    assert_eq!(get.header("if-match"), "\"etag42\"");

    assert_eq!(std::fs::read(&dest).unwrap(), full);
    assert!(!temp.exists(), "temp file must be renamed away");
}

#[tokio::test]
async fn fresh_download_writes_and_renames() {
    let (client, transport) = client("https://storage.example.com");
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("fresh.bin");

    let body = vec![9u8; 2 * KIB];
    transport.enqueue(head_response(2 * KIB, "abc"));
    transport.enqueue(
        MockResponse::new(200)
            .header("content-length", &(2 * KIB).to_string())
            .body(body.clone()),
    );

    client
        .get_object_to_file("bucket", "fresh.bin", &dest, &GetObjectOptions::default())
        .await
        .unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    // A fresh download has no offset and no range header.
    assert!(transport.request(1).header("range").is_empty());
}

#[tokio::test]
async fn complete_destination_is_a_no_op() {
    let (client, transport) = client("https://storage.example.com");
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("done.bin");
    std::fs::write(&dest, vec![1u8; 3 * KIB]).unwrap();

    transport.enqueue(head_response(3 * KIB, "same"));

    client
        .get_object_to_file("bucket", "done.bin", &dest, &GetObjectOptions::default())
        .await
        .unwrap();
    // Only the HEAD went out.
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn larger_destination_is_a_size_mismatch() {
    let (client, transport) = client("https://storage.example.com");
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("big.bin");
    std::fs::write(&dest, vec![1u8; 5 * KIB]).unwrap();

    transport.enqueue(head_response(3 * KIB, "small"));

    let err = client
        .get_object_to_file("bucket", "big.bin", &dest, &GetObjectOptions::default())
        .await
        .unwrap_err();
    assert_eq!(
        *err.kind(),
        s3_object_client::error::ErrorKind::InvalidArgument
    );
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn truncated_body_is_a_transport_error() {
    let (client, transport) = client("https://storage.example.com");
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("cut.bin");

    transport.enqueue(head_response(4 * KIB, "cut"));
    transport.enqueue(
        MockResponse::new(200)
            .header("content-length", &(4 * KIB).to_string())
            .body(vec![0u8; KIB]),
    );

    let err = client
        .get_object_to_file("bucket", "cut.bin", &dest, &GetObjectOptions::default())
        .await
        .unwrap_err();
    assert_eq!(*err.kind(), s3_object_client::error::ErrorKind::Transport);
    assert!(!dest.exists(), "destination must not appear on failure");
}
