/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Upload behavior: chunked streaming single puts, multipart orchestration
//! and cleanup on failure.

mod common;

use bytes::Bytes;
use common::{client, error_xml};
use http::Method;
use s3_object_client::error::ErrorKind;
use s3_object_client::http::test_util::{MockResponse, MockTransport};
use s3_object_client::io::InputStream;
use s3_object_client::operation::upload::PutObjectOptions;

const MIB: usize = 1024 * 1024;

fn initiate_xml(upload_id: &str) -> String {
    format!(
        "<InitiateMultipartUploadResult><Bucket>bucket</Bucket><Key>key</Key>\
         <UploadId>{upload_id}</UploadId></InitiateMultipartUploadResult>"
    )
}

fn complete_xml(etag: &str) -> String {
    format!(
        "<CompleteMultipartUploadResult><Bucket>bucket</Bucket><Key>key</Key>\
         <ETag>\"{etag}\"</ETag></CompleteMultipartUploadResult>"
    )
}

/// A known-length stream over plain HTTP goes out as one streaming
/// chunk-signed request.
#[tokio::test]
async fn known_length_stream_uses_one_chunked_request() {
    let (client, transport) = client("http://storage.example.com");
    transport.enqueue(MockResponse::new(200).header("etag", "\"abc123\""));

    let total = 100 * MIB;
    let chunk = Bytes::from(vec![b'x'; MIB]);
    let chunks: Vec<std::io::Result<Bytes>> = (0..100).map(|_| Ok(chunk.clone())).collect();
    let stream = InputStream::from_stream(futures_util::stream::iter(chunks), Some(total as u64));

    let output = client
        .put_object("bucket", "key", stream, &PutObjectOptions::default())
        .await
        .unwrap();
    assert_eq!(output.etag, "abc123");
    assert!(output.upload_id.is_none());

    assert_eq!(transport.request_count(), 1);
    let request = transport.request(0);
    assert_eq!(request.method, Method::PUT);
    assert_eq!(request.header("x-amz-content-sha256"), "STREAMING-AWS4-HMAC-SHA256-PAYLOAD");
    assert_eq!(request.header("content-encoding"), "aws-chunked");
    assert_eq!(request.header("x-amz-decoded-content-length"), "104857600");

    // The recorded body is the framed wire form: chunk headers plus a
    // zero-length terminator, and its length matches Content-Length.
    let declared: u64 = request.header("content-length").parse().unwrap();
    assert_eq!(request.body.len() as u64, declared);
    assert!(request.body.len() > total);
    let head = String::from_utf8_lossy(&request.body[..80]);
    assert!(head.starts_with("10000;chunk-signature="), "{head}");
    let tail = String::from_utf8_lossy(&request.body[request.body.len() - 90..]);
    assert!(tail.contains("0;chunk-signature="), "{tail}");
}

#[tokio::test]
async fn buffered_put_is_also_chunk_signed() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).header("etag", "\"e\""));

    // Buffered bodies travel as streams too, so object puts always take
    // the chunk-signed path when credentials are present.
    client
        .put_object(
            "bucket",
            "key",
            InputStream::from(vec![1u8; 1024]),
            &PutObjectOptions::default(),
        )
        .await
        .unwrap();
    let request = transport.request(0);
    assert_eq!(request.header("x-amz-content-sha256"), "STREAMING-AWS4-HMAC-SHA256-PAYLOAD");
    assert_eq!(request.header("x-amz-decoded-content-length"), "1024");
}

#[tokio::test]
async fn explicit_part_size_drives_multipart_with_ordered_completion() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).xml(initiate_xml("upload-1")));
    for i in 1..=3 {
        transport.enqueue(MockResponse::new(200).header("etag", &format!("\"etag-{i}\"")));
    }
    transport.enqueue(MockResponse::new(200).xml(complete_xml("final-etag")));

    let mut options = PutObjectOptions::default();
    options.part_size = Some(5 * MIB as u64);
    let output = client
        .put_object(
            "bucket",
            "key",
            InputStream::from(vec![b'z'; 12 * MIB]),
            &options,
        )
        .await
        .unwrap();
    assert_eq!(output.etag, "final-etag");
    assert_eq!(output.upload_id.as_deref(), Some("upload-1"));

    assert_eq!(transport.request_count(), 5);
    let initiate = transport.request(0);
    assert_eq!(initiate.method, Method::POST);
    assert!(initiate.query().contains("uploads"));

    for (i, expected_len) in [(1usize, 5 * MIB), (2, 5 * MIB), (3, 2 * MIB)] {
        let part = transport.request(i);
        assert_eq!(part.method, Method::PUT);
        assert!(part.query().contains(&format!("partNumber={i}")), "{}", part.query());
        assert!(part.query().contains("uploadId=upload-1"));
        assert_eq!(
            part.header("x-amz-decoded-content-length"),
            expected_len.to_string()
        );
    }

    let complete = transport.request(4);
    assert_eq!(complete.method, Method::POST);
    assert!(complete.query().contains("uploadId=upload-1"));
    let body = String::from_utf8_lossy(&complete.body);
    let pos1 = body.find("<PartNumber>1</PartNumber><ETag>etag-1</ETag>").unwrap();
    let pos2 = body.find("<PartNumber>2</PartNumber><ETag>etag-2</ETag>").unwrap();
    let pos3 = body.find("<PartNumber>3</PartNumber><ETag>etag-3</ETag>").unwrap();
    assert!(pos1 < pos2 && pos2 < pos3);
}

/// A failure while uploading parts aborts the multipart upload exactly
/// once before the error is surfaced.
#[tokio::test]
async fn part_failure_aborts_the_upload() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).xml(initiate_xml("upload-7")));
    transport.enqueue(MockResponse::new(200).header("etag", "\"etag-1\""));
    transport.enqueue(MockResponse::new(200).header("etag", "\"etag-2\""));
    transport.enqueue_error("connection reset by peer");
    transport.enqueue(MockResponse::new(204));

    let mut options = PutObjectOptions::default();
    options.part_size = Some(5 * MIB as u64);
    let err = client
        .put_object(
            "bucket",
            "key",
            InputStream::from(vec![b'z'; 25 * MIB]),
            &options,
        )
        .await
        .unwrap_err();
    assert_eq!(*err.kind(), ErrorKind::Transport);

    let aborts: Vec<_> = transport
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::DELETE)
        .collect();
    assert_eq!(aborts.len(), 1);
    assert!(aborts[0].query().contains("uploadId=upload-7"));
}

#[tokio::test]
async fn failed_completion_also_aborts() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).xml(initiate_xml("upload-9")));
    transport.enqueue(MockResponse::new(200).header("etag", "\"etag-1\""));
    transport.enqueue(MockResponse::new(200).header("etag", "\"etag-2\""));
    transport.enqueue(MockResponse::new(404).xml(error_xml("NoSuchUpload", "bucket", "key")));
    transport.enqueue(MockResponse::new(204));

    let mut options = PutObjectOptions::default();
    options.part_size = Some(5 * MIB as u64);
    let err = client
        .put_object(
            "bucket",
            "key",
            InputStream::from(vec![b'z'; 10 * MIB]),
            &options,
        )
        .await
        .unwrap_err();
    assert_eq!(*err.kind(), ErrorKind::NotFound);

    let last = transport.request(transport.request_count() - 1);
    assert_eq!(last.method, Method::DELETE);
}

/// A stream of unknown length that fits within one part falls back to a
/// plain single put.
#[tokio::test]
async fn short_unknown_length_stream_degrades_to_single_put() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).header("etag", "\"tiny\""));

    let chunks: Vec<std::io::Result<Bytes>> = vec![Ok(Bytes::from_static(b"hello world"))];
    let stream = InputStream::from_stream(futures_util::stream::iter(chunks), None);
    let output = client
        .put_object("bucket", "key", stream, &PutObjectOptions::default())
        .await
        .unwrap();
    assert_eq!(output.etag, "tiny");

    assert_eq!(transport.request_count(), 1);
    let request = transport.request(0);
    assert!(request.query().is_empty());
    assert_eq!(request.header("x-amz-decoded-content-length"), "11");
}

#[tokio::test]
async fn unknown_length_stream_spanning_parts_goes_multipart() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).xml(initiate_xml("upload-3")));
    transport.enqueue(MockResponse::new(200).header("etag", "\"etag-1\""));
    transport.enqueue(MockResponse::new(200).header("etag", "\"etag-2\""));
    transport.enqueue(MockResponse::new(200).xml(complete_xml("joined")));

    // 6 MiB through a 5 MiB part size: two parts.
    let mut options = PutObjectOptions::default();
    options.part_size = Some(5 * MIB as u64);
    let chunks: Vec<std::io::Result<Bytes>> =
        (0..6).map(|_| Ok(Bytes::from(vec![b'q'; MIB]))).collect();
    let stream = InputStream::from_stream(futures_util::stream::iter(chunks), None);

    let output = client
        .put_object("bucket", "key", stream, &options)
        .await
        .unwrap();
    assert_eq!(output.etag, "joined");
    assert_eq!(transport.request_count(), 4);
    assert!(transport.request(1).query().contains("partNumber=1"));
    assert!(transport.request(2).query().contains("partNumber=2"));
}

#[tokio::test]
async fn metadata_and_sse_headers_reach_the_wire() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).header("etag", "\"e\""));

    let mut options = PutObjectOptions::default();
    options.content_type = Some("text/plain".into());
    options.user_metadata.push(("project".into(), "atlas".into()));
    options.headers.push(("Cache-Control".into(), "max-age=60".into()));
    options.headers.push(("Reviewer".into(), "ops".into()));
    options.sse = Some(s3_object_client::types::Sse::S3);

    client
        .put_object("bucket", "key", InputStream::from(vec![0u8; 16]), &options)
        .await
        .unwrap();

    let request = transport.request(0);
    assert_eq!(request.header("content-type"), "text/plain");
    assert_eq!(request.header("x-amz-meta-project"), "atlas");
    assert_eq!(request.header("cache-control"), "max-age=60");
    assert_eq!(request.header("x-amz-meta-reviewer"), "ops");
    assert_eq!(request.header("x-amz-server-side-encryption"), "AES256");
}

#[tokio::test]
async fn ssec_requires_tls() {
    let (client, _transport): (s3_object_client::Client, MockTransport) =
        client("http://storage.example.com");
    let mut options = PutObjectOptions::default();
    options.sse = Some(s3_object_client::types::Sse::Customer(
        s3_object_client::types::SseCustomerKey::new([7u8; 32]),
    ));
    let err = client
        .put_object("bucket", "key", InputStream::from(vec![0u8; 4]), &options)
        .await
        .unwrap_err();
    assert_eq!(*err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn oversized_payload_is_rejected_up_front() {
    let (client, transport) = client("https://storage.example.com");
    let stream = InputStream::from_stream(
        futures_util::stream::iter(Vec::<std::io::Result<Bytes>>::new()),
        Some(s3_object_client::types::MAX_OBJECT_SIZE + 1),
    );
    let err = client
        .put_object("bucket", "key", stream, &PutObjectOptions::default())
        .await
        .unwrap_err();
    assert_eq!(*err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(transport.request_count(), 0);
}
