/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Listing pagination behavior.

mod common;

use common::client;
use futures_util::StreamExt;
use s3_object_client::http::test_util::MockResponse;
use s3_object_client::operation::list::{ListMultipartUploadsOptions, ListObjectsOptions};

fn v2_page(keys: &[&str], prefixes: &[&str], next_token: Option<&str>) -> String {
    let mut doc = String::from("<ListBucketResult>");
    doc.push_str(&format!(
        "<IsTruncated>{}</IsTruncated>",
        next_token.is_some()
    ));
    if let Some(token) = next_token {
        doc.push_str(&format!(
            "<NextContinuationToken>{token}</NextContinuationToken>"
        ));
    }
    for key in keys {
        doc.push_str(&format!(
            "<Contents><Key>{key}</Key><Size>10</Size><ETag>\"e\"</ETag></Contents>"
        ));
    }
    for prefix in prefixes {
        doc.push_str(&format!(
            "<CommonPrefixes><Prefix>{prefix}</Prefix></CommonPrefixes>"
        ));
    }
    doc.push_str("</ListBucketResult>");
    doc
}

#[tokio::test]
async fn paginates_exactly_until_not_truncated() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).xml(v2_page(&["a", "b"], &[], Some("t1"))));
    transport.enqueue(MockResponse::new(200).xml(v2_page(&["c", "d"], &[], Some("t2"))));
    transport.enqueue(MockResponse::new(200).xml(v2_page(&["e"], &[], None)));

    let mut options = ListObjectsOptions::default();
    options.prefix = Some("p/".into());
    options.recursive = false;
    let entries: Vec<_> = client
        .list_objects("bucket", &options)
        .collect::<Vec<_>>()
        .await;

    let keys: Vec<String> = entries
        .into_iter()
        .map(|e| e.unwrap().key)
        .collect();
    assert_eq!(keys, ["a", "b", "c", "d", "e"]);
    assert_eq!(transport.request_count(), 3);

    let first = transport.request(0);
    assert!(first.query().contains("list-type=2"));
    assert!(first.query().contains("prefix=p%2F"));
    assert!(first.query().contains("delimiter=%2F"));
    assert!(!first.query().contains("continuation-token"));

    assert!(transport.request(1).query().contains("continuation-token=t1"));
    assert!(transport.request(2).query().contains("continuation-token=t2"));
}

#[tokio::test]
async fn common_prefixes_surface_as_directory_entries() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).xml(v2_page(&["p/file"], &["p/sub/"], None)));

    let entries: Vec<_> = client
        .list_objects("bucket", &ListObjectsOptions::default())
        .collect::<Vec<_>>()
        .await;
    let entries: Vec<_> = entries.into_iter().map(|e| e.unwrap()).collect();

    assert_eq!(entries.len(), 2);
    assert!(!entries[0].is_prefix);
    assert!(entries[1].is_prefix);
    assert_eq!(entries[1].key, "p/sub/");
    assert!(entries[1].key.ends_with('/'));
    assert_eq!(entries[1].size, 0);
}

#[tokio::test]
async fn recursive_listing_drops_the_delimiter() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).xml(v2_page(&["x"], &[], None)));

    let mut options = ListObjectsOptions::default();
    options.recursive = true;
    let _: Vec<_> = client
        .list_objects("bucket", &options)
        .collect::<Vec<_>>()
        .await;
    assert!(!transport.request(0).query().contains("delimiter"));
}

#[tokio::test]
async fn v1_listing_forwards_markers() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).xml(
        "<ListBucketResult><IsTruncated>true</IsTruncated>\
         <Contents><Key>a</Key><Size>1</Size></Contents>\
         <Contents><Key>b</Key><Size>1</Size></Contents>\
         </ListBucketResult>",
    ));
    transport.enqueue(MockResponse::new(200).xml(
        "<ListBucketResult><IsTruncated>false</IsTruncated>\
         <Contents><Key>c</Key><Size>1</Size></Contents>\
         </ListBucketResult>",
    ));

    let mut options = ListObjectsOptions::default();
    options.use_v1 = true;
    options.recursive = true;
    let entries: Vec<_> = client
        .list_objects("bucket", &options)
        .collect::<Vec<_>>()
        .await;
    assert_eq!(entries.len(), 3);

    assert!(!transport.request(0).query().contains("marker"));
    // Without an explicit NextMarker the last key of the page carries over.
    assert!(transport.request(1).query().contains("marker=b"));
    assert!(!transport.request(0).query().contains("list-type"));
}

#[tokio::test]
async fn page_error_is_terminal() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).xml(v2_page(&["a"], &[], Some("t1"))));
    transport.enqueue(MockResponse::new(403));

    let entries: Vec<_> = client
        .list_objects("bucket", &ListObjectsOptions::default())
        .collect::<Vec<_>>()
        .await;
    assert_eq!(entries.len(), 2);
    assert!(entries[0].is_ok());
    assert!(entries[1].is_err());
}

#[tokio::test]
async fn upload_listing_can_aggregate_part_sizes() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).xml(
        "<ListMultipartUploadsResult><IsTruncated>false</IsTruncated>\
         <Upload><Key>big.bin</Key><UploadId>u-1</UploadId></Upload>\
         </ListMultipartUploadsResult>",
    ));
    transport.enqueue(MockResponse::new(200).xml(
        "<ListPartsResult><IsTruncated>false</IsTruncated>\
         <Part><PartNumber>1</PartNumber><ETag>\"e1\"</ETag><Size>5242880</Size></Part>\
         <Part><PartNumber>2</PartNumber><ETag>\"e2\"</ETag><Size>1048576</Size></Part>\
         </ListPartsResult>",
    ));

    let mut options = ListMultipartUploadsOptions::default();
    options.with_aggregated_part_sizes = true;
    let uploads: Vec<_> = client
        .list_multipart_uploads("bucket", &options)
        .collect::<Vec<_>>()
        .await;
    let upload = uploads[0].as_ref().unwrap();
    assert_eq!(upload.upload_id, "u-1");
    assert_eq!(upload.aggregated_part_size, Some(6291456));

    assert!(transport.request(0).query().contains("uploads"));
    assert!(transport.request(1).query().contains("uploadId=u-1"));
}

#[tokio::test]
async fn bucket_listing_parses_names_and_dates() {
    let (client, transport) = client("https://storage.example.com");
    transport.enqueue(MockResponse::new(200).xml(
        "<ListAllMyBucketsResult><Owner><ID>abc</ID></Owner><Buckets>\
         <Bucket><Name>logs</Name><CreationDate>2024-01-15T08:30:00.000Z</CreationDate></Bucket>\
         <Bucket><Name>media</Name><CreationDate>2023-06-01T00:00:00.000Z</CreationDate></Bucket>\
         </Buckets></ListAllMyBucketsResult>",
    ));

    let buckets = client.list_buckets().await.unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].name, "logs");
    assert!(buckets[0].creation_date.is_some());
    assert_eq!(transport.request(0).url.as_str(), "https://storage.example.com/");
}
