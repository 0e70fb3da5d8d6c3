use std::sync::Arc;

use aws_sdk_s3::config::{
    retry::RetryConfig, BehaviorVersion, Credentials, Region, RequestChecksumCalculation,
    ResponseChecksumValidation,
};
use b2fs::{
    adapters::{s3::S3Client, ObjectBucket, ObjectClient},
    model::fs::BackendError,
    ErrorKind, FileObject, Filesystem, ObjectFs, TemporaryUrlOptions, WriteConfig,
};
use httpmock::{prelude::*, Method::HEAD};
use time::{Duration, OffsetDateTime};

const DOWNLOAD_URL: &str = "https://f004.backblazeb2.com";
const LAST_MODIFIED: &str = "Wed, 14 Mar 2018 04:00:00 GMT";

fn s3_client(server: &MockServer) -> S3Client {
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-west-004"))
        .credentials_provider(Credentials::new("keyid", "secret", None, None, "test"))
        .endpoint_url(server.base_url())
        .force_path_style(true)
        .retry_config(RetryConfig::disabled())
        .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
        .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
        .build();

    S3Client::new(aws_sdk_s3::Client::from_conf(config), &format!("{}/", DOWNLOAD_URL))
}

async fn mock_buckets(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .header("Content-Type", "application/xml")
                .body(concat!(
                    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                    r#"<ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#,
                    "<Owner><ID>acct1</ID><DisplayName>acct1</DisplayName></Owner>",
                    "<Buckets>",
                    "<Bucket><Name>photos</Name><CreationDate>2024-01-01T00:00:00.000Z</CreationDate></Bucket>",
                    "<Bucket><Name>archive</Name><CreationDate>2024-01-01T00:00:00.000Z</CreationDate></Bucket>",
                    "</Buckets>",
                    "</ListAllMyBucketsResult>"
                ));
        })
        .await;
}

async fn object_fs(server: &MockServer) -> ObjectFs {
    mock_buckets(server).await;
    ObjectFs::new(Arc::new(s3_client(server)), "photos")
        .await
        .unwrap()
}

async fn mock_head(server: &MockServer, key: &str, found: bool) {
    let path = format!("/photos/{}", key);
    server
        .mock_async(|when, then| {
            when.method(HEAD).path(path);
            if found {
                then.status(200)
                    .header("Content-Type", "text/plain")
                    .header("Last-Modified", LAST_MODIFIED)
                    .header("x-amz-version-id", "v1");
            } else {
                then.status(404);
            }
        })
        .await;
}

fn list_page(keys: &[&str], next: Option<&str>) -> String {
    let contents: String = keys
        .iter()
        .map(|key| {
            format!(
                "<Contents><Key>{}</Key><LastModified>2018-03-14T04:00:00.000Z</LastModified><Size>1</Size></Contents>",
                key
            )
        })
        .collect();
    let truncated = match next {
        Some(token) => format!(
            "<IsTruncated>true</IsTruncated><NextContinuationToken>{}</NextContinuationToken>",
            token
        ),
        None => "<IsTruncated>false</IsTruncated>".to_string(),
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>photos</Name><Prefix>docs/</Prefix><KeyCount>{}</KeyCount>{}{}</ListBucketResult>"#,
        keys.len(),
        truncated,
        contents
    )
}

fn without_continuation_token(req: &HttpMockRequest) -> bool {
    !req.query_params
        .as_ref()
        .map(|params| params.iter().any(|(name, _)| name == "continuation-token"))
        .unwrap_or(false)
}

#[tokio::test]
async fn test_lists_buckets() {
    let server = MockServer::start_async().await;
    mock_buckets(&server).await;
    let client = s3_client(&server);

    assert_eq!(client.download_url(), DOWNLOAD_URL);
    let names: Vec<String> = client
        .list_buckets()
        .await
        .unwrap()
        .iter()
        .map(|bucket| bucket.name().to_string())
        .collect();
    assert_eq!(names, vec!["photos", "archive"]);

    let fs = ObjectFs::new(Arc::new(client), "photos").await.unwrap();
    assert_eq!(
        fs.get_url("a/b.txt"),
        format!("{}/file/photos/a/b.txt", DOWNLOAD_URL)
    );
}

#[tokio::test]
async fn test_upload_reads_back_the_stored_record() {
    let server = MockServer::start_async().await;
    let fs = object_fs(&server).await;

    let put = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/photos/a/b.txt")
                .header("Content-Type", "text/plain");
            then.status(200).header("ETag", "\"5d41402abc4b2a76b9719d911017c592\"");
        })
        .await;
    mock_head(&server, "a/b.txt", true).await;

    let meta = fs
        .write("a/b.txt", b"hello".to_vec(), &WriteConfig::with_content_type("text/plain"))
        .await
        .unwrap();

    put.assert_async().await;
    assert_eq!(meta.path, "a/b.txt");
    assert_eq!(meta.mimetype.as_deref(), Some("text/plain"));
    assert_eq!(meta.timestamp, 1_521_000_000);
}

#[tokio::test]
async fn test_missing_head_is_not_found() {
    let server = MockServer::start_async().await;
    let fs = object_fs(&server).await;
    mock_head(&server, "a/b.txt", true).await;
    mock_head(&server, "ghost.txt", false).await;

    assert!(fs.has("a/b.txt").await.unwrap());
    assert!(!fs.has("ghost.txt").await.unwrap());
    assert_eq!(fs.get_timestamp("a/b.txt").await.unwrap(), 1_521_000_000);
    assert_eq!(
        fs.get_metadata("ghost.txt").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(fs.delete("ghost.txt").await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_download() {
    let server = MockServer::start_async().await;
    let fs = object_fs(&server).await;
    mock_head(&server, "a/b.txt", true).await;

    let get = server
        .mock_async(|when, then| {
            when.method(GET).path("/photos/a/b.txt");
            then.status(200).body("hello");
        })
        .await;

    assert_eq!(fs.read("a/b.txt").await.unwrap(), b"hello".to_vec());
    get.assert_async().await;
}

#[tokio::test]
async fn test_no_such_key_is_not_found() {
    let server = MockServer::start_async().await;
    let fs = object_fs(&server).await;
    mock_head(&server, "a/b.txt", true).await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/photos/a/b.txt");
            then.status(404)
                .header("Content-Type", "application/xml")
                .body(concat!(
                    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                    "<Error><Code>NoSuchKey</Code>",
                    "<Message>The specified key does not exist.</Message>",
                    "<Key>a/b.txt</Key></Error>"
                ));
        })
        .await;

    assert_eq!(fs.read("a/b.txt").await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_listing_follows_continuation_tokens() {
    let server = MockServer::start_async().await;
    let fs = object_fs(&server).await;

    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/photos")
                .query_param("list-type", "2")
                .query_param("prefix", "docs/")
                .matches(without_continuation_token);
            then.status(200)
                .header("Content-Type", "application/xml")
                .body(list_page(&["docs/a.txt"], Some("tok2")));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/photos")
                .query_param("list-type", "2")
                .query_param("prefix", "docs/")
                .query_param("continuation-token", "tok2");
            then.status(200)
                .header("Content-Type", "application/xml")
                .body(list_page(&["docs/b.txt"], None));
        })
        .await;

    let listed = fs.list_contents("docs/", true).await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    let paths: Vec<&str> = listed.iter().map(|meta| meta.path.as_str()).collect();
    assert_eq!(paths, vec!["docs/a.txt", "docs/b.txt"]);
    assert!(listed.iter().all(|meta| meta.size == 1 && meta.timestamp == 1_521_000_000));
}

#[tokio::test]
async fn test_delete_passes_version_id() {
    let server = MockServer::start_async().await;
    let fs = object_fs(&server).await;
    mock_head(&server, "a/b.txt", true).await;

    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE)
                .path("/photos/a/b.txt")
                .query_param("versionId", "v1");
            then.status(204);
        })
        .await;

    fs.delete("a/b.txt").await.unwrap();
    delete.assert_async().await;
}

#[tokio::test]
async fn test_download_authorization_is_unsupported() {
    let server = MockServer::start_async().await;
    mock_buckets(&server).await;
    let buckets = s3_client(&server).list_buckets().await.unwrap();
    let file = FileObject {
        id: Some("v1".to_string()),
        name: "a/b.txt".to_string(),
        content_type: None,
        size: 5,
        upload_timestamp: 0,
    };

    let err = buckets[0]
        .download_authorization(&file, 600, &TemporaryUrlOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Unsupported(_)));
}

#[tokio::test]
async fn test_temporary_url_is_sdk_error() {
    let server = MockServer::start_async().await;
    let fs = object_fs(&server).await;
    mock_head(&server, "a/b.txt", true).await;

    let expiration = OffsetDateTime::now_utc() + Duration::minutes(10);
    let err = fs
        .get_temporary_url("a/b.txt", expiration, &TemporaryUrlOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Sdk);
}
