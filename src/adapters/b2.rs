use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::debug;
use url::Url;

use crate::{
    adapters::{BackendResult, ObjectBucket, ObjectClient},
    config::B2Config,
    model::fs::{BackendError, FileObject, TemporaryUrlOptions},
};

const API_VERSION: &str = "b2api/v2";
const AUTO_CONTENT_TYPE: &str = "b2/x-auto";
const LIST_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeAccountResponse {
    account_id: String,
    authorization_token: String,
    api_url: String,
    download_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    status: u16,
    code: String,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListBucketsRequest<'a> {
    account_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketInfo {
    bucket_id: String,
    bucket_name: String,
}

#[derive(Debug, Deserialize)]
struct ListBucketsResponse {
    buckets: Vec<BucketInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetUploadUrlRequest<'a> {
    bucket_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetUploadUrlResponse {
    upload_url: String,
    authorization_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListFileNamesRequest<'a> {
    bucket_id: &'a str,
    prefix: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_file_name: Option<&'a str>,
    max_file_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFileNamesResponse {
    files: Vec<B2File>,
    next_file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct B2File {
    file_id: Option<String>,
    file_name: String,
    content_type: Option<String>,
    content_length: u64,
    upload_timestamp: i64,
    action: Option<String>,
}

impl B2File {
    fn is_upload(&self) -> bool {
        self.action.as_deref().map_or(true, |action| action == "upload")
    }
}

impl From<B2File> for FileObject {
    fn from(file: B2File) -> Self {
        FileObject {
            id: file.file_id,
            name: file.file_name,
            content_type: file.content_type,
            size: file.content_length,
            upload_timestamp: file.upload_timestamp,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteFileVersionRequest<'a> {
    file_name: &'a str,
    file_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetDownloadAuthorizationRequest<'a> {
    bucket_id: &'a str,
    file_name_prefix: &'a str,
    valid_duration_in_seconds: u64,
    #[serde(rename = "b2ContentDisposition", skip_serializing_if = "Option::is_none")]
    content_disposition: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetDownloadAuthorizationResponse {
    authorization_token: String,
}

/// An authorized account; shared by the client and every bucket it hands out.
struct Session {
    http: reqwest::Client,
    account_id: String,
    token: String,
    api_url: String,
    download_url: String,
}

impl Session {
    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{}/{}", self.api_url, API_VERSION, operation)
    }

    async fn call<B, T>(&self, operation: &str, body: &B) -> BackendResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let res = self
            .http
            .post(self.endpoint(operation))
            .header("Authorization", &self.token)
            .json(body)
            .send()
            .await?;
        let res = check_response(res, operation).await?;

        Ok(res.json().await?)
    }
}

async fn check_response(res: Response, context: &str) -> BackendResult<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let text = res.text().await?;
    if status == StatusCode::NOT_FOUND {
        return Err(BackendError::NotFound(context.to_string()));
    }

    let err = match serde_json::from_str::<ApiErrorBody>(&text) {
        Ok(body) => BackendError::Api {
            status: body.status,
            code: body.code,
            message: body.message,
        },
        Err(_) => BackendError::Api {
            status: status.as_u16(),
            code: status.canonical_reason().unwrap_or("unknown").to_string(),
            message: text,
        },
    };
    debug!(error_message=%err, error_group=context);

    Err(err)
}

/// Builds `{download_url}/file/{bucket}/{key}` with every segment percent-encoded.
pub fn download_file_url(download_url: &str, bucket: &str, key: &str) -> BackendResult<Url> {
    let mut url = Url::parse(download_url)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| BackendError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
        segments
            .pop_if_empty()
            .push("file")
            .push(bucket)
            .extend(key.split('/'));
    }

    Ok(url)
}

fn encode_file_name(key: &str) -> String {
    url::form_urlencoded::byte_serialize(key.as_bytes()).collect()
}

/// Client for the native B2 HTTP API.
#[derive(Clone)]
pub struct B2Client {
    session: Arc<Session>,
}

impl B2Client {
    /// Authorizes the account once; the token is reused for every later call.
    pub async fn authorize(config: &B2Config) -> BackendResult<Self> {
        let http = reqwest::Client::new();
        let res = http
            .get(format!(
                "{}/{}/b2_authorize_account",
                config.api_url.trim_end_matches('/'),
                API_VERSION
            ))
            .basic_auth(&config.key_id, Some(&config.application_key))
            .send()
            .await?;
        let res = check_response(res, "b2_authorize_account").await?;
        let auth: AuthorizeAccountResponse = res.json().await?;
        debug!(account_id = %auth.account_id, api_url = %auth.api_url, "authorized");

        Ok(Self {
            session: Arc::new(Session {
                http,
                account_id: auth.account_id,
                token: auth.authorization_token,
                api_url: auth.api_url.trim_end_matches('/').to_string(),
                download_url: auth.download_url.trim_end_matches('/').to_string(),
            }),
        })
    }
}

#[async_trait]
impl ObjectClient for B2Client {
    async fn list_buckets(&self) -> BackendResult<Vec<Box<dyn ObjectBucket>>> {
        let res: ListBucketsResponse = self
            .session
            .call(
                "b2_list_buckets",
                &ListBucketsRequest {
                    account_id: &self.session.account_id,
                },
            )
            .await?;

        Ok(res
            .buckets
            .into_iter()
            .map(|bucket| {
                Box::new(B2Bucket {
                    session: self.session.clone(),
                    id: bucket.bucket_id,
                    name: bucket.bucket_name,
                }) as Box<dyn ObjectBucket>
            })
            .collect())
    }

    fn download_url(&self) -> &str {
        &self.session.download_url
    }
}

pub struct B2Bucket {
    session: Arc<Session>,
    id: String,
    name: String,
}

impl B2Bucket {
    async fn list_page(
        &self,
        prefix: &str,
        start_file_name: Option<&str>,
        max_file_count: u32,
    ) -> BackendResult<ListFileNamesResponse> {
        self.session
            .call(
                "b2_list_file_names",
                &ListFileNamesRequest {
                    bucket_id: &self.id,
                    prefix,
                    start_file_name,
                    max_file_count,
                },
            )
            .await
    }

    async fn find(&self, key: &str) -> BackendResult<Option<FileObject>> {
        let page = self.list_page(key, Some(key), 1).await?;

        Ok(page
            .files
            .into_iter()
            .find(|file| file.file_name == key && file.is_upload())
            .map(FileObject::from))
    }
}

#[async_trait]
impl ObjectBucket for B2Bucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload_file(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> BackendResult<FileObject> {
        debug!(bucket = %self.name, key, size = body.len(), "upload_file");
        let target: GetUploadUrlResponse = self
            .session
            .call("b2_get_upload_url", &GetUploadUrlRequest { bucket_id: &self.id })
            .await?;

        let checksum = format!("{:x}", Sha1::digest(&body));
        let res = self
            .session
            .http
            .post(&target.upload_url)
            .header("Authorization", &target.authorization_token)
            .header("X-Bz-File-Name", encode_file_name(key))
            .header(CONTENT_TYPE, content_type.unwrap_or(AUTO_CONTENT_TYPE))
            .header("X-Bz-Content-Sha1", checksum)
            .body(body)
            .send()
            .await?;
        let res = check_response(res, "b2_upload_file").await?;
        let file: B2File = res.json().await?;

        Ok(file.into())
    }

    async fn get_file_by_name(&self, key: &str) -> BackendResult<FileObject> {
        debug!(bucket = %self.name, key, "get_file_by_name");
        self.find(key)
            .await?
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    async fn file_exists(&self, key: &str) -> BackendResult<bool> {
        debug!(bucket = %self.name, key, "file_exists");
        Ok(self.find(key).await?.is_some())
    }

    async fn list_file_names(&self, prefix: &str) -> BackendResult<Vec<FileObject>> {
        debug!(bucket = %self.name, prefix, "list_file_names");
        let mut files = Vec::new();
        let mut start_file_name: Option<String> = None;

        loop {
            let page = self
                .list_page(prefix, start_file_name.as_deref(), LIST_PAGE_SIZE)
                .await?;

            files.extend(
                page.files
                    .into_iter()
                    .filter(B2File::is_upload)
                    .map(FileObject::from),
            );

            start_file_name = page.next_file_name;
            if start_file_name.is_none() {
                break;
            }
        }

        Ok(files)
    }

    async fn delete_file(&self, file: &FileObject) -> BackendResult<()> {
        debug!(bucket = %self.name, key = %file.name, "delete_file");
        let file_id = file
            .id
            .as_deref()
            .ok_or_else(|| BackendError::NotFound(file.name.clone()))?;

        let _: serde_json::Value = self
            .session
            .call(
                "b2_delete_file_version",
                &DeleteFileVersionRequest {
                    file_name: &file.name,
                    file_id,
                },
            )
            .await?;

        Ok(())
    }

    async fn download(&self, file: &FileObject) -> BackendResult<Vec<u8>> {
        debug!(bucket = %self.name, key = %file.name, "download");
        let url = download_file_url(&self.session.download_url, &self.name, &file.name)?;
        let res = self
            .session
            .http
            .get(url)
            .header("Authorization", &self.session.token)
            .send()
            .await?;
        let res = check_response(res, "b2_download_file_by_name").await?;

        Ok(res.bytes().await?.to_vec())
    }

    async fn download_authorization(
        &self,
        file: &FileObject,
        valid_secs: u64,
        options: &TemporaryUrlOptions,
    ) -> BackendResult<String> {
        debug!(bucket = %self.name, key = %file.name, valid_secs, "download_authorization");
        let res: GetDownloadAuthorizationResponse = self
            .session
            .call(
                "b2_get_download_authorization",
                &GetDownloadAuthorizationRequest {
                    bucket_id: &self.id,
                    file_name_prefix: &file.name,
                    valid_duration_in_seconds: valid_secs,
                    content_disposition: options.content_disposition.as_deref(),
                },
            )
            .await?;

        Ok(res.authorization_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_file_url() {
        let url = download_file_url("https://f000.backblazeb2.com", "photos", "a b/c.txt").unwrap();
        assert_eq!(url.as_str(), "https://f000.backblazeb2.com/file/photos/a%20b/c.txt");
    }

    #[test]
    fn test_encode_file_name() {
        assert_eq!(encode_file_name("a/b c.txt"), "a%2Fb+c.txt");
    }

    #[test]
    fn test_listing_skips_non_uploads() {
        let page: ListFileNamesResponse = serde_json::from_value(serde_json::json!({
            "files": [
                {"fileId": "1", "fileName": "a", "contentType": "text/plain", "contentLength": 1, "uploadTimestamp": 1000, "action": "upload"},
                {"fileId": null, "fileName": "b/", "contentType": null, "contentLength": 0, "uploadTimestamp": 0, "action": "folder"}
            ],
            "nextFileName": null
        }))
        .unwrap();

        let uploads: Vec<B2File> = page.files.into_iter().filter(B2File::is_upload).collect();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].file_name, "a");
    }
}
