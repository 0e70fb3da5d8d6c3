use async_trait::async_trait;
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use tracing::debug;

use crate::{
    adapters::{BackendResult, ObjectBucket, ObjectClient},
    model::fs::{BackendError, FileObject, TemporaryUrlOptions},
};

/// Client for the S3-compatible endpoint of a bucket service.
///
/// The S3 API has no way to discover the public download host, so it is
/// supplied by the caller.
#[derive(Clone)]
pub struct S3Client {
    client: aws_sdk_s3::Client,
    download_url: String,
}

impl S3Client {
    pub fn new(client: aws_sdk_s3::Client, download_url: &str) -> Self {
        Self {
            client,
            download_url: download_url.trim_end_matches('/').to_string(),
        }
    }

    /// Loads credentials, region and endpoint from the standard AWS environment.
    pub async fn from_env(download_url: &str) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(aws_sdk_s3::Client::new(&config), download_url)
    }
}

fn sdk_error<E>(err: E, group: &'static str) -> BackendError
where
    E: std::error::Error + Send + Sync + 'static,
{
    debug!(error_message=%err, error_group=group);
    BackendError::Sdk(Box::new(err))
}

fn to_millis(time: Option<&DateTime>) -> i64 {
    time.map(|t| t.secs() * 1000 + i64::from(t.subsec_nanos() / 1_000_000))
        .unwrap_or(0)
}

#[async_trait]
impl ObjectClient for S3Client {
    async fn list_buckets(&self) -> BackendResult<Vec<Box<dyn ObjectBucket>>> {
        let lb = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|err| sdk_error(err, "list_buckets"))?;

        Ok(lb
            .buckets()
            .iter()
            .filter_map(|b| b.name())
            .map(|name| {
                Box::new(S3Bucket {
                    client: self.client.clone(),
                    name: name.to_string(),
                }) as Box<dyn ObjectBucket>
            })
            .collect())
    }

    fn download_url(&self) -> &str {
        &self.download_url
    }
}

pub struct S3Bucket {
    client: aws_sdk_s3::Client,
    name: String,
}

impl S3Bucket {
    async fn head(&self, key: &str) -> BackendResult<Option<FileObject>> {
        let req = self.client.head_object().bucket(&self.name).key(key);

        let ho = match req.send().await {
            Err(err) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_not_found() {
                        return Ok(None);
                    }
                }

                return Err(sdk_error(err, "head_object"));
            }
            Ok(ho) => ho,
        };

        Ok(Some(FileObject {
            id: ho.version_id().map(str::to_string),
            name: key.to_string(),
            content_type: ho.content_type().map(str::to_string),
            size: ho.content_length().unwrap_or(0).max(0) as u64,
            upload_timestamp: to_millis(ho.last_modified()),
        }))
    }
}

#[async_trait]
impl ObjectBucket for S3Bucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload_file(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> BackendResult<FileObject> {
        debug!(bucket = %self.name, key, size = body.len(), "put_object");
        self.client
            .put_object()
            .bucket(&self.name)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| sdk_error(err, "put_object"))?;

        self.head(key)
            .await?
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    async fn get_file_by_name(&self, key: &str) -> BackendResult<FileObject> {
        debug!(bucket = %self.name, key, "head_object");
        self.head(key)
            .await?
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    async fn file_exists(&self, key: &str) -> BackendResult<bool> {
        debug!(bucket = %self.name, key, "head_object");
        Ok(self.head(key).await?.is_some())
    }

    async fn list_file_names(&self, prefix: &str) -> BackendResult<Vec<FileObject>> {
        debug!(bucket = %self.name, prefix, "list_objects_v2");
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.name).prefix(prefix);

            if let Some(tok) = continuation_token {
                req = req.continuation_token(tok);
            }

            let lo = req
                .send()
                .await
                .map_err(|err| sdk_error(err, "list_objects_v2"))?;

            for o in lo.contents() {
                objects.push(FileObject {
                    id: None,
                    name: o.key().unwrap_or("").to_string(),
                    content_type: None,
                    size: o.size().unwrap_or(0).max(0) as u64,
                    upload_timestamp: to_millis(o.last_modified()),
                });
            }

            continuation_token = lo.next_continuation_token().map(|tok| tok.to_string());
            if continuation_token.is_none() {
                break;
            }
        }

        Ok(objects)
    }

    async fn delete_file(&self, file: &FileObject) -> BackendResult<()> {
        debug!(bucket = %self.name, key = %file.name, "delete_object");
        self.client
            .delete_object()
            .bucket(&self.name)
            .key(&file.name)
            .set_version_id(file.id.clone())
            .send()
            .await
            .map_err(|err| sdk_error(err, "delete_object"))?;

        Ok(())
    }

    async fn download(&self, file: &FileObject) -> BackendResult<Vec<u8>> {
        debug!(bucket = %self.name, key = %file.name, "get_object");
        let o = match self
            .client
            .get_object()
            .bucket(&self.name)
            .key(&file.name)
            .send()
            .await
        {
            Err(err) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_no_such_key() {
                        return Err(BackendError::NotFound(file.name.clone()));
                    }
                }

                return Err(sdk_error(err, "get_object"));
            }
            Ok(o) => o,
        };

        let bytes = o
            .body
            .collect()
            .await
            .map_err(|err| sdk_error(err, "collect_body"))?;

        Ok(bytes.into_bytes().to_vec())
    }

    async fn download_authorization(
        &self,
        _file: &FileObject,
        _valid_secs: u64,
        _options: &TemporaryUrlOptions,
    ) -> BackendResult<String> {
        Err(BackendError::Unsupported("download authorization"))
    }
}
