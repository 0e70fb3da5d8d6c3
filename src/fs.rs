use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::{
    adapters::{ObjectBucket, ObjectClient},
    model::{
        error::Result,
        fs::{BackendError, FileMetadata, FsError, TemporaryUrlOptions, Visibility, WriteConfig},
    },
};

/// Filesystem-style operations over a flat namespace of keyed objects.
///
/// Paths are opaque keys. Directories exist only as key prefixes, plus the
/// empty marker objects written by [`Filesystem::create_dir`].
#[async_trait]
pub trait Filesystem: Send + Sync {
    async fn write(&self, path: &str, contents: Vec<u8>, config: &WriteConfig)
        -> Result<FileMetadata>;

    /// Buffers the whole stream, then behaves like [`Filesystem::write`].
    async fn write_stream(
        &self,
        path: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        config: &WriteConfig,
    ) -> Result<FileMetadata>;

    async fn update(
        &self,
        path: &str,
        contents: Vec<u8>,
        config: &WriteConfig,
    ) -> Result<FileMetadata>;

    async fn update_stream(
        &self,
        path: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        config: &WriteConfig,
    ) -> Result<FileMetadata>;

    async fn rename(&self, path: &str, newpath: &str) -> Result<()>;

    async fn copy(&self, path: &str, newpath: &str) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    async fn delete_dir(&self, dirname: &str) -> Result<()>;

    async fn create_dir(&self, dirname: &str, config: &WriteConfig) -> Result<FileMetadata>;

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<FileMetadata>;

    async fn has(&self, path: &str) -> Result<bool>;

    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    async fn read_stream(&self, path: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>>;

    async fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<FileMetadata>>;

    async fn get_metadata(&self, path: &str) -> Result<FileMetadata>;

    async fn get_size(&self, path: &str) -> Result<u64>;

    async fn get_mimetype(&self, path: &str) -> Result<Option<String>>;

    async fn get_timestamp(&self, path: &str) -> Result<i64>;

    async fn get_visibility(&self, path: &str) -> Result<Visibility>;
}

fn backend_error(context: &'static str, path: &str, err: BackendError) -> FsError {
    warn!(path, error_message=%err, error_group=context);
    FsError::sdk(context, path, err)
}

/// A [`Filesystem`] bound to one bucket of an [`ObjectClient`].
///
/// The client and the resolved bucket are fixed at construction; every
/// operation is a single call-through to the bucket.
pub struct ObjectFs {
    client: Arc<dyn ObjectClient>,
    bucket: Box<dyn ObjectBucket>,
}

impl ObjectFs {
    /// Resolves `bucket_name` from the client's bucket listing.
    pub async fn new(client: Arc<dyn ObjectClient>, bucket_name: &str) -> Result<Self> {
        let buckets = client.list_buckets().await.map_err(|err| {
            warn!(bucket = bucket_name, error_message=%err, error_group="list_buckets");
            FsError::Sdk {
                context: "error retrieving buckets",
                source: err,
            }
        })?;

        let bucket = buckets
            .into_iter()
            .find(|bucket| bucket.name() == bucket_name)
            .ok_or_else(|| FsError::BucketNotFound(bucket_name.to_string()))?;
        info!(bucket = bucket_name, "bucket loaded");

        Ok(Self { client, bucket })
    }

    pub fn bucket_name(&self) -> &str {
        self.bucket.name()
    }

    /// Public download URL of `path`; makes no request.
    pub fn get_url(&self, path: &str) -> String {
        format!(
            "{}/file/{}/{}",
            self.client.download_url(),
            self.bucket.name(),
            path
        )
    }

    /// Download URL carrying an authorization token that stays valid until
    /// `expiration`.
    pub async fn get_temporary_url(
        &self,
        path: &str,
        expiration: OffsetDateTime,
        options: &TemporaryUrlOptions,
    ) -> Result<String> {
        let seconds = expiration.unix_timestamp() - OffsetDateTime::now_utc().unix_timestamp();
        self.temporary_url_valid_for(path, seconds, options).await
    }

    pub async fn temporary_url_valid_for(
        &self,
        path: &str,
        seconds: i64,
        options: &TemporaryUrlOptions,
    ) -> Result<String> {
        let valid_secs = u64::try_from(seconds)
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(FsError::InvalidExpiration(seconds))?;
        debug!(path, valid_secs, "temporary url");

        let context = "error retrieving temporary url";
        let file = self
            .bucket
            .get_file_by_name(path)
            .await
            .map_err(|err| backend_error(context, path, err))?;
        let token = self
            .bucket
            .download_authorization(&file, valid_secs, options)
            .await
            .map_err(|err| backend_error(context, path, err))?;

        Ok(format!("{}?Authorization={}", self.get_url(path), token))
    }

    async fn read_all(
        path: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Vec<u8>> {
        let mut contents = Vec::new();
        reader
            .read_to_end(&mut contents)
            .await
            .map_err(|err| FsError::Upload {
                path: path.to_string(),
                source: BackendError::Io(err),
            })?;

        Ok(contents)
    }
}

#[async_trait]
impl Filesystem for ObjectFs {
    async fn write(
        &self,
        path: &str,
        contents: Vec<u8>,
        config: &WriteConfig,
    ) -> Result<FileMetadata> {
        debug!(path, size = contents.len(), "write");
        let file = self
            .bucket
            .upload_file(path, contents, config.content_type.as_deref())
            .await
            .map_err(|err| {
                warn!(path, error_message=%err, error_group="upload_file");
                FsError::Upload {
                    path: path.to_string(),
                    source: err,
                }
            })?;

        Ok(FileMetadata::from(&file))
    }

    async fn write_stream(
        &self,
        path: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        config: &WriteConfig,
    ) -> Result<FileMetadata> {
        let contents = Self::read_all(path, reader).await?;
        self.write(path, contents, config).await
    }

    async fn update(
        &self,
        _path: &str,
        _contents: Vec<u8>,
        _config: &WriteConfig,
    ) -> Result<FileMetadata> {
        Err(FsError::Unsupported("update"))
    }

    async fn update_stream(
        &self,
        path: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        config: &WriteConfig,
    ) -> Result<FileMetadata> {
        self.write_stream(path, reader, config).await
    }

    async fn rename(&self, _path: &str, _newpath: &str) -> Result<()> {
        Err(FsError::Unsupported("rename"))
    }

    async fn copy(&self, _path: &str, _newpath: &str) -> Result<()> {
        Err(FsError::Unsupported("copy"))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        debug!(path, "delete");
        let context = "error deleting file";
        let file = self
            .bucket
            .get_file_by_name(path)
            .await
            .map_err(|err| backend_error(context, path, err))?;

        self.bucket
            .delete_file(&file)
            .await
            .map_err(|err| backend_error(context, path, err))
    }

    async fn delete_dir(&self, dirname: &str) -> Result<()> {
        self.delete(dirname).await
    }

    async fn create_dir(&self, dirname: &str, config: &WriteConfig) -> Result<FileMetadata> {
        self.write(dirname, Vec::new(), config).await
    }

    async fn set_visibility(&self, _path: &str, _visibility: Visibility) -> Result<FileMetadata> {
        Err(FsError::Unsupported("set visibility"))
    }

    async fn has(&self, path: &str) -> Result<bool> {
        debug!(path, "has");
        self.bucket
            .file_exists(path)
            .await
            .map_err(|err| backend_error("error checking for file", path, err))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        debug!(path, "read");
        let context = "error retrieving file";
        let file = self
            .bucket
            .get_file_by_name(path)
            .await
            .map_err(|err| backend_error(context, path, err))?;

        self.bucket
            .download(&file)
            .await
            .map_err(|err| backend_error(context, path, err))
    }

    async fn read_stream(&self, _path: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
        Err(FsError::Unsupported("read stream"))
    }

    // Keys are flat, so a prefix listing already covers nested "directories".
    async fn list_contents(&self, directory: &str, _recursive: bool) -> Result<Vec<FileMetadata>> {
        debug!(directory, "list_contents");
        let files = self
            .bucket
            .list_file_names(directory)
            .await
            .map_err(|err| backend_error("error retrieving files", directory, err))?;

        Ok(files.iter().map(FileMetadata::from).collect())
    }

    async fn get_metadata(&self, path: &str) -> Result<FileMetadata> {
        debug!(path, "get_metadata");
        let file = self
            .bucket
            .get_file_by_name(path)
            .await
            .map_err(|err| backend_error("error retrieving meta data", path, err))?;

        Ok(FileMetadata::from(&file))
    }

    async fn get_size(&self, path: &str) -> Result<u64> {
        Ok(self.get_metadata(path).await?.size)
    }

    async fn get_mimetype(&self, path: &str) -> Result<Option<String>> {
        Ok(self.get_metadata(path).await?.mimetype)
    }

    async fn get_timestamp(&self, path: &str) -> Result<i64> {
        Ok(self.get_metadata(path).await?.timestamp)
    }

    async fn get_visibility(&self, _path: &str) -> Result<Visibility> {
        Err(FsError::Unsupported("get visibility"))
    }
}
