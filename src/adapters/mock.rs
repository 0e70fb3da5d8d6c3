use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    adapters::{BackendResult, ObjectBucket, ObjectClient},
    model::fs::{BackendError, FileObject, TemporaryUrlOptions},
};

pub const MOCK_DOWNLOAD_URL: &str = "https://f000.backblazeb2.com";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub key: String,
    pub valid_secs: u64,
    pub content_disposition: Option<String>,
}

#[derive(Default)]
struct MockBucketState {
    objects: BTreeMap<String, (FileObject, Vec<u8>)>,
    fail_next: Option<String>,
    last_authorization: Option<AuthorizationRequest>,
    next_id: u64,
}

#[derive(Default)]
struct MockState {
    buckets: BTreeMap<String, Arc<Mutex<MockBucketState>>>,
    fail_list_buckets: bool,
}

/// In-memory object store.
///
/// Cloning shares the underlying state, so a test can keep one handle for
/// inspection and hand another to the filesystem under test.
#[derive(Clone)]
pub struct MockClient {
    state: Arc<Mutex<MockState>>,
    clock: Clock,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            clock: Arc::new(|| (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64),
        }
    }

    /// Replaces the clock used for upload timestamps (milliseconds).
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_bucket(self, name: &str) -> Self {
        lock(&self.state)
            .buckets
            .entry(name.to_string())
            .or_default();
        self
    }

    pub fn fail_list_buckets(&self, fail: bool) {
        lock(&self.state).fail_list_buckets = fail;
    }

    /// Makes the next backend call on `bucket` fail with an api error.
    pub fn fail_next(&self, bucket: &str, message: &str) {
        if let Some(state) = self.bucket_state(bucket) {
            lock(&state).fail_next = Some(message.to_string());
        }
    }

    pub fn last_authorization(&self, bucket: &str) -> Option<AuthorizationRequest> {
        let state = self.bucket_state(bucket)?;
        let last = lock(&state).last_authorization.clone();
        last
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        match self.bucket_state(bucket) {
            Some(state) => {
                let count = lock(&state).objects.len();
                count
            }
            None => 0,
        }
    }

    fn bucket_state(&self, bucket: &str) -> Option<Arc<Mutex<MockBucketState>>> {
        lock(&self.state).buckets.get(bucket).cloned()
    }
}

#[async_trait]
impl ObjectClient for MockClient {
    async fn list_buckets(&self) -> BackendResult<Vec<Box<dyn ObjectBucket>>> {
        let state = lock(&self.state);
        if state.fail_list_buckets {
            return Err(api_error("list buckets failed"));
        }

        let buckets = state
            .buckets
            .iter()
            .map(|(name, bucket)| {
                Box::new(MockBucket {
                    name: name.clone(),
                    state: bucket.clone(),
                    clock: self.clock.clone(),
                }) as Box<dyn ObjectBucket>
            })
            .collect();

        Ok(buckets)
    }

    fn download_url(&self) -> &str {
        MOCK_DOWNLOAD_URL
    }
}

pub struct MockBucket {
    name: String,
    state: Arc<Mutex<MockBucketState>>,
    clock: Clock,
}

impl MockBucket {
    fn state(&self) -> BackendResult<MutexGuard<'_, MockBucketState>> {
        let mut state = lock(&self.state);
        if let Some(message) = state.fail_next.take() {
            return Err(api_error(&message));
        }
        Ok(state)
    }
}

#[async_trait]
impl ObjectBucket for MockBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload_file(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> BackendResult<FileObject> {
        let mut state = self.state()?;
        state.next_id += 1;

        let file = FileObject {
            id: Some(format!("mock_{}", state.next_id)),
            name: key.to_string(),
            content_type: Some(content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_string()),
            size: body.len() as u64,
            upload_timestamp: (self.clock)(),
        };
        state
            .objects
            .insert(key.to_string(), (file.clone(), body));

        Ok(file)
    }

    async fn get_file_by_name(&self, key: &str) -> BackendResult<FileObject> {
        self.state()?
            .objects
            .get(key)
            .map(|(file, _)| file.clone())
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    async fn file_exists(&self, key: &str) -> BackendResult<bool> {
        Ok(self.state()?.objects.contains_key(key))
    }

    async fn list_file_names(&self, prefix: &str) -> BackendResult<Vec<FileObject>> {
        Ok(self
            .state()?
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, (file, _))| file.clone())
            .collect())
    }

    async fn delete_file(&self, file: &FileObject) -> BackendResult<()> {
        self.state()?
            .objects
            .remove(&file.name)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(file.name.clone()))
    }

    async fn download(&self, file: &FileObject) -> BackendResult<Vec<u8>> {
        self.state()?
            .objects
            .get(&file.name)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| BackendError::NotFound(file.name.clone()))
    }

    async fn download_authorization(
        &self,
        file: &FileObject,
        valid_secs: u64,
        options: &TemporaryUrlOptions,
    ) -> BackendResult<String> {
        let mut state = self.state()?;
        state.last_authorization = Some(AuthorizationRequest {
            key: file.name.clone(),
            valid_secs,
            content_disposition: options.content_disposition.clone(),
        });

        Ok(format!("mock-token-{}-{}", self.name, valid_secs))
    }
}

fn api_error(message: &str) -> BackendError {
    BackendError::Api {
        status: 500,
        code: "internal_error".to_string(),
        message: message.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn bucket(client: &MockClient, name: &str) -> Box<dyn ObjectBucket> {
        client
            .list_buckets()
            .await
            .unwrap()
            .into_iter()
            .find(|b| b.name() == name)
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_is_prefix_scoped_and_sorted() {
        let client = MockClient::new().with_bucket("photos");
        let bucket = bucket(&client, "photos").await;

        for key in ["b/2.txt", "a/1.txt", "b/1.txt", "bb.txt"] {
            bucket.upload_file(key, vec![1], None).await.unwrap();
        }

        let names: Vec<String> = bucket
            .list_file_names("b/")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["b/1.txt", "b/2.txt"]);
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed_once() {
        let client = MockClient::new().with_bucket("photos");
        let bucket = bucket(&client, "photos").await;

        client.fail_next("photos", "boom");
        assert!(matches!(
            bucket.file_exists("x").await,
            Err(BackendError::Api { .. })
        ));
        assert!(!bucket.file_exists("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_clock_drives_upload_timestamp() {
        let client = MockClient::new().with_clock(|| 42_000).with_bucket("photos");
        let bucket = bucket(&client, "photos").await;

        let file = bucket.upload_file("k", vec![], Some("text/plain")).await.unwrap();
        assert_eq!(file.upload_timestamp, 42_000);
        assert_eq!(file.content_type.as_deref(), Some("text/plain"));
    }
}
