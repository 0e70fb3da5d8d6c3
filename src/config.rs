use clap::Args;

use crate::model::fs::FsError;

pub const DEFAULT_API_URL: &str = "https://api.backblazeb2.com";

/// Credentials and endpoints for a bucket service.
#[derive(Args, Clone, Debug)]
pub struct B2Config {
    /// Application key id
    #[arg(long, env = "B2_APPLICATION_KEY_ID", default_value = "", hide_env_values = true)]
    pub key_id: String,

    /// Application key
    #[arg(long, env = "B2_APPLICATION_KEY", default_value = "", hide_env_values = true)]
    pub application_key: String,

    /// Account authorization endpoint
    #[arg(long, env = "B2_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Public download host; required with s3:// buckets
    #[arg(long, env = "B2_DOWNLOAD_URL")]
    pub download_url: Option<String>,
}

impl B2Config {
    pub fn new(key_id: &str, application_key: &str) -> Self {
        Self {
            key_id: key_id.to_string(),
            application_key: application_key.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            download_url: None,
        }
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    /// Settings the native API needs before any request is made.
    pub fn validate(&self) -> Result<(), FsError> {
        if self.key_id.is_empty() {
            return Err(FsError::Config(
                "missing application key id (B2_APPLICATION_KEY_ID)".to_string(),
            ));
        }
        if self.application_key.is_empty() {
            return Err(FsError::Config(
                "missing application key (B2_APPLICATION_KEY)".to_string(),
            ));
        }
        if self.api_url.is_empty() {
            return Err(FsError::Config("empty api url".to_string()));
        }
        Ok(())
    }

    pub fn require_download_url(&self) -> Result<&str, FsError> {
        self.download_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                FsError::Config("s3:// buckets need a download url (B2_DOWNLOAD_URL)".to_string())
            })
    }
}
