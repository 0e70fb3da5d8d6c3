use crate::model::fs::FsError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    B2,
    S3,
}

pub fn parse_provider_from_uri(bucket_uri: &str) -> Result<Provider, FsError> {
    if bucket_uri.starts_with("b2://") {
        Ok(Provider::B2)
    } else if bucket_uri.starts_with("s3://") {
        Ok(Provider::S3)
    } else {
        Err(FsError::Config(format!(
            "failed to parse provider of: {}",
            bucket_uri
        )))
    }
}

pub fn parse_bucket_from_uri(bucket_uri: &str) -> &str {
    bucket_uri
        .split_once("://")
        .map(|(_, rest)| rest.trim_end_matches('/'))
        .unwrap_or("")
}
