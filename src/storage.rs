use async_trait::async_trait;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{EvaluatorError, Result};

const DEFAULT_REGION: &str = "us-east-1";

/// S3 credentials and layout handed out by the server with each job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub bucket_name: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub path: String,
    pub path_by_value: String,
    #[serde(default)]
    pub region: Option<String>,
}

/// Remote storage of artefacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Prefix of value-addressed keys.
    fn path_by_value(&self) -> &str;

    /// Write a small object to verify the credentials.
    async fn check_connection(&self) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<()>;

    async fn put_object(&self, key: &str, file: &Path, content_type: &str) -> Result<()>;

    fn object_key_for(&self, sha256hex: &str) -> String {
        join_key(self.path_by_value(), &format!("sha256/{}", sha256hex))
    }

    fn public_url(&self, key: &str) -> String {
        format!("http://{}.s3.amazonaws.com/{}", self.bucket(), key)
    }
}

pub fn join_key(prefix: &str, rest: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", prefix, rest)
    }
}

pub struct S3Store {
    client: aws_sdk_s3::Client,
    config: AwsConfig,
}

impl S3Store {
    pub async fn new(config: AwsConfig) -> Self {
        let credentials = Credentials::new(
            config.aws_access_key_id.clone(),
            config.aws_secret_access_key.clone(),
            None,
            None,
            "challenges-server",
        );
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region))
            .credentials_provider(credentials)
            .load()
            .await;
        Self {
            client: aws_sdk_s3::Client::new(&sdk_config),
            config,
        }
    }
}

fn storage_err(e: impl std::fmt::Display) -> EvaluatorError {
    EvaluatorError::Storage(e.to_string())
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.config.bucket_name
    }

    fn path_by_value(&self) -> &str {
        &self.config.path_by_value
    }

    async fn check_connection(&self) -> Result<()> {
        debug!("trying bucket connection");
        let key = join_key(&self.config.path, "initial.txt");
        self.client
            .put_object()
            .bucket(&self.config.bucket_name)
            .key(key)
            .body(ByteStream::from_static(b"initial data"))
            .send()
            .await
            .map_err(storage_err)?;
        debug!("uploaded");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.config.bucket_name)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()) == Some(true) {
                    Ok(false)
                } else {
                    Err(storage_err(e))
                }
            }
        }
    }

    async fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<()> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(storage_err)?;
        let mut body = resp.body;
        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = body.try_next().await.map_err(storage_err)? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn put_object(&self, key: &str, file: &Path, content_type: &str) -> Result<()> {
        let body = ByteStream::from_path(file).await.map_err(storage_err)?;
        self.client
            .put_object()
            .bucket(&self.config.bucket_name)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("by-value/", "sha256/ab"), "by-value/sha256/ab");
        assert_eq!(join_key("", "initial.txt"), "initial.txt");
    }

    #[test]
    fn test_aws_config_from_server_json() {
        let cfg: AwsConfig = serde_json::from_value(serde_json::json!({
            "bucket_name": "dt-artefacts",
            "aws_access_key_id": "AKIA",
            "aws_secret_access_key": "secret",
            "path": "jobs",
            "path_by_value": "v",
        }))
        .unwrap();
        assert_eq!(cfg.bucket_name, "dt-artefacts");
        assert!(cfg.region.is_none());
    }
}
