//! Source object store
//!
//! [`ObjectStore`] is the seam the pipeline reads pricing files through.
//! [`S3ObjectStore`] implements it on top of `aws-sdk-s3`.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{config::Credentials, error::DisplayErrorContext, Client};
use coin_common::{PricingError, Result};
use tracing::{debug, info, instrument};

pub mod config;

pub use config::StorageConfig;

/// One page of an object listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Present while more pages remain
    pub next_token: Option<String>,
}

/// Read access to the bucket holding pricing files
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the full body of one object
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Fetch one page of keys, continuing from `continuation_token`
    async fn list_page(&self, bucket: &str, continuation_token: Option<&str>) -> Result<ListPage>;
}

/// S3 (or S3-compatible) object store
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn new(config: StorageConfig) -> AnyResult<Self> {
        debug!("Initializing object store with config: {:?}", config);

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if let Some((access_key, secret_key)) = config.static_credentials() {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "coin-ingest",
            ));
        }

        let shared = loader.load().await;
        let mut s3_config_builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, endpoint = ?config.endpoint, "Object store client initialized");

        Ok(Self { client })
    }
}

fn unavailable(bucket: &str, key: &str, reason: impl std::fmt::Display) -> PricingError {
    PricingError::SourceUnavailable {
        bucket: bucket.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| unavailable(bucket, key, DisplayErrorContext(&e)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| unavailable(bucket, key, format!("failed to read body: {}", e)))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);

        Ok(data)
    }

    #[instrument(skip(self))]
    async fn list_page(&self, bucket: &str, continuation_token: Option<&str>) -> Result<ListPage> {
        let mut request = self.client.list_objects_v2().bucket(bucket);

        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| unavailable(bucket, "", DisplayErrorContext(&e)))?;

        let keys: Vec<String> = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_string))
            .collect();

        debug!("Listed {} keys from s3://{}", keys.len(), bucket);

        Ok(ListPage {
            keys,
            next_token: response.next_continuation_token().map(str::to_string),
        })
    }
}
