use crate::config::Config;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;

/// Shared SDK configuration: region from `Config`, optional LocalStack endpoint,
/// credentials from the default provider chain.
pub async fn load_sdk_config(config: &Config) -> SdkConfig {
    tracing::info!(sdk_region = %config.aws_region, "Setting SDK region");
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.aws_region.clone()));

    match &config.localstack_endpoint {
        Some(endpoint_url) => {
            tracing::info!("Using localstack endpoint override: {}", endpoint_url);
            loader = loader.endpoint_url(endpoint_url);
        }
        None => tracing::info!("Using default AWS endpoints and credential resolution."),
    }

    loader.load().await
}

pub fn dynamodb_client(sdk_config: &SdkConfig) -> DynamoDbClient {
    DynamoDbClient::new(sdk_config)
}

/// Path-style addressing keeps LocalStack bucket URLs working.
pub fn s3_client(sdk_config: &SdkConfig) -> S3Client {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
        .force_path_style(true)
        .build();
    S3Client::from_conf(s3_config)
}
