use crate::{
    aws_clients,
    cloudinary::CloudinaryMediaHost,
    config::{AuthConfig, Config, MediaConfig, StoreConfig},
    domain::{MediaHost, SessionProvider},
    errors::AppError,
    memory::MemoryStore,
    overlay::CaptionRenderer,
    repositories::{
        DynamoDbMemeRepository, DynamoDbReactionRepository, DynamoDbTemplateRepository, REACTION_HASH_KEY,
        REACTION_RANGE_KEY,
    },
    session::{HttpSessionProvider, StaticSessionProvider},
    storage::S3MediaHost,
    AppState, Backends,
};
use aws_sdk_dynamodb::{
    error::SdkError as DynamoSdkError,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
    Client as DynamoDbClient,
};
use aws_sdk_s3::{
    error::SdkError as S3SdkError,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client,
};
use std::{sync::Arc, time::Duration};

fn string_attribute(name: &str) -> Result<AttributeDefinition, AppError> {
    Ok(AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()?)
}

fn key_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement, AppError> {
    Ok(KeySchemaElement::builder().attribute_name(name).key_type(key_type).build()?)
}

/// Creates a DynamoDB table if it doesn't exist.
async fn ensure_table(
    client: &DynamoDbClient,
    table_name: &str,
    hash_key: &str,
    range_key: Option<&str>,
) -> Result<(), AppError> {
    let mut request = client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(string_attribute(hash_key)?)
        .key_schema(key_element(hash_key, KeyType::Hash)?)
        .billing_mode(BillingMode::PayPerRequest);

    if let Some(range_key) = range_key {
        request = request
            .attribute_definitions(string_attribute(range_key)?)
            .key_schema(key_element(range_key, KeyType::Range)?);
    }

    match request.send().await {
        Ok(_) => {
            tracing::info!("Startup: Table '{}' created successfully or setup initiated.", table_name);
            Ok(())
        }
        Err(DynamoSdkError::ServiceError(service_err)) if service_err.err().is_resource_in_use_exception() => {
            tracing::info!("Startup: Table '{}' already exists, no action needed.", table_name);
            Ok(())
        }
        Err(e) => {
            let context = format!("Startup: Error creating DynamoDB table '{}'", table_name);
            tracing::error!("{}: {}", context, e);
            Err(AppError::InitError(format!("{}: {}", context, e)))
        }
    }
}

/// Ensures the S3 bucket exists, creating it with the correct location constraint if needed.
async fn ensure_s3_bucket_exists(client: &S3Client, bucket_name: &str, region_str: &str) -> Result<(), AppError> {
    let mut create_bucket_req_builder = client.create_bucket().bucket(bucket_name);
    if region_str != "us-east-1" {
        create_bucket_req_builder = create_bucket_req_builder.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region_str))
                .build(),
        );
    }

    match create_bucket_req_builder.send().await {
        Ok(_) => {
            tracing::info!("Startup: S3 bucket '{}' created.", bucket_name);
            Ok(())
        }
        Err(sdk_err) => {
            if let S3SdkError::ServiceError(service_err) = &sdk_err {
                let code = service_err.err().meta().code();
                if code == Some("BucketAlreadyOwnedByYou") || code == Some("BucketAlreadyExists") {
                    tracing::info!("Startup: S3 bucket '{}' already exists.", bucket_name);
                    return Ok(());
                }
            }
            let context = format!("Startup: Error creating S3 bucket '{}'", bucket_name);
            tracing::error!("{}: {}", context, sdk_err);
            Err(AppError::InitError(format!("{}: {}", context, sdk_err)))
        }
    }
}

fn http_client() -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| AppError::InitError(format!("Failed to build HTTP client: {}", e)))
}

/// Wires backends from configuration, creating AWS resources on the way.
pub async fn build_state(config: &Config) -> Result<Arc<AppState>, AppError> {
    let http = http_client()?;
    let sdk_config = if config.needs_aws() {
        Some(aws_clients::load_sdk_config(config).await)
    } else {
        None
    };

    let sessions: Arc<dyn SessionProvider> = match &config.auth {
        AuthConfig::Http { base_url, api_key } => {
            tracing::info!(%base_url, "Startup: Using HTTP identity provider");
            Arc::new(HttpSessionProvider::new(http.clone(), base_url.clone(), api_key.clone()))
        }
        AuthConfig::Static { tokens } => {
            tracing::warn!(tokens = tokens.len(), "Startup: AUTH_URL not set, using static development sessions");
            Arc::new(StaticSessionProvider::new(tokens.clone()))
        }
    };

    let media: Arc<dyn MediaHost> = match &config.media {
        MediaConfig::Cloudinary { cloud_name, upload_preset } => {
            Arc::new(CloudinaryMediaHost::new(http.clone(), cloud_name, upload_preset.clone()))
        }
        MediaConfig::S3 { bucket_name, public_base_url } => {
            let sdk_config = sdk_config
                .as_ref()
                .ok_or_else(|| AppError::InitError("S3 media host requires AWS configuration".into()))?;
            let client = aws_clients::s3_client(sdk_config);
            ensure_s3_bucket_exists(&client, bucket_name, &config.aws_region).await?;
            Arc::new(S3MediaHost::new(client, bucket_name.clone(), public_base_url.clone()))
        }
    };

    let backends = match &config.store {
        StoreConfig::DynamoDb { memes_table, reactions_table, templates_table } => {
            let sdk_config = sdk_config
                .as_ref()
                .ok_or_else(|| AppError::InitError("DynamoDB store requires AWS configuration".into()))?;
            let client = aws_clients::dynamodb_client(sdk_config);

            tracing::info!("Startup: Initializing DynamoDB tables...");
            ensure_table(&client, memes_table, "meme_id", None).await?;
            ensure_table(&client, reactions_table, REACTION_HASH_KEY, Some(REACTION_RANGE_KEY)).await?;
            ensure_table(&client, templates_table, "template_id", None).await?;

            Backends {
                memes: Arc::new(DynamoDbMemeRepository::new(client.clone(), memes_table.clone(), reactions_table.clone())),
                reactions: Arc::new(DynamoDbReactionRepository::new(client.clone(), reactions_table.clone())),
                templates: Arc::new(DynamoDbTemplateRepository::new(client, templates_table.clone())),
                media,
                sessions,
            }
        }
        StoreConfig::Memory => {
            tracing::warn!("Startup: Using in-memory store, data is lost on restart");
            let store = Arc::new(MemoryStore::default());
            Backends {
                memes: store.clone(),
                reactions: store.clone(),
                templates: store,
                media,
                sessions,
            }
        }
    };

    let renderer = match &config.font_path {
        Some(path) => Some(
            CaptionRenderer::from_font_file(path, http)
                .map_err(|e| AppError::InitError(format!("Failed to load caption font: {}", e)))?,
        ),
        None => {
            tracing::warn!("Startup: MEMEBOARD_FONT_PATH not set, meme generator disabled");
            None
        }
    };

    tracing::info!("Startup: Backend initialization complete.");
    Ok(Arc::new(AppState::new(backends, renderer, config.preview_ttl)))
}
