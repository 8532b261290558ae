use crate::models::UserId;
use std::{collections::HashMap, env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
}

/// Where meme, reaction and template rows live.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreConfig {
    DynamoDb {
        memes_table: String,
        reactions_table: String,
        templates_table: String,
    },
    Memory,
}

/// Where uploaded images go.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaConfig {
    Cloudinary {
        cloud_name: String,
        upload_preset: String,
    },
    S3 {
        bucket_name: String,
        public_base_url: String,
    },
}

/// Who vouches for access tokens.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthConfig {
    Http { base_url: String, api_key: String },
    Static { tokens: HashMap<String, UserId> },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    pub store: StoreConfig,
    pub media: MediaConfig,
    pub auth: AuthConfig,
    /// Caption font; the generator is disabled without it.
    pub font_path: Option<PathBuf>,
    pub preview_ttl: Duration,
}

/// Reads variables through a lookup function so tests need not touch the process env.
struct Vars<F: Fn(&str) -> Option<String>>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingVar(key.into()))
    }
}

/// Parses `tok1=alice,tok2=bob`.
fn parse_dev_sessions(raw: &str) -> Result<HashMap<String, UserId>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .filter(|(token, user)| !token.is_empty() && !user.is_empty())
                .map(|(token, user)| (token.to_string(), UserId::new(user)))
                .ok_or_else(|| ConfigError::InvalidVar("DEV_SESSIONS".into(), format!("expected token=user, got '{}'", pair)))
        })
        .collect()
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(lookup);

        let bind_address_str = vars.or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let aws_region = vars.or("AWS_DEFAULT_REGION", "ca-central-1");
        let localstack_endpoint = vars.get("AWS_ENDPOINT_URL");

        let store = match vars.or("MEMEBOARD_STORE", "dynamodb").as_str() {
            "dynamodb" => StoreConfig::DynamoDb {
                memes_table: vars.or("MEMES_TABLE", "memes"),
                reactions_table: vars.or("REACTIONS_TABLE", "reactions"),
                templates_table: vars.or("TEMPLATES_TABLE", "templates"),
            },
            "memory" => StoreConfig::Memory,
            other => {
                return Err(ConfigError::InvalidVar(
                    "MEMEBOARD_STORE".into(),
                    format!("expected 'dynamodb' or 'memory', got '{}'", other),
                ))
            }
        };

        let media = match vars.or("MEDIA_BACKEND", "cloudinary").as_str() {
            "cloudinary" => MediaConfig::Cloudinary {
                cloud_name: vars.required("CLOUDINARY_CLOUD_NAME")?,
                upload_preset: vars.required("CLOUDINARY_UPLOAD_PRESET")?,
            },
            "s3" => {
                let bucket_name = vars.required("MEME_BUCKET_NAME")?;
                let public_base_url = vars.get("MEDIA_PUBLIC_BASE_URL").unwrap_or_else(|| match &localstack_endpoint {
                    Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket_name),
                    None => format!("https://{}.s3.{}.amazonaws.com", bucket_name, aws_region),
                });
                MediaConfig::S3 {
                    bucket_name,
                    public_base_url,
                }
            }
            other => {
                return Err(ConfigError::InvalidVar(
                    "MEDIA_BACKEND".into(),
                    format!("expected 'cloudinary' or 's3', got '{}'", other),
                ))
            }
        };

        let auth = match vars.get("AUTH_URL") {
            Some(base_url) => AuthConfig::Http {
                base_url,
                api_key: vars.required("AUTH_API_KEY")?,
            },
            None => AuthConfig::Static {
                tokens: parse_dev_sessions(&vars.or("DEV_SESSIONS", ""))?,
            },
        };

        let preview_ttl_secs = vars
            .or("PREVIEW_TTL_SECS", "300")
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidVar("PREVIEW_TTL_SECS".into(), e.to_string()))?;

        Ok(Config {
            bind_address,
            aws_region,
            localstack_endpoint,
            store,
            media,
            auth,
            font_path: vars.get("MEMEBOARD_FONT_PATH").map(PathBuf::from),
            preview_ttl: Duration::from_secs(preview_ttl_secs),
        })
    }

    pub fn needs_aws(&self) -> bool {
        matches!(self.store, StoreConfig::DynamoDb { .. }) || matches!(self.media, MediaConfig::S3 { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_need_cloudinary_credentials() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(v) if v == "CLOUDINARY_CLOUD_NAME"));
    }

    #[test]
    fn cloudinary_with_dynamodb_defaults() {
        let config = load(&[("CLOUDINARY_CLOUD_NAME", "demo"), ("CLOUDINARY_UPLOAD_PRESET", "memes")]).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(
            config.store,
            StoreConfig::DynamoDb {
                memes_table: "memes".into(),
                reactions_table: "reactions".into(),
                templates_table: "templates".into(),
            }
        );
        assert_eq!(config.auth, AuthConfig::Static { tokens: HashMap::new() });
        assert_eq!(config.preview_ttl, Duration::from_secs(300));
        assert!(config.needs_aws());
    }

    #[test]
    fn s3_public_url_defaults_to_bucket_host() {
        let config = load(&[
            ("MEMEBOARD_STORE", "memory"),
            ("MEDIA_BACKEND", "s3"),
            ("MEME_BUCKET_NAME", "memes-bucket"),
            ("AWS_DEFAULT_REGION", "eu-west-1"),
        ])
        .unwrap();
        assert_eq!(
            config.media,
            MediaConfig::S3 {
                bucket_name: "memes-bucket".into(),
                public_base_url: "https://memes-bucket.s3.eu-west-1.amazonaws.com".into(),
            }
        );
    }

    #[test]
    fn dev_sessions_are_parsed() {
        let config = load(&[
            ("MEMEBOARD_STORE", "memory"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_UPLOAD_PRESET", "memes"),
            ("DEV_SESSIONS", "tok1=alice, tok2=bob"),
        ])
        .unwrap();
        let AuthConfig::Static { tokens } = config.auth else {
            panic!("expected static auth");
        };
        assert_eq!(tokens.get("tok2"), Some(&UserId::new("bob")));
        assert!(parse_dev_sessions("broken").is_err());
    }

    #[test]
    fn unknown_store_is_rejected() {
        let err = load(&[("MEMEBOARD_STORE", "sqlite")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar(v, _) if v == "MEMEBOARD_STORE"));
    }
}
