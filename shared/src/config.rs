use crate::error::{AppError, Result};

const DEFAULT_TABLE_NAME: &str = "unilearn";
const DEFAULT_YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Runtime configuration, read once at cold start
#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    pub cognito_user_pool_id: String,
    pub cognito_client_id: String,
    pub cognito_client_secret: String,
    pub media_bucket: String,
    /// Base for public object URLs. Defaults to the bucket's virtual-hosted S3 endpoint.
    pub media_public_base_url: String,
    pub youtube_api_key: String,
    pub youtube_api_base: String,
    /// Trust an `X-User-Id` header instead of JWT claims. Local development only.
    pub allow_user_id_header: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests don't touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::Config(format!("{} must be set", key)))
        };

        let media_bucket = required("MEDIA_BUCKET")?;
        let media_public_base_url = lookup("MEDIA_PUBLIC_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| format!("https://{}.s3.amazonaws.com", media_bucket));

        Ok(Self {
            table_name: lookup("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            cognito_user_pool_id: required("COGNITO_USER_POOL_ID")?,
            cognito_client_id: required("COGNITO_CLIENT_ID")?,
            cognito_client_secret: required("COGNITO_CLIENT_SECRET")?,
            media_bucket,
            media_public_base_url: media_public_base_url.trim_end_matches('/').to_string(),
            youtube_api_key: required("YOUTUBE_API_KEY")?,
            youtube_api_base: lookup("YOUTUBE_API_BASE")
                .unwrap_or_else(|| DEFAULT_YOUTUBE_API_BASE.to_string()),
            allow_user_id_header: lookup("ALLOW_USER_ID_HEADER")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }

    /// Config used by tests and local tooling; never reads the environment.
    pub fn for_tests() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            cognito_user_pool_id: "test-pool".to_string(),
            cognito_client_id: "test-client".to_string(),
            cognito_client_secret: "test-secret".to_string(),
            media_bucket: "unilearn-media".to_string(),
            media_public_base_url: "https://unilearn-media.s3.amazonaws.com".to_string(),
            youtube_api_key: "test-key".to_string(),
            youtube_api_base: DEFAULT_YOUTUBE_API_BASE.to_string(),
            allow_user_id_header: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn reads_required_values_and_defaults() {
        let vars = env(&[
            ("COGNITO_USER_POOL_ID", "pool"),
            ("COGNITO_CLIENT_ID", "cid"),
            ("COGNITO_CLIENT_SECRET", "secret"),
            ("MEDIA_BUCKET", "bucket"),
            ("YOUTUBE_API_KEY", "yt"),
        ]);
        let config = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.table_name, "unilearn");
        assert_eq!(config.media_public_base_url, "https://bucket.s3.amazonaws.com");
        assert_eq!(config.youtube_api_base, DEFAULT_YOUTUBE_API_BASE);
        assert!(!config.allow_user_id_header);
    }

    #[test]
    fn missing_required_value_is_a_config_error() {
        let vars = env(&[("COGNITO_CLIENT_ID", "cid")]);
        let err = Config::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn dev_header_flag_parses_truthy_values() {
        let vars = env(&[
            ("COGNITO_USER_POOL_ID", "pool"),
            ("COGNITO_CLIENT_ID", "cid"),
            ("COGNITO_CLIENT_SECRET", "secret"),
            ("MEDIA_BUCKET", "bucket"),
            ("YOUTUBE_API_KEY", "yt"),
            ("ALLOW_USER_ID_HEADER", "TRUE"),
            ("MEDIA_PUBLIC_BASE_URL", "https://cdn.example.edu/"),
        ]);
        let config = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert!(config.allow_user_id_header);
        assert_eq!(config.media_public_base_url, "https://cdn.example.edu");
    }
}
