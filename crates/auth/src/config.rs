use chrono::Duration;

/// Signing and lifetime settings for issued credentials.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for HS256 access tokens.
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            ..Default::default()
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "development-secret-change-me-0123456789".to_string(),
            issuer: "sales-api".to_string(),
            audience: "sales-clients".to_string(),
            access_ttl: Duration::days(7),
            refresh_ttl: Duration::days(7),
        }
    }
}
