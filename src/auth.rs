//! Shared access-token check for the pull endpoints.
//!
//! BLOOMIN8 frames send a fixed token in the `X-Access-Token` header. The
//! server compares it with the configured `access_token`; an unconfigured
//! (empty) token rejects every request rather than allowing open access.
//!
//! ```rust,ignore
//! use bloomin8_pull::AccessToken;
//!
//! async fn pull(token: AccessToken) -> Result<Json<PullResponse>, (StatusCode, &'static str)> {
//!     token.validate(&config.access_token)?;
//!     // ...
//! }
//! ```

/// Header carrying the device token.
pub const ACCESS_TOKEN_HEADER: &str = "X-Access-Token";

/// Authentication error returned when token validation fails.
#[derive(Debug, Clone)]
pub struct AuthError {
    /// Error message
    pub message: &'static str,
}

impl AuthError {
    /// Create a new auth error.
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AuthError {}

/// Token presented by the device.
#[derive(Debug, Clone, Default)]
pub struct AccessToken {
    /// The `X-Access-Token` header value (if present)
    pub token: Option<String>,
}

impl AccessToken {
    /// Create an AccessToken with the given value.
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    /// Validate against the configured token.
    ///
    /// Fails when the server has no token configured, when the device sent
    /// none, or when they differ.
    pub fn validate(&self, expected: &str) -> Result<(), AuthError> {
        if expected.is_empty() {
            return Err(AuthError::new("Access token not configured"));
        }
        match &self.token {
            Some(token) if token == expected => Ok(()),
            Some(_) => Err(AuthError::new("Invalid token")),
            None => Err(AuthError::new("Missing token")),
        }
    }
}

#[cfg(feature = "axum")]
mod axum_impl {
    use super::*;
    use axum::extract::FromRequestParts;
    use axum::http::request::Parts;
    use axum::http::StatusCode;

    /// Axum extractor for AccessToken.
    ///
    /// Never rejects; validation happens in the handler so the response body
    /// can follow the pull protocol.
    impl<S> FromRequestParts<S> for AccessToken
    where
        S: Send + Sync,
    {
        type Rejection = (StatusCode, &'static str);

        async fn from_request_parts(
            parts: &mut Parts,
            _state: &S,
        ) -> Result<Self, Self::Rejection> {
            let token = parts
                .headers
                .get(ACCESS_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            Ok(AccessToken { token })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use axum::http::Request;

        #[tokio::test]
        async fn test_access_token_extractor() {
            let request = Request::builder()
                .header("X-Access-Token", "secret")
                .body(())
                .unwrap();
            let (mut parts, _body) = request.into_parts();
            let token = AccessToken::from_request_parts(&mut parts, &())
                .await
                .unwrap();
            assert_eq!(token.token.as_deref(), Some("secret"));
        }

        #[tokio::test]
        async fn test_access_token_extractor_missing() {
            let request = Request::builder().body(()).unwrap();
            let (mut parts, _body) = request.into_parts();
            let token = AccessToken::from_request_parts(&mut parts, &())
                .await
                .unwrap();
            assert!(token.token.is_none());
        }
    }
}
