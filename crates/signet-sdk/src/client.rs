//! HTTP clients that carry an acquired bearer token
//!
//! Every request sent through the returned client has an
//! `Authorization: Bearer {token}` header. The header is marked sensitive so
//! it is kept out of debug output.

use crate::auth::{AccountType, ClassifiedFailure, Scopes, Token, TokenAcquisitionEngine};
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use std::time::Duration;

/// Default timeout in seconds for requests made with an authorized client
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Token cannot be used as a header value: {0}")]
    InvalidToken(#[from] InvalidHeaderValue),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Auth(#[from] ClassifiedFailure),
}

/// Build a client that sends `token` on every request
pub fn authorized_client(token: &Token) -> Result<reqwest::Client, ClientError> {
    authorized_client_with_timeout(token, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

pub fn authorized_client_with_timeout(
    token: &Token,
    timeout: Duration,
) -> Result<reqwest::Client, ClientError> {
    let mut value = HeaderValue::from_str(&token.bearer())?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()?)
}

/// Acquire a token through the engine and wrap it in an authorized client
pub async fn acquire_authorized_client(
    engine: &TokenAcquisitionEngine,
    scopes: &Scopes,
    account_type: AccountType,
) -> Result<reqwest::Client, ClientError> {
    let token = engine.acquire_token(scopes, account_type).await?;
    authorized_client(&token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token(value: &str) -> Token {
        Token {
            access_token: value.to_string(),
            expires_on: Utc::now() + chrono::Duration::hours(1),
            username: None,
        }
    }

    #[tokio::test]
    async fn test_authorized_client_sends_bearer_header() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/me"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "displayName": "Ada Lovelace",
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = authorized_client(&token("test-token")).unwrap();
        let response = client
            .get(format!("{}/v1.0/me", mock_server.uri()))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["displayName"], "Ada Lovelace");
    }

    #[test]
    fn test_token_with_newline_is_rejected() {
        assert!(matches!(
            authorized_client(&token("bad\ntoken")),
            Err(ClientError::InvalidToken(_))
        ));
    }
}
