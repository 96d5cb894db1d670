use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;

#[derive(Debug, Clone)]
pub struct OAuthCodeExchangeRequest {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorization_code: String,
}

#[derive(Debug, Clone)]
pub struct OAuthRefreshRequest {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

#[async_trait]
pub trait OAuthHttpClient: Send + Sync {
    async fn exchange_authorization_code(
        &self,
        request: OAuthCodeExchangeRequest,
    ) -> Result<OAuthTokenResponse, InfraError>;

    async fn refresh_access_token(
        &self,
        request: OAuthRefreshRequest,
    ) -> Result<OAuthTokenResponse, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestOAuthClient {
    client: Client,
}

#[derive(Debug, serde::Deserialize)]
struct GoogleTokenResponsePayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ReqwestOAuthClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn post_form(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<OAuthTokenResponse, InfraError> {
        let response = self
            .client
            .post(endpoint)
            .form(params)
            .send()
            .await
            .map_err(|error| InfraError::Transport(format!("token request failed: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Transport(format!("failed reading token response: {error}")))?;

        parse_token_response(status, &body)
    }
}

fn parse_token_response(
    status: reqwest::StatusCode,
    body: &str,
) -> Result<OAuthTokenResponse, InfraError> {
    if status.is_server_error() {
        return Err(InfraError::Transport(format!(
            "token endpoint unavailable: http {}",
            status.as_u16()
        )));
    }

    let parsed = serde_json::from_str::<GoogleTokenResponsePayload>(body).map_err(|error| {
        InfraError::OAuth(format!("invalid token response payload: {error}; body={body}"))
    })?;

    if !status.is_success() || parsed.error.is_some() {
        let code = parsed.error.unwrap_or_else(|| format!("http_{}", status.as_u16()));
        let detail = parsed.error_description.unwrap_or_else(|| body.to_string());
        return Err(InfraError::OAuth(format!("token endpoint error: {code}; {detail}")));
    }

    let access_token = parsed
        .access_token
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| InfraError::OAuth("token response did not include access_token".to_string()))?;
    Ok(OAuthTokenResponse {
        access_token,
        refresh_token: parsed.refresh_token.filter(|value| !value.trim().is_empty()),
        expires_in: parsed.expires_in.map(|value| value.max(0)),
        token_type: parsed.token_type,
        scope: parsed.scope,
    })
}

#[async_trait]
impl OAuthHttpClient for ReqwestOAuthClient {
    async fn exchange_authorization_code(
        &self,
        request: OAuthCodeExchangeRequest,
    ) -> Result<OAuthTokenResponse, InfraError> {
        self.post_form(
            &request.token_endpoint,
            &[
                ("grant_type", "authorization_code".to_string()),
                ("client_id", request.client_id),
                ("client_secret", request.client_secret),
                ("redirect_uri", request.redirect_uri),
                ("code", request.authorization_code),
            ],
        )
        .await
    }

    async fn refresh_access_token(
        &self,
        request: OAuthRefreshRequest,
    ) -> Result<OAuthTokenResponse, InfraError> {
        self.post_form(
            &request.token_endpoint,
            &[
                ("grant_type", "refresh_token".to_string()),
                ("client_id", request.client_id),
                ("client_secret", request.client_secret),
                ("refresh_token", request.refresh_token),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn successful_refresh_payload_is_parsed() {
        let parsed = parse_token_response(
            StatusCode::OK,
            r#"{"access_token":"ya29.new","expires_in":3599,"token_type":"Bearer","scope":"https://www.googleapis.com/auth/drive.file"}"#,
        )
        .expect("parse token response");
        assert_eq!(parsed.access_token, "ya29.new");
        assert_eq!(parsed.refresh_token, None);
        assert_eq!(parsed.expires_in, Some(3599));
    }

    #[test]
    fn invalid_grant_is_an_oauth_error() {
        let result = parse_token_response(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
        );
        match result {
            Err(InfraError::OAuth(message)) => {
                assert!(message.contains("invalid_grant"));
                assert!(message.contains("expired or revoked"));
            }
            other => panic!("expected oauth error, got {other:?}"),
        }
    }

    #[test]
    fn server_errors_are_transport_failures() {
        let result = parse_token_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert!(matches!(result, Err(InfraError::Transport(_))));
    }

    #[test]
    fn missing_access_token_is_rejected() {
        let result = parse_token_response(StatusCode::OK, r#"{"token_type":"Bearer"}"#);
        assert!(matches!(result, Err(InfraError::OAuth(_))));
    }
}
