//! Yggdrasil authentication over HTTP.
//!
//! [`Yggdrasil`] implements [`AuthGateway`] against the Mojang-style auth and
//! session servers. Every call is a single JSON `POST`; there are no retries.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, AuthGateway, Profile, Session};

/// Default authentication server.
pub const DEFAULT_AUTH_SERVER: &str = "https://authserver.mojang.com";

/// Default session server.
pub const DEFAULT_SESSION_SERVER: &str = "https://sessionserver.mojang.com";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Endpoints and limits for [`Yggdrasil`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct YggdrasilConfig {
    /// Base URL of the authentication server
    pub auth_server: String,
    /// Base URL of the session server
    pub session_server: String,
    /// Timeout applied to every request
    #[serde(with = "lodestone_core::duration_ms")]
    pub request_timeout: Duration,
}

impl Default for YggdrasilConfig {
    fn default() -> Self {
        Self {
            auth_server: DEFAULT_AUTH_SERVER.to_string(),
            session_server: DEFAULT_SESSION_SERVER.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Serialize)]
struct Agent {
    name: &'static str,
    version: u32,
}

const MINECRAFT_AGENT: Agent = Agent { name: "Minecraft", version: 1 };

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateRequest<'a> {
    agent: Agent,
    username: &'a str,
    password: &'a str,
    client_token: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    access_token: &'a str,
    client_token: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest<'a> {
    access_token: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest<'a> {
    access_token: &'a str,
    selected_profile: &'a str,
    server_id: &'a str,
}

/// Body of a successful authenticate or refresh call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_token: String,
    client_token: Option<String>,
    selected_profile: Option<Profile>,
}

/// Body of a failed call.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: Option<String>,
    error_message: Option<String>,
}

impl ErrorResponse {
    fn message(self, status: u16) -> String {
        self.error_message.or(self.error).unwrap_or_else(|| format!("status {status}"))
    }
}

impl SessionResponse {
    fn into_session(self, requested_username: &str, client_token: &str) -> Session {
        let username = self
            .selected_profile
            .as_ref()
            .map_or_else(|| requested_username.to_string(), |profile| profile.name.clone());

        Session {
            username,
            access_token: self.access_token,
            client_token: self.client_token.unwrap_or_else(|| client_token.to_string()),
            selected_profile: self.selected_profile,
        }
    }
}

/// HTTP gateway to the Yggdrasil auth and session servers.
#[derive(Debug, Clone)]
pub struct Yggdrasil {
    http: reqwest::Client,
    config: YggdrasilConfig,
}

impl Yggdrasil {
    /// Build a gateway with its own HTTP client.
    pub fn new(config: YggdrasilConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::Network(format!("failed to build http client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Active configuration.
    pub fn config(&self) -> &YggdrasilConfig {
        &self.config
    }

    fn auth_url(&self, path: &str) -> String {
        join_url(&self.config.auth_server, path)
    }

    fn session_url(&self, path: &str) -> String {
        join_url(&self.config.session_server, path)
    }

    /// POST `body` and fail on any non-success status.
    async fn post<B: Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, AuthError> {
        tracing::debug!(url, "yggdrasil request");

        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = rejection_message(code, &body);
        tracing::warn!(url, status = code, %message, "yggdrasil request rejected");

        Err(AuthError::Rejected { status: code, message })
    }

    async fn session_from(
        &self,
        response: reqwest::Response,
        username: &str,
        client_token: &str,
    ) -> Result<Session, AuthError> {
        let body: SessionResponse =
            response.json().await.map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        Ok(body.into_session(username, client_token))
    }
}

#[async_trait]
impl AuthGateway for Yggdrasil {
    async fn acquire_session(
        &self,
        username: &str,
        credential: &str,
        client_token: &str,
        is_token: bool,
    ) -> Result<Session, AuthError> {
        let response = if is_token {
            let request = RefreshRequest { access_token: credential, client_token };
            self.post(&self.auth_url("refresh"), &request).await?
        } else {
            let request = AuthenticateRequest {
                agent: MINECRAFT_AGENT,
                username,
                password: credential,
                client_token,
            };
            self.post(&self.auth_url("authenticate"), &request).await?
        };

        self.session_from(response, username, client_token).await
    }

    async fn validate_session(&self, access_token: &str) -> Result<(), AuthError> {
        let request = ValidateRequest { access_token };
        self.post(&self.auth_url("validate"), &request).await?;
        Ok(())
    }

    async fn join_server(
        &self,
        access_token: &str,
        profile_id: &str,
        server_hash: &str,
    ) -> Result<(), AuthError> {
        let request =
            JoinRequest { access_token, selected_profile: profile_id, server_id: server_hash };
        self.post(&self.session_url("session/minecraft/join"), &request).await?;
        Ok(())
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

fn rejection_message(status: u16, body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body).unwrap_or_default().message(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticate_body_uses_wire_names() {
        let request = AuthenticateRequest {
            agent: MINECRAFT_AGENT,
            username: "steve@example.com",
            password: "hunter2",
            client_token: "token",
        };
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "agent": { "name": "Minecraft", "version": 1 },
                "username": "steve@example.com",
                "password": "hunter2",
                "clientToken": "token",
            })
        );
    }

    #[test]
    fn join_body_uses_wire_names() {
        let request =
            JoinRequest { access_token: "access", selected_profile: "abc", server_id: "-7c9d" };
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["accessToken"], "access");
        assert_eq!(value["selectedProfile"], "abc");
        assert_eq!(value["serverId"], "-7c9d");
    }

    #[test]
    fn session_takes_case_corrected_name_from_profile() {
        let body = r#"{
            "accessToken": "access",
            "clientToken": "client",
            "selectedProfile": { "id": "069a79f4", "name": "Notch" }
        }"#;
        let response: SessionResponse = serde_json::from_str(body).unwrap();
        let session = response.into_session("notch", "ignored");

        assert_eq!(session.username, "Notch");
        assert_eq!(session.access_token, "access");
        assert_eq!(session.client_token, "client");
        assert_eq!(session.selected_profile.unwrap().id, "069a79f4");
    }

    #[test]
    fn session_without_profile_keeps_requested_name() {
        let response: SessionResponse =
            serde_json::from_str(r#"{ "accessToken": "access" }"#).unwrap();
        let session = response.into_session("steve", "client");

        assert_eq!(session.username, "steve");
        assert_eq!(session.client_token, "client");
        assert!(session.selected_profile.is_none());
    }

    #[test]
    fn rejection_prefers_error_message() {
        let body = r#"{"error":"ForbiddenOperationException","errorMessage":"Invalid token."}"#;
        assert_eq!(rejection_message(403, body), "Invalid token.");
        assert_eq!(rejection_message(403, r#"{"error":"Forbidden"}"#), "Forbidden");
        assert_eq!(rejection_message(502, "<html>bad gateway</html>"), "status 502");
    }

    #[test]
    fn urls_tolerate_trailing_slashes() {
        assert_eq!(join_url("https://auth.example/", "refresh"), "https://auth.example/refresh");
        assert_eq!(
            join_url("https://session.example", "session/minecraft/join"),
            "https://session.example/session/minecraft/join"
        );
    }

    #[test]
    fn config_loads_from_camel_case_with_defaults() {
        let json = r#"{"authServer": "http://localhost:8080", "requestTimeout": 500}"#;
        let config: YggdrasilConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.auth_server, "http://localhost:8080");
        assert_eq!(config.session_server, DEFAULT_SESSION_SERVER);
        assert_eq!(config.request_timeout, Duration::from_millis(500));
    }
}
