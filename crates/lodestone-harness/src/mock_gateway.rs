//! Scripted authentication gateway.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use lodestone_client::{AuthError, AuthGateway, Profile, Session};
use tokio::time::Instant;

/// A call the gateway received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    /// `acquire_session`
    AcquireSession {
        /// Account login
        username: String,
        /// Whether the credential was an access token
        is_token: bool,
    },
    /// `validate_session`
    ValidateSession {
        /// Token checked
        access_token: String,
    },
    /// `join_server`
    JoinServer {
        /// Profile joining
        profile_id: String,
        /// Server hash presented
        server_hash: String,
    },
}

/// Gateway that answers from a script instead of the network.
///
/// Accepting gateways issue `token-<username>` access tokens and a profile
/// named after the account. Every call is recorded with the time it
/// completed.
#[derive(Debug)]
pub struct MockGateway {
    rejection: Option<AuthError>,
    delay: Duration,
    calls: Mutex<Vec<(GatewayCall, Instant)>>,
}

impl MockGateway {
    /// Gateway that accepts every credential.
    pub fn accepting() -> Self {
        Self { rejection: None, delay: Duration::ZERO, calls: Mutex::new(Vec::new()) }
    }

    /// Gateway that fails every call with `error`.
    pub fn rejecting(error: AuthError) -> Self {
        Self { rejection: Some(error), ..Self::accepting() }
    }

    /// Take `delay` to answer each call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock_calls().iter().map(|(call, _)| call.clone()).collect()
    }

    /// When the most recent call completed.
    pub fn last_answered_at(&self) -> Option<Instant> {
        self.lock_calls().last().map(|(_, at)| *at)
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<(GatewayCall, Instant)>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn answer(&self, call: GatewayCall) -> Result<(), AuthError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.lock_calls().push((call, Instant::now()));

        match &self.rejection {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AuthGateway for MockGateway {
    async fn acquire_session(
        &self,
        username: &str,
        _credential: &str,
        client_token: &str,
        is_token: bool,
    ) -> Result<Session, AuthError> {
        self.answer(GatewayCall::AcquireSession { username: username.to_string(), is_token })
            .await?;

        Ok(Session {
            username: username.to_string(),
            access_token: format!("token-{username}"),
            client_token: client_token.to_string(),
            selected_profile: Some(Profile {
                id: format!("profile-{username}"),
                name: username.to_string(),
            }),
        })
    }

    async fn validate_session(&self, access_token: &str) -> Result<(), AuthError> {
        self.answer(GatewayCall::ValidateSession { access_token: access_token.to_string() }).await
    }

    async fn join_server(
        &self,
        _access_token: &str,
        profile_id: &str,
        server_hash: &str,
    ) -> Result<(), AuthError> {
        self.answer(GatewayCall::JoinServer {
            profile_id: profile_id.to_string(),
            server_hash: server_hash.to_string(),
        })
        .await
    }
}
