//! DMS login handshake

use super::RESULT_SUCCESS;
use super::transport::{DmsTransport, LoginInfo, LoginRequest};
use crate::config::DmsConfig;
use crate::error::AuthError;
use crate::types::SessionCredential;
use std::sync::Arc;

/// Authentication mode flag for a fresh (non-renewal) login
const AUTHENTICATE: i32 = 1;

/// Performs the login handshake and yields a [`SessionCredential`]
pub struct SessionManager {
    transport: Arc<dyn DmsTransport>,
    network: i32,
    login_context: String,
}

impl SessionManager {
    /// Create a session manager using the login record settings from `config`
    pub fn new(transport: Arc<dyn DmsTransport>, config: &DmsConfig) -> Self {
        Self {
            transport,
            network: config.network,
            login_context: config.login_context.clone(),
        }
    }

    /// Log in with a fresh session
    ///
    /// Succeeds only when the reply carries the success result code AND a
    /// non-empty token. No retry is attempted here; callers treat any
    /// [`AuthError`] as fatal for the run.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionCredential, AuthError> {
        let request = LoginRequest {
            login_info: vec![LoginInfo {
                network: self.network,
                login_context: self.login_context.clone(),
                username: username.to_string(),
                password: password.to_string(),
            }],
            auth_mode: AUTHENTICATE,
            incoming_token: String::new(),
        };

        let reply = match self.transport.login(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, username, "DMS login call failed");
                return Err(e.into());
            }
        };

        if reply.result_code != RESULT_SUCCESS {
            tracing::error!(result_code = reply.result_code, username, "DMS login rejected");
            return Err(AuthError::Rejected {
                result_code: reply.result_code,
            });
        }

        match reply.outgoing_token.filter(|t| !t.is_empty()) {
            Some(token) => {
                tracing::info!(username, "DMS login successful");
                Ok(SessionCredential::new(token))
            }
            None => {
                tracing::error!(username, "DMS login returned success without a session token");
                Err(AuthError::EmptyToken)
            }
        }
    }
}
