//! Authentication endpoints of the backend

use crate::pipeline::RequestPipeline;
use crate::transport::ApiRequest;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use vetdesk_auth::{Identity, Session, SessionStore};
use vetdesk_core::{ErrorContext, VetdeskError, VetdeskResult};

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const ME_PATH: &str = "/auth/me";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "accessToken", alias = "access_token")]
    access_token: String,
    #[serde(rename = "refreshToken", alias = "refresh_token", default)]
    refresh_token: Option<String>,
    user: Identity,
}

/// Login, logout and profile calls, keeping the session store in step
pub struct AuthApi {
    pipeline: Arc<RequestPipeline>,
}

impl AuthApi {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    fn store(&self) -> &Arc<SessionStore> {
        self.pipeline.store()
    }

    /// Exchange credentials for a session and store it
    pub async fn login(&self, email: &str, password: &str) -> VetdeskResult<Session> {
        let request = ApiRequest::post(
            LOGIN_PATH,
            serde_json::json!({ "email": email, "password": password }),
        )
        .without_auth();

        let response: LoginResponse = self.pipeline.execute(request).await?.json()?;
        let session = Session::new(response.access_token, response.refresh_token, response.user);

        if !session.is_authenticated() {
            return Err(VetdeskError::MalformedSession {
                message: "Login response did not contain a usable session".to_string(),
                context: ErrorContext::new("auth_api").with_operation("login"),
            });
        }

        self.store().set(session.clone())?;
        info!(user_id = ?session.user_id(), role = %session.role(), "Signed in");
        Ok(session)
    }

    /// Tell the backend (best effort) and tear the local session down
    pub async fn logout(&self) -> VetdeskResult<()> {
        if let Some(session) = self.store().get() {
            let request = ApiRequest::post(
                LOGOUT_PATH,
                serde_json::json!({ "refreshToken": session.refresh_token }),
            )
            .without_auth()
            .no_retry();

            if let Err(e) = self.pipeline.execute(request).await {
                warn!(error = %e, "Backend logout failed, clearing local session anyway");
            }
        }

        self.store().teardown()
    }

    /// Identity of the signed-in user as the backend sees it
    pub async fn me(&self) -> VetdeskResult<Identity> {
        self.pipeline.get_json(ME_PATH).await
    }

    /// Fetch the current identity and store it in the session
    pub async fn sync_profile(&self) -> VetdeskResult<Identity> {
        let identity = self.me().await?;
        self.store().update_identity(identity.clone())?;
        Ok(identity)
    }
}
