//! Caller Identity
//!
//! Authentication happens at the gateway in front of this server, which
//! injects the verified user id as `x-user-id`. The user is upserted on
//! every authenticated request so profile changes propagate.

use assistant_core::{AssistantError, User};
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// The authenticated caller
#[derive(Clone, Debug)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let id = header(parts, USER_ID_HEADER).ok_or(AssistantError::Unauthorized)?;

        let mut user = User::new(id);
        if let Some(email) = header(parts, USER_EMAIL_HEADER) {
            user = user.with_email(email);
        }

        let user = state.accounts.upsert_user(user).await?;
        Ok(Self(user))
    }
}
