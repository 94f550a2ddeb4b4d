use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::app::auth::AuthService;
use crate::app::users::UserService;
use crate::domain::user::Role;
use crate::http::AppError;
use crate::AppState;

/// The authenticated caller. The token only proves identity; username and
/// role are read from the database on every request, so a role change or
/// removed account takes effect before the token expires.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Owner-or-admin rule for threads and comments.
    pub fn can_modify(&self, author_id: Uuid) -> bool {
        self.id == author_id || self.is_admin()
    }
}

/// An authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::unauthorized("invalid Authorization header"))?;

        let service = AuthService::new(state.db.clone(), state.token_key, state.token_ttl_days);
        let claims = service
            .authenticate_token(token)
            .map_err(|err| {
                tracing::warn!(error = ?err, "rejected malformed token");
                AppError::unauthorized("invalid token")
            })?
            .ok_or_else(|| AppError::unauthorized("invalid token"))?;

        let user = UserService::new(state.db.clone())
            .get_user(claims.user_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, user_id = %claims.user_id, "failed to load token user");
                AppError::internal("failed to authenticate")
            })?
            .ok_or_else(|| AppError::unauthorized("invalid token"))?;

        Ok(AuthUser {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
        })
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::forbidden("admin access required"));
        }
        Ok(AdminUser(user))
    }
}
