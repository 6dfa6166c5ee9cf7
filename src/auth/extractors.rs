use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use super::{claims::TokenKind, jwt::JwtKeys};
use crate::{error::AppError, users::model::Role};

/// The authenticated caller, as stated by a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
    pub email: String,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin access required".into()))
        }
    }
}

/// Extracts and validates the bearer access token.
pub struct AuthUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header".into()))?;

        let claims = keys.verify_kind(token, TokenKind::Access).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            AppError::Unauthorized("Invalid or expired token".into())
        })?;

        Ok(AuthUser(Principal {
            id: claims.sub,
            role: claims.role,
            email: claims.email,
        }))
    }
}

/// Like [`AuthUser`] but only lets admins through.
pub struct AdminUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(principal) = AuthUser::from_request_parts(parts, state).await?;
        principal.require_admin()?;
        Ok(AdminUser(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use crate::users::model::User;
    use axum::http::{header::AUTHORIZATION, Request, StatusCode};
    use time::OffsetDateTime;

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Meera".into(),
            email: "meera@example.com".into(),
            password_hash: String::new(),
            role,
            mobile: "9000000000".into(),
            city: "Chennai".into(),
            state: "TN".into(),
            zipcode: "600001".into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn parts_with(header: Option<String>) -> Parts {
        let mut req = Request::builder();
        if let Some(h) = header {
            req = req.header(AUTHORIZATION, h);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn access_token_yields_principal() {
        let (state, _) = AppState::fake();
        let u = user(Role::Student);
        let token = JwtKeys::from_ref(&state).sign_access(&u).unwrap();
        let mut parts = parts_with(Some(format!("Bearer {token}")));

        let AuthUser(p) = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(p.id, u.id);
        assert_eq!(p.role, Role::Student);
        assert!(!p.is_admin());
    }

    #[tokio::test]
    async fn missing_header_or_refresh_token_is_unauthorized() {
        let (state, _) = AppState::fake();
        let mut parts = parts_with(None);
        let err = AuthUser::from_request_parts(&mut parts, &state).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let refresh = JwtKeys::from_ref(&state).sign_refresh(&user(Role::Admin)).unwrap();
        let mut parts = parts_with(Some(format!("Bearer {refresh}")));
        let err = AuthUser::from_request_parts(&mut parts, &state).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_extractor_forbids_members() {
        let (state, _) = AppState::fake();
        let keys = JwtKeys::from_ref(&state);

        let token = keys.sign_access(&user(Role::Professor)).unwrap();
        let mut parts = parts_with(Some(format!("Bearer {token}")));
        let err = AdminUser::from_request_parts(&mut parts, &state).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let token = keys.sign_access(&user(Role::Admin)).unwrap();
        let mut parts = parts_with(Some(format!("Bearer {token}")));
        assert!(AdminUser::from_request_parts(&mut parts, &state).await.is_ok());
    }
}
