use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::{
    claims::TokenKind,
    dto::{AuthResponse, PublicUser, SignupRequest},
    extractors::Principal,
    jwt::JwtKeys,
    password::{check_policy, hash_password, verify_password},
};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
    users::model::{NewUser, User},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_mobile(mobile: &str) -> bool {
    lazy_static! {
        static ref MOBILE_RE: Regex = Regex::new(r"^\+?[0-9][0-9 \-]{6,18}[0-9]$").unwrap();
    }
    MOBILE_RE.is_match(mobile)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn issue_tokens(state: &AppState, user: &User) -> AppResult<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    Ok(AuthResponse {
        access_token: keys.sign_access(user)?,
        refresh_token: keys.sign_refresh(user)?,
        user: PublicUser::from(user),
    })
}

fn validate_signup(req: &SignupRequest) -> AppResult<()> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".into()));
    }
    if !is_valid_email(&req.email) {
        return Err(AppError::Validation("Invalid email".into()));
    }
    check_policy(&req.password)?;
    if !is_valid_mobile(req.mobile.trim()) {
        return Err(AppError::Validation("Invalid mobile number".into()));
    }
    for (field, value) in [("city", &req.city), ("state", &req.state), ("zipcode", &req.zipcode)] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{field} is required")));
        }
    }
    Ok(())
}

pub async fn signup(state: &AppState, mut req: SignupRequest) -> AppResult<AuthResponse> {
    req.email = normalize_email(&req.email);
    validate_signup(&req)?;

    if state.store.find_user_by_email(&req.email).await?.is_some() {
        warn!(email = %req.email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user = state
        .store
        .create_user(NewUser {
            name: req.name.trim().to_string(),
            email: req.email,
            password_hash,
            role: req.role,
            mobile: req.mobile.trim().to_string(),
            city: req.city.trim().to_string(),
            state: req.state.trim().to_string(),
            zipcode: req.zipcode.trim().to_string(),
        })
        .await?
        .ok_or_else(|| AppError::Conflict("Email already registered".into()))?;

    state.notifier.send_welcome(&user.email, &user.name).await;

    info!(user_id = %user.id, email = %user.email, role = user.role.as_str(), "user registered");
    issue_tokens(state, &user)
}

pub async fn login(state: &AppState, email: &str, password: &str) -> AppResult<AuthResponse> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email".into()));
    }

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    issue_tokens(state, &user)
}

pub async fn refresh(state: &AppState, refresh_token: &str) -> AppResult<AuthResponse> {
    let claims = JwtKeys::from_ref(state)
        .verify_kind(refresh_token, TokenKind::Refresh)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;
    // Re-read so a changed role ends up in the new tokens.
    let user = state
        .store
        .find_user(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    issue_tokens(state, &user)
}

pub async fn current_user(state: &AppState, principal: &Principal) -> AppResult<User> {
    state
        .store
        .find_user(principal.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

pub async fn change_password(
    state: &AppState,
    principal: &Principal,
    old_password: &str,
    new_password: &str,
) -> AppResult<()> {
    let user = current_user(state, principal).await?;
    if !verify_password(old_password, &user.password_hash)? {
        return Err(AppError::Validation("Old password is incorrect".into()));
    }
    check_policy(new_password)?;
    state
        .store
        .set_password_hash(user.id, &hash_password(new_password)?)
        .await?;
    info!(user_id = %user.id, "password changed");
    Ok(())
}

pub async fn forgot_password(state: &AppState, email: &str) -> AppResult<()> {
    let email = normalize_email(email);
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let token = JwtKeys::from_ref(state).sign_reset(&user)?;
    state.notifier.send_password_reset(&user.email, &token).await;
    info!(user_id = %user.id, "password reset requested");
    Ok(())
}

pub async fn reset_password(state: &AppState, token: &str, new_password: &str) -> AppResult<()> {
    let claims = JwtKeys::from_ref(state)
        .verify_kind(token, TokenKind::Reset)
        .map_err(|_| AppError::Unauthorized("Invalid or expired reset link".into()))?;
    check_policy(new_password)?;
    let updated = state
        .store
        .set_password_hash(claims.sub, &hash_password(new_password)?)
        .await?;
    if !updated {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!(user_id = %claims.sub, "password reset");
    Ok(())
}
