//! Credential manager: API key and token issuance, hashing and validation.
//!
//! # Secrets
//!
//! - API keys look like `olk_<64 hex chars>`, tokens like `olt_<64 hex chars>`
//! - Only the SHA-256 hex digest is stored; the plaintext is returned once
//! - Stored and computed digests are compared in constant time
//!
//! # Lifecycle
//!
//! A key is usable while active and unexpired. A token is usable while
//! unrevoked, unexpired, and its parent key is usable; the parent is
//! re-checked on every token lookup, so revoking a key revokes its tokens.

use chrono::{DateTime, TimeDelta, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{AppError, AuthFailure};
use crate::models::{
    api_key::{ApiKey, IssueApiKeyRequest, NewApiKey},
    token::{NewToken, Token},
};
use crate::repositories::Repositories;
use crate::services::settings_service::{
    MAX_API_KEY_TTL_DAYS, MAX_TOKEN_TTL_MINUTES, SettingsService,
};

pub const API_KEY_PREFIX: &str = "olk_";
pub const TOKEN_PREFIX: &str = "olt_";

/// A secret presented by a caller, classified by its prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    Token(String),
}

impl Credential {
    pub fn parse(raw: &str) -> Credential {
        let raw = raw.trim();
        if raw.starts_with(TOKEN_PREFIX) {
            Credential::Token(raw.to_string())
        } else {
            Credential::ApiKey(raw.to_string())
        }
    }
}

/// Who a request was authenticated as.
#[derive(Debug, Clone)]
pub struct Principal {
    pub api_key: ApiKey,
    /// Set when the caller presented a token rather than the key itself
    pub token_id: Option<i64>,
}

/// SHA-256 hex digest of a secret.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// 32 random bytes, hex encoded, behind `prefix`.
fn generate_secret(prefix: &str) -> String {
    let bytes: [u8; 32] = rand::random();
    format!("{prefix}{}", hex::encode(bytes))
}

fn hashes_match(stored: &str, computed: &str) -> bool {
    stored.as_bytes().ct_eq(computed.as_bytes()).into()
}

/// `now + ttl`, rejected past `max` units or when the date would overflow.
fn expiry_after(
    field: &str,
    now: DateTime<Utc>,
    ttl: i64,
    max: i64,
    unit: fn(i64) -> Option<TimeDelta>,
) -> Result<DateTime<Utc>, AppError> {
    if ttl > max {
        return Err(AppError::validation(field, format!("must be at most {max}")));
    }
    unit(ttl)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| AppError::validation(field, "is out of range"))
}

fn check_key_usable(key: &ApiKey, now: DateTime<Utc>) -> Result<(), AppError> {
    if !key.is_active {
        return Err(AppError::Authentication(AuthFailure::Inactive));
    }
    if key.is_expired_at(now) {
        return Err(AppError::Authentication(AuthFailure::Expired));
    }
    Ok(())
}

/// Issue a new API key.
///
/// # Process
///
/// 1. Validate the name
/// 2. Generate a random secret and hash it
/// 3. Store the hash with the expiry (`ttl_days`, else the `api_key_expiry_days` setting; 0 = never)
/// 4. Return the plaintext together with the stored row; it cannot be recovered later
///
/// # Errors
///
/// - `Validation("name")`: name is empty
/// - `Validation("ttl_days")`: expiry beyond the supported range
/// - `Conflict`: hash collision (practically impossible)
pub async fn issue_api_key(
    repos: &Repositories,
    settings: &SettingsService,
    request: IssueApiKeyRequest,
) -> Result<(String, ApiKey), AppError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name", "must not be empty"));
    }
    if name.len() > 120 {
        return Err(AppError::validation("name", "must be at most 120 characters"));
    }

    let ttl_days = match request.ttl_days {
        Some(days) => i64::from(days),
        None => settings.get_int("api_key_expiry_days", 90).await.max(0),
    };
    let expires_at = if ttl_days > 0 {
        Some(expiry_after(
            "ttl_days",
            Utc::now(),
            ttl_days,
            MAX_API_KEY_TTL_DAYS,
            TimeDelta::try_days,
        )?)
    } else {
        None
    };

    let secret = generate_secret(API_KEY_PREFIX);
    let key = repos
        .api_keys
        .insert(NewApiKey {
            key_hash: hash_secret(&secret),
            name: name.to_string(),
            description: request.description,
            user_id: request.user_id,
            expires_at,
        })
        .await?;

    tracing::info!(api_key_id = key.id, name = %key.name, "API key issued");

    Ok((secret, key))
}

/// Authenticate a presented API key secret.
///
/// Updates `last_used_at` on success; a failure to do so is logged and ignored.
///
/// # Errors
///
/// - `Authentication(NotFound)`: no key with this hash
/// - `Authentication(Inactive)`: key was revoked
/// - `Authentication(Expired)`: key is past `expires_at`
pub async fn authenticate_api_key(repos: &Repositories, secret: &str) -> Result<ApiKey, AppError> {
    let key_hash = hash_secret(secret);

    let key = repos
        .api_keys
        .find_by_hash(&key_hash)
        .await?
        .filter(|key| hashes_match(&key.key_hash, &key_hash))
        .ok_or(AppError::Authentication(AuthFailure::NotFound))?;

    let now = Utc::now();
    check_key_usable(&key, now)?;

    if let Err(e) = repos.api_keys.touch_last_used(key.id, now).await {
        tracing::warn!(api_key_id = key.id, error = %e, "Failed to record API key use");
    }

    Ok(key)
}

/// Deactivate an API key. Revoking twice is not an error.
pub async fn revoke_api_key(repos: &Repositories, api_key_id: i64) -> Result<(), AppError> {
    if !repos.api_keys.set_active(api_key_id, false).await? {
        return Err(AppError::NotFound("API key".to_string()));
    }

    tracing::info!(api_key_id, "API key revoked");
    Ok(())
}

/// Hard-delete an API key together with its tokens and permissions.
pub async fn delete_api_key(repos: &Repositories, api_key_id: i64) -> Result<(), AppError> {
    if !repos.api_keys.delete(api_key_id).await? {
        return Err(AppError::NotFound("API key".to_string()));
    }

    tracing::info!(api_key_id, "API key deleted");
    Ok(())
}

pub async fn list_api_keys(repos: &Repositories) -> Result<Vec<ApiKey>, AppError> {
    repos.api_keys.list().await
}

/// Issue a short-lived bearer token under an API key.
///
/// The parent key must exist and be usable. `ttl_minutes` falls back to the
/// `token_ttl_minutes` setting.
pub async fn issue_token(
    repos: &Repositories,
    settings: &SettingsService,
    api_key_id: i64,
    ttl_minutes: Option<u32>,
) -> Result<(String, Token), AppError> {
    let key = repos
        .api_keys
        .find(api_key_id)
        .await?
        .ok_or_else(|| AppError::NotFound("API key".to_string()))?;

    let now = Utc::now();
    check_key_usable(&key, now)?;

    let ttl = match ttl_minutes {
        Some(minutes) => i64::from(minutes),
        None => settings.get_int("token_ttl_minutes", 60).await,
    };
    if ttl <= 0 {
        return Err(AppError::validation("ttl_minutes", "must be positive"));
    }
    let expires_at = expiry_after(
        "ttl_minutes",
        now,
        ttl,
        MAX_TOKEN_TTL_MINUTES,
        TimeDelta::try_minutes,
    )?;

    let secret = generate_secret(TOKEN_PREFIX);
    let token = repos
        .tokens
        .insert(NewToken {
            token_hash: hash_secret(&secret),
            api_key_id,
            token_type: "bearer".to_string(),
            issued_at: now,
            expires_at,
        })
        .await?;

    tracing::info!(api_key_id, token_id = token.id, "Token issued");

    Ok((secret, token))
}

/// Authenticate a presented token secret, re-checking its parent key.
///
/// # Errors
///
/// - `Authentication(NotFound)`: unknown token, or its key no longer exists
/// - `Authentication(Inactive)`: token revoked, or parent key revoked
/// - `Authentication(Expired)`: token or parent key expired
pub async fn authenticate_token(
    repos: &Repositories,
    secret: &str,
) -> Result<(Token, ApiKey), AppError> {
    let token_hash = hash_secret(secret);

    let token = repos
        .tokens
        .find_by_hash(&token_hash)
        .await?
        .filter(|token| hashes_match(&token.token_hash, &token_hash))
        .ok_or(AppError::Authentication(AuthFailure::NotFound))?;

    let now = Utc::now();
    if token.revoked_at.is_some() {
        return Err(AppError::Authentication(AuthFailure::Inactive));
    }
    if token.is_expired_at(now) {
        return Err(AppError::Authentication(AuthFailure::Expired));
    }

    let key = repos
        .api_keys
        .find(token.api_key_id)
        .await?
        .ok_or(AppError::Authentication(AuthFailure::NotFound))?;
    check_key_usable(&key, now)?;

    if let Err(e) = repos.api_keys.touch_last_used(key.id, now).await {
        tracing::warn!(api_key_id = key.id, error = %e, "Failed to record API key use");
    }

    Ok((token, key))
}

/// Revoke a token. The first revocation time is kept.
pub async fn revoke_token(repos: &Repositories, token_id: i64) -> Result<(), AppError> {
    if !repos.tokens.revoke(token_id, Utc::now()).await? {
        return Err(AppError::NotFound("Token".to_string()));
    }

    tracing::info!(token_id, "Token revoked");
    Ok(())
}

pub async fn list_tokens(repos: &Repositories, api_key_id: i64) -> Result<Vec<Token>, AppError> {
    if repos.api_keys.find(api_key_id).await?.is_none() {
        return Err(AppError::NotFound("API key".to_string()));
    }
    repos.tokens.list_for_key(api_key_id).await
}

/// Authenticate whichever kind of credential was presented.
pub async fn authenticate(repos: &Repositories, credential: &Credential) -> Result<Principal, AppError> {
    match credential {
        Credential::ApiKey(secret) => Ok(Principal {
            api_key: authenticate_api_key(repos, secret).await?,
            token_id: None,
        }),
        Credential::Token(secret) => {
            let (token, api_key) = authenticate_token(repos, secret).await?;
            Ok(Principal {
                api_key,
                token_id: Some(token.id),
            })
        }
    }
}
