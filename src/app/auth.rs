use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};
use sqlx::Row;
use uuid::Uuid;

use crate::app::users::{user_from_row, USER_COLUMNS};
use crate::domain::user::{normalize_email, Role, User, DEFAULT_AVATAR_URL};
use crate::infra::db::{is_unique_violation, Db};

const TOKEN_ISSUER: &str = "webboard";
pub const MIN_PASSWORD_LEN: usize = 6;

/// Identity carried inside a bearer token.
#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct LoginSession {
    pub token: String,
    pub user: User,
}

#[derive(Debug)]
pub enum RegisterOutcome {
    Created(User),
    UsernameTaken,
    EmailTaken,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PasswordChange {
    Changed,
    UserNotFound,
    WrongPassword,
}

#[derive(Clone)]
pub struct AuthService {
    db: Db,
    token_key: [u8; 32],
    token_ttl_days: u64,
}

impl AuthService {
    pub fn new(db: Db, token_key: [u8; 32], token_ttl_days: u64) -> Self {
        Self {
            db,
            token_key,
            token_ttl_days,
        }
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterOutcome> {
        let password_hash = hash_password(password)?;
        let result = sqlx::query(&format!(
            "INSERT INTO users (username, email, password_hash, role, avatar_url) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(username.trim())
        .bind(normalize_email(email))
        .bind(password_hash)
        .bind(Role::User.as_db())
        .bind(DEFAULT_AVATAR_URL)
        .fetch_one(self.db.pool())
        .await;

        match result {
            Ok(row) => Ok(RegisterOutcome::Created(user_from_row(&row)?)),
            Err(err) => {
                let err = anyhow::Error::from(err);
                if is_unique_violation(&err, "users_username_key") {
                    Ok(RegisterOutcome::UsernameTaken)
                } else if is_unique_violation(&err, "users_email_key") {
                    Ok(RegisterOutcome::EmailTaken)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// `None` covers both an unknown username and a wrong password.
    pub async fn login(&self, username: &str, password: &str) -> Result<Option<LoginSession>> {
        let row = sqlx::query(&format!(
            "SELECT {}, password_hash FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username.trim())
        .fetch_optional(self.db.pool())
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let password_hash: String = row.get("password_hash");
        if !verify_password(password, &password_hash)? {
            return Ok(None);
        }

        let user = user_from_row(&row)?;
        let token = self.issue_token(&user)?;
        Ok(Some(LoginSession { token, user }))
    }

    pub fn issue_token(&self, user: &User) -> Result<String> {
        let duration = std::time::Duration::from_secs(self.token_ttl_days * 24 * 60 * 60);
        let mut claims = Claims::new_expires_in(&duration)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_ISSUER)?;
        claims.subject(&user.id.to_string())?;
        claims.add_additional("email", user.email.as_str())?;
        claims.add_additional("role", user.role.as_db())?;
        claims.add_additional("typ", "access")?;

        let key = SymmetricKey::<V4>::from(&self.token_key)?;
        Ok(local::encrypt(&key, &claims, None, None)?)
    }

    /// Decodes a bearer token. Expired, tampered or foreign tokens yield `None`.
    pub fn authenticate_token(&self, token: &str) -> Result<Option<TokenClaims>> {
        let key = SymmetricKey::<V4>::from(&self.token_key)?;
        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(TOKEN_ISSUER);
        rules.validate_audience_with(TOKEN_ISSUER);

        let untrusted = match UntrustedToken::<Local, V4>::try_from(token) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        let trusted = match local::decrypt(&key, &untrusted, &rules, None, None) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        let Some(claims) = trusted.payload_claims() else {
            return Ok(None);
        };
        if claim_str(claims, "typ") != Some("access") {
            return Ok(None);
        }

        let user_id = claim_str(claims, "sub")
            .and_then(|value| Uuid::parse_str(value).ok())
            .ok_or_else(|| anyhow!("token is missing a valid sub claim"))?;
        let email = claim_str(claims, "email").unwrap_or_default().to_string();
        let role = claim_str(claims, "role")
            .and_then(Role::from_db)
            .ok_or_else(|| anyhow!("token is missing a valid role claim"))?;

        Ok(Some(TokenClaims {
            user_id,
            email,
            role,
        }))
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<PasswordChange> {
        let current: Option<String> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(self.db.pool())
                .await?;

        let Some(current) = current else {
            return Ok(PasswordChange::UserNotFound);
        };
        if !verify_password(old_password, &current)? {
            return Ok(PasswordChange::WrongPassword);
        }

        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(hash_password(new_password)?)
            .execute(self.db.pool())
            .await?;

        Ok(PasswordChange::Changed)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
            .bind(normalize_email(email))
            .fetch_optional(self.db.pool())
            .await?;

        row.map(|row| user_from_row(&row)).transpose()
    }

    /// Overwrites the password of the account registered under `email`.
    /// No proof of mailbox ownership is required.
    pub async fn reset_password(&self, email: &str, new_password: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "UPDATE users SET password_hash = $2 WHERE email = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(normalize_email(email))
        .bind(hash_password(new_password)?)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|row| user_from_row(&row)).transpose()
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {}", err))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| anyhow!("failed to parse password hash: {}", err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn claim_str<'a>(claims: &'a Claims, name: &str) -> Option<&'a str> {
    claims.get_claim(name).and_then(|value| value.as_str())
}
