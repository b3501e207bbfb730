use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_graphql::SimpleObject;
use chrono::{DateTime, Duration, TimeZone, Utc};
use diesel::prelude::*;
use hmac::{Hmac, Mac};
use log::error;
use jwt::{Claims, Header, RegisteredClaims, SignWithKey, Token, VerifyWithKey};
use sha2::Sha256;

use crate::config::Config;
use crate::db::schema::users;
use crate::types::{ApiError, ApiResult};
use crate::utils::blocking;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, SimpleObject)]
#[diesel(table_name = users)]
#[graphql(complex)]
pub struct User {
    #[graphql(skip)]
    pub id: i32,
    pub username: String,
    pub email: String,
    /// argon2 PHC string
    #[graphql(skip)]
    pub password: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn make_password(password: &str) -> ApiResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!("failed to hash password: {}", e);
                ApiError::Internal
            })
    }

    pub fn verify_password(&self, password_to_verify: &str) -> bool {
        verify_hash(self.id, &self.password, password_to_verify)
    }

    /// `make_password` on the blocking pool, holding no database connection.
    pub async fn hash_password(password: String) -> ApiResult<String> {
        blocking(move || User::make_password(&password)).await
    }

    /// `verify_password` on the blocking pool, holding no database connection.
    pub async fn password_matches(&self, password: String) -> ApiResult<bool> {
        let user_id = self.id;
        let hash = self.password.clone();
        blocking(move || Ok(verify_hash(user_id, &hash, &password))).await
    }

    pub fn token(&self, config: &Config) -> ApiResult<String> {
        issue_token(config, self.id, Utc::now())
    }

    pub fn find(user_id: i32, connection: &mut PgConnection) -> QueryResult<Option<User>> {
        users::table
            .find(user_id)
            .select(User::as_select())
            .first(connection)
            .optional()
    }

    pub fn find_by_email(email: &str, connection: &mut PgConnection) -> QueryResult<Option<User>> {
        users::table
            .filter(users::email.eq(email))
            .select(User::as_select())
            .first(connection)
            .optional()
    }

    /// Matches a user having either the id or the username.
    pub fn find_by_id_or_username(
        user_id: Option<i32>,
        name: Option<&str>,
        connection: &mut PgConnection,
    ) -> QueryResult<Option<User>> {
        let query = users::table.select(User::as_select()).into_boxed();
        let query = match (user_id, name) {
            (Some(user_id), Some(name)) => {
                query.filter(users::id.eq(user_id).or(users::username.eq(name)))
            }
            (Some(user_id), None) => query.filter(users::id.eq(user_id)),
            (None, Some(name)) => query.filter(users::username.eq(name)),
            (None, None) => return Ok(None),
        };
        query.order(users::id.asc()).first(connection).optional()
    }

    pub fn all(connection: &mut PgConnection) -> QueryResult<Vec<User>> {
        users::table
            .select(User::as_select())
            .order((users::created_at.asc(), users::id.asc()))
            .load(connection)
    }

    /// Whether a user other than `except` already uses the username or the
    /// email.
    pub fn is_taken(
        name: Option<&str>,
        mail: Option<&str>,
        except: Option<i32>,
        connection: &mut PgConnection,
    ) -> QueryResult<bool> {
        let mut query = users::table.select(users::id).into_boxed();
        query = match (name, mail) {
            (Some(name), Some(mail)) => {
                query.filter(users::username.eq(name).or(users::email.eq(mail)))
            }
            (Some(name), None) => query.filter(users::username.eq(name)),
            (None, Some(mail)) => query.filter(users::email.eq(mail)),
            (None, None) => return Ok(false),
        };
        if let Some(except) = except {
            query = query.filter(users::id.ne(except));
        }
        Ok(query.first::<i32>(connection).optional()?.is_some())
    }

    pub fn delete(user_id: i32, connection: &mut PgConnection) -> QueryResult<usize> {
        diesel::delete(users::table.find(user_id)).execute(connection)
    }
}

fn verify_hash(user_id: i32, stored: &str, password_to_verify: &str) -> bool {
    let hash = match PasswordHash::new(stored) {
        Ok(hash) => hash,
        Err(e) => {
            error!("failed to parse password hash of user {}: {}", user_id, e);
            return false;
        }
    };
    Argon2::default()
        .verify_password(password_to_verify.as_bytes(), &hash)
        .is_ok()
}

pub fn issue_token(config: &Config, user_id: i32, issued_at: DateTime<Utc>) -> ApiResult<String> {
    let key = Hmac::<Sha256>::new_from_slice(config.jwt_secret.as_bytes()).map_err(|e| {
        error!("invalid jwt key: {}", e);
        ApiError::Internal
    })?;
    let expires_at = Duration::try_days(config.jwt_ttl_days)
        .and_then(|ttl| issued_at.checked_add_signed(ttl))
        .ok_or_else(|| {
            error!("token lifetime of {} days is out of range", config.jwt_ttl_days);
            ApiError::Internal
        })?;
    let claims = Claims::new(RegisteredClaims {
        issuer: Some(config.jwt_issuer.clone()),
        subject: Some(user_id.to_string()),
        issued_at: Some(issued_at.timestamp() as u64),
        expiration: Some(expires_at.timestamp() as u64),
        ..Default::default()
    });
    claims.sign_with_key(&key).map_err(|e| {
        error!("failed to sign jwt: {}", e);
        ApiError::Internal
    })
}

/// Returns the user id carried by a valid, unexpired token.
pub fn subject_from_token(jwt_token: &str, config: &Config) -> Option<i32> {
    let key = Hmac::<Sha256>::new_from_slice(config.jwt_secret.as_bytes()).ok()?;
    let token: Token<Header, Claims, _> = jwt_token.verify_with_key(&key).ok()?;
    let claims = &token.claims().registered;

    if claims.issuer.as_deref() != Some(config.jwt_issuer.as_str()) {
        return None;
    }

    let exp = Utc
        .timestamp_opt(claims.expiration? as i64, 0)
        .single()?;
    if exp <= Utc::now() {
        return None;
    }

    claims.subject.as_ref()?.parse::<i32>().ok()
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub avatar: Option<String>,
}

impl NewUser {
    pub fn insert(&self, connection: &mut PgConnection) -> QueryResult<User> {
        diesel::insert_into(users::table)
            .values(self)
            .returning(User::as_returning())
            .get_result(connection)
    }
}

/// `None` leaves a column untouched; `Some(None)` clears a nullable one.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<Option<String>>,
    pub bio: Option<Option<String>>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.password.is_none()
            && self.avatar.is_none()
            && self.bio.is_none()
    }

    pub fn apply(&self, user_id: i32, connection: &mut PgConnection) -> QueryResult<User> {
        diesel::update(users::table.find(user_id))
            .set(self)
            .returning(User::as_returning())
            .get_result(connection)
    }
}
