use async_graphql::{ErrorExtensions, ID};
use diesel::r2d2::PoolError;
use log::{debug, error};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use std::collections::BTreeMap;

pub trait Validate
where
    Self: Sized,
{
    fn validate(self) -> Result<Self, ValidationError>;
}

#[derive(Debug)]
pub enum ApiError {
    Diesel(DieselError),
    Pool(PoolError),
    Validation(ValidationError),
    Unauthenticated(&'static str),
    Forbidden(&'static str),
    NotFound(&'static str),
    BadInput(&'static str),
    Conflict(&'static str),
    Internal,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<DieselError> for ApiError {
    fn from(err: DieselError) -> ApiError {
        ApiError::Diesel(err)
    }
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> ApiError {
        ApiError::Pool(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> ApiError {
        ApiError::Validation(err)
    }
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Diesel(DieselError::NotFound) => "NOT_FOUND",
            ApiError::Diesel(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                "CONFLICT"
            }
            ApiError::Diesel(_) | ApiError::Pool(_) | ApiError::Internal => "INTERNAL",
            ApiError::Validation(_) => "VALIDATION",
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadInput(_) => "BAD_USER_INPUT",
            ApiError::Conflict(_) => "CONFLICT",
        }
    }

    /// The message shown to the client. Internal details stay in the logs.
    pub fn message(&self) -> String {
        match self {
            ApiError::Diesel(DieselError::NotFound) => "Ressource non trouvée".to_string(),
            ApiError::Diesel(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                "Cette ressource existe déjà".to_string()
            }
            ApiError::Diesel(_) | ApiError::Pool(_) | ApiError::Internal => {
                "Erreur interne du serveur".to_string()
            }
            ApiError::Validation(errors) => errors.summary(),
            ApiError::Unauthenticated(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::BadInput(msg)
            | ApiError::Conflict(msg) => msg.to_string(),
        }
    }

    fn is_internal(&self) -> bool {
        self.code() == "INTERNAL"
    }
}

impl ErrorExtensions for ApiError {
    fn extend(&self) -> async_graphql::Error {
        if self.is_internal() {
            error!("internal error: {:?}", self);
        } else {
            debug!("request rejected: {:?}", self);
        }

        async_graphql::Error::new(self.message()).extend_with(|_, e| {
            e.set("code", self.code());
            if let ApiError::Validation(errors) = self {
                e.set("fields", errors.fields());
            }
        })
    }
}

impl From<ApiError> for async_graphql::Error {
    fn from(err: ApiError) -> Self {
        err.extend()
    }
}

/// Parses a GraphQL id into a row id. Anything that is not a row id cannot
/// name an existing row, so it reports `not_found`.
pub fn parse_id(id: &ID, not_found: &'static str) -> ApiResult<i32> {
    id.parse::<i32>().map_err(|_| ApiError::NotFound(not_found))
}

#[derive(Debug, Serialize, Default)]
pub struct ValidationError(BTreeMap<String, Vec<String>>);

impl ValidationError {
    pub fn add_error<K: Into<String>, V: Into<String>>(&mut self, key: K, val: V) {
        let entry = self.0.entry(key.into()).or_default();
        entry.push(val.into());
    }

    pub fn from<K: Into<String>, V: Into<String>>(key: K, val: V) -> Self {
        let mut error = ValidationError::default();
        error.add_error(key, val);
        error
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (key, errors) in other.0.into_iter() {
            let entry = self.0.entry(key).or_default();
            entry.extend(errors);
        }
    }

    pub fn empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fields(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn summary(&self) -> String {
        self.0
            .values()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}
