use async_graphql::{ComplexObject, Context, InputObject, MaybeUndefined, Object, Result, SimpleObject, ID};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::{error, info, warn};
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};

use crate::article::Article;
use crate::comment::Comment;
use crate::config::Config;
use crate::db::{self, Pool};
use crate::like::Like;
use crate::types::{ApiError, ApiResult, Validate, ValidationError};
use crate::utils::{non_blank, ContextExt};

pub mod models;
pub mod utils;

pub use self::models::User;
use self::models::{subject_from_token, NewUser, UserChanges};
use self::utils::*;

const ALREADY_REGISTERED: &str = "Cet email ou nom d'utilisateur est déjà utilisé";
const ALREADY_TAKEN: &str = "Ce nom d'utilisateur ou email est déjà utilisé";
const BAD_CREDENTIALS: &str = "Email ou mot de passe incorrect";
const USER_NOT_FOUND: &str = "Utilisateur non trouvé";

/// The user a request acts for, `None` for anonymous requests.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<User>);

impl Viewer {
    /// A token that fails verification or names a deleted user makes the
    /// request anonymous instead of failing it.
    pub async fn resolve(pool: &Pool, config: &Config, header: Option<&str>) -> ApiResult<Viewer> {
        let token = match bearer_token(header) {
            Some(token) => token,
            None => return Ok(Viewer(None)),
        };
        let user_id = match subject_from_token(token, config) {
            Some(user_id) => user_id,
            None => {
                warn!("ignoring invalid or expired authorization token");
                return Ok(Viewer(None));
            }
        };

        let user = db::run(pool, move |c| Ok(User::find(user_id, c)?)).await?;
        if user.is_none() {
            warn!("authorization token names unknown user {}", user_id);
        }
        Ok(Viewer(user))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Viewer {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let header = request.headers().get_one("Authorization");
        if bearer_token(header).is_none() {
            return Outcome::Success(Viewer(None));
        }

        let rocket = request.rocket();
        let (pool, config) = match (rocket.state::<Pool>(), rocket.state::<Config>()) {
            (Some(pool), Some(config)) => (pool, config),
            _ => return Outcome::Error((Status::InternalServerError, ApiError::Internal)),
        };

        match Viewer::resolve(pool, config, header).await {
            Ok(viewer) => Outcome::Success(viewer),
            Err(e) => {
                error!("failed to resolve the current user: {:?}", e);
                Outcome::Error((Status::ServiceUnavailable, e))
            }
        }
    }
}

fn on_unique_violation(message: &'static str) -> impl FnOnce(DieselError) -> ApiError {
    move |err| match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            ApiError::Conflict(message)
        }
        other => other.into(),
    }
}

#[derive(SimpleObject)]
pub struct AuthPayload {
    pub token: String,
    pub user: User,
}

#[ComplexObject]
impl User {
    async fn id(&self) -> ID {
        ID::from(self.id.to_string())
    }

    /// Newest first.
    async fn articles(&self, ctx: &Context<'_>) -> Result<Vec<Article>> {
        let author_id = self.id;
        Ok(db::run(ctx.pool(), move |c| Ok(Article::by_author(author_id, c)?)).await?)
    }

    async fn articles_count(&self, ctx: &Context<'_>) -> Result<i64> {
        let author_id = self.id;
        Ok(db::run(ctx.pool(), move |c| Ok(Article::count_by_author(author_id, c)?)).await?)
    }

    /// Newest first.
    async fn comments(&self, ctx: &Context<'_>) -> Result<Vec<Comment>> {
        let author_id = self.id;
        Ok(db::run(ctx.pool(), move |c| Ok(Comment::by_author(author_id, c)?)).await?)
    }

    async fn likes(&self, ctx: &Context<'_>) -> Result<Vec<Like>> {
        let user_id = self.id;
        Ok(db::run(ctx.pool(), move |c| Ok(Like::by_user(user_id, c)?)).await?)
    }
}

#[derive(Debug, InputObject)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub avatar: Option<String>,
}

impl Validate for RegisterInput {
    fn validate(self) -> std::result::Result<Self, ValidationError> {
        let mut errors = ValidationError::default();
        let input = RegisterInput {
            username: self.username.trim().to_string(),
            email: normalize_email(&self.email),
            ..self
        };

        for check in [
            validate_email_re(&input.email),
            validate_username_re(&input.username),
            validate_password(&input.password),
        ] {
            if let Err(e) = check {
                errors.merge(e);
            }
        }

        errors.into_result().map(|_| input)
    }
}

#[derive(Debug, InputObject)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, InputObject)]
pub struct UpdateProfileInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar: MaybeUndefined<String>,
    pub bio: MaybeUndefined<String>,
    pub current_password: String,
    pub new_password: Option<String>,
}

impl Validate for UpdateProfileInput {
    fn validate(self) -> std::result::Result<Self, ValidationError> {
        let mut errors = ValidationError::default();
        let input = UpdateProfileInput {
            username: non_blank(self.username).map(|name| name.trim().to_string()),
            email: non_blank(self.email).map(|mail| normalize_email(&mail)),
            new_password: non_blank(self.new_password),
            ..self
        };

        if let Some(Err(e)) = input.username.as_deref().map(validate_username_re) {
            errors.merge(e);
        }
        if let Some(Err(e)) = input.email.as_deref().map(validate_email_re) {
            errors.merge(e);
        }
        if let Some(Err(e)) = input.new_password.as_deref().map(validate_password) {
            errors.merge(e);
        }

        errors.into_result().map(|_| input)
    }
}

fn double_option(value: MaybeUndefined<String>) -> Option<Option<String>> {
    match value {
        MaybeUndefined::Undefined => None,
        MaybeUndefined::Null => Some(None),
        MaybeUndefined::Value(value) => Some(non_blank(Some(value))),
    }
}

#[derive(Default)]
pub struct UserQuery;

#[Object]
impl UserQuery {
    /// The authenticated user.
    async fn me(&self, ctx: &Context<'_>) -> Result<User> {
        Ok(ctx.require_viewer("Non authentifié")?.clone())
    }

    /// Looks a user up by id or by username; either one matching is enough.
    async fn user(
        &self,
        ctx: &Context<'_>,
        id: Option<ID>,
        username: Option<String>,
    ) -> Result<User> {
        if id.is_none() && username.is_none() {
            return Err(ApiError::BadInput(
                "Vous devez fournir soit un ID soit un nom d'utilisateur",
            )
            .into());
        }

        let user_id = id.and_then(|id| id.parse::<i32>().ok());
        let user = db::run(ctx.pool(), move |c| {
            User::find_by_id_or_username(user_id, username.as_deref(), c)?
                .ok_or(ApiError::NotFound(USER_NOT_FOUND))
        })
        .await?;
        Ok(user)
    }

    async fn users(&self, ctx: &Context<'_>) -> Result<Vec<User>> {
        Ok(db::run(ctx.pool(), |c| Ok(User::all(c)?)).await?)
    }
}

#[derive(Default)]
pub struct UserMutation;

#[Object]
impl UserMutation {
    async fn register(&self, ctx: &Context<'_>, input: RegisterInput) -> Result<AuthPayload> {
        let input = input.validate().map_err(ApiError::from)?;

        let (name, mail) = (input.username.clone(), input.email.clone());
        let taken = db::run(ctx.pool(), move |c| {
            Ok(User::is_taken(Some(&name), Some(&mail), None, c)?)
        })
        .await?;
        if taken {
            return Err(ApiError::Conflict(ALREADY_REGISTERED).into());
        }

        let new_user = NewUser {
            password: User::hash_password(input.password).await?,
            avatar: non_blank(input.avatar),
            username: input.username,
            email: input.email,
        };
        let user = db::run(ctx.pool(), move |c| {
            new_user
                .insert(c)
                .map_err(on_unique_violation(ALREADY_REGISTERED))
        })
        .await?;

        info!("registered user {} ({})", user.username, user.id);
        let token = user.token(ctx.config())?;
        Ok(AuthPayload { token, user })
    }

    async fn login(&self, ctx: &Context<'_>, input: LoginInput) -> Result<AuthPayload> {
        let email = normalize_email(&input.email);

        let user = db::run(ctx.pool(), move |c| Ok(User::find_by_email(&email, c)?))
            .await?
            .ok_or(ApiError::BadInput(BAD_CREDENTIALS))?;
        if !user.password_matches(input.password).await? {
            return Err(ApiError::BadInput(BAD_CREDENTIALS).into());
        }

        let token = user.token(ctx.config())?;
        Ok(AuthPayload { token, user })
    }

    async fn update_profile(&self, ctx: &Context<'_>, input: UpdateProfileInput) -> Result<User> {
        let viewer = ctx
            .require_viewer("Vous devez être connecté pour mettre à jour votre profil")?
            .clone();
        let input = input.validate().map_err(ApiError::from)?;

        if !viewer.password_matches(input.current_password).await? {
            return Err(ApiError::BadInput("Mot de passe actuel incorrect").into());
        }
        let password = match input.new_password {
            Some(new_password) => Some(User::hash_password(new_password).await?),
            None => None,
        };
        let changes = UserChanges {
            username: input.username,
            email: input.email,
            password,
            avatar: double_option(input.avatar),
            bio: double_option(input.bio),
        };
        if changes.is_empty() {
            return Ok(viewer);
        }

        let user = db::run(ctx.pool(), move |c| {
            if User::is_taken(
                changes.username.as_deref(),
                changes.email.as_deref(),
                Some(viewer.id),
                c,
            )? {
                return Err(ApiError::Conflict(ALREADY_TAKEN));
            }
            changes
                .apply(viewer.id, c)
                .map_err(on_unique_violation(ALREADY_TAKEN))
        })
        .await?;

        Ok(user)
    }

    /// Deletes the viewer together with their articles, comments and likes.
    async fn delete_account(&self, ctx: &Context<'_>, password: String) -> Result<bool> {
        let viewer = ctx.require_viewer("Vous devez être connecté pour supprimer votre compte")?;
        if !viewer.password_matches(password).await? {
            return Err(ApiError::BadInput("Mot de passe incorrect").into());
        }

        let viewer_id = viewer.id;
        db::run(ctx.pool(), move |c| Ok(User::delete(viewer_id, c)?)).await?;

        info!("deleted user {}", viewer_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_input_collects_every_problem() {
        let input = RegisterInput {
            username: "ab".into(),
            email: "pas-un-email".into(),
            password: "1".into(),
            avatar: None,
        };
        let errors = input.validate().unwrap_err();
        assert_eq!(errors.fields(), vec!["email", "password", "username"]);
    }

    #[test]
    fn register_input_is_normalized() {
        let input = RegisterInput {
            username: "  Caps  ".into(),
            email: " Caps@Lolify.GG ".into(),
            password: "secret".into(),
            avatar: None,
        }
        .validate()
        .unwrap();
        assert_eq!(input.username, "Caps");
        assert_eq!(input.email, "caps@lolify.gg");
    }

    #[test]
    fn blank_profile_fields_are_ignored() {
        let input = UpdateProfileInput {
            username: Some("".into()),
            email: Some("   ".into()),
            avatar: MaybeUndefined::Undefined,
            bio: MaybeUndefined::Undefined,
            current_password: "secret".into(),
            new_password: Some("".into()),
        }
        .validate()
        .unwrap();
        assert!(input.username.is_none());
        assert!(input.email.is_none());
        assert!(input.new_password.is_none());
    }

    #[test]
    fn provided_profile_fields_are_validated() {
        let errors = UpdateProfileInput {
            username: Some("x".into()),
            email: None,
            avatar: MaybeUndefined::Undefined,
            bio: MaybeUndefined::Undefined,
            current_password: "secret".into(),
            new_password: Some("123".into()),
        }
        .validate()
        .unwrap_err();
        assert_eq!(errors.fields(), vec!["password", "username"]);
    }

    #[test]
    fn unique_index_violation_is_a_conflict() {
        let err = DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new(String::from("users_username_key")),
        );
        match on_unique_violation(ALREADY_TAKEN)(err) {
            ApiError::Conflict(msg) => assert_eq!(msg, ALREADY_TAKEN),
            other => panic!("unexpected {:?}", other),
        }

        match on_unique_violation(ALREADY_TAKEN)(DieselError::RollbackTransaction) {
            ApiError::Diesel(DieselError::RollbackTransaction) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn null_clears_and_undefined_keeps() {
        assert_eq!(double_option(MaybeUndefined::Undefined), None);
        assert_eq!(double_option(MaybeUndefined::Null), Some(None));
        assert_eq!(
            double_option(MaybeUndefined::Value("gg".into())),
            Some(Some("gg".into()))
        );
        assert_eq!(double_option(MaybeUndefined::Value(" ".into())), Some(None));
    }
}
