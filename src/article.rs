use async_graphql::{ComplexObject, Context, InputObject, Object, Result, SimpleObject, ID};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::info;

use crate::comment::Comment;
use crate::db::{self, schema::articles, schema::users};
use crate::like::Like;
use crate::types::{parse_id, ApiError, ApiResult, Validate, ValidationError};
use crate::users::User;
use crate::utils::{like_pattern, non_blank, ContextExt};

pub const ARTICLE_NOT_FOUND: &str = "Article non trouvé";
pub const DEFAULT_LIMIT: i32 = 10;
pub const MAX_LIMIT: i32 = 100;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, SimpleObject)]
#[diesel(table_name = articles)]
#[graphql(complex)]
pub struct Article {
    #[graphql(skip)]
    pub id: i32,
    #[graphql(skip)]
    pub author_id: i32,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing options for `articles`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ArticleFilter {
    pub offset: i64,
    pub limit: i64,
    pub search: Option<String>,
    pub author_id: Option<i32>,
    pub author_username: Option<String>,
}

impl ArticleFilter {
    pub fn new(offset: i32, limit: i32) -> Self {
        ArticleFilter {
            offset: i64::from(offset.max(0)),
            limit: i64::from(limit.clamp(1, MAX_LIMIT)),
            ..Default::default()
        }
    }
}

impl Article {
    pub fn find(article_id: i32, connection: &mut PgConnection) -> QueryResult<Option<Article>> {
        articles::table
            .find(article_id)
            .select(Article::as_select())
            .first(connection)
            .optional()
    }

    pub fn load(article_id: i32, connection: &mut PgConnection) -> ApiResult<Article> {
        Article::find(article_id, connection)?.ok_or(ApiError::NotFound(ARTICLE_NOT_FOUND))
    }

    pub fn by_author(author_id: i32, connection: &mut PgConnection) -> QueryResult<Vec<Article>> {
        articles::table
            .filter(articles::author_id.eq(author_id))
            .order((articles::created_at.desc(), articles::id.desc()))
            .select(Article::as_select())
            .load(connection)
    }

    pub fn count_by_author(author_id: i32, connection: &mut PgConnection) -> QueryResult<i64> {
        articles::table
            .filter(articles::author_id.eq(author_id))
            .count()
            .get_result(connection)
    }

    /// Newest first. An unknown author gives an empty page.
    pub fn list(filter: &ArticleFilter, connection: &mut PgConnection) -> QueryResult<Vec<Article>> {
        let mut query = articles::table.select(Article::as_select()).into_boxed();

        if let Some(name) = &filter.author_username {
            let author = users::table
                .filter(users::username.eq(name))
                .select(users::id)
                .first::<i32>(connection)
                .optional()?;
            match author {
                Some(author_id) => query = query.filter(articles::author_id.eq(author_id)),
                None => return Ok(Vec::new()),
            }
        }

        if let Some(author_id) = filter.author_id {
            query = query.filter(articles::author_id.eq(author_id));
        }

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = like_pattern(search);
            let matching_authors = users::table
                .filter(users::username.ilike(pattern.clone()))
                .select(users::id);
            query = query.filter(
                articles::title
                    .ilike(pattern.clone())
                    .or(articles::content.ilike(pattern))
                    .or(articles::author_id.eq_any(matching_authors)),
            );
        }

        query
            .order((articles::created_at.desc(), articles::id.desc()))
            .offset(filter.offset)
            .limit(filter.limit)
            .load(connection)
    }

    pub fn delete(article_id: i32, connection: &mut PgConnection) -> QueryResult<usize> {
        diesel::delete(articles::table.find(article_id)).execute(connection)
    }
}

/// An article deleted between loading it and writing to it is reported as
/// missing rather than as a database failure.
pub fn article_gone(err: DieselError) -> ApiError {
    match err {
        DieselError::NotFound
        | DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
            ApiError::NotFound(ARTICLE_NOT_FOUND)
        }
        other => other.into(),
    }
}

#[ComplexObject]
impl Article {
    async fn id(&self) -> ID {
        ID::from(self.id.to_string())
    }

    async fn author(&self, ctx: &Context<'_>) -> Result<User> {
        let author_id = self.author_id;
        Ok(db::run(ctx.pool(), move |c| {
            User::find(author_id, c)?.ok_or(ApiError::NotFound("Utilisateur non trouvé"))
        })
        .await?)
    }

    /// Newest first.
    async fn comments(&self, ctx: &Context<'_>) -> Result<Vec<Comment>> {
        let article_id = self.id;
        Ok(db::run(ctx.pool(), move |c| Ok(Comment::by_article(article_id, c)?)).await?)
    }

    async fn likes(&self, ctx: &Context<'_>) -> Result<Vec<Like>> {
        let article_id = self.id;
        Ok(db::run(ctx.pool(), move |c| Ok(Like::by_article(article_id, c)?)).await?)
    }

    async fn likes_count(&self, ctx: &Context<'_>) -> Result<i64> {
        let article_id = self.id;
        Ok(db::run(ctx.pool(), move |c| Ok(Like::count_for(article_id, c)?)).await?)
    }

    /// False for anonymous requests.
    async fn liked_by_me(&self, ctx: &Context<'_>) -> Result<bool> {
        let user_id = match ctx.viewer() {
            Some(viewer) => viewer.id,
            None => return Ok(false),
        };
        let article_id = self.id;
        Ok(db::run(ctx.pool(), move |c| Ok(Like::find(user_id, article_id, c)?.is_some())).await?)
    }
}

#[derive(Insertable)]
#[diesel(table_name = articles)]
pub struct NewArticle {
    pub author_id: i32,
    pub title: String,
    pub content: String,
}

impl NewArticle {
    pub fn insert(&self, connection: &mut PgConnection) -> QueryResult<Article> {
        diesel::insert_into(articles::table)
            .values(self)
            .returning(Article::as_returning())
            .get_result(connection)
    }
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = articles)]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ArticleChanges {
    pub fn apply(&self, article_id: i32, connection: &mut PgConnection) -> QueryResult<Article> {
        diesel::update(articles::table.find(article_id))
            .set(self)
            .returning(Article::as_returning())
            .get_result(connection)
    }
}

#[derive(Debug, InputObject)]
pub struct ArticleInput {
    pub title: String,
    pub content: String,
}

impl Validate for ArticleInput {
    fn validate(self) -> std::result::Result<Self, ValidationError> {
        let mut error = ValidationError::default();
        if self.title.trim().is_empty() {
            error.add_error("title", "Le titre est obligatoire");
        }
        if self.content.trim().is_empty() {
            error.add_error("content", "Le contenu est obligatoire");
        }
        error.into_result().map(|_| ArticleInput {
            title: self.title.trim().to_string(),
            ..self
        })
    }
}

#[derive(Debug, InputObject)]
pub struct ArticleUpdateInput {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl ArticleUpdateInput {
    /// Blank values leave the column unchanged.
    pub fn into_changes(self) -> ArticleChanges {
        ArticleChanges {
            title: non_blank(self.title).map(|title| title.trim().to_string()),
            content: non_blank(self.content),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct ArticleQuery;

#[Object]
impl ArticleQuery {
    async fn article(&self, ctx: &Context<'_>, id: ID) -> Result<Article> {
        let article_id = parse_id(&id, ARTICLE_NOT_FOUND)?;
        Ok(db::run(ctx.pool(), move |c| Article::load(article_id, c)).await?)
    }

    async fn articles(
        &self,
        ctx: &Context<'_>,
        offset: Option<i32>,
        limit: Option<i32>,
        search: Option<String>,
        author_username: Option<String>,
        author_id: Option<ID>,
    ) -> Result<Vec<Article>> {
        let mut filter = ArticleFilter::new(offset.unwrap_or(0), limit.unwrap_or(DEFAULT_LIMIT));
        filter.search = search;
        filter.author_username = author_username;
        if let Some(author_id) = author_id {
            match author_id.parse::<i32>() {
                Ok(author_id) => filter.author_id = Some(author_id),
                Err(_) => return Ok(Vec::new()),
            }
        }
        Ok(db::run(ctx.pool(), move |c| Ok(Article::list(&filter, c)?)).await?)
    }
}

#[derive(Default)]
pub struct ArticleMutation;

#[Object]
impl ArticleMutation {
    async fn create_article(&self, ctx: &Context<'_>, input: ArticleInput) -> Result<Article> {
        let author_id = ctx
            .require_viewer("Vous devez être connecté pour créer un article")?
            .id;
        let input = input.validate().map_err(ApiError::from)?;

        let new_article = NewArticle {
            author_id,
            title: input.title,
            content: input.content,
        };
        let article = db::run(ctx.pool(), move |c| Ok(new_article.insert(c)?)).await?;
        info!("user {} published article {}", author_id, article.id);
        Ok(article)
    }

    async fn update_article(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: ArticleUpdateInput,
    ) -> Result<Article> {
        let viewer_id = ctx
            .require_viewer("Vous devez être connecté pour modifier un article")?
            .id;
        let article_id = parse_id(&id, ARTICLE_NOT_FOUND)?;
        let changes = input.into_changes();

        Ok(db::run(ctx.pool(), move |c| {
            let article = Article::load(article_id, c)?;
            if article.author_id != viewer_id {
                return Err(ApiError::Forbidden(
                    "Vous n'êtes pas autorisé à modifier cet article",
                ));
            }
            changes.apply(article.id, c).map_err(article_gone)
        })
        .await?)
    }

    /// Comments and likes go with the article.
    async fn delete_article(&self, ctx: &Context<'_>, id: ID) -> Result<bool> {
        let viewer_id = ctx
            .require_viewer("Vous devez être connecté pour supprimer un article")?
            .id;
        let article_id = parse_id(&id, ARTICLE_NOT_FOUND)?;

        db::run(ctx.pool(), move |c| {
            let article = Article::load(article_id, c)?;
            if article.author_id != viewer_id {
                return Err(ApiError::Forbidden(
                    "Vous n'êtes pas autorisé à supprimer cet article",
                ));
            }
            Article::delete(article.id, c)?;
            Ok(())
        })
        .await?;
        Ok(true)
    }
}
