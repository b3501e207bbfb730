use async_graphql::{ComplexObject, Context, InputObject, Object, Result, SimpleObject, ID};
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::article::{Article, ARTICLE_NOT_FOUND};
use crate::db::{self, schema::comments};
use crate::types::{parse_id, ApiError, Validate, ValidationError};
use crate::users::User;
use crate::utils::ContextExt;

const COMMENT_NOT_FOUND: &str = "Commentaire non trouvé";

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, SimpleObject)]
#[diesel(table_name = comments)]
#[graphql(complex)]
pub struct Comment {
    #[graphql(skip)]
    pub id: i32,
    #[graphql(skip)]
    pub author_id: i32,
    #[graphql(skip)]
    pub article_id: i32,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn find(comment_id: i32, conn: &mut PgConnection) -> QueryResult<Option<Comment>> {
        comments::table
            .find(comment_id)
            .select(Comment::as_select())
            .first(conn)
            .optional()
    }

    pub fn by_article(article_id: i32, conn: &mut PgConnection) -> QueryResult<Vec<Comment>> {
        comments::table
            .filter(comments::article_id.eq(article_id))
            .order((comments::created_at.desc(), comments::id.desc()))
            .select(Comment::as_select())
            .load(conn)
    }

    pub fn by_author(author_id: i32, conn: &mut PgConnection) -> QueryResult<Vec<Comment>> {
        comments::table
            .filter(comments::author_id.eq(author_id))
            .order((comments::created_at.desc(), comments::id.desc()))
            .select(Comment::as_select())
            .load(conn)
    }
}

#[ComplexObject]
impl Comment {
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

    async fn article(&self, ctx: &Context<'_>) -> Result<Article> {
        let article_id = self.article_id;
        Ok(db::run(ctx.pool(), move |c| Article::load(article_id, c)).await?)
    }
}

#[derive(Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment {
    pub author_id: i32,
    pub article_id: i32,
    pub content: String,
}

#[derive(Debug, InputObject)]
pub struct CommentInput {
    pub content: String,
    pub article_id: ID,
}

impl Validate for CommentInput {
    fn validate(self) -> std::result::Result<Self, ValidationError> {
        if self.content.trim().is_empty() {
            Err(ValidationError::from(
                "content",
                "Le commentaire ne peut pas être vide",
            ))
        } else {
            Ok(self)
        }
    }
}

#[derive(Default)]
pub struct CommentQuery;

#[Object]
impl CommentQuery {
    /// Comments of an article, newest first.
    async fn comments(&self, ctx: &Context<'_>, article_id: ID) -> Result<Vec<Comment>> {
        let article_id = match article_id.parse::<i32>() {
            Ok(article_id) => article_id,
            Err(_) => return Ok(Vec::new()),
        };
        Ok(db::run(ctx.pool(), move |c| Ok(Comment::by_article(article_id, c)?)).await?)
    }
}

#[derive(Default)]
pub struct CommentMutation;

#[Object]
impl CommentMutation {
    async fn add_comment(&self, ctx: &Context<'_>, input: CommentInput) -> Result<Comment> {
        let author_id = ctx
            .require_viewer("Vous devez être connecté pour ajouter un commentaire")?
            .id;
        let input = input.validate().map_err(ApiError::from)?;
        let article_id = parse_id(&input.article_id, ARTICLE_NOT_FOUND)?;
        let content = input.content;

        Ok(db::run(ctx.pool(), move |c| {
            let article = Article::load(article_id, c)?;
            let new_comment = NewComment {
                author_id,
                article_id: article.id,
                content,
            };
            Ok(diesel::insert_into(comments::table)
                .values(&new_comment)
                .returning(Comment::as_returning())
                .get_result(c)?)
        })
        .await?)
    }

    async fn delete_comment(&self, ctx: &Context<'_>, id: ID) -> Result<bool> {
        let viewer_id = ctx
            .require_viewer("Vous devez être connecté pour supprimer un commentaire")?
            .id;
        let comment_id = parse_id(&id, COMMENT_NOT_FOUND)?;

        db::run(ctx.pool(), move |c| {
            let comment =
                Comment::find(comment_id, c)?.ok_or(ApiError::NotFound(COMMENT_NOT_FOUND))?;
            if comment.author_id != viewer_id {
                return Err(ApiError::Forbidden(
                    "Vous n'êtes pas autorisé à supprimer ce commentaire",
                ));
            }
            diesel::delete(&comment).execute(c)?;
            Ok(())
        })
        .await?;
        Ok(true)
    }
}
