use async_graphql::{Context, Object, Result, ID};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use log::debug;

use crate::article::{article_gone, Article, ARTICLE_NOT_FOUND};
use crate::db::{self, schema::likes};
use crate::types::{parse_id, ApiError};
use crate::users::User;
use crate::utils::ContextExt;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = likes)]
pub struct Like {
    pub id: i32,
    pub user_id: i32,
    pub article_id: i32,
}

impl Like {
    pub fn find(user_id: i32, article_id: i32, conn: &mut PgConnection) -> QueryResult<Option<Like>> {
        likes::table
            .filter(likes::user_id.eq(user_id))
            .filter(likes::article_id.eq(article_id))
            .select(Like::as_select())
            .first(conn)
            .optional()
    }

    pub fn by_article(article_id: i32, conn: &mut PgConnection) -> QueryResult<Vec<Like>> {
        likes::table
            .filter(likes::article_id.eq(article_id))
            .order(likes::id.asc())
            .select(Like::as_select())
            .load(conn)
    }

    pub fn by_user(user_id: i32, conn: &mut PgConnection) -> QueryResult<Vec<Like>> {
        likes::table
            .filter(likes::user_id.eq(user_id))
            .order(likes::id.asc())
            .select(Like::as_select())
            .load(conn)
    }

    pub fn count_for(article_id: i32, conn: &mut PgConnection) -> QueryResult<i64> {
        likes::table
            .filter(likes::article_id.eq(article_id))
            .count()
            .get_result(conn)
    }

    /// Flips the like of `user_id` on `article_id` and returns whether the
    /// article is now liked. Removing first and inserting with
    /// `ON CONFLICT DO NOTHING` keeps concurrent toggles clear of the
    /// unique index.
    pub fn toggle(user_id: i32, article_id: i32, conn: &mut PgConnection) -> QueryResult<bool> {
        conn.transaction::<_, DieselError, _>(|conn| {
            let removed = diesel::delete(
                likes::table
                    .filter(likes::user_id.eq(user_id))
                    .filter(likes::article_id.eq(article_id)),
            )
            .execute(conn)?;

            if removed > 0 {
                return Ok(false);
            }

            diesel::insert_into(likes::table)
                .values((likes::user_id.eq(user_id), likes::article_id.eq(article_id)))
                .on_conflict((likes::user_id, likes::article_id))
                .do_nothing()
                .execute(conn)?;
            Ok(true)
        })
    }
}

#[Object]
impl Like {
    async fn id(&self) -> ID {
        ID::from(self.id.to_string())
    }

    async fn user(&self, ctx: &Context<'_>) -> Result<User> {
        let user_id = self.user_id;
        Ok(db::run(ctx.pool(), move |c| {
            User::find(user_id, c)?.ok_or(ApiError::NotFound("Utilisateur non trouvé"))
        })
        .await?)
    }

    async fn article(&self, ctx: &Context<'_>) -> Result<Article> {
        let article_id = self.article_id;
        Ok(db::run(ctx.pool(), move |c| Article::load(article_id, c)).await?)
    }
}

#[derive(Default)]
pub struct LikeMutation;

#[Object]
impl LikeMutation {
    /// Likes the article, or removes the like if it was already there.
    /// Returns the article as it is after the change.
    async fn toggle_like(&self, ctx: &Context<'_>, article_id: ID) -> Result<Article> {
        let user_id = ctx
            .require_viewer("Vous devez être connecté pour liker un article")?
            .id;
        let article_id = parse_id(&article_id, ARTICLE_NOT_FOUND)?;

        Ok(db::run(ctx.pool(), move |c| {
            c.transaction::<_, ApiError, _>(|c| {
                let article = Article::load(article_id, c)?;
                let liked = Like::toggle(user_id, article.id, c).map_err(article_gone)?;
                debug!(
                    "user {} {} article {}",
                    user_id,
                    if liked { "liked" } else { "unliked" },
                    article.id
                );
                Article::load(article.id, c)
            })
        })
        .await?)
    }
}
