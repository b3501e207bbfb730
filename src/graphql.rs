use async_graphql::http::GraphiQLSource;
use async_graphql::{EmptySubscription, MergedObject, Schema};
use async_graphql_rocket::{GraphQLRequest, GraphQLResponse};
use rocket::http::Status;
use rocket::response::content::RawHtml;
use rocket::State;

use crate::article::{ArticleMutation, ArticleQuery};
use crate::comment::{CommentMutation, CommentQuery};
use crate::config::Config;
use crate::db::Pool;
use crate::like::LikeMutation;
use crate::users::{UserMutation, UserQuery, Viewer};

#[derive(MergedObject, Default)]
pub struct Query(UserQuery, ArticleQuery, CommentQuery);

#[derive(MergedObject, Default)]
pub struct Mutation(UserMutation, ArticleMutation, CommentMutation, LikeMutation);

pub type LolifySchema = Schema<Query, Mutation, EmptySubscription>;

pub fn schema(pool: Pool, config: Config) -> LolifySchema {
    Schema::build(Query::default(), Mutation::default(), EmptySubscription)
        .data(pool)
        .data(config)
        .limit_depth(10)
        .limit_complexity(500)
        .finish()
}

#[get("/")]
pub fn index() -> &'static str {
    "API GraphQL de Lolify - Utilisez /graphql pour accéder au playground"
}

#[get("/graphql")]
pub fn graphiql() -> RawHtml<String> {
    RawHtml(GraphiQLSource::build().endpoint("/graphql").finish())
}

#[post("/graphql", data = "<request>", format = "application/json")]
pub async fn graphql_request(
    schema: &State<LolifySchema>,
    viewer: Viewer,
    request: GraphQLRequest,
) -> GraphQLResponse {
    request.data(viewer).execute(schema.inner()).await
}

#[options("/graphql")]
pub fn graphql_preflight() -> Status {
    Status::NoContent
}
