use rocket::http::{Header, Status};
use serde_json::{json, Value};

use super::*;

#[rocket::async_test]
async fn index_points_to_graphql() {
    let client = anonymous_client().await;
    let response = client.get("/").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let body = response.into_string().await.unwrap();
    assert!(body.contains("/graphql"));
}

#[rocket::async_test]
async fn graphiql_is_served() {
    let client = anonymous_client().await;
    let response = client.get("/graphql").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    assert!(response.into_string().await.unwrap().contains("graphiql"));
}

#[rocket::async_test]
async fn unknown_route_gets_json_404() {
    let client = anonymous_client().await;
    let response = client.get("/api/articles").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["errors"][0], "Ressource non trouvée");
}

#[rocket::async_test]
async fn me_requires_a_token() {
    let client = anonymous_client().await;
    let body = graphql(&client, None, "{ me { id username } }", json!({})).await;
    assert_eq!(error_message(&body), "Non authentifié");
    assert_eq!(error_code(&body), "UNAUTHENTICATED");
    assert!(body["data"].is_null());
}

#[rocket::async_test]
async fn bad_token_means_anonymous() {
    let client = anonymous_client().await;
    let body = graphql(&client, Some("not.a.jwt"), "{ me { id } }", json!({})).await;
    assert_eq!(error_message(&body), "Non authentifié");
}

#[rocket::async_test]
async fn token_signed_with_another_secret_means_anonymous() {
    let client = anonymous_client().await;
    let mut config = test_config("postgres://unused");
    config.jwt_secret = "pas-le-bon-secret".into();
    let token = crate::users::models::issue_token(&config, 1, chrono::Utc::now()).unwrap();

    let body = graphql(&client, Some(&token), "{ me { id } }", json!({})).await;
    assert_eq!(error_message(&body), "Non authentifié");
}

#[rocket::async_test]
async fn unreachable_database_gets_json_503() {
    let client = anonymous_client().await;
    let config = test_config("postgres://unused");
    let token = crate::users::models::issue_token(&config, 1, chrono::Utc::now()).unwrap();

    let response = client
        .post("/graphql")
        .header(rocket::http::ContentType::JSON)
        .header(Header::new("Authorization", format!("Bearer {}", token)))
        .body(json!({ "query": "{ me { id } }" }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::ServiceUnavailable);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["errors"][0], "Service temporairement indisponible");
}

#[rocket::async_test]
async fn mutations_require_authentication() {
    let client = anonymous_client().await;
    let cases = [
        (
            r#"mutation { createArticle(input: { title: "t", content: "c" }) { id } }"#,
            "Vous devez être connecté pour créer un article",
        ),
        (
            r#"mutation { updateArticle(id: "1", input: { title: "t" }) { id } }"#,
            "Vous devez être connecté pour modifier un article",
        ),
        (
            r#"mutation { deleteArticle(id: "1") }"#,
            "Vous devez être connecté pour supprimer un article",
        ),
        (
            r#"mutation { toggleLike(articleId: "1") { id } }"#,
            "Vous devez être connecté pour liker un article",
        ),
        (
            r#"mutation { addComment(input: { content: "gg", articleId: "1" }) { id } }"#,
            "Vous devez être connecté pour ajouter un commentaire",
        ),
        (
            r#"mutation { deleteComment(id: "1") }"#,
            "Vous devez être connecté pour supprimer un commentaire",
        ),
        (
            r#"mutation { updateProfile(input: { currentPassword: "x" }) { id } }"#,
            "Vous devez être connecté pour mettre à jour votre profil",
        ),
        (
            r#"mutation { deleteAccount(password: "x") }"#,
            "Vous devez être connecté pour supprimer votre compte",
        ),
    ];

    for (query, message) in cases.iter() {
        let body = graphql(&client, None, query, json!({})).await;
        assert_eq!(error_message(&body), *message, "{}", query);
        assert_eq!(error_code(&body), "UNAUTHENTICATED");
    }
}

#[rocket::async_test]
async fn user_lookup_needs_id_or_username() {
    let client = anonymous_client().await;
    let body = graphql(&client, None, "{ user { id } }", json!({})).await;
    assert_eq!(
        error_message(&body),
        "Vous devez fournir soit un ID soit un nom d'utilisateur"
    );
    assert_eq!(error_code(&body), "BAD_USER_INPUT");
}

#[rocket::async_test]
async fn register_validates_before_touching_the_database() {
    let client = anonymous_client().await;
    let body = graphql(
        &client,
        None,
        "mutation Register($input: RegisterInput!) { register(input: $input) { token } }",
        json!({ "input": { "username": "x", "email": "nope", "password": "123" } }),
    )
    .await;
    assert_eq!(error_code(&body), "VALIDATION");
    assert_eq!(
        body["errors"][0]["extensions"]["fields"],
        json!(["email", "password", "username"])
    );
}

#[rocket::async_test]
async fn preflight_allows_configured_origin() {
    let client = anonymous_client().await;
    let response = client
        .options("/graphql")
        .header(Header::new("Origin", "http://localhost:5173"))
        .header(Header::new("Access-Control-Request-Method", "POST"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NoContent);
    let headers = response.headers();
    assert_eq!(
        headers.get_one("Access-Control-Allow-Origin"),
        Some("http://localhost:5173")
    );
    assert_eq!(headers.get_one("Access-Control-Allow-Credentials"), Some("true"));
    assert!(headers
        .get_one("Access-Control-Allow-Headers")
        .unwrap()
        .contains("Authorization"));
}

#[rocket::async_test]
async fn preflight_ignores_unknown_origin() {
    let client = anonymous_client().await;
    let response = client
        .options("/graphql")
        .header(Header::new("Origin", "http://evil.example"))
        .dispatch()
        .await;
    assert_eq!(response.headers().get_one("Access-Control-Allow-Origin"), None);
}

#[test]
fn schema_exposes_the_api() {
    let config = test_config("postgres://unused");
    let schema = crate::graphql::schema(crate::db::lazy_pool(&config.database_url), config);
    let sdl = schema.sdl();
    for field in [
        "me",
        "articles",
        "toggleLike",
        "likesCount",
        "likedByMe",
        "updateProfile",
        "deleteAccount",
        "addComment",
        "DateTime",
    ] {
        assert!(sdl.contains(field), "missing {}", field);
    }

    assert!(sdl.contains("type Like {"));
    // paging arguments are nullable so clients may leave their variables out
    assert!(sdl.contains("offset: Int"), "{}", sdl);
    assert!(!sdl.contains("offset: Int!"));
    assert!(!sdl.contains("limit: Int!"));

    let user_type = sdl
        .split("type User {")
        .nth(1)
        .and_then(|rest| rest.split('}').next())
        .expect("User type in schema");
    assert!(user_type.contains("username"));
    assert!(!user_type.contains("password"));
}
