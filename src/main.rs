#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate rocket;

mod article;
mod comment;
mod config;
mod cors;
mod db;
mod graphql;
mod like;
mod types;
mod users;
mod utils;

#[cfg(test)]
mod tests;

use log::info;
use rocket::serde::json::Json;
use rocket::{Build, Rocket};
use serde_json::{json, Value};

use config::Config;
use cors::Cors;
use db::Pool;

mod errors {
    error_chain! {
        links {
            Config(crate::config::Error, crate::config::ErrorKind);
            Db(crate::db::Error, crate::db::ErrorKind);
        }
    }
}

#[catch(404)]
fn not_found() -> Json<Value> {
    Json(json!({
        "errors": [
            "Ressource non trouvée"
        ]
    }))
}

#[catch(422)]
fn handle_422() -> Json<Value> {
    Json(json!({
        "errors": [
            "Requête invalide"
        ]
    }))
}

#[catch(500)]
fn internal_error() -> Json<Value> {
    Json(json!({
        "errors": [
            "Erreur interne du serveur"
        ]
    }))
}

#[catch(503)]
fn unavailable() -> Json<Value> {
    Json(json!({
        "errors": [
            "Service temporairement indisponible"
        ]
    }))
}

pub fn build_rocket(config: Config, pool: Pool) -> Rocket<Build> {
    let figment = rocket::Config::figment().merge(("port", config.port));
    let schema = graphql::schema(pool.clone(), config.clone());

    rocket::custom(figment)
        .attach(Cors::new(config.cors_origins.clone()))
        .manage(pool)
        .manage(config)
        .manage(schema)
        .mount(
            "/",
            routes![
                graphql::index,
                graphql::graphiql,
                graphql::graphql_request,
                graphql::graphql_preflight,
            ],
        )
        .register("/", catchers![not_found, handle_422, internal_error, unavailable])
}

async fn run() -> errors::Result<()> {
    let config = Config::from_env()?;
    let pool = db::init_pool(&config)?;
    let applied = db::run_migrations(&pool)?;

    let port = config.port;
    let rocket = build_rocket(config, pool);
    info!("applied {} pending migration(s)", applied);
    info!("Serveur prêt à l'adresse http://localhost:{}/graphql", port);

    if let Err(e) = rocket.launch().await {
        bail!("failed to launch the server: {}", e);
    }
    Ok(())
}

#[rocket::main]
async fn main() {
    if let Err(ref e) = run().await {
        eprintln!("error: {}", e);
        for cause in e.iter().skip(1) {
            eprintln!("caused by: {}", cause);
        }
        std::process::exit(1);
    }
}
