mod auth;
mod compose;
mod config;
mod database;
mod error;
mod fts_tree;
mod media;
mod model;
mod mutation;
mod response;
mod routes;
mod views;

use actix_identity::{CookieIdentityPolicy, IdentityService};
use actix_web::{middleware::Logger, web, App, HttpServer};
use clap::Parser;
use config::Args;
use database::Store;
use log::info;
use media::DirectoryStorage;
use routes::AppState;
use std::io;
use std::sync::Arc;

fn io_error<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[actix_rt::main]
async fn main() -> io::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    env_logger::Builder::new()
        .parse_filters(&args.log_level)
        .init();

    let session_key = args.session_key.as_bytes().to_vec();
    if session_key.len() < 32 {
        return Err(io_error("SESSION_KEY must be at least 32 bytes"));
    }
    let secure = args.secure_cookies;

    let db = args.open_database().map_err(io_error)?;
    let store = Store::open(db).map_err(io_error)?;
    let media = DirectoryStorage::new(&args.media_dir, &args.media_base_url).map_err(io_error)?;
    let state = web::Data::new(AppState {
        store: store.clone(),
        media: Arc::new(media),
        bcrypt_cost: args.bcrypt_cost,
    });

    info!("Listening on {}", args.listen);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(IdentityService::new(
                CookieIdentityPolicy::new(&session_key)
                    .name("auth-cookie")
                    .secure(secure),
            ))
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(args.listen)?
    .run()
    .await?;

    info!("Shutting down");
    store.flush().map_err(io_error)
}
