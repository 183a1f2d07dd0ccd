mod auth;
mod db;
mod filters;
mod media;
mod models;
mod policy;
mod push;
mod reservations;
mod routes;
mod state;
mod templates;

use actix_files::Files;
use actix_web::{middleware, web, App, HttpServer};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::env;
use std::str::FromStr;
use tokio::sync::broadcast;

use crate::policy::BookingPolicy;
use crate::state::{AppState, PushConfig};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./data/beachline.db".to_string());
    db::ensure_sqlite_dir(&db_url)?;

    let connect_options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;

    db::run_migrations(&pool).await?;
    db::seed_defaults(&pool).await?;

    let (events, _) = broadcast::channel(64);

    let push = PushConfig {
        public_key: env::var("VAPID_PUBLIC_KEY").unwrap_or_default(),
        private_key: env::var("VAPID_PRIVATE_KEY").unwrap_or_default(),
        subject: env::var("VAPID_SUBJECT").unwrap_or_else(|_| "mailto:hello@beachline.local".to_string()),
    };
    if !push.enabled() {
        log::warn!("VAPID keys not set. Web push notifications are disabled.");
    }

    let media_dir = env::var("MEDIA_DIR").unwrap_or_else(|_| "./data/media".to_string());
    std::fs::create_dir_all(&media_dir)?;

    let state = AppState {
        db: pool.clone(),
        events,
        push,
        policy: BookingPolicy::from_env(),
        media_dir: media_dir.clone(),
    };

    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8080);

    let address = format!("0.0.0.0:{port}");
    log::info!("Starting Beachline on http://{address}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .service(Files::new("/static", "./static").prefer_utf8(true))
            .service(Files::new("/media", media_dir.clone()))
            .configure(routes::events::configure)
            .configure(routes::customer::configure)
            .configure(routes::vendor::configure)
            .configure(routes::admin::configure)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
