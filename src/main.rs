use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::info;
use std::time::Duration;

use mailsift::config::Settings;
use mailsift::services::scheduler;
use mailsift::{api, db, services};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new(None).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Configuration error: {e}"),
        )
    })?;

    env_logger::Builder::from_env(Env::default().default_filter_or(settings.log.level.clone()))
        .init();

    let pool = db::connect(&settings.database.url).await.map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Database connection failed: {e}"),
        )
    })?;
    db::run_migrations(&pool).await.map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::Other, format!("Migration failed: {e}"))
    })?;

    let bind_addr = (settings.server.host.clone(), settings.server.port);
    let frontend_origin = settings.frontend.url.clone();
    let sync_config = settings.sync.clone();

    let state = web::Data::new(services::init(settings, pool));

    // The worker binary is the recommended deployment for the scheduler;
    // running it in-process keeps single-binary setups working.
    if sync_config.enabled {
        scheduler::start_background_sync(
            state.sync.clone(),
            Duration::from_secs(sync_config.interval_seconds),
        );
    }

    info!("Starting server at http://{}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::routes::configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}
