use std::sync::Arc;

use actix_identity::IdentityMiddleware;
use actix_web::{middleware, web, App, HttpServer};

use water_quality_server::AppData;
use water_quality_server::backend::PgBackend;
use water_quality_server::config::Settings;
use water_quality_server::web::{api_service, session_middleware};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let settings = match Settings::from_env() {
        Ok(x) => x,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let backend = PgBackend::new(&settings.database_url, settings.pool_size);
    // The service stays up with a missing database, requests report it
    if let Err(e) = backend.run_migrations() {
        log::error!("Cannot run migrations: {}", e);
    }

    let data = AppData::new(&settings, Arc::new(backend));
    if let Some(password) = &settings.bootstrap_admin_password {
        if let Err(e) = data.setup_bootstrap_admin(password, settings.bootstrap_password_override) {
            log::error!("Cannot set up the bootstrap admin: {}", e);
        }
    }

    let data = web::Data::new(data);
    let cookie_secret_key = settings.cookie_secret_key.clone();
    let domain = settings.domain.clone();

    log::info!("Listening on {}", settings.bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(IdentityMiddleware::default())
            .wrap(session_middleware(&cookie_secret_key, Some(domain.as_str())))
            // enable logger
            .wrap(middleware::Logger::default())
            // limit the maximum amount of data that server will accept
            .app_data(web::JsonConfig::default().limit(16 * 1024))
            .configure(api_service::config)
    })
        .bind(settings.bind_address.as_str())?
        .run()
        .await
}
