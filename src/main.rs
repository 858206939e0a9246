mod bot;
mod config;
mod handlers;
mod models;
mod services;
mod state;
#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::middleware::{Logger, NormalizePath};
use actix_web::{web, App, HttpServer};
use config::{Config, LogFormat};
use state::AppState;
use tracing_subscriber::EnvFilter;

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Compact => tracing_subscriber::fmt().with_env_filter(filter).compact().init(),
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {}", err);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, err));
        }
    };
    init_logging(config.log_format);

    tracing::info!(
        bind_address = %config.server.bind_address,
        port = config.server.port,
        direct_line_base_url = %config.direct_line.base_url,
        has_direct_line_secret = config.direct_line.secret.is_some(),
        has_language_key = config.language.key.is_some(),
        channel_auth = config.bot.app_id.is_some(),
        "starting qna-relay"
    );

    let app_state = web::Data::new(AppState::new(&config));

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .wrap(Cors::permissive())
            .app_data(app_state.clone())
            .configure(handlers::configure)
    })
    .bind((config.server.bind_address.as_str(), config.server.port))?
    .run()
    .await
}
