use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use actix_cors::Cors;
use anyhow::Result;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bugwise_web::api::create_api_router;
use bugwise_web::config::AppConfig;
use bugwise_web::state::AppState;

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bugwise_web=debug,bugwise_core=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let bind_address = config.bind_address.clone();
    let cors_origin = config.cors_origin.clone();
    let state = AppState::new(config).await?;

    tracing::info!("BugWise server listening on {}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&cors_origin)
            .allow_any_method()
            .allow_any_header()
            .supports_credentials();

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(TracingLogger::default())
            .wrap(cors)
            .service(create_api_router())
            .route("/health", web::get().to(health_check))
    })
    .bind(bind_address)?
    .run()
    .await?;

    Ok(())
}
