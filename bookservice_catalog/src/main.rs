use actix_web::{App, HttpServer};
use paperclip::actix::{web, OpenApiExt};
use tracing_actix_web::TracingLogger;

use bookservice_catalog::app_config::{build_book_service, build_cors, config_app};
use bookservice_catalog::settings::Settings;
use bookservice_catalog::telemetry::init_telemetry;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_telemetry(&settings.telemetry)?;

    let book_service = build_book_service(&settings).await?;

    tracing::info!(
        "starting HTTP server at http://{}:{}",
        settings.server.host,
        settings.server.port
    );

    let cors_settings = settings.cors.clone();
    HttpServer::new(move || {
        App::new()
            .wrap_api()
            .app_data(web::Data::new(book_service.clone()))
            .wrap(build_cors(&cors_settings))
            .wrap(TracingLogger::default())
            .configure(config_app)
            .with_json_spec_at("/apispec/v2")
            .build()
    })
    .bind((settings.server.host.as_str(), settings.server.port))?
    .run()
    .await?;

    Ok(())
}
