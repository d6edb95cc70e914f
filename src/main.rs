use actix_web::{
    error, http::header::ContentType, middleware::Logger, route, web::Data, App, HttpResponse,
    HttpServer, Responder, Result,
};
use anyhow::Context;
use calbot::calendar::IcsEventSource;
use calbot::delivery::TelegramDelivery;
use calbot::processing::Processor;
use calbot::store::FileStore;
use calbot::AppConfig;
use dotenv::dotenv;
use prometheus::{Registry, TextEncoder};

#[route("/metrics", method = "GET")]
async fn metrics(registry: Data<Registry>) -> Result<impl Responder> {
    let body = TextEncoder::new()
        .encode_to_string(&registry.gather())
        .map_err(|err| {
            log::error!("{err}");
            error::ErrorInternalServerError("failed to encode metrics")
        })?;

    Ok(HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body(body))
}

#[route("/healthz", method = "GET", method = "HEAD")]
async fn healthz() -> impl Responder {
    HttpResponse::Ok().body("ok")
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv().ok();

    let config = AppConfig::load()?;

    let store = FileStore::open(&config.store.path)
        .with_context(|| format!("failed to open store {}", config.store.path.display()))?;
    let source = IcsEventSource::new(
        config.processing.fetch_timeout(),
        config.processing.lookahead(),
    )?;
    let delivery = TelegramDelivery::new(&config.bot)?;

    let processor = Processor::new(store, source, delivery, &config.processing)?;

    let registry = Registry::new();
    processor.register_metrics(&registry)?;

    let update_task = processor
        .spawn_update_task(config.processing.interval())
        .await;

    let registry = Data::new(registry);

    log::info!("starting HTTP server at {}", config.server.listen_addr);

    let served = HttpServer::new(move || {
        App::new()
            .app_data(registry.clone())
            .service(metrics)
            .service(healthz)
            .wrap(Logger::new(r#""%r" %s %b %T"#))
    })
    .workers(1)
    .bind(config.server.listen_addr)?
    .run()
    .await;

    // Let a running sweep finish before exiting.
    update_task.stop().await?;
    served?;

    Ok(())
}
