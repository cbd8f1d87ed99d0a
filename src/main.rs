use actix_files::Files;
use actix_identity::IdentityMiddleware;
use actix_web::{
    http::{Method, StatusCode},
    middleware,
    web::{self, Data},
    App, HttpResponse, HttpServer, Responder,
};
use log::info;

use linkhub::{
    config::AppConfig, db, errors::render_error_page, form_config, json_config, routes,
    session_middleware, AppState,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("FATAL: {}", e);
        e
    })?;

    let db_pool = db::connect(&config.database_url).await.map_err(|e| {
        log::error!("FATAL: database unavailable: {}", e);
        e
    })?;

    let state = AppState {
        db_pool,
        images: config.image_store.clone(),
    };

    db::bootstrap(&state, &config.admin_username, &config.admin_password)
        .await
        .map_err(|e| {
            log::error!("Database initialization failed: {}", e);
            e
        })?;

    info!(
        "Starting HTTP server on http://{}:{}/",
        config.server_host, config.server_port
    );

    let bind = (config.server_host.clone(), config.server_port);
    HttpServer::new(move || {
        App::new()
            // enable automatic response compression - usually register this first
            .wrap(middleware::Compress::default())
            .wrap(IdentityMiddleware::default())
            .wrap(session_middleware(
                config.session_key.clone(),
                config.session_cookie_secure,
            ))
            // enable logger - always register Actix Web Logger middleware last
            .wrap(middleware::Logger::default())
            .app_data(Data::new(state.clone()))
            .app_data(form_config(config.max_payload_bytes))
            .app_data(json_config(config.max_payload_bytes))
            .service(Files::new("/static", &config.static_dir))
            .configure(routes::configure)
            .default_service(web::to(default_handler))
    })
    .bind(bind)?
    .run()
    .await
}

async fn default_handler(req_method: Method) -> impl Responder {
    match req_method {
        Method::GET => render_error_page(StatusCode::NOT_FOUND, "Not found"),
        _ => HttpResponse::MethodNotAllowed().finish(),
    }
}
