#[macro_use]
extern crate lazy_static;

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{cookie::Key, web};
use sqlx::SqlitePool;
use tera::Tera;

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod images;
pub mod routes;
pub mod structs;
pub mod utils;

use images::ImageStore;

#[derive(Debug, Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub images: ImageStore,
}

lazy_static! {
    pub static ref TEMPLATES: Tera = {
        let mut tera = Tera::default();
        if let Err(e) = tera.add_raw_templates(vec![
            ("base.html", include_str!("../templates/base.html")),
            ("index.html", include_str!("../templates/index.html")),
            ("gear.html", include_str!("../templates/gear.html")),
            ("admin_login.html", include_str!("../templates/admin_login.html")),
            ("admin.html", include_str!("../templates/admin.html")),
            ("admin_gear.html", include_str!("../templates/admin_gear.html")),
            ("error.html", include_str!("../templates/error.html")),
        ]) {
            log::error!("Parsing error(s): {}", e);
            ::std::process::exit(1);
        }
        tera.autoescape_on(vec![".html"]);
        tera
    };
}

pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(errors::json_error_handler)
}

pub fn form_config(limit: usize) -> web::FormConfig {
    web::FormConfig::default()
        .limit(limit)
        .error_handler(errors::form_error_handler)
}

pub fn session_middleware(key: Key, secure: bool) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_secure(secure)
        .cookie_http_only(true)
        .build()
}
