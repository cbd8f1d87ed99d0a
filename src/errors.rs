use actix_web::{
    error::{InternalError, JsonPayloadError, UrlencodedError},
    http::StatusCode,
    HttpRequest, HttpResponse, ResponseError,
};
use serde::Serialize;
use sqlx::Error as SqlxError;
use tera::Context;
use thiserror::Error;

use crate::TEMPLATES;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Login required")]
    LoginRequired,

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Template error: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("Password error: {0}")]
    PasswordError(String),

    #[error("Identity error: {0}")]
    IdentityError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AppError {
    /// Text that is safe to hand back to a client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::NotFound | AppError::Unauthorized | AppError::LoginRequired => {
                self.to_string()
            }
            AppError::Validation(msg) => msg.clone(),
            _ => "Internal server error".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorPayload {
    success: bool,
    message: String,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::FORBIDDEN,
            AppError::LoginRequired => StatusCode::SEE_OTHER,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::DatabaseError(_)
            | AppError::MigrateError(_)
            | AppError::TemplateError(_)
            | AppError::PasswordError(_)
            | AppError::IdentityError(_)
            | AppError::ConfigError(_)
            | AppError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::LoginRequired = self {
            return HttpResponse::SeeOther()
                .append_header(("Location", "/admin/login"))
                .finish();
        }
        render_error_page(self.status_code(), &self.public_message())
    }
}

/// Renders the shared error page, falling back to a plain body if the
/// template itself cannot be rendered.
pub fn render_error_page(status: StatusCode, message: &str) -> HttpResponse {
    let mut context = Context::new();
    context.insert("status", &status.as_u16());
    context.insert("message", message);

    match TEMPLATES.render("error.html", &context) {
        Ok(rendered) => HttpResponse::build(status)
            .content_type("text/html; charset=utf-8")
            .body(rendered),
        Err(e) => {
            log::error!("Failed to render error template: {}", e);
            HttpResponse::build(status).body(message.to_string())
        }
    }
}

/// JSON rendition used by the admin API routes: `{success: false, message}`
/// with the status matching the error kind.
pub fn json_error(err: &AppError) -> HttpResponse {
    match err {
        AppError::Validation(_) | AppError::NotFound | AppError::Unauthorized => {
            log::warn!("Request refused: {}", err)
        }
        AppError::LoginRequired => {}
        _ => log::error!("Request failed: {}", err),
    }
    if let AppError::LoginRequired = err {
        return err.error_response();
    }
    HttpResponse::build(err.status_code()).json(ErrorPayload {
        success: false,
        message: err.public_message(),
    })
}

/// Rejected JSON bodies answer with the same failure payload as the
/// mutation routes instead of actix's plain-text 400.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let app_err = match &err {
        JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
            AppError::Validation("Request body too large".to_string())
        }
        _ => AppError::Validation("Invalid request body".to_string()),
    };
    log::warn!("Rejected JSON body: {}", err);
    InternalError::from_response(err, json_error(&app_err)).into()
}

pub fn form_error_handler(err: UrlencodedError, _req: &HttpRequest) -> actix_web::Error {
    let app_err = match &err {
        UrlencodedError::Overflow { .. } => {
            AppError::Validation("Request body too large".to_string())
        }
        _ => AppError::Validation("Invalid form data".to_string()),
    };
    log::warn!("Rejected form body: {}", err);
    InternalError::from_response(err, json_error(&app_err)).into()
}

impl From<AppError> for std::io::Error {
    fn from(err: AppError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
    }
}
