use actix_identity::{Identity, IdentityExt};
use actix_web::{dev::Payload, web::Data, FromRequest, HttpMessage, HttpRequest};
use futures_util::future::LocalBoxFuture;

use crate::{db, errors::AppError, structs::User, utils::verify_password, AppState};

/// The authenticated admin for the current request. Handlers that take this
/// extractor are only reached with a live session; everyone else is sent to
/// the login page.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

impl FromRequest for CurrentUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<Data<AppState>>().cloned();
        let user_id = req
            .get_identity()
            .ok()
            .and_then(|identity| identity.id().ok())
            .and_then(|id| id.parse::<i64>().ok());

        Box::pin(async move {
            let state = state.ok_or_else(|| {
                log::error!("Application state is not registered");
                AppError::ConfigError("application state missing".to_string())
            })?;
            let user_id = user_id.ok_or(AppError::LoginRequired)?;
            let user = db::get_user_by_id(&state, user_id)
                .await?
                .ok_or(AppError::LoginRequired)?;
            Ok(CurrentUser::from(user))
        })
    }
}

/// Checks the credentials and, on success, attaches the user's id to the
/// session. Returns `None` for any mismatch so callers cannot tell which
/// field was wrong.
pub async fn login(
    state: &AppState,
    request: &HttpRequest,
    username: &str,
    password: &str,
) -> Result<Option<CurrentUser>, AppError> {
    let user = match db::get_user_by_username(state, username.trim()).await? {
        Some(user) => user,
        None => {
            log::warn!("Login attempt for unknown user");
            return Ok(None);
        }
    };
    if !verify_password(password, &user.password_hash) {
        log::warn!("Password check failed for user {}", user.id);
        return Ok(None);
    }

    Identity::login(&request.extensions(), user.id.to_string())
        .map_err(|e| AppError::IdentityError(e.to_string()))?;
    log::info!("User {} logged in", user.id);
    Ok(Some(CurrentUser::from(user)))
}

pub fn logout(identity: Identity, user: &CurrentUser) {
    identity.logout();
    log::info!("User {} logged out", user.id);
}
