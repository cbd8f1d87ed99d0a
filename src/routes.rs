use actix_identity::Identity;
use actix_web::{
    get, post,
    web::{self, Data},
    HttpRequest, HttpResponse, Responder,
};
use tera::Context;

use crate::{
    auth::{self, CurrentUser},
    db,
    errors::{json_error, AppError},
    structs::{
        CreatedLink, GearForm, LinkForm, LinkSummary, LoginForm, MutationResponse,
        PreferencesUpdate,
    },
    AppState, TEMPLATES,
};

const GEAR_PAGE_ROUTE: &str = "/gear";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index_handler)
        .service(api_links_handler)
        .service(gear_handler)
        .service(gear_click_handler)
        .service(track_handler)
        .service(login_handler)
        .service(login_form_handler)
        .service(logout_handler)
        .service(dashboard_handler)
        .service(admin_gear_handler)
        .service(admin_gear_detail_handler)
        .service(add_link_handler)
        .service(edit_link_handler)
        .service(delete_link_handler)
        .service(add_gear_handler)
        .service(edit_gear_handler)
        .service(delete_gear_handler)
        .service(get_preferences_handler)
        .service(update_preferences_handler);
}

fn render(template: &str, context: &Context) -> Result<HttpResponse, AppError> {
    let rendered = TEMPLATES.render(template, context).map_err(|e| {
        log::error!("Failed to render template {}: {}", template, e);
        AppError::TemplateError(e)
    })?;

    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(rendered))
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header(("Location", location))
        .finish()
}

fn mutation_response(result: Result<MutationResponse, AppError>) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(e) => json_error(&e),
    }
}

async fn site_context(state: &AppState) -> Result<Context, AppError> {
    let prefs = db::get_site_preferences(state).await?;
    let mut context = Context::new();
    context.insert("prefs", &prefs);
    context.insert("version", env!("CARGO_PKG_VERSION"));
    Ok(context)
}

#[get("/")]
pub async fn index_handler(state: Data<AppState>) -> Result<impl Responder, AppError> {
    let links = db::list_links(&state).await?;
    let mut context = site_context(&state).await?;
    context.insert("links", &links);
    render("index.html", &context)
}

#[get("/api/links")]
pub async fn api_links_handler(state: Data<AppState>) -> Result<impl Responder, AppError> {
    let links: Vec<LinkSummary> = db::list_links(&state)
        .await?
        .into_iter()
        .map(LinkSummary::from)
        .collect();
    Ok(HttpResponse::Ok().json(links))
}

#[get("/gear")]
pub async fn gear_handler(state: Data<AppState>) -> Result<impl Responder, AppError> {
    let gear_items = db::list_gear(&state).await?;
    let mut context = site_context(&state).await?;
    context.insert("gear_items", &gear_items);
    render("gear.html", &context)
}

#[get("/gear/{id}/click")]
pub async fn gear_click_handler(
    state: Data<AppState>,
    path: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    let gear = db::track_gear_click(&state, path.into_inner()).await?;
    Ok(see_other(&gear.url))
}

/// Counts the visit, then redirects. Links aliased to the gear page count
/// like any other link and land on the gear route.
#[get("/track/{id}")]
pub async fn track_handler(
    state: Data<AppState>,
    path: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    let link = db::track_link_click(&state, path.into_inner()).await?;
    if link.points_to_gear_page() {
        return Ok(see_other(GEAR_PAGE_ROUTE));
    }
    Ok(see_other(&link.url))
}

#[get("/admin/login")]
pub async fn login_handler() -> Result<impl Responder, AppError> {
    let mut context = Context::new();
    context.insert("title", "Admin login");
    render("admin_login.html", &context)
}

#[post("/admin/login")]
pub async fn login_form_handler(
    web::Form(form): web::Form<LoginForm>,
    state: Data<AppState>,
    request: HttpRequest,
) -> Result<impl Responder, AppError> {
    if let Some(user) = auth::login(&state, &request, &form.username, &form.password).await? {
        log::info!("Redirecting {} to the dashboard", user.username);
        return Ok(see_other("/admin"));
    }

    let mut context = Context::new();
    context.insert("title", "Admin login");
    context.insert("error", "Invalid username or password");
    let rendered = TEMPLATES.render("admin_login.html", &context)?;
    Ok(HttpResponse::Unauthorized()
        .content_type("text/html; charset=utf-8")
        .body(rendered))
}

#[get("/admin/logout")]
pub async fn logout_handler(user: CurrentUser, identity: Identity) -> impl Responder {
    auth::logout(identity, &user);
    see_other("/")
}

#[get("/admin")]
pub async fn dashboard_handler(
    state: Data<AppState>,
    user: CurrentUser,
) -> Result<impl Responder, AppError> {
    let links = db::list_links_for_user(&state, user.id).await?;
    let prefs = db::get_preferences(&state, user.id).await?;

    let mut context = Context::new();
    context.insert("username", &user.username);
    context.insert("links", &links);
    context.insert("prefs", &prefs);
    render("admin.html", &context)
}

#[get("/admin/gear")]
pub async fn admin_gear_handler(
    state: Data<AppState>,
    user: CurrentUser,
) -> Result<impl Responder, AppError> {
    let gear_items = db::list_gear(&state).await?;
    let prefs = db::get_preferences(&state, user.id).await?;

    let mut context = Context::new();
    context.insert("username", &user.username);
    context.insert("gear_items", &gear_items);
    context.insert("prefs", &prefs);
    render("admin_gear.html", &context)
}

#[get("/admin/gear/{id}")]
pub async fn admin_gear_detail_handler(
    state: Data<AppState>,
    _user: CurrentUser,
    path: web::Path<i64>,
) -> impl Responder {
    match db::get_gear(&state, path.into_inner()).await {
        Ok(Some(gear)) => HttpResponse::Ok().json(gear),
        Ok(None) => json_error(&AppError::NotFound),
        Err(e) => json_error(&e),
    }
}

#[post("/admin/links/add")]
pub async fn add_link_handler(
    state: Data<AppState>,
    user: CurrentUser,
    web::Form(form): web::Form<LinkForm>,
) -> impl Responder {
    mutation_response(db::add_link(&state, &user, &form).await.map(|link| {
        MutationResponse {
            link: Some(CreatedLink::from(&link)),
            ..MutationResponse::with_message("Link added successfully")
        }
    }))
}

#[post("/admin/links/edit/{id}")]
pub async fn edit_link_handler(
    state: Data<AppState>,
    user: CurrentUser,
    path: web::Path<i64>,
    web::Form(form): web::Form<LinkForm>,
) -> impl Responder {
    mutation_response(
        db::edit_link(&state, &user, path.into_inner(), &form)
            .await
            .map(|_| MutationResponse::ok()),
    )
}

#[post("/admin/links/delete/{id}")]
pub async fn delete_link_handler(
    state: Data<AppState>,
    user: CurrentUser,
    path: web::Path<i64>,
) -> impl Responder {
    mutation_response(
        db::delete_link(&state, &user, path.into_inner())
            .await
            .map(|_| MutationResponse::ok()),
    )
}

#[post("/admin/gear/add")]
pub async fn add_gear_handler(
    state: Data<AppState>,
    _user: CurrentUser,
    web::Form(form): web::Form<GearForm>,
) -> impl Responder {
    mutation_response(
        db::add_gear(&state, &form)
            .await
            .map(|_| MutationResponse::ok()),
    )
}

#[post("/admin/gear/edit/{id}")]
pub async fn edit_gear_handler(
    state: Data<AppState>,
    _user: CurrentUser,
    path: web::Path<i64>,
    web::Form(form): web::Form<GearForm>,
) -> impl Responder {
    mutation_response(
        db::edit_gear(&state, path.into_inner(), &form)
            .await
            .map(|_| MutationResponse::ok()),
    )
}

#[post("/admin/gear/delete/{id}")]
pub async fn delete_gear_handler(
    state: Data<AppState>,
    _user: CurrentUser,
    path: web::Path<i64>,
) -> impl Responder {
    mutation_response(
        db::delete_gear(&state, path.into_inner())
            .await
            .map(|_| MutationResponse::ok()),
    )
}

#[get("/admin/preferences")]
pub async fn get_preferences_handler(state: Data<AppState>, user: CurrentUser) -> impl Responder {
    match db::get_preferences(&state, user.id).await {
        Ok(Some(prefs)) => HttpResponse::Ok().json(prefs),
        Ok(None) => HttpResponse::Ok().json(serde_json::json!({})),
        Err(e) => json_error(&e),
    }
}

#[post("/admin/preferences")]
pub async fn update_preferences_handler(
    state: Data<AppState>,
    user: CurrentUser,
    web::Json(update): web::Json<PreferencesUpdate>,
) -> impl Responder {
    mutation_response(
        db::upsert_preferences(&state, user.id, &update)
            .await
            .map(|_| MutationResponse::with_message("Preferences updated successfully")),
    )
}
