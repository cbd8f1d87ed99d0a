use std::str::FromStr;

use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
    Sqlite, SqlitePool, Transaction,
};

use crate::{
    auth::CurrentUser,
    errors::AppError,
    images::ImageReference,
    structs::{
        non_blank, Gear, GearForm, Link, LinkForm, Preferences, PreferencesUpdate, User,
        GEAR_PAGE_ALIAS,
    },
    utils::hash_password,
    AppState,
};

pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .read_only(false)
        .busy_timeout(std::time::Duration::from_secs(5));

    let db_pool = SqlitePool::connect_with(opts).await?;
    sqlx::migrate!().run(&db_pool).await?;
    log::info!("Database migrated successfully");
    Ok(db_pool)
}

pub async fn get_user_by_id(state: &AppState, id: i64) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?;
    Ok(user)
}

pub async fn get_user_by_username(
    state: &AppState,
    username: &str,
) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(&state.db_pool)
        .await?;
    Ok(user)
}

pub async fn create_user(state: &AppState, username: &str, password: &str) -> Result<User, AppError> {
    let pwd_hash = hash_password(password)?;
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, password_hash) VALUES ($1, $2) RETURNING *",
    )
    .bind(username)
    .bind(pwd_hash)
    .fetch_one(&state.db_pool)
    .await?;
    log::info!("User created: {}", user.username);
    Ok(user)
}

pub async fn list_links(state: &AppState) -> Result<Vec<Link>, AppError> {
    let links =
        sqlx::query_as::<_, Link>("SELECT * FROM links ORDER BY created_at DESC, id DESC")
            .fetch_all(&state.db_pool)
            .await?;
    Ok(links)
}

pub async fn list_links_for_user(state: &AppState, user_id: i64) -> Result<Vec<Link>, AppError> {
    let links = sqlx::query_as::<_, Link>(
        "SELECT * FROM links WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(links)
}

pub async fn get_link(state: &AppState, id: i64) -> Result<Option<Link>, AppError> {
    let link = sqlx::query_as::<_, Link>("SELECT * FROM links WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?;
    Ok(link)
}

pub async fn list_gear(state: &AppState) -> Result<Vec<Gear>, AppError> {
    let gear = sqlx::query_as::<_, Gear>("SELECT * FROM gear ORDER BY created_at DESC, id DESC")
        .fetch_all(&state.db_pool)
        .await?;
    Ok(gear)
}

pub async fn get_gear(state: &AppState, id: i64) -> Result<Option<Gear>, AppError> {
    let gear = sqlx::query_as::<_, Gear>("SELECT * FROM gear WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?;
    Ok(gear)
}

/// Preferences of the site owner (the first admin), used by the public pages.
pub async fn get_site_preferences(state: &AppState) -> Result<Option<Preferences>, AppError> {
    let prefs = sqlx::query_as::<_, Preferences>(
        "SELECT p.* FROM preferences p JOIN users u ON u.id = p.user_id ORDER BY u.id LIMIT 1",
    )
    .fetch_optional(&state.db_pool)
    .await?;
    Ok(prefs)
}

/// Bumps the link's counter by one in a single statement and returns the
/// updated row.
pub async fn track_link_click(state: &AppState, id: i64) -> Result<Link, AppError> {
    let link = sqlx::query_as::<_, Link>(
        "UPDATE links SET clicks = clicks + 1 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or(AppError::NotFound)?;
    Ok(link)
}

pub async fn track_gear_click(state: &AppState, id: i64) -> Result<Gear, AppError> {
    let gear = sqlx::query_as::<_, Gear>(
        "UPDATE gear SET clicks = clicks + 1 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or(AppError::NotFound)?;
    Ok(gear)
}

fn required_link_fields(form: &LinkForm) -> Result<(String, String), AppError> {
    match (non_blank(&form.title), non_blank(&form.url)) {
        (Some(title), Some(url)) => Ok((title.to_string(), url.to_string())),
        _ => Err(AppError::Validation("Title and URL are required".to_string())),
    }
}

pub async fn add_link(state: &AppState, user: &CurrentUser, form: &LinkForm) -> Result<Link, AppError> {
    let (title, url) = required_link_fields(form)?;
    let icon = non_blank(&form.icon).map(str::to_string);

    let mut tx = state.db_pool.begin().await?;

    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM links WHERE title = $1 AND user_id = $2")
            .bind(&title)
            .bind(user.id)
            .fetch_optional(&mut *tx)
            .await?;
    if existing.is_some() {
        return Err(AppError::Validation(
            "A link with this title already exists".to_string(),
        ));
    }

    let link = sqlx::query_as::<_, Link>(
        "INSERT INTO links (title, url, icon, clicks, created_at, user_id) VALUES ($1, $2, $3, 0, $4, $5) RETURNING *",
    )
    .bind(&title)
    .bind(&url)
    .bind(&icon)
    .bind(Utc::now())
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    log::info!("Link {} created for user {}", link.id, user.id);
    Ok(link)
}

pub async fn edit_link(
    state: &AppState,
    user: &CurrentUser,
    id: i64,
    form: &LinkForm,
) -> Result<Link, AppError> {
    let mut tx = state.db_pool.begin().await?;

    let owner: i64 = sqlx::query_scalar("SELECT user_id FROM links WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;
    if owner != user.id {
        return Err(AppError::Unauthorized);
    }
    let (title, url) = required_link_fields(form)?;
    let icon = non_blank(&form.icon).map(str::to_string);

    let link = sqlx::query_as::<_, Link>(
        "UPDATE links SET title = $1, url = $2, icon = $3 WHERE id = $4 RETURNING *",
    )
    .bind(&title)
    .bind(&url)
    .bind(&icon)
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    log::info!("Link {} updated by user {}", id, user.id);
    Ok(link)
}

pub async fn delete_link(state: &AppState, user: &CurrentUser, id: i64) -> Result<(), AppError> {
    let mut tx = state.db_pool.begin().await?;

    let owner: i64 = sqlx::query_scalar("SELECT user_id FROM links WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;
    if owner != user.id {
        return Err(AppError::Unauthorized);
    }

    sqlx::query("DELETE FROM links WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    log::info!("Link {} deleted by user {}", id, user.id);
    Ok(())
}

struct GearFields {
    title: String,
    description: String,
    price: String,
    url: String,
}

fn required_gear_fields(form: &GearForm) -> Result<GearFields, AppError> {
    match (
        non_blank(&form.title),
        non_blank(&form.description),
        non_blank(&form.price),
        non_blank(&form.url),
    ) {
        (Some(title), Some(description), Some(price), Some(url)) => Ok(GearFields {
            title: title.to_string(),
            description: description.to_string(),
            price: price.to_string(),
            url: url.to_string(),
        }),
        _ => Err(AppError::Validation("Missing required fields".to_string())),
    }
}

pub async fn add_gear(state: &AppState, form: &GearForm) -> Result<Gear, AppError> {
    let fields = required_gear_fields(form)?;
    let image = non_blank(&form.image_url)
        .ok_or_else(|| AppError::Validation("Missing required fields".to_string()))?;
    let image = state.images.accept(image)?;

    let mut tx = state.db_pool.begin().await?;
    let gear = sqlx::query_as::<_, Gear>(
        "INSERT INTO gear (title, description, price, url, image, clicks, created_at) VALUES ($1, $2, $3, $4, $5, 0, $6) RETURNING *",
    )
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(&fields.price)
    .bind(&fields.url)
    .bind(image.as_stored_value())
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    log::info!("Gear {} created", gear.id);
    Ok(gear)
}

pub async fn edit_gear(state: &AppState, id: i64, form: &GearForm) -> Result<Gear, AppError> {
    let mut tx = state.db_pool.begin().await?;

    let current = sqlx::query_as::<_, Gear>("SELECT * FROM gear WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;
    let fields = required_gear_fields(form)?;
    let new_image = match non_blank(&form.image_url) {
        Some(input) => Some(state.images.accept(input)?),
        None => None,
    };
    let image_value = new_image
        .as_ref()
        .map(ImageReference::as_stored_value)
        .unwrap_or_else(|| current.image.clone());

    let gear = sqlx::query_as::<_, Gear>(
        "UPDATE gear SET title = $1, description = $2, price = $3, url = $4, image = $5 WHERE id = $6 RETURNING *",
    )
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(&fields.price)
    .bind(&fields.url)
    .bind(&image_value)
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    let orphaned =
        current.image != gear.image && image_users(&mut tx, &current.image).await? == 0;
    tx.commit().await?;

    if orphaned {
        discard_image(state, &current.image).await;
    }
    log::info!("Gear {} updated", id);
    Ok(gear)
}

pub async fn delete_gear(state: &AppState, id: i64) -> Result<(), AppError> {
    let mut tx = state.db_pool.begin().await?;

    let image: String = sqlx::query_scalar("SELECT image FROM gear WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

    sqlx::query("DELETE FROM gear WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let orphaned = image_users(&mut tx, &image).await? == 0;
    tx.commit().await?;

    if orphaned {
        discard_image(state, &image).await;
    } else {
        log::info!("Image {} still used by other gear, keeping it", image);
    }
    log::info!("Gear {} deleted", id);
    Ok(())
}

/// Number of gear rows still pointing at `image`.
async fn image_users(tx: &mut Transaction<'_, Sqlite>, image: &str) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM gear WHERE image = $1")
        .bind(image)
        .fetch_one(&mut **tx)
        .await?;
    Ok(count)
}

// The row is already gone at this point, so a failed removal only gets logged.
async fn discard_image(state: &AppState, stored: &str) {
    let reference = ImageReference::parse(stored);
    if let Err(e) = state.images.discard(&reference).await {
        log::error!("Failed to remove image {}: {}", stored, e);
    }
}

pub async fn get_preferences(state: &AppState, user_id: i64) -> Result<Option<Preferences>, AppError> {
    let prefs = sqlx::query_as::<_, Preferences>("SELECT * FROM preferences WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(&state.db_pool)
        .await?;
    Ok(prefs)
}

/// Creates the user's row with defaults when missing, then applies only the
/// fields present in `update`.
pub async fn upsert_preferences(
    state: &AppState,
    user_id: i64,
    update: &PreferencesUpdate,
) -> Result<Preferences, AppError> {
    let now = Utc::now();
    let mut tx = state.db_pool.begin().await?;

    sqlx::query(
        "INSERT INTO preferences (user_id, created_at, updated_at) VALUES ($1, $2, $2) ON CONFLICT(user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let prefs = sqlx::query_as::<_, Preferences>(
        r#"
        UPDATE preferences SET
            site_title = COALESCE($1, site_title),
            site_description = COALESCE($2, site_description),
            profile_image = COALESCE($3, profile_image),
            background_color = COALESCE($4, background_color),
            accent_color = COALESCE($5, accent_color),
            text_color = COALESCE($6, text_color),
            updated_at = $7
        WHERE user_id = $8
        RETURNING *
        "#,
    )
    .bind(&update.site_title)
    .bind(&update.site_description)
    .bind(&update.profile_image)
    .bind(&update.background_color)
    .bind(&update.accent_color)
    .bind(&update.text_color)
    .bind(now)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    log::info!("Preferences updated for user {}", user_id);
    Ok(prefs)
}

/// Ensures the admin account, its preferences row and the starter links
/// exist. Safe to run on every start.
pub async fn bootstrap(state: &AppState, username: &str, password: &str) -> Result<User, AppError> {
    let admin = match get_user_by_username(state, username).await? {
        Some(user) => {
            log::info!("Admin user already exists");
            user
        }
        None => create_user(state, username, password).await?,
    };

    if get_preferences(state, admin.id).await?.is_none() {
        upsert_preferences(state, admin.id, &PreferencesUpdate::default()).await?;
        log::info!("Default preferences created");
    }

    let link_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM links WHERE user_id = $1")
        .bind(admin.id)
        .fetch_one(&state.db_pool)
        .await?;
    if link_count == 0 {
        seed_default_links(state, admin.id).await?;
    }
    Ok(admin)
}

async fn seed_default_links(state: &AppState, user_id: i64) -> Result<(), AppError> {
    let defaults = [
        ("Gear Recommendations", GEAR_PAGE_ALIAS, "fas fa-gamepad"),
        ("YouTube", "https://youtube.com/@dcgaming", "fab fa-youtube"),
        ("Twitch", "https://twitch.tv/dcgaming", "fab fa-twitch"),
        ("Twitter", "https://twitter.com/dcgaming", "fab fa-twitter"),
    ];

    let mut tx = state.db_pool.begin().await?;
    for (title, url, icon) in defaults {
        sqlx::query(
            "INSERT INTO links (title, url, icon, clicks, created_at, user_id) VALUES ($1, $2, $3, 0, $4, $5)",
        )
        .bind(title)
        .bind(url)
        .bind(icon)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    log::info!("Default links created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::ImageStore;
    use tempfile::TempDir;

    // The database lives inside the returned dir, which is removed on drop.
    async fn test_state() -> (AppState, TempDir) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("linkhub.sqlite");
        let db_pool = connect(&format!("sqlite://{}", path.display()))
            .await
            .expect("connect test database");
        let state = AppState {
            db_pool,
            images: ImageStore::Remote,
        };
        (state, dir)
    }

    fn local_store(state: &mut AppState, dir: &TempDir) -> std::path::PathBuf {
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        state.images = ImageStore::Local {
            dir: uploads.clone(),
        };
        uploads
    }

    async fn user(state: &AppState, name: &str) -> CurrentUser {
        let user = create_user(state, name, "pw").await.unwrap();
        CurrentUser {
            id: user.id,
            username: user.username,
        }
    }

    fn link_form(title: &str, url: &str) -> LinkForm {
        LinkForm {
            title: Some(title.to_string()),
            url: Some(url.to_string()),
            icon: None,
        }
    }

    fn gear_form(title: &str) -> GearForm {
        GearForm {
            title: Some(title.to_string()),
            description: Some("Wireless, 80h battery".to_string()),
            price: Some("$99".to_string()),
            url: Some("https://shop.example.com/headset".to_string()),
            image_url: Some("https://cdn.example.com/headset.jpg".to_string()),
        }
    }

    #[tokio::test]
    async fn added_link_is_listed_once_with_zero_clicks() {
        let (state, _dir) = test_state().await;
        let admin = user(&state, "admin").await;

        let created = add_link(&state, &admin, &link_form("Blog", "https://blog.example.com"))
            .await
            .unwrap();

        let links = list_links(&state).await.unwrap();
        let matching: Vec<_> = links.iter().filter(|l| l.id == created.id).collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].clicks, 0);
        assert_eq!(matching[0].user_id, admin.id);
    }

    #[tokio::test]
    async fn links_are_listed_newest_first() {
        let (state, _dir) = test_state().await;
        let admin = user(&state, "admin").await;
        add_link(&state, &admin, &link_form("First", "https://a.example.com")).await.unwrap();
        add_link(&state, &admin, &link_form("Second", "https://b.example.com")).await.unwrap();

        let titles: Vec<_> = list_links(&state).await.unwrap().into_iter().map(|l| l.title).collect();
        assert_eq!(titles, vec!["Second", "First"]);
    }

    #[tokio::test]
    async fn duplicate_title_is_rejected_without_change() {
        let (state, _dir) = test_state().await;
        let admin = user(&state, "admin").await;
        add_link(&state, &admin, &link_form("Blog", "https://blog.example.com")).await.unwrap();

        let err = add_link(&state, &admin, &link_form("Blog", "https://other.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(list_links(&state).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_title_is_allowed_for_another_user() {
        let (state, _dir) = test_state().await;
        let admin = user(&state, "admin").await;
        let other = user(&state, "other").await;
        add_link(&state, &admin, &link_form("Blog", "https://a.example.com")).await.unwrap();
        add_link(&state, &other, &link_form("Blog", "https://b.example.com")).await.unwrap();
        assert_eq!(list_links(&state).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let (state, _dir) = test_state().await;
        let admin = user(&state, "admin").await;
        let err = add_link(&state, &admin, &link_form("  ", "https://a.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(list_links(&state).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_owner_cannot_edit_or_delete() {
        let (state, _dir) = test_state().await;
        let admin = user(&state, "admin").await;
        let intruder = user(&state, "intruder").await;
        let link = add_link(&state, &admin, &link_form("Blog", "https://blog.example.com"))
            .await
            .unwrap();

        let err = edit_link(&state, &intruder, link.id, &link_form("Hacked", "https://evil.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
        let err = delete_link(&state, &intruder, link.id).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));

        assert_eq!(get_link(&state, link.id).await.unwrap(), Some(link));
    }

    #[tokio::test]
    async fn owner_edit_with_blank_fields_is_rejected() {
        let (state, _dir) = test_state().await;
        let admin = user(&state, "admin").await;
        let link = add_link(&state, &admin, &link_form("Blog", "https://blog.example.com"))
            .await
            .unwrap();

        for form in [
            link_form("", "https://journal.example.com"),
            link_form("Journal", "   "),
            LinkForm::default(),
        ] {
            let err = edit_link(&state, &admin, link.id, &form).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert_eq!(get_link(&state, link.id).await.unwrap(), Some(link));
    }

    #[tokio::test]
    async fn owner_edits_and_deletes() {
        let (state, _dir) = test_state().await;
        let admin = user(&state, "admin").await;
        let link = add_link(&state, &admin, &link_form("Blog", "https://blog.example.com"))
            .await
            .unwrap();

        let mut form = link_form("Journal", "https://journal.example.com");
        form.icon = Some("fas fa-book".to_string());
        let edited = edit_link(&state, &admin, link.id, &form).await.unwrap();
        assert_eq!(edited.title, "Journal");
        assert_eq!(edited.icon.as_deref(), Some("fas fa-book"));
        assert_eq!(edited.created_at, link.created_at);

        delete_link(&state, &admin, link.id).await.unwrap();
        assert!(get_link(&state, link.id).await.unwrap().is_none());
        assert!(matches!(
            delete_link(&state, &admin, link.id).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn click_increments_by_exactly_one() {
        let (state, _dir) = test_state().await;
        let admin = user(&state, "admin").await;
        let link = add_link(&state, &admin, &link_form("Blog", "https://blog.example.com"))
            .await
            .unwrap();

        let tracked = track_link_click(&state, link.id).await.unwrap();
        assert_eq!(tracked.clicks, 1);
        assert_eq!(tracked.url, "https://blog.example.com");
        assert_eq!(get_link(&state, link.id).await.unwrap().unwrap().clicks, 1);
    }

    #[tokio::test]
    async fn click_on_unknown_link_is_not_found() {
        let (state, _dir) = test_state().await;
        assert!(matches!(
            track_link_click(&state, 4242).await,
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            track_gear_click(&state, 4242).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn concurrent_clicks_are_not_lost() {
        let (state, _dir) = test_state().await;
        let admin = user(&state, "admin").await;
        let link = add_link(&state, &admin, &link_form("Blog", "https://blog.example.com"))
            .await
            .unwrap();

        let id = link.id;
        let mut handles = Vec::new();
        for _ in 0..100 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                track_link_click(&state, id).await.is_ok()
            }));
        }
        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        let clicks = get_link(&state, link.id).await.unwrap().unwrap().clicks;
        assert_eq!(clicks, succeeded);
        assert_eq!(succeeded, 100);
    }

    #[tokio::test]
    async fn gear_lifecycle() {
        let (state, _dir) = test_state().await;
        let gear = add_gear(&state, &gear_form("Headset")).await.unwrap();
        assert_eq!(gear.clicks, 0);

        let mut form = gear_form("Headset Pro");
        form.image_url = None;
        let edited = edit_gear(&state, gear.id, &form).await.unwrap();
        assert_eq!(edited.title, "Headset Pro");
        assert_eq!(edited.image, gear.image);

        assert_eq!(track_gear_click(&state, gear.id).await.unwrap().clicks, 1);

        delete_gear(&state, gear.id).await.unwrap();
        assert!(get_gear(&state, gear.id).await.unwrap().is_none());
        assert!(matches!(
            edit_gear(&state, gear.id, &gear_form("x")).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn gear_requires_every_field() {
        let (state, _dir) = test_state().await;
        let mut form = gear_form("Headset");
        form.price = None;
        assert!(matches!(
            add_gear(&state, &form).await,
            Err(AppError::Validation(_))
        ));
        assert!(list_gear(&state).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_gear_removes_local_image() {
        let (mut state, dir) = test_state().await;
        let uploads = local_store(&mut state, &dir);
        std::fs::write(uploads.join("chair.png"), b"png").unwrap();

        let mut form = gear_form("Chair");
        form.image_url = Some("chair.png".to_string());
        let gear = add_gear(&state, &form).await.unwrap();
        assert_eq!(gear.image, "/static/uploads/chair.png");

        delete_gear(&state, gear.id).await.unwrap();
        assert!(!uploads.join("chair.png").exists());
    }

    #[tokio::test]
    async fn shared_local_image_survives_until_last_user_is_gone() {
        let (mut state, dir) = test_state().await;
        let uploads = local_store(&mut state, &dir);
        std::fs::write(uploads.join("chair.png"), b"png").unwrap();

        let mut form = gear_form("Chair");
        form.image_url = Some("chair.png".to_string());
        let first = add_gear(&state, &form).await.unwrap();
        form.title = Some("Chair, black".to_string());
        let second = add_gear(&state, &form).await.unwrap();

        delete_gear(&state, first.id).await.unwrap();
        assert!(uploads.join("chair.png").exists());
        assert_eq!(
            get_gear(&state, second.id).await.unwrap().unwrap().image,
            "/static/uploads/chair.png"
        );

        delete_gear(&state, second.id).await.unwrap();
        assert!(!uploads.join("chair.png").exists());
    }

    #[tokio::test]
    async fn replacing_local_image_removes_the_old_file() {
        let (mut state, dir) = test_state().await;
        let uploads = local_store(&mut state, &dir);
        std::fs::write(uploads.join("old.png"), b"png").unwrap();
        std::fs::write(uploads.join("new.png"), b"png").unwrap();

        let mut form = gear_form("Desk");
        form.image_url = Some("old.png".to_string());
        let gear = add_gear(&state, &form).await.unwrap();

        form.image_url = Some("/static/uploads/new.png".to_string());
        let edited = edit_gear(&state, gear.id, &form).await.unwrap();
        assert_eq!(edited.image, "/static/uploads/new.png");
        assert!(!uploads.join("old.png").exists());
        assert!(uploads.join("new.png").exists());
    }

    #[tokio::test]
    async fn replacing_shared_image_keeps_the_old_file() {
        let (mut state, dir) = test_state().await;
        let uploads = local_store(&mut state, &dir);
        std::fs::write(uploads.join("old.png"), b"png").unwrap();

        let mut form = gear_form("Desk");
        form.image_url = Some("old.png".to_string());
        let gear = add_gear(&state, &form).await.unwrap();
        form.title = Some("Desk mat".to_string());
        add_gear(&state, &form).await.unwrap();

        form.title = Some("Desk".to_string());
        form.image_url = Some("https://cdn.example.com/desk.png".to_string());
        edit_gear(&state, gear.id, &form).await.unwrap();
        assert!(uploads.join("old.png").exists());
    }

    #[tokio::test]
    async fn upsert_creates_row_with_defaults() {
        let (state, _dir) = test_state().await;
        let admin = user(&state, "admin").await;
        assert!(get_preferences(&state, admin.id).await.unwrap().is_none());

        let update = PreferencesUpdate {
            site_title: Some("X".to_string()),
            ..Default::default()
        };
        let prefs = upsert_preferences(&state, admin.id, &update).await.unwrap();
        assert_eq!(prefs.site_title, "X");
        assert_eq!(prefs.site_description, "Your gaming destination");
        assert_eq!(prefs.profile_image, None);
        assert_eq!(prefs.background_color, "#000000");
        assert_eq!(prefs.accent_color, "#E50914");
        assert_eq!(prefs.text_color, "#ffffff");

        let update = PreferencesUpdate {
            accent_color: Some("#00ff00".to_string()),
            ..Default::default()
        };
        let prefs = upsert_preferences(&state, admin.id, &update).await.unwrap();
        assert_eq!(prefs.site_title, "X");
        assert_eq!(prefs.accent_color, "#00ff00");

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM preferences WHERE user_id = $1")
            .bind(admin.id)
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let (state, _dir) = test_state().await;
        let admin = bootstrap(&state, "admin", "secret").await.unwrap();
        let again = bootstrap(&state, "admin", "ignored").await.unwrap();
        assert_eq!(admin.id, again.id);

        let links = list_links_for_user(&state, admin.id).await.unwrap();
        assert_eq!(links.len(), 4);
        assert!(links.iter().any(|l| l.points_to_gear_page()));
        assert!(get_site_preferences(&state).await.unwrap().is_some());
        assert!(crate::utils::verify_password("secret", &again.password_hash));
    }
}
