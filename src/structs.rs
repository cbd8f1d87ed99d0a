use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Internal route alias that points a link at the gear page.
pub const GEAR_PAGE_ALIAS: &str = "/gear";

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, FromRow)]
pub struct Link {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub icon: Option<String>,
    pub clicks: i64,
    pub created_at: DateTime<Utc>,
    pub user_id: i64,
}

impl Link {
    pub fn points_to_gear_page(&self) -> bool {
        self.url == GEAR_PAGE_ALIAS
    }
}

/// Flat public view of a link, as served by `/api/links`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LinkSummary {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub icon: Option<String>,
    pub clicks: i64,
}

impl From<Link> for LinkSummary {
    fn from(link: Link) -> Self {
        Self {
            id: link.id,
            title: link.title,
            url: link.url,
            icon: link.icon,
            clicks: link.clicks,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, FromRow)]
pub struct Gear {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price: String,
    pub url: String,
    pub image: String,
    pub clicks: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, FromRow)]
pub struct Preferences {
    pub id: i64,
    pub user_id: i64,
    pub site_title: String,
    pub site_description: String,
    pub profile_image: Option<String>,
    pub background_color: String,
    pub accent_color: String,
    pub text_color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct LinkForm {
    pub title: Option<String>,
    pub url: Option<String>,
    pub icon: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct GearForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
}

/// Partial preferences update; absent fields keep their stored value.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct PreferencesUpdate {
    pub site_title: Option<String>,
    pub site_description: Option<String>,
    pub profile_image: Option<String>,
    pub background_color: Option<String>,
    pub accent_color: Option<String>,
    pub text_color: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct MutationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<CreatedLink>,
}

impl MutationResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            link: None,
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            link: None,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct CreatedLink {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub icon: Option<String>,
}

impl From<&Link> for CreatedLink {
    fn from(link: &Link) -> Self {
        Self {
            id: link.id,
            title: link.title.clone(),
            url: link.url.clone(),
            icon: link.icon.clone(),
        }
    }
}

/// Trims a form value, treating blank input the same as a missing field.
pub fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
