//! Global configuration for the SnackShop client runtime.
//!
//! Priority: environment > settings file > default.

use std::path::PathBuf;

use crate::settings;

const DEFAULT_API_URL: &str = "http://localhost:4000/api";

/// App shell resources pre-fetched into the static partition at install.
pub const SHELL_RESOURCES: &[&str] = &[
    "/",
    "/catalog",
    "/care-guide",
    "/orders",
    "/login",
    "/register",
    "/static/js/bundle.js",
    "/static/css/main.css",
    "/manifest.json",
];

#[derive(Debug, Clone)]
pub struct Configuration {
    /// REST API root, including the `/api` suffix.
    pub api_url: String,
    /// Realtime/asset origin: the API URL with the `/api` suffix stripped.
    pub origin_url: String,
    pub auth_token: String,
    /// Signed-in user whose broadcast room is joined on connect.
    pub user_id: Option<String>,
    pub home_dir: PathBuf,
    pub cache_db_path: PathBuf,
    pub settings_file: PathBuf,
    /// Generation tag for the resource cache, baked in at build time.
    pub generation_version: String,
    pub badge_available: bool,
}

impl Configuration {
    /// Create configuration from environment variables, the settings file,
    /// and defaults.
    pub fn create() -> anyhow::Result<Self> {
        // Home directory: SNACKSHOP_HOME env > ~/.snackshop
        let home_dir = if let Ok(home) = std::env::var("SNACKSHOP_HOME") {
            PathBuf::from(home)
        } else {
            let user_home = dirs_next::home_dir()
                .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
            user_home.join(".snackshop")
        };
        std::fs::create_dir_all(&home_dir)?;

        let settings_file = settings::settings_file_path(&home_dir);
        let stored = settings::read_settings(&settings_file)?;

        let api_url = std::env::var("SNACKSHOP_API_URL")
            .ok()
            .or(stored.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.into());
        let auth_token = std::env::var("SNACKSHOP_TOKEN")
            .ok()
            .or(stored.auth_token)
            .unwrap_or_default();
        let user_id = std::env::var("SNACKSHOP_USER_ID").ok().or(stored.user_id);

        Ok(Self {
            origin_url: origin_from_api_url(&api_url),
            api_url,
            auth_token,
            user_id,
            cache_db_path: home_dir.join("cache.db"),
            settings_file,
            home_dir,
            generation_version: env!("CARGO_PKG_VERSION").to_string(),
            badge_available: stored.badge_available.unwrap_or(true),
        })
    }

    pub fn shell_resources(&self) -> Vec<String> {
        SHELL_RESOURCES.iter().map(|s| s.to_string()).collect()
    }
}

/// The realtime server and app shell live at the API origin without the
/// `/api` suffix.
pub fn origin_from_api_url(api_url: &str) -> String {
    api_url
        .strip_suffix("/api")
        .or_else(|| api_url.strip_suffix("/api/"))
        .unwrap_or(api_url)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_strips_api_suffix() {
        assert_eq!(
            origin_from_api_url("https://shop.example.com/api"),
            "https://shop.example.com"
        );
        assert_eq!(
            origin_from_api_url("http://localhost:4000/api"),
            "http://localhost:4000"
        );
        // No suffix: unchanged.
        assert_eq!(
            origin_from_api_url("https://shop.example.com"),
            "https://shop.example.com"
        );
    }

    #[test]
    fn shell_resources_cover_routes_and_assets() {
        assert!(SHELL_RESOURCES.contains(&"/"));
        assert!(SHELL_RESOURCES.contains(&"/catalog"));
        assert!(SHELL_RESOURCES.contains(&"/manifest.json"));
        assert!(SHELL_RESOURCES.iter().any(|r| r.ends_with(".js")));
        assert!(SHELL_RESOURCES.iter().any(|r| r.ends_with(".css")));
    }
}
