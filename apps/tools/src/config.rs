use std::{collections::HashMap, fs};

#[derive(Debug)]
pub struct Settings {
    pub database_url: String,
    pub target_database_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/plateshare.db".into(),
            target_database_url: "sqlite://./data/documents.db".into(),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("plateshare.toml") {
        apply_file_overrides(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Ok(v) = std::env::var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Ok(v) = std::env::var("TARGET_DATABASE_URL") {
        settings.target_database_url = v;
    }
    if let Ok(v) = std::env::var("APP__TARGET_DATABASE_URL") {
        settings.target_database_url = v;
    }

    settings
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
        if let Some(v) = file_cfg.get("database_url") {
            settings.database_url = v.clone();
        }
        if let Some(v) = file_cfg.get("target_database_url") {
            settings.target_database_url = v.clone();
        }
    }
}
