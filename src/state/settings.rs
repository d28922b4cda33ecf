// SPDX-License-Identifier: MPL-2.0

use crate::config::{
    APP_ID, DEFAULT_PDS, MAX_TIMELINE_SIZE, TIMELINE_ADD_PAGE_SIZE, TIMELINE_DELETE_SIZE,
    TIMELINE_NEXT_PAGE_THRESHOLD, TIMELINE_PREPEND_PAGE_SIZE, TIMELINE_SYNC_PAGE_SIZE,
};
use crate::atproto::MAX_PAGE_LIMIT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid service URL {url}: {reason}")]
    InvalidServiceUrl { url: String, reason: String },
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Tunables of timeline paging, persisted as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingSettings {
    pub service_url: String,
    pub max_timeline_size: usize,
    pub add_page_size: usize,
    pub prepend_page_size: usize,
    pub sync_page_size: usize,
    pub delete_size: usize,
    pub next_page_threshold: usize,
}

impl Default for PagingSettings {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_PDS.to_string(),
            max_timeline_size: MAX_TIMELINE_SIZE,
            add_page_size: TIMELINE_ADD_PAGE_SIZE,
            prepend_page_size: TIMELINE_PREPEND_PAGE_SIZE,
            sync_page_size: TIMELINE_SYNC_PAGE_SIZE,
            delete_size: TIMELINE_DELETE_SIZE,
            next_page_threshold: TIMELINE_NEXT_PAGE_THRESHOLD,
        }
    }
}

impl PagingSettings {
    /// Get the settings file path (~/.config/io.github.sethcottle.Skyline/paging.json)
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push(APP_ID);
            p.push("paging.json");
            p
        })
    }

    /// Load settings from disk, or return defaults if missing or invalid
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(SettingsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(e) => {
                tracing::warn!("ignoring {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::debug!("saved paging settings to {}", path.display());

        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let url = url::Url::parse(&self.service_url).map_err(|e| {
            SettingsError::InvalidServiceUrl {
                url: self.service_url.clone(),
                reason: e.to_string(),
            }
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SettingsError::InvalidServiceUrl {
                url: self.service_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        for (name, size) in [
            ("add_page_size", self.add_page_size),
            ("prepend_page_size", self.prepend_page_size),
            ("sync_page_size", self.sync_page_size),
        ] {
            if size == 0 || size > MAX_PAGE_LIMIT {
                return Err(SettingsError::Invalid {
                    name,
                    reason: format!("{size} not within 1..={MAX_PAGE_LIMIT}"),
                });
            }
        }

        // A tail eviction must be able to cut at a page boundary
        if self.delete_size < self.add_page_size.max(self.sync_page_size) {
            return Err(SettingsError::Invalid {
                name: "delete_size",
                reason: format!("{} is smaller than a page", self.delete_size),
            });
        }

        if self.max_timeline_size <= self.add_page_size.max(self.sync_page_size) {
            return Err(SettingsError::Invalid {
                name: "max_timeline_size",
                reason: format!("{} leaves no room for a page", self.max_timeline_size),
            });
        }

        Ok(())
    }
}
