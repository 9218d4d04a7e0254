// src/appstream.rs

//! AppStream component listings
//!
//! AppStream data itself is parsed elsewhere. The pipeline only needs each
//! component's identifier, name, kind and package names, which it reads
//! through a [`ComponentSource`].

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// File read from every metadata directory by [`ComponentListSource`]
pub const COMPONENT_LIST: &str = "components.json";

/// A described software item (application, font, codec, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStreamComponent {
    #[serde(rename = "id")]
    pub identifier: String,

    pub name: String,

    /// `desktop-app`, `font`, ...
    pub kind: String,

    #[serde(default, rename = "packages")]
    pub package_names: Vec<String>,
}

impl AppStreamComponent {
    pub fn new(identifier: &str, name: &str, kind: &str, package_names: &[&str]) -> Self {
        Self {
            identifier: identifier.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            package_names: package_names.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Package name used for matching; only the first declared one counts
    pub fn package_name(&self) -> Option<&str> {
        self.package_names.first().map(String::as_str)
    }
}

/// Provider of AppStream components for a set of metadata directories
pub trait ComponentSource: Send + Sync {
    fn list_components(&self, metadata_dirs: &[PathBuf]) -> Result<Vec<AppStreamComponent>>;
}

/// Fixed component list, independent of the directories asked for
#[derive(Debug, Clone, Default)]
pub struct StaticComponentSource {
    components: Vec<AppStreamComponent>,
}

impl StaticComponentSource {
    pub fn new(components: Vec<AppStreamComponent>) -> Self {
        Self { components }
    }
}

impl ComponentSource for StaticComponentSource {
    fn list_components(&self, _metadata_dirs: &[PathBuf]) -> Result<Vec<AppStreamComponent>> {
        Ok(self.components.clone())
    }
}

/// Reads pre-extracted `components.json` listings.
///
/// Directories without a listing are skipped. When several directories
/// describe the same identifier, the first directory wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentListSource;

impl ComponentSource for ComponentListSource {
    fn list_components(&self, metadata_dirs: &[PathBuf]) -> Result<Vec<AppStreamComponent>> {
        let mut seen = HashSet::new();
        let mut components = Vec::new();

        for dir in metadata_dirs {
            let path = dir.join(COMPONENT_LIST);
            if !path.is_file() {
                debug!("No component listing in {}", dir.display());
                continue;
            }

            let listed: Vec<AppStreamComponent> = serde_json::from_slice(&fs::read(&path)?)?;
            let before = components.len();
            components.extend(
                listed
                    .into_iter()
                    .filter(|c| seen.insert(c.identifier.clone())),
            );
            info!(
                "Loaded {} components from {}",
                components.len() - before,
                path.display()
            );
        }

        Ok(components)
    }
}
