//! Resolves facedeck's config and data directories, honouring environment
//! overrides so tests and packaged installs can relocate them.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "FACEDECK_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "FACEDECK_DATA_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "facedeck";
const APPLICATION: &str = "facedeck";
const CONFIG_FILE: &str = "facedeck.toml";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        let config_override = env_override(ENV_CONFIG_DIR);
        let data_override = env_override(ENV_DATA_DIR);
        if let (Some(config_dir), Some(data_dir)) = (&config_override, &data_override) {
            return Ok(Self {
                config_dir: config_dir.clone(),
                data_dir: data_dir.clone(),
            });
        }

        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;
        let config_dir = match config_override {
            Some(dir) => dir,
            None => ensure_directory(project_dirs.config_dir(), "config")?,
        };
        let data_dir = match data_override {
            Some(dir) => dir,
            None => ensure_directory(project_dirs.data_dir(), "data")?,
        };
        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Conventional target for `--frames-dir` dumps.
    pub fn frames_dir(&self) -> PathBuf {
        self.data_dir.join("frames")
    }
}

fn ensure_directory(path: &Path, label: &str) -> Result<PathBuf> {
    if !path.exists() {
        fs::create_dir_all(path).with_context(|| {
            format!(
                "failed to create facedeck {label} directory at {}",
                path.display()
            )
        })?;
    }
    Ok(path.to_path_buf())
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
