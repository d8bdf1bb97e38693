use crate::model::{Category, Scope};
use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GeneralConfig {
    #[serde(default)]
    pub default_category: Category,
    #[serde(default = "default_elevation_command")]
    pub elevation_command: String,
    #[serde(default = "default_refresh_command")]
    pub refresh_command: Vec<String>,
}

fn default_elevation_command() -> String { "pkexec".to_string() }
fn default_refresh_command() -> Vec<String> { vec!["update-desktop-database".to_string()] }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_category: Category::default(),
            elevation_command: default_elevation_command(),
            refresh_command: default_refresh_command(),
        }
    }
}

/// Optional overrides for the per-scope directories.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct PathsConfig {
    pub user_applications: Option<PathBuf>,
    pub user_bin: Option<PathBuf>,
    pub user_icon_theme: Option<PathBuf>,
    pub system_applications: Option<PathBuf>,
    pub system_bin: Option<PathBuf>,
    pub system_icon_theme: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeDirs {
    pub applications: PathBuf,
    pub bin: PathBuf,
    pub icon_theme: PathBuf,   // hicolor root; sizes live below it
}

impl ScopeDirs {
    /// Where installed icons go.
    pub fn icons(&self) -> PathBuf {
        self.icon_theme.join("256x256").join("apps")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub user: ScopeDirs,
    pub system: ScopeDirs,
}

impl Layout {
    pub fn dirs(&self, scope: Scope) -> &ScopeDirs {
        match scope {
            Scope::User => &self.user,
            Scope::System => &self.system,
        }
    }

    /// Entries under the user applications directory are user scoped,
    /// everything else is treated as system wide.
    pub fn scope_of(&self, entry_path: &Path) -> Scope {
        if entry_path.starts_with(&self.user.applications) {
            Scope::User
        } else {
            Scope::System
        }
    }
}

impl Config {
    pub fn layout(&self) -> Layout {
        let defaults = default_layout();
        let p = &self.paths;
        Layout {
            user: ScopeDirs {
                applications: p.user_applications.clone().unwrap_or(defaults.user.applications),
                bin: p.user_bin.clone().unwrap_or(defaults.user.bin),
                icon_theme: p.user_icon_theme.clone().unwrap_or(defaults.user.icon_theme),
            },
            system: ScopeDirs {
                applications: p.system_applications.clone().unwrap_or(defaults.system.applications),
                bin: p.system_bin.clone().unwrap_or(defaults.system.bin),
                icon_theme: p.system_icon_theme.clone().unwrap_or(defaults.system.icon_theme),
            },
        }
    }
}

fn default_layout() -> Layout {
    let (data_dir, bin_dir) = match BaseDirs::new() {
        Some(base) => {
            let bin = base
                .executable_dir()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| base.home_dir().join(".local").join("bin"));
            (base.data_dir().to_path_buf(), bin)
        }
        None => (PathBuf::from(".local/share"), PathBuf::from(".local/bin")),
    };

    Layout {
        user: ScopeDirs {
            applications: data_dir.join("applications"),
            bin: bin_dir,
            icon_theme: data_dir.join("icons").join("hicolor"),
        },
        system: ScopeDirs {
            applications: PathBuf::from("/usr/share/applications"),
            bin: PathBuf::from("/usr/local/bin"),
            icon_theme: PathBuf::from("/usr/share/icons/hicolor"),
        },
    }
}

pub fn default_config_path() -> PathBuf {
    match ProjectDirs::from("org", "appmgr", "appmgr") {
        Some(dirs) => dirs.config_dir().join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("parsing {}", config_path.display()))?;
    Ok(config)
}
