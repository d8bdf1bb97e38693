use crate::error::InstallError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Scope {
    User,
    System,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::User => write!(f, "user"),
            Scope::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Category {
    AudioVideo,
    Development,
    Education,
    Game,
    Graphics,
    Network,
    Office,
    Science,
    Settings,
    System,
    #[default]
    Utility,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::AudioVideo,
        Category::Development,
        Category::Education,
        Category::Game,
        Category::Graphics,
        Category::Network,
        Category::Office,
        Category::Science,
        Category::Settings,
        Category::System,
        Category::Utility,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::AudioVideo => "AudioVideo",
            Category::Development => "Development",
            Category::Education => "Education",
            Category::Game => "Game",
            Category::Graphics => "Graphics",
            Category::Network => "Network",
            Category::Office => "Office",
            Category::Science => "Science",
            Category::Settings => "Settings",
            Category::System => "System",
            Category::Utility => "Utility",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

impl TryFrom<String> for Category {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Everything needed to install one executable. Built once from user input
/// and consumed by the installer.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub executable: PathBuf,
    pub app_name: Option<String>,
    pub icon: Option<PathBuf>,
    pub category: Category,
    pub keywords: Option<String>,
    pub description: Option<String>,
    pub scope: Scope,
}

impl InstallRequest {
    pub fn builder(executable: impl Into<PathBuf>) -> InstallRequestBuilder {
        InstallRequestBuilder {
            executable: executable.into(),
            app_name: None,
            icon: None,
            category: Category::default(),
            keywords: None,
            description: None,
            scope: Scope::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstallRequestBuilder {
    executable: PathBuf,
    app_name: Option<String>,
    icon: Option<PathBuf>,
    category: Category,
    keywords: Option<String>,
    description: Option<String>,
    scope: Scope,
}

impl InstallRequestBuilder {
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = non_blank(name.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<PathBuf>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = non_blank(keywords.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = non_blank(description.into());
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn build(self) -> Result<InstallRequest, InstallError> {
        let readable = self.executable.is_file() && File::open(&self.executable).is_ok();
        if !readable {
            return Err(InstallError::InvalidRequest(format!(
                "{} is not a readable file",
                self.executable.display()
            )));
        }

        Ok(InstallRequest {
            executable: self.executable,
            app_name: self.app_name,
            icon: self.icon,
            category: self.category,
            keywords: self.keywords,
            description: self.description,
            scope: self.scope,
        })
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value) }
}

/// Key/value pairs of an entry file, in the order they were set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesktopEntry {
    fields: Vec<(String, String)>,
}

impl DesktopEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the value in place when `key` is already present.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    #[cfg(test)]
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl Serialize for DesktopEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct InstalledApp {
    pub path: PathBuf,          // Entry file on disk
    pub scope: Scope,           // Inferred from the directory it lives in
    pub entry: DesktopEntry,
    #[serde(skip)]
    pub program: Option<String>, // First token of the main group's Exec
}

impl InstalledApp {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// `Name` if present, otherwise the entry file's stem.
    pub fn display_name(&self) -> String {
        match self.entry.get("Name") {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Turns `my-cool-app.AppImage` into `My Cool App`.
pub fn guess_display_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    stem.replace('-', " ")
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}
