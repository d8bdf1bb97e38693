use crate::config::{Config, Layout};
use crate::desktop;
use crate::error::InstallError;
use crate::icon;
use crate::model::{DesktopEntry, InstallRequest, Scope};
use crate::ops::{FileOps, Privileges};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    DirectoriesReady,
    ExecutableInstalled,
    IconInstalled,
    EntryWritten,
    Finished,
}

#[derive(Debug, Clone)]
pub struct Installed {
    pub entry: DesktopEntry,
    pub entry_path: PathBuf,
    pub executable_path: PathBuf,
    pub icon_path: Option<PathBuf>,
}

pub struct Installer {
    layout: Layout,
    privileges: Privileges,
}

impl Installer {
    pub fn new(config: &Config) -> Self {
        Self::with_layout(config.layout(), Privileges::from(&config.general))
    }

    pub fn with_layout(layout: Layout, privileges: Privileges) -> Self {
        Self { layout, privileges }
    }

    #[cfg(test)]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn install(
        &self,
        request: InstallRequest,
        progress: impl FnMut(Milestone),
    ) -> Result<Installed, InstallError> {
        let ops = self.privileges.ops_for(request.scope);
        self.install_with(ops.as_ref(), request, progress)
    }

    /// Runs the install steps in order. Nothing already written is undone when
    /// a later step fails.
    pub fn install_with(
        &self,
        ops: &dyn FileOps,
        request: InstallRequest,
        mut progress: impl FnMut(Milestone),
    ) -> Result<Installed, InstallError> {
        let dirs = self.layout.dirs(request.scope);
        let icon_dir = dirs.icons();

        if request.scope == Scope::User {
            for dir in [&dirs.applications, &dirs.bin, &icon_dir] {
                ops.create_dir_all(dir)?;
            }
        }
        progress(Milestone::DirectoriesReady);

        let source_name = file_name(&request.executable)?;
        let exe_name = executable_name(&source_name, request.app_name.as_deref());
        let base = base_name(&exe_name);

        let exe_path = dirs.bin.join(&exe_name);
        ops.copy(&request.executable, &exe_path)?;
        ops.set_executable(&exe_path)?;
        info!("Installed executable {:?}", exe_path);
        progress(Milestone::ExecutableInstalled);

        let icon_path = match &request.icon {
            Some(source) => {
                let dest = icon_dir.join(format!("{}.png", base));
                ops.copy(source, &dest)?;
                progress(Milestone::IconInstalled);
                Some(dest)
            }
            None => None,
        };

        let source_stem = Path::new(&source_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| source_name.clone());

        let mut entry = DesktopEntry::new();
        entry.set("Name", request.app_name.clone().unwrap_or(source_stem));
        entry.set("Exec", exe_path.display().to_string());
        entry.set("Type", "Application");
        entry.set("Categories", request.category.to_string());
        if icon_path.is_some() {
            entry.set("Icon", base.clone());
        }
        if let Some(keywords) = &request.keywords {
            entry.set("Keywords", keywords.clone());
        }
        if let Some(description) = &request.description {
            entry.set("Comment", description.clone());
        }

        let entry_path = dirs
            .applications
            .join(format!("{}.{}", base, desktop::EXTENSION));
        ops.write(&entry_path, &desktop::serialize(&entry))?;
        info!("Wrote {:?}", entry_path);
        progress(Milestone::EntryWritten);

        if request.scope == Scope::System {
            ops.refresh(&dirs.applications)?;
        }
        progress(Milestone::Finished);

        Ok(Installed {
            entry,
            entry_path,
            executable_path: exe_path,
            icon_path,
        })
    }
}

fn file_name(path: &Path) -> Result<String, InstallError> {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| InstallError::InvalidRequest(format!("{} has no file name", path.display())))
}

/// File name the executable is installed under. A supplied app name is
/// lowercased with whitespace and `/` turned into dashes; bundles keep their
/// extension.
pub fn executable_name(source_name: &str, app_name: Option<&str>) -> String {
    let Some(mut slug) = app_name.map(slugify).filter(|s| !s.is_empty()) else {
        return source_name.to_string();
    };

    let source = Path::new(source_name);
    if icon::is_bundle(source) && !icon::is_bundle(Path::new(&slug)) {
        if let Some(ext) = source.extension() {
            slug.push('.');
            slug.push_str(&ext.to_string_lossy());
        }
    }
    slug
}

/// Control characters are dropped and leading dots stripped, so the result is
/// always a single plain path component.
fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() || c == '/' || c == '\\' => Some('-'),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    slug.trim_start_matches('.').to_string()
}

pub fn base_name(exe_name: &str) -> String {
    Path::new(exe_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| exe_name.to_string())
}
