use crate::config::{Config, Layout};
use crate::desktop;
use crate::error::{LaunchError, RemoveError};
use crate::executor;
use crate::icon;
use crate::model::{InstalledApp, Scope};
use crate::ops::{FileOps, Privileges};
use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Entry files found in the user and system applications directories.
pub struct Catalog {
    layout: Layout,
    privileges: Privileges,
}

impl Catalog {
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

    /// User entries first, then system ones, each in directory-listing order.
    pub fn list(&self) -> Vec<InstalledApp> {
        let mut apps = Vec::new();

        for dir in [&self.layout.user.applications, &self.layout.system.applications] {
            if !dir.exists() { continue; }

            debug!("Scanning desktop files in {:?}", dir);
            let Ok(read_dir) = fs::read_dir(dir) else {
                warn!("Cannot read {:?}", dir);
                continue;
            };

            for entry in read_dir.flatten() {
                let path = entry.path();
                if !desktop::is_entry_file(&path) || !path.is_file() { continue; }

                match self.open(&path) {
                    Ok(app) => apps.push(app),
                    Err(e) => warn!("Skipping {:?}: {}", path, e),
                }
            }
        }

        info!("Catalog: found {} entries", apps.len());
        apps
    }

    /// Reads an entry file leniently. The launch program comes from the first
    /// `Exec` line, while `entry` keeps the last value of every key.
    pub fn open(&self, path: &Path) -> io::Result<InstalledApp> {
        let content = fs::read_to_string(path)?;
        Ok(InstalledApp {
            path: path.to_path_buf(),
            scope: self.layout.scope_of(path),
            entry: desktop::parse(&content),
            program: desktop::exec_program(&content),
        })
    }

    /// Resolves a CLI argument: a path to an entry file, or a file name or
    /// stem looked up in the user directory, then the system one.
    pub fn find(&self, name: &str) -> Option<InstalledApp> {
        let as_path = Path::new(name);
        if as_path.is_file() {
            return self.open(as_path).ok();
        }

        let file_name = if desktop::is_entry_file(as_path) {
            name.to_string()
        } else {
            format!("{}.{}", name, desktop::EXTENSION)
        };

        [&self.layout.user.applications, &self.layout.system.applications]
            .into_iter()
            .map(|dir| dir.join(&file_name))
            .find(|p| p.is_file())
            .and_then(|p| self.open(&p).ok())
    }

    pub fn display_icon(&self, app: &InstalledApp) -> Option<PathBuf> {
        let name = app.entry.get("Icon")?;
        let as_path = Path::new(name);
        if as_path.is_absolute() && as_path.exists() {
            return Some(as_path.to_path_buf());
        }
        icon::lookup_display_icon(&self.layout, name)
    }

    pub fn launch(&self, app: &InstalledApp) -> Result<u32, LaunchError> {
        let program = app
            .program
            .as_deref()
            .ok_or_else(|| LaunchError::MissingExec(app.path.clone()))?;

        let pid = executor::spawn_detached(program).map_err(|source| LaunchError::Spawn {
            program: program.to_string(),
            source,
        })?;
        info!("Launched {} (pid {})", program, pid);
        Ok(pid)
    }

    pub fn remove(&self, app: &InstalledApp) -> Result<(), RemoveError> {
        let ops = self.privileges.ops_for(app.scope);
        self.remove_with(ops.as_ref(), app)
    }

    /// Deletes the entry file, and the executable it points at when that lives
    /// in the bin directory of the entry's own scope.
    pub fn remove_with(&self, ops: &dyn FileOps, app: &InstalledApp) -> Result<(), RemoveError> {
        if !app.path.exists() {
            return Err(RemoveError::NotFound(app.path.clone()));
        }

        let dirs = self.layout.dirs(app.scope);
        let owned_executable = app
            .program
            .as_deref()
            .and_then(|program| inside_dir(&dirs.bin, Path::new(program)));

        ops.remove(&app.path)?;
        info!("Removed {:?}", app.path);

        if let Some(exe) = owned_executable {
            if exe.exists() {
                ops.remove(&exe)?;
                info!("Removed {:?}", exe);
            }
        }

        if app.scope == Scope::System {
            ops.refresh(&dirs.applications)?;
        }
        Ok(())
    }
}

/// `path` itself when it names a file inside `dir`. Relative paths,
/// `..` components and parents that resolve outside `dir` through symlinks
/// are all rejected.
fn inside_dir(dir: &Path, path: &Path) -> Option<PathBuf> {
    let plain = path.is_absolute()
        && path
            .components()
            .all(|c| matches!(c, Component::RootDir | Component::Normal(_)));
    if !plain || !path.starts_with(dir) || path == dir {
        return None;
    }

    let parent = path.parent()?.canonicalize().ok()?;
    let dir = dir.canonicalize().ok()?;
    parent.starts_with(&dir).then(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeDirs;
    use crate::installer::Installer;
    use crate::model::InstallRequest;
    use crate::ops::{DirectOps, ElevatedOps};
    use std::os::unix::fs::PermissionsExt;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn layout_in(root: &Path) -> Layout {
        let scope = |name: &str| ScopeDirs {
            applications: root.join(name).join("applications"),
            bin: root.join(name).join("bin"),
            icon_theme: root.join(name).join("icons/hicolor"),
        };
        Layout { user: scope("user"), system: scope("system") }
    }

    fn privileges() -> Privileges {
        Privileges {
            elevation_command: "env".to_string(),
            refresh_command: vec!["true".to_string()],
        }
    }

    fn write_entry(dir: &Path, name: &str, content: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn names(apps: &[InstalledApp]) -> Vec<String> {
        let mut names: Vec<String> = apps.iter().map(InstalledApp::file_name).collect();
        names.sort();
        names
    }

    #[test]
    fn list_scans_both_directories_non_recursively() {
        let root = TempDir::new().unwrap();
        let layout = layout_in(root.path());
        write_entry(&layout.user.applications, "mine.desktop", "Name=Mine\n");
        write_entry(&layout.user.applications, "notes.txt", "Name=Nope\n");
        write_entry(&layout.user.applications.join("nested"), "deep.desktop", "Name=Deep\n");
        write_entry(&layout.system.applications, "shared.desktop", "Name=Shared\n");

        let catalog = Catalog::with_layout(layout, privileges());
        let apps = catalog.list();

        assert_eq!(names(&apps), ["mine.desktop", "shared.desktop"]);
        let mine = apps.iter().find(|a| a.file_name() == "mine.desktop").unwrap();
        assert_eq!(mine.scope, Scope::User);
        let shared = apps.iter().find(|a| a.file_name() == "shared.desktop").unwrap();
        assert_eq!(shared.scope, Scope::System);
        assert_eq!(shared.display_name(), "Shared");
    }

    #[test]
    fn list_tolerates_missing_directories() {
        let root = TempDir::new().unwrap();
        let catalog = Catalog::with_layout(layout_in(root.path()), privileges());
        assert!(catalog.list().is_empty());
    }

    #[test]
    fn read_skips_malformed_lines() {
        let root = TempDir::new().unwrap();
        let layout = layout_in(root.path());
        let path = write_entry(
            &layout.user.applications,
            "odd.desktop",
            "[Desktop Entry]\nName=Odd\njust some words\nExec=/bin/true\n",
        );

        let entry = Catalog::with_layout(layout, privileges()).open(&path).unwrap().entry;
        assert_eq!(entry.keys().collect::<Vec<_>>(), ["Name", "Exec"]);
    }

    #[test]
    fn find_accepts_path_file_name_or_stem() {
        let root = TempDir::new().unwrap();
        let layout = layout_in(root.path());
        let user = write_entry(&layout.user.applications, "tool.desktop", "Name=User\n");
        write_entry(&layout.system.applications, "tool.desktop", "Name=System\n");
        write_entry(&layout.system.applications, "other.desktop", "Name=Other\n");
        let catalog = Catalog::with_layout(layout, privileges());

        assert_eq!(catalog.find("tool").unwrap().path, user);
        assert_eq!(catalog.find("tool.desktop").unwrap().display_name(), "User");
        assert_eq!(catalog.find("other").unwrap().scope, Scope::System);
        assert_eq!(catalog.find(user.to_str().unwrap()).unwrap().path, user);
        assert!(catalog.find("missing").is_none());
    }

    #[test]
    fn remove_user_entry_deletes_owned_executable() {
        let root = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let exe = src.path().join("tool");
        fs::write(&exe, "binary").unwrap();

        let layout = layout_in(root.path());
        let installer = Installer::with_layout(layout.clone(), privileges());
        let installed = installer
            .install(InstallRequest::builder(&exe).build().unwrap(), |_| {})
            .unwrap();

        let catalog = Catalog::with_layout(layout, privileges());
        let app = catalog.open(&installed.entry_path).unwrap();
        assert_eq!(app.scope, Scope::User);

        catalog.remove(&app).unwrap();
        assert!(!installed.entry_path.exists());
        assert!(!installed.executable_path.exists());
        assert!(exe.exists());
        assert!(catalog.list().iter().all(|a| a.path != installed.entry_path));
    }

    #[test]
    fn remove_keeps_executables_outside_bin() {
        let root = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let exe = elsewhere.path().join("tool");
        fs::write(&exe, "binary").unwrap();

        let layout = layout_in(root.path());
        let path = write_entry(
            &layout.user.applications,
            "tool.desktop",
            &format!("Name=Tool\nExec={} %U\n", exe.display()),
        );
        let catalog = Catalog::with_layout(layout, privileges());
        let app = catalog.open(&path).unwrap();

        catalog.remove_with(&DirectOps::default(), &app).unwrap();
        assert!(!path.exists());
        assert!(exe.exists());
    }

    #[test]
    fn remove_never_deletes_outside_bin_through_parent_components() {
        let root = TempDir::new().unwrap();
        let layout = layout_in(root.path());
        fs::create_dir_all(&layout.user.bin).unwrap();
        let victim = root.path().join("victim");
        fs::write(&victim, "keep me").unwrap();

        let path = write_entry(
            &layout.user.applications,
            "sneaky.desktop",
            &format!("Name=Sneaky\nExec={}/../../victim\n", layout.user.bin.display()),
        );
        let catalog = Catalog::with_layout(layout, privileges());
        let app = catalog.open(&path).unwrap();

        catalog.remove_with(&DirectOps::default(), &app).unwrap();
        assert!(!path.exists());
        assert!(victim.exists());
    }

    #[test]
    fn remove_never_follows_symlinked_directories_out_of_bin() {
        let root = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let victim = elsewhere.path().join("tool");
        fs::write(&victim, "keep me").unwrap();

        let layout = layout_in(root.path());
        fs::create_dir_all(&layout.user.bin).unwrap();
        std::os::unix::fs::symlink(elsewhere.path(), layout.user.bin.join("escape")).unwrap();

        let path = write_entry(
            &layout.user.applications,
            "linked.desktop",
            &format!("Name=Linked\nExec={}/escape/tool\n", layout.user.bin.display()),
        );
        let catalog = Catalog::with_layout(layout, privileges());
        let app = catalog.open(&path).unwrap();

        catalog.remove_with(&DirectOps::default(), &app).unwrap();
        assert!(!path.exists());
        assert!(victim.exists());
    }

    #[test]
    fn remove_uses_main_exec_not_action_exec() {
        let root = TempDir::new().unwrap();
        let layout = layout_in(root.path());
        fs::create_dir_all(&layout.user.bin).unwrap();
        let exe = layout.user.bin.join("tool");
        fs::write(&exe, "binary").unwrap();

        let path = write_entry(
            &layout.user.applications,
            "tool.desktop",
            &format!(
                "[Desktop Entry]\nName=Tool\nExec={} %U\n\n[Desktop Action new]\nName=New Window\nExec=/usr/bin/other --new\n",
                exe.display()
            ),
        );
        let catalog = Catalog::with_layout(layout, privileges());
        let app = catalog.open(&path).unwrap();
        assert_eq!(app.program.as_deref(), exe.to_str());

        catalog.remove_with(&DirectOps::default(), &app).unwrap();
        assert!(!path.exists());
        assert!(!exe.exists());
    }

    #[test]
    fn remove_system_entry_uses_elevation_and_cleans_bin() {
        let root = TempDir::new().unwrap();
        let layout = layout_in(root.path());
        fs::create_dir_all(&layout.system.bin).unwrap();
        let exe = layout.system.bin.join("tool");
        fs::write(&exe, "binary").unwrap();
        let path = write_entry(
            &layout.system.applications,
            "tool.desktop",
            &format!("Name=Tool\nExec={}\n", exe.display()),
        );

        let catalog = Catalog::with_layout(layout, privileges());
        let app = catalog.open(&path).unwrap();
        assert_eq!(app.scope, Scope::System);

        let ops = ElevatedOps { program: "env".to_string(), refresh: vec!["true".to_string()] };
        catalog.remove_with(&ops, &app).unwrap();
        assert!(!path.exists());
        assert!(!exe.exists());
    }

    #[test]
    fn remove_missing_entry_is_not_found() {
        let root = TempDir::new().unwrap();
        let layout = layout_in(root.path());
        let path = write_entry(&layout.user.applications, "gone.desktop", "Name=Gone\n");
        let catalog = Catalog::with_layout(layout, privileges());
        let app = catalog.open(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert!(matches!(catalog.remove(&app), Err(RemoveError::NotFound(_))));
    }

    #[test]
    fn launch_without_exec_is_an_error() {
        let root = TempDir::new().unwrap();
        let layout = layout_in(root.path());
        let path = write_entry(&layout.user.applications, "noexec.desktop", "Name=NoExec\n");
        let catalog = Catalog::with_layout(layout, privileges());
        let app = catalog.open(&path).unwrap();

        assert!(matches!(catalog.launch(&app), Err(LaunchError::MissingExec(_))));
    }

    #[test]
    fn launch_reports_spawn_failure() {
        let root = TempDir::new().unwrap();
        let layout = layout_in(root.path());
        let path = write_entry(
            &layout.user.applications,
            "broken.desktop",
            "Name=Broken\nExec=/definitely/not/here %F\n",
        );
        let catalog = Catalog::with_layout(layout, privileges());
        let app = catalog.open(&path).unwrap();

        match catalog.launch(&app) {
            Err(LaunchError::Spawn { program, .. }) => assert_eq!(program, "/definitely/not/here"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn launch_runs_first_exec_token() {
        let root = TempDir::new().unwrap();
        let layout = layout_in(root.path());
        let marker = root.path().join("launched");
        fs::create_dir_all(&layout.user.bin).unwrap();
        let script = layout.user.bin.join("tool");
        fs::write(&script, format!("#!/bin/sh\ntouch {}\n", marker.display())).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let path = write_entry(
            &layout.user.applications,
            "tool.desktop",
            &format!("Name=Tool\nExec={} %U\n", script.display()),
        );
        let catalog = Catalog::with_layout(layout, privileges());
        let app = catalog.open(&path).unwrap();

        catalog.launch(&app).unwrap();
        for _ in 0..50 {
            if marker.exists() { break; }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(marker.exists());
    }

    #[test]
    fn launch_runs_main_exec_when_actions_follow() {
        let root = TempDir::new().unwrap();
        let layout = layout_in(root.path());
        let marker = root.path().join("launched");
        let action_marker = root.path().join("action");
        fs::create_dir_all(&layout.user.bin).unwrap();
        let script = layout.user.bin.join("tool");
        let action = layout.user.bin.join("other");
        fs::write(&script, format!("#!/bin/sh\ntouch {}\n", marker.display())).unwrap();
        fs::write(&action, format!("#!/bin/sh\ntouch {}\n", action_marker.display())).unwrap();
        for file in [&script, &action] {
            fs::set_permissions(file, fs::Permissions::from_mode(0o755)).unwrap();
        }

        let path = write_entry(
            &layout.user.applications,
            "tool.desktop",
            &format!(
                "[Desktop Entry]\nName=Tool\nExec={}\n[Desktop Action new]\nExec={}\n",
                script.display(),
                action.display()
            ),
        );
        let catalog = Catalog::with_layout(layout, privileges());
        catalog.launch(&catalog.open(&path).unwrap()).unwrap();

        for _ in 0..50 {
            if marker.exists() { break; }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(marker.exists());
        assert!(!action_marker.exists());
    }

    #[test]
    fn display_icon_falls_back_to_system_theme() {
        let root = TempDir::new().unwrap();
        let layout = layout_in(root.path());
        let path = write_entry(&layout.user.applications, "tool.desktop", "Name=Tool\nIcon=tool\n");
        let icon = layout.system.icon_theme.join("64x64/apps/tool.png");
        fs::create_dir_all(icon.parent().unwrap()).unwrap();
        fs::write(&icon, "png").unwrap();

        let catalog = Catalog::with_layout(layout, privileges());
        let app = catalog.open(&path).unwrap();
        assert_eq!(catalog.display_icon(&app), Some(icon));

        let bare = write_entry(&catalog.layout().user.applications, "bare.desktop", "Name=Bare\n");
        assert_eq!(catalog.display_icon(&catalog.open(&bare).unwrap()), None);
    }
}
