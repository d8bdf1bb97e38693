//! Filesystem steps used by install and uninstall, either performed directly
//! or delegated one command at a time to an elevation program.

use crate::config::GeneralConfig;
use crate::error::OpsError;
use crate::executor;
use crate::model::Scope;
use log::debug;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

pub trait FileOps {
    fn create_dir_all(&self, dir: &Path) -> Result<(), OpsError>;
    fn copy(&self, from: &Path, to: &Path) -> Result<(), OpsError>;
    fn set_executable(&self, path: &Path) -> Result<(), OpsError>;
    fn write(&self, path: &Path, contents: &str) -> Result<(), OpsError>;
    fn remove(&self, path: &Path) -> Result<(), OpsError>;
    /// Rebuilds the entry cache for `applications`. A no-op for user scope.
    fn refresh(&self, applications: &Path) -> Result<(), OpsError>;
}

/// Plain filesystem calls with the caller's own permissions. `refresh` stays
/// empty for user scope; it is set for system scope when already running as root.
#[derive(Debug, Default)]
pub struct DirectOps {
    pub refresh: Vec<String>,
}

impl FileOps for DirectOps {
    fn create_dir_all(&self, dir: &Path) -> Result<(), OpsError> {
        fs::create_dir_all(dir).map_err(|e| OpsError::io(dir, e))
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), OpsError> {
        fs::copy(from, to).map(|_| ()).map_err(|e| OpsError::io(to, e))
    }

    fn set_executable(&self, path: &Path) -> Result<(), OpsError> {
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .map_err(|e| OpsError::io(path, e))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<(), OpsError> {
        fs::write(path, contents).map_err(|e| OpsError::io(path, e))
    }

    fn remove(&self, path: &Path) -> Result<(), OpsError> {
        fs::remove_file(path).map_err(|e| OpsError::io(path, e))
    }

    fn refresh(&self, applications: &Path) -> Result<(), OpsError> {
        if self.refresh.is_empty() {
            return Ok(());
        }
        let mut argv = self.refresh.clone();
        argv.push(applications.display().to_string());
        executor::run_checked(&argv).map_err(|reason| OpsError::Elevation {
            command: argv.join(" "),
            reason,
        })
    }
}

/// Every step is its own `<program> <command...>` invocation, e.g.
/// `pkexec cp a b`. Each one may prompt the user.
#[derive(Debug)]
pub struct ElevatedOps {
    pub program: String,
    pub refresh: Vec<String>,
}

impl ElevatedOps {
    fn run(&self, command: &[&str]) -> Result<(), OpsError> {
        let mut argv = Vec::with_capacity(command.len() + 1);
        argv.push(self.program.clone());
        argv.extend(command.iter().map(|s| s.to_string()));

        executor::run_checked(&argv).map_err(|reason| OpsError::Elevation {
            command: argv.join(" "),
            reason,
        })
    }
}

fn arg(path: &Path) -> String {
    path.display().to_string()
}

impl FileOps for ElevatedOps {
    fn create_dir_all(&self, dir: &Path) -> Result<(), OpsError> {
        let dir = arg(dir);
        self.run(&["mkdir", "-p", dir.as_str()])
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), OpsError> {
        let (from, to) = (arg(from), arg(to));
        self.run(&["cp", from.as_str(), to.as_str()])
    }

    fn set_executable(&self, path: &Path) -> Result<(), OpsError> {
        let path = arg(path);
        self.run(&["chmod", "755", path.as_str()])
    }

    fn write(&self, path: &Path, contents: &str) -> Result<(), OpsError> {
        let mut staged = tempfile::NamedTempFile::new().map_err(|e| OpsError::io(path, e))?;
        staged
            .write_all(contents.as_bytes())
            .and_then(|_| staged.flush())
            .map_err(|e| OpsError::io(staged.path(), e))?;

        // World-readable so the elevated `cp` yields a readable entry.
        fs::set_permissions(staged.path(), fs::Permissions::from_mode(0o644))
            .map_err(|e| OpsError::io(staged.path(), e))?;

        debug!("Staged {:?} for {:?}", staged.path(), path);
        self.copy(staged.path(), path)
    }

    fn remove(&self, path: &Path) -> Result<(), OpsError> {
        let path = arg(path);
        self.run(&["rm", "-f", path.as_str()])
    }

    fn refresh(&self, applications: &Path) -> Result<(), OpsError> {
        if self.refresh.is_empty() {
            return Ok(());
        }
        let mut command: Vec<&str> = self.refresh.iter().map(String::as_str).collect();
        let dir = arg(applications);
        command.push(dir.as_str());
        self.run(&command)
    }
}

/// How privileged steps are carried out for system scope.
#[derive(Debug, Clone)]
pub struct Privileges {
    pub elevation_command: String,
    pub refresh_command: Vec<String>,
}

impl From<&GeneralConfig> for Privileges {
    fn from(general: &GeneralConfig) -> Self {
        Self {
            elevation_command: general.elevation_command.clone(),
            refresh_command: general.refresh_command.clone(),
        }
    }
}

impl Privileges {
    /// System scope goes through the elevation program unless this process
    /// already runs as root.
    pub fn ops_for(&self, scope: Scope) -> Box<dyn FileOps + Send> {
        match scope {
            Scope::User => Box::new(DirectOps::default()),
            Scope::System if nix::unistd::geteuid().is_root() => Box::new(DirectOps {
                refresh: self.refresh_command.clone(),
            }),
            Scope::System => Box::new(ElevatedOps {
                program: self.elevation_command.clone(),
                refresh: self.refresh_command.clone(),
            }),
        }
    }
}
