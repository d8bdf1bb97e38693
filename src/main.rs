mod catalog;
mod config;
mod desktop;
mod error;
mod executor;
mod icon;
mod installer;
mod matcher;
mod model;
mod ops;
mod worker;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::mpsc::Receiver;

use crate::catalog::Catalog;
use crate::config::{Config, load_config};
use crate::error::{InstallError, ResolveError};
use crate::installer::{Installed, Installer, Milestone};
use crate::matcher::FuzzyMatcher;
use crate::model::{Category, InstallRequest, InstalledApp, Scope, guess_display_name};
use crate::worker::{Event, Slot, spawn_job};

static INSTALLER_SLOT: LazyLock<Slot> = LazyLock::new(|| Slot::new("installer"));
static RESOLVER_SLOT: LazyLock<Slot> = LazyLock::new(|| Slot::new("icon resolver"));

#[derive(Parser, Debug)]
#[command(author, version, about = "Install executables and AppImages as desktop applications", long_about = None)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy an executable into a bin directory and create a desktop entry for it
    Install(InstallArgs),
    /// Extract the icon shipped inside an AppImage
    ExtractIcon {
        bundle: PathBuf,
    },
    /// List installed desktop entries
    List {
        /// Fuzzy filter on name or file name
        #[arg(short, long)]
        filter: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show the fields of an entry
    Show {
        /// Entry file path, file name or stem
        entry: String,
        #[arg(long)]
        json: bool,
    },
    /// Launch the program an entry points at
    Launch {
        entry: String,
    },
    /// Remove an entry and the executable installed with it
    Remove {
        entry: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct InstallArgs {
    executable: PathBuf,

    /// Application name; guessed from the file name when omitted
    #[arg(short, long)]
    name: Option<String>,

    /// Do not guess a name, keep the file name as is
    #[arg(long, conflicts_with = "name")]
    keep_file_name: bool,

    /// Icon image to install alongside
    #[arg(short, long, conflicts_with = "extract_icon")]
    icon: Option<PathBuf>,

    /// Take the icon from inside the AppImage
    #[arg(short = 'x', long)]
    extract_icon: bool,

    #[arg(short, long)]
    category: Option<Category>,

    /// Comma separated search keywords
    #[arg(short, long)]
    keywords: Option<String>,

    #[arg(short, long)]
    description: Option<String>,

    /// Install for all users (requires admin privileges)
    #[arg(long)]
    system: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    yes: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Install(args) => install(&config, args),
        Command::ExtractIcon { bundle } => extract_icon(&bundle),
        Command::List { filter, json } => list(&config, filter.as_deref(), json),
        Command::Show { entry, json } => show(&config, &entry, json),
        Command::Launch { entry } => {
            let catalog = Catalog::new(&config);
            let app = find(&catalog, &entry)?;
            catalog.launch(&app)?;
            println!("Launched {}", app.display_name());
            Ok(())
        }
        Command::Remove { entry, yes } => {
            let catalog = Catalog::new(&config);
            let app = find(&catalog, &entry)?;
            let question = format!("Are you sure you want to uninstall {}?", app.display_name());
            if !yes && !confirm(&question)? {
                return Ok(());
            }
            catalog.remove(&app)?;
            println!("Application uninstalled successfully.");
            Ok(())
        }
    }
}

fn install(config: &Config, args: InstallArgs) -> Result<()> {
    let scope = if args.system { Scope::System } else { Scope::User };
    if scope == Scope::System && !args.yes {
        let question = "You are about to install this application system-wide.\n\
                        This requires administrative privileges and will affect all users on this system.\n\
                        Are you sure you want to continue?";
        if !confirm(question)? {
            return Ok(());
        }
    }

    let mut builder = InstallRequest::builder(&args.executable)
        .category(args.category.unwrap_or(config.general.default_category))
        .scope(scope);

    if let Some(name) = args.name {
        builder = builder.app_name(name);
    } else if !args.keep_file_name {
        builder = builder.app_name(guess_display_name(&args.executable));
    }
    if let Some(keywords) = args.keywords {
        builder = builder.keywords(keywords);
    }
    if let Some(description) = args.description {
        builder = builder.description(description);
    }

    let mut scratch = None;
    if let Some(icon) = args.icon {
        builder = builder.icon(icon);
    } else if args.extract_icon {
        match run_resolver(&args.executable) {
            Ok(icon) => {
                scratch = icon.parent().map(Path::to_path_buf);
                builder = builder.icon(icon);
            }
            Err(e @ (ResolveError::NotFound { .. } | ResolveError::UnsupportedFormat(_))) => {
                warn!("{}; installing without an icon", e);
                scratch = e.scratch_dir().cloned();
            }
            Err(e) => {
                if let Some(dir) = e.scratch_dir() {
                    discard_scratch(dir);
                }
                return Err(e.into());
            }
        }
    }

    let request = builder.build()?;
    let result = run_installer(Installer::new(config), request);
    if let Some(dir) = scratch {
        discard_scratch(&dir);
    }

    let installed = result?;
    println!(
        "{} installed successfully!",
        installed.entry.get("Name").unwrap_or("Application")
    );
    println!("  entry:      {}", installed.entry_path.display());
    println!("  executable: {}", installed.executable_path.display());
    if let Some(icon) = &installed.icon_path {
        println!("  icon:       {}", icon.display());
    }
    Ok(())
}

fn run_installer(installer: Installer, request: InstallRequest) -> Result<Installed> {
    let rx = spawn_job(&INSTALLER_SLOT, move |progress| {
        installer.install(request, |milestone| {
            let _ = progress.send(Event::Progress(milestone));
        })
    })?;

    let result: Result<Installed, InstallError> = wait(rx, |milestone: Milestone| {
        info!("Install: {:?}", milestone);
    })?;
    Ok(result?)
}

fn run_resolver(bundle: &Path) -> Result<PathBuf, ResolveError> {
    let bundle = bundle.to_path_buf();
    let rx = spawn_job::<(), _, _>(&RESOLVER_SLOT, move |_| icon::resolve_icon(&bundle))
        .map_err(|e| ResolveError::ExtractionFailure { message: e.to_string(), scratch: None })?;

    wait(rx, |_: ()| {}).map_err(|e| ResolveError::ExtractionFailure {
        message: e.to_string(),
        scratch: None,
    })?
}

/// Drains a job's events until it reports its result.
fn wait<P, T>(rx: Receiver<Event<P, T>>, mut on_progress: impl FnMut(P)) -> Result<T> {
    for event in rx {
        match event {
            Event::Progress(p) => on_progress(p),
            Event::Done(result) => return Ok(result),
        }
    }
    Err(anyhow!("worker exited without a result"))
}

fn discard_scratch(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        warn!("Could not remove {:?}: {}", dir, e);
    }
}

fn extract_icon(bundle: &Path) -> Result<()> {
    let icon = run_resolver(bundle)?;
    match icon::icon_dimensions(&icon) {
        Some((w, h)) => println!("{} ({}x{})", icon.display(), w, h),
        None => println!("{}", icon.display()),
    }
    Ok(())
}

fn list(config: &Config, filter: Option<&str>, json: bool) -> Result<()> {
    let catalog = Catalog::new(config);
    let apps = FuzzyMatcher::new().filter(filter.unwrap_or(""), catalog.list());

    if json {
        println!("{}", serde_json::to_string_pretty(&apps)?);
        return Ok(());
    }

    for app in &apps {
        println!("{:<7} {:<40} {}", app.scope.to_string(), app.file_name(), app.display_name());
    }
    Ok(())
}

fn show(config: &Config, name: &str, json: bool) -> Result<()> {
    let catalog = Catalog::new(config);
    let app = find(&catalog, name)?;
    let icon = catalog.display_icon(&app);

    if json {
        let value = serde_json::json!({
            "path": app.path,
            "scope": app.scope,
            "entry": app.entry,
            "icon": icon,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let kind = match app.scope {
        Scope::User => "User Application",
        Scope::System => "System Application",
    };
    println!("Installation Type: {}", kind);
    println!("File: {}", app.path.display());
    for (key, value) in app.entry.iter() {
        if key == "Icon" {
            continue;
        }
        println!("{}: {}", key, value);
    }
    if app.entry.contains_key("Icon") {
        match &icon {
            Some(path) => match icon::icon_dimensions(path) {
                Some((w, h)) => println!("Icon: {} ({}x{})", path.display(), w, h),
                None => println!("Icon: {}", path.display()),
            },
            None => println!("Icon: No icon"),
        }
    }
    Ok(())
}

fn find(catalog: &Catalog, name: &str) -> Result<InstalledApp> {
    catalog
        .find(name)
        .with_context(|| format!("no desktop entry named {}", name))
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer)? == 0 {
        bail!("no answer on stdin; pass --yes to skip confirmation");
    }
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
