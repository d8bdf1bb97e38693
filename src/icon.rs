use crate::config::Layout;
use crate::error::ResolveError;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use walkdir::WalkDir;

const BUNDLE_EXTENSION: &str = "appimage";
const EXTRACT_FLAG: &str = "--appimage-extract";
const EXTRACT_ROOT: &str = "squashfs-root";
const EXTRACTED_ICON: &str = "extracted_icon.png";

const ICON_EXTENSIONS: [&str; 3] = ["png", "svg", "xpm"];
const SIZE_TIERS: [&str; 4] = ["256x256", "128x128", "64x64", "48x48"];

pub fn is_bundle(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(BUNDLE_EXTENSION))
}

/// Extracts `bundle` into a fresh scratch directory and copies the first icon
/// it ships to `<scratch>/extracted_icon.png`. The scratch directory is left
/// on disk for the caller.
pub fn resolve_icon(bundle: &Path) -> Result<PathBuf, ResolveError> {
    if !is_bundle(bundle) {
        return Err(ResolveError::UnsupportedFormat(bundle.to_path_buf()));
    }

    let failure = |message: String, scratch: Option<&Path>| ResolveError::ExtractionFailure {
        message,
        scratch: scratch.map(Path::to_path_buf),
    };

    // The bundle runs with the scratch dir as cwd, so a relative path would break.
    let bundle = bundle
        .canonicalize()
        .map_err(|e| failure(format!("{}: {}", bundle.display(), e), None))?;

    let scratch = tempfile::Builder::new()
        .prefix("appmgr-icon-")
        .tempdir()
        .map_err(|e| failure(format!("creating scratch directory: {}", e), None))?
        .keep();

    debug!("Extracting {:?} into {:?}", bundle, scratch);
    let status = Command::new(&bundle)
        .arg(EXTRACT_FLAG)
        .current_dir(&scratch)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .status()
        .map_err(|e| failure(format!("running {}: {}", bundle.display(), e), Some(scratch.as_path())))?;

    if !status.success() {
        return Err(failure(
            format!("{} {} exited with {}", bundle.display(), EXTRACT_FLAG, status),
            Some(scratch.as_path()),
        ));
    }

    let Some(found) = find_icon(&scratch.join(EXTRACT_ROOT)) else {
        return Err(ResolveError::NotFound { bundle, scratch });
    };

    let saved = scratch.join(EXTRACTED_ICON);
    fs::copy(&found, &saved)
        .map_err(|e| failure(format!("copying {}: {}", found.display(), e), Some(scratch.as_path())))?;

    info!("Extracted icon {:?} from {:?}", found, bundle);
    Ok(saved)
}

/// Looks for an icon in an extracted bundle tree: `.DirIcon` first, then the
/// `icons` and `pixmaps` directories under `usr/share`.
pub fn find_icon(root: &Path) -> Option<PathBuf> {
    let dir_icon = root.join(".DirIcon");
    if dir_icon.is_file() {
        return Some(dir_icon);
    }

    let share = root.join("usr").join("share");
    ["icons", "pixmaps"]
        .into_iter()
        .find_map(|sub| scan_for_image(&share.join(sub)))
}

/// Pre-order walk in file name order. A directory's own files are checked,
/// by extension priority, before anything below it.
fn scan_for_image(dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }

    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
        .find_map(|e| best_image_in(e.path()))
}

fn best_image_in(dir: &Path) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    ICON_EXTENSIONS.iter().find_map(|wanted| {
        files
            .iter()
            .find(|p| {
                p.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
            })
            .cloned()
    })
}

/// Candidate PNGs for an entry's `Icon` value, user theme before system theme.
pub fn display_icon_candidates(layout: &Layout, icon_name: &str) -> Vec<PathBuf> {
    [&layout.user.icon_theme, &layout.system.icon_theme]
        .into_iter()
        .flat_map(|theme| {
            SIZE_TIERS
                .iter()
                .map(move |tier| theme.join(tier).join("apps").join(format!("{}.png", icon_name)))
        })
        .collect()
}

pub fn lookup_display_icon(layout: &Layout, icon_name: &str) -> Option<PathBuf> {
    display_icon_candidates(layout, icon_name)
        .into_iter()
        .find(|p| p.exists())
}

pub fn icon_dimensions(path: &Path) -> Option<(u32, u32)> {
    image::image_dimensions(path).ok()
}
