use crate::model::InstalledApp;
use nucleo_matcher::pattern::{CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Matcher, Utf32Str};

pub struct FuzzyMatcher {
    matcher: Matcher,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FuzzyMatcher {
    pub fn new() -> Self {
        Self {
            matcher: Matcher::new(nucleo_matcher::Config::DEFAULT),
        }
    }

    /// Keeps the apps whose name or file name matches `query`, best first.
    /// An empty query keeps everything in its original order.
    pub fn filter(&mut self, query: &str, apps: Vec<InstalledApp>) -> Vec<InstalledApp> {
        if query.trim().is_empty() {
            return apps;
        }

        let pattern = Pattern::parse(query, CaseMatching::Smart, Normalization::Smart);
        let mut buf = Vec::new();

        let mut scored: Vec<(u32, InstalledApp)> = apps
            .into_iter()
            .filter_map(|app| {
                let name = app.display_name();
                let file = app.file_name();
                let best = [name.as_str(), file.as_str()]
                    .into_iter()
                    .filter_map(|hay| pattern.score(Utf32Str::new(hay, &mut buf), &mut self.matcher))
                    .max()?;
                Some((best, app))
            })
            .collect();

        // Stable, so equal scores keep listing order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, app)| app).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DesktopEntry, Scope};
    use std::path::PathBuf;

    fn app(file: &str, name: &str) -> InstalledApp {
        let mut entry = DesktopEntry::new();
        entry.set("Name", name);
        InstalledApp {
            path: PathBuf::from(format!("/apps/{}", file)),
            scope: Scope::User,
            entry,
            program: None,
        }
    }

    #[test]
    fn empty_query_keeps_everything() {
        let apps = vec![app("b.desktop", "Beta"), app("a.desktop", "Alpha")];
        let kept = FuzzyMatcher::new().filter("  ", apps);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].file_name(), "b.desktop");
    }

    #[test]
    fn drops_non_matches() {
        let apps = vec![
            app("krita.desktop", "Krita"),
            app("firefox.desktop", "Firefox Web Browser"),
            app("gimp.desktop", "GNU Image Manipulation Program"),
        ];
        let kept = FuzzyMatcher::new().filter("firefox", apps);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].display_name(), "Firefox Web Browser");
    }

    #[test]
    fn matches_on_file_name_too() {
        let apps = vec![app("org.example.Tool.desktop", "Something Else")];
        let kept = FuzzyMatcher::new().filter("example", apps);
        assert_eq!(kept.len(), 1);
    }
}
