use std::{collections::BTreeMap, path::Path, sync::Arc};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::WindowManager;

/// What the tracker knows about the foreground window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowIdentity {
    pub app: Arc<str>,
    pub title: Arc<str>,
    pub language: Option<Arc<str>>,
    pub icon: Vec<u8>,
}

/// Resolves the foreground window into a known application. `Ok(None)` means the window
/// belongs to an application that isn't tracked.
#[cfg_attr(test, mockall::automock)]
pub trait WindowIdentityResolver: Send {
    fn resolve(&mut self) -> Result<Option<WindowIdentity>>;
}

/// Known applications keyed by executable name, and languages keyed by file extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationRegistry {
    pub applications: BTreeMap<String, String>,
    pub languages: BTreeMap<String, String>,
}

impl Default for ApplicationRegistry {
    fn default() -> Self {
        let applications = [
            ("code", "Visual Studio Code"),
            ("codium", "VSCodium"),
            ("cursor", "Cursor"),
            ("zed", "Zed"),
            ("nvim", "Neovim"),
            ("vim", "Vim"),
            ("emacs", "Emacs"),
            ("idea", "IntelliJ IDEA"),
            ("goland", "GoLand"),
            ("pycharm", "PyCharm"),
            ("rustrover", "RustRover"),
            ("sublime_text", "Sublime Text"),
            ("devenv", "Visual Studio"),
        ];
        let languages = [
            ("rs", "Rust"),
            ("go", "Go"),
            ("py", "Python"),
            ("js", "JavaScript"),
            ("jsx", "JavaScript"),
            ("ts", "TypeScript"),
            ("tsx", "TypeScript"),
            ("java", "Java"),
            ("kt", "Kotlin"),
            ("c", "C"),
            ("h", "C"),
            ("cpp", "C++"),
            ("hpp", "C++"),
            ("cs", "C#"),
            ("rb", "Ruby"),
            ("php", "PHP"),
            ("swift", "Swift"),
            ("html", "HTML"),
            ("css", "CSS"),
            ("json", "JSON"),
            ("toml", "TOML"),
            ("yaml", "YAML"),
            ("yml", "YAML"),
            ("md", "Markdown"),
            ("sql", "SQL"),
            ("sh", "Shell"),
        ];
        Self {
            applications: applications
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            languages: languages
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl ApplicationRegistry {
    /// Looks up the display name of an executable, ignoring its directory, `.exe` suffix and
    /// case.
    pub fn application(&self, process_name: &str) -> Option<&str> {
        let executable = clean_process_name(process_name);
        self.applications.get(&executable).map(String::as_str)
    }

    /// Guesses the language from the first file name with a known extension in a window title.
    pub fn language_for_title(&self, title: &str) -> Option<&str> {
        title
            .split(|c: char| c.is_whitespace() || "—–•|()[]\"'".contains(c))
            .filter_map(|word| word.rsplit_once('.'))
            .find_map(|(name, extension)| {
                if name.is_empty() {
                    return None;
                }
                let extension = extension.trim_end_matches([':', ',', '*']).to_lowercase();
                self.languages.get(&extension).map(String::as_str)
            })
    }
}

/// Normalized executable name. `/usr/bin/Code` and `C:\Apps\code.exe` both become `code`.
pub fn clean_process_name(value: &str) -> String {
    let file_name = value.rsplit(['/', '\\']).next().unwrap_or(value);
    let file_name = Path::new(file_name)
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| value.to_string())
        .to_lowercase();
    match file_name.strip_suffix(".exe") {
        Some(stripped) => stripped.to_string(),
        None => file_name,
    }
}

/// [WindowIdentityResolver] backed by a platform [WindowManager] and an [ApplicationRegistry].
pub struct RegistryResolver {
    windows: Box<dyn WindowManager>,
    registry: ApplicationRegistry,
}

impl RegistryResolver {
    pub fn new(windows: Box<dyn WindowManager>, registry: ApplicationRegistry) -> Self {
        Self { windows, registry }
    }
}

impl WindowIdentityResolver for RegistryResolver {
    fn resolve(&mut self) -> Result<Option<WindowIdentity>> {
        let window = self.windows.get_active_window_data()?;
        let Some(app) = self.registry.application(&window.process_name) else {
            trace!("Ignoring unknown application {}", window.process_name);
            return Ok(None);
        };

        Ok(Some(WindowIdentity {
            app: app.into(),
            language: self.registry.language_for_title(&window.window_title).map(Into::into),
            title: window.window_title,
            icon: window.icon,
        }))
    }
}
