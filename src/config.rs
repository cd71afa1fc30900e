// ABOUTME: Configuration module for the deckhand application
// ABOUTME: Resolves CLI flags, front matter, the project file and defaults into one memoized Config

use crate::assets::is_absolute_url;
use crate::errors::{DeckError, Result};
use crate::utils::{
    self, FsCache, SanitizeOptions, get_directory, is_within_directory, load_json, merge_objects,
    normalize_extension, normalize_path, sanitize,
};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Built-in defaults, the lowest configuration layer.
pub const DEFAULTS: &str = include_str!("../defaults.json");

/// Built-in static modules: name, mount URL, location under the package
/// directory and the CDN URL used when that location is missing.
const MODULES: &[(&str, &str, Option<(&str, &str)>)] = &[
    ("assets", "/assets", None),
    (
        "base",
        "/modules/reveal",
        Some(("vendor/reveal.js", "https://cdn.jsdelivr.net/npm/reveal.js@5.1.0")),
    ),
    (
        "bootstrap",
        "/modules/bootstrap",
        Some(("vendor/bootstrap", "https://cdn.jsdelivr.net/npm/bootstrap@5.3.3")),
    ),
    (
        "datatables",
        "/modules/datatables",
        Some(("vendor/datatables.net", "https://cdn.jsdelivr.net/npm/datatables.net@2.0.8")),
    ),
    (
        "datatables-bs",
        "/modules/datatables-bs",
        Some(("vendor/datatables.net-bs5", "https://cdn.jsdelivr.net/npm/datatables.net-bs5@2.0.8")),
    ),
    (
        "font-awesome",
        "/modules/font-awesome",
        Some(("vendor/font-awesome", "https://cdn.jsdelivr.net/npm/@fortawesome/fontawesome-free@6.5.2")),
    ),
    (
        "highlight",
        "/modules/highlight",
        Some(("vendor/highlight.js/styles", "https://cdn.jsdelivr.net/npm/highlight.js@11.9.0/styles")),
    ),
    (
        "jquery",
        "/modules/jquery",
        Some(("vendor/jquery", "https://cdn.jsdelivr.net/npm/jquery@3.7.1")),
    ),
    (
        "menu",
        "/modules/menu",
        Some(("vendor/reveal.js-menu", "https://cdn.jsdelivr.net/npm/reveal.js-menu@2.1.0")),
    ),
];

/// Package directory holding the vendored modules and tilde-relative paths.
pub fn package_dir_from_env() -> PathBuf {
    env::var("DECKHAND_HOME")
        .ok()
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")))
}

/// Resolve `target` against `base`; a leading `~` resolves against `package`.
pub fn get_path(target: &str, base: &Path, package: &Path) -> PathBuf {
    match target.strip_prefix('~') {
        Some(rest) => normalize_path(&package.join(rest.trim_start_matches('/'))),
        None => normalize_path(&base.join(target)),
    }
}

/// What `--print` asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintTarget {
    /// Print next to the build output.
    Default,
    /// Print to an explicit file.
    Path(PathBuf),
}

/// The CLI layer, highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub targets: Vec<String>,
    pub build: bool,
    pub print: Option<PrintTarget>,
    pub all: bool,
    pub watch: bool,
    pub config: Option<String>,
    pub no_open: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub slide: Option<String>,
}

impl CliOptions {
    /// Only flags that were actually given enter the layer; `open` is always set.
    fn to_layer(&self, cwd: &Path) -> Value {
        let mut layer = Map::new();
        layer.insert("open".into(), json!(!self.no_open));
        if self.build {
            layer.insert("build".into(), json!(true));
        }
        match &self.print {
            Some(PrintTarget::Default) => {
                layer.insert("print".into(), json!(true));
            }
            Some(PrintTarget::Path(path)) => {
                let path = normalize_path(&cwd.join(path));
                layer.insert("print".into(), json!(utils::to_posix(&path)));
            }
            None => {}
        }
        if self.all {
            layer.insert("all".into(), json!(true));
        }
        if self.watch {
            layer.insert("watch".into(), json!(true));
        }
        if let Some(config) = &self.config {
            layer.insert("config".into(), json!(config));
        }
        if let Some(host) = &self.host {
            layer.insert("host".into(), json!(host));
        }
        if let Some(port) = self.port {
            layer.insert("port".into(), json!(port));
        }
        if let Some(slide) = &self.slide {
            layer.insert("slide".into(), json!(slide));
        }
        Value::Object(layer)
    }
}

/// A list given either as an array or as a comma-separated string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StringList(pub Vec<String>);

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(StringList(utils::to_list(&value)))
    }
}

impl Deref for StringList {
    type Target = Vec<String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// `print` is either a flag or an output path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PrintSetting {
    Enabled(bool),
    Path(PathBuf),
}

impl Default for PrintSetting {
    fn default() -> Self {
        PrintSetting::Enabled(false)
    }
}

impl PrintSetting {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, PrintSetting::Enabled(false))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            PrintSetting::Path(path) => Some(path),
            PrintSetting::Enabled(_) => None,
        }
    }
}

/// A named static root mounted under a URL prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModuleConfig {
    pub url: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeparatorConfig {
    pub horizontal_separator: Option<String>,
    pub vertical_separator: Option<String>,
    pub notes_separator: Option<String>,
}

/// Per-document presentation settings; front matter lands here.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresentationConfig {
    pub hero: Value,
    #[serde(deserialize_with = "lenient_option")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_option")]
    pub title: Option<String>,
    pub description: Value,
    pub date: Value,
    pub author: Value,
    pub featured: Value,
    #[serde(deserialize_with = "lenient_string")]
    pub theme: String,
    #[serde(deserialize_with = "lenient_string")]
    pub highlight_theme: String,
    pub separators: SeparatorConfig,
    pub settings: Value,
    pub plugins: StringList,
    pub scripts: StringList,
    pub styles: StringList,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Scalars become their text form (`title: 2024` is `"2024"`); null is `None`.
fn lenient_option<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_option(deserializer)?.unwrap_or_default())
}

/// The four unmerged layers behind a [`Config`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sources {
    pub cli: Value,
    pub extra: Value,
    pub process: Value,
    pub defaults: Value,
}

/// Fully resolved configuration for one presentation-config variant.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub config: String,
    pub extensions: StringList,
    pub project: String,
    pub git: String,
    pub host: String,
    pub port: u16,
    pub open: bool,
    pub watch: bool,
    pub build: bool,
    pub print: PrintSetting,
    pub all: bool,
    pub slide: Option<String>,
    pub base_url: String,
    pub out_dir: PathBuf,
    pub root_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub template_path: Option<String>,
    pub preprocessor_paths: StringList,
    pub partial_paths: StringList,
    pub script_paths: StringList,
    pub style_paths: StringList,
    pub theme_paths: StringList,
    pub print_size: Option<String>,
    pub browser_path: Option<String>,
    pub browser_args: Option<String>,
    pub modules: BTreeMap<String, ModuleConfig>,
    pub presentation: PresentationConfig,

    #[serde(skip)]
    pub package_dir: PathBuf,
    #[serde(skip)]
    pub target_dir: PathBuf,
    #[serde(skip)]
    pub target_path: PathBuf,
    #[serde(skip)]
    pub resolved_template_path: Option<PathBuf>,
    #[serde(skip)]
    pub sources: Sources,
    #[serde(skip)]
    pub has_favicon: bool,
}

impl Config {
    pub fn module(&self, name: &str) -> Option<&ModuleConfig> {
        self.modules.get(name)
    }

    /// The user assets module; always present after resolution.
    pub fn assets_module(&self) -> ModuleConfig {
        self.modules.get("assets").cloned().unwrap_or_else(|| ModuleConfig {
            url: "/assets".to_string(),
            path: Some(self.assets_dir.clone()),
        })
    }

    /// Strip the base URL from a request URL.
    pub fn target_url<'a>(&self, url: &'a str) -> &'a str {
        url.strip_prefix(self.base_url.as_str()).unwrap_or(url)
    }

    /// File-system location of a request URL under the root directory.
    pub fn content_path(&self, url: &str) -> PathBuf {
        let relative = sanitize(self.target_url(url), SanitizeOptions::default());
        if relative.is_empty() {
            self.root_dir.clone()
        } else {
            self.root_dir.join(relative)
        }
    }

    pub fn is_document_extension(&self, extension: &str) -> bool {
        !extension.is_empty() && self.extensions.iter().any(|ext| ext == extension)
    }

    pub fn project_file(&self) -> PathBuf {
        self.target_dir.join(&self.config)
    }
}

/// Layers that do not depend on the front matter, loaded once.
#[derive(Debug)]
struct BaseLayers {
    cli: Value,
    process: Value,
    defaults: Value,
    modules: Value,
    target_dir: PathBuf,
    target_path: PathBuf,
}

/// Produces [`Config`] snapshots, memoized per front-matter variant.
pub struct ConfigResolver {
    cli: CliOptions,
    cwd: PathBuf,
    package_dir: PathBuf,
    fs_cache: Arc<FsCache>,
    base: Mutex<Option<Arc<BaseLayers>>>,
    cache: Mutex<HashMap<String, Arc<Config>>>,
}

impl ConfigResolver {
    pub fn new(cli: CliOptions, cwd: PathBuf, package_dir: PathBuf, fs_cache: Arc<FsCache>) -> Self {
        Self {
            cli,
            cwd,
            package_dir,
            fs_cache,
            base: Mutex::new(None),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn fs_cache(&self) -> &Arc<FsCache> {
        &self.fs_cache
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// The configuration without document overrides.
    pub fn base(&self) -> Result<Arc<Config>> {
        self.resolve(None)
    }

    /// Resolve the configuration for a document's front matter.
    ///
    /// The same front matter (by value) always yields the same `Arc`.
    pub fn resolve(&self, front_matter: Option<&Value>) -> Result<Arc<Config>> {
        let empty = Value::Object(Map::new());
        let front_matter = front_matter.unwrap_or(&empty);
        let key = serde_json::to_string(front_matter)?;

        if let Some(config) = self.cache.lock().get(&key) {
            return Ok(Arc::clone(config));
        }

        let base = self.base_layers()?;
        let config = Arc::new(self.build_config(&base, front_matter)?);
        debug!("Resolved configuration for front matter {}", key);
        Ok(Arc::clone(
            self.cache.lock().entry(key).or_insert(config),
        ))
    }

    /// Forget every cached configuration and reload the layers on next use.
    pub fn clear(&self) {
        self.cache.lock().clear();
        *self.base.lock() = None;
    }

    fn base_layers(&self) -> Result<Arc<BaseLayers>> {
        if let Some(base) = self.base.lock().as_ref() {
            return Ok(Arc::clone(base));
        }

        let (target_dir, target_path) = self.resolve_targets()?;
        let cli = self.cli.to_layer(&self.cwd);
        let defaults: Value = serde_json::from_str(DEFAULTS)?;
        let config_name = cli
            .get("config")
            .or_else(|| defaults.get("config"))
            .and_then(Value::as_str)
            .unwrap_or("config.json")
            .to_string();
        let process = load_json(&target_dir.join(config_name));

        let modules: Map<String, Value> = MODULES
            .iter()
            .map(|(name, url, vendored)| {
                let module = match vendored {
                    None => json!({ "url": url, "path": null }),
                    Some((path, cdn)) => {
                        let path = self.package_dir.join(path);
                        if self.fs_cache.is_directory(&path) {
                            json!({ "url": url, "path": utils::to_posix(&path) })
                        } else {
                            warn!("Module {} not found at {:?}, using {}", name, path, cdn);
                            json!({ "url": cdn, "path": null })
                        }
                    }
                };
                ((*name).to_string(), module)
            })
            .collect();

        let base = Arc::new(BaseLayers {
            cli,
            process,
            defaults,
            modules: json!({ "modules": modules }),
            target_dir,
            target_path,
        });
        *self.base.lock() = Some(Arc::clone(&base));
        Ok(base)
    }

    /// Turn the positional arguments into `(target_dir, target_path)`.
    fn resolve_targets(&self) -> Result<(PathBuf, PathBuf)> {
        match self.cli.targets.as_slice() {
            [target] => {
                let target_path = get_path(target, &self.cwd, &self.package_dir);
                let target_dir = get_directory(&target_path, &self.fs_cache);
                Ok((target_dir, target_path))
            }
            [directory, target] => {
                let target_dir = get_path(directory, &self.cwd, &self.package_dir);
                if !self.fs_cache.is_directory(&target_dir) {
                    return Err(DeckError::Configuration(format!(
                        "The target directory must be a directory: {:?}",
                        target_dir
                    )));
                }
                let target_path = normalize_path(&target_dir.join(target));
                if !is_within_directory(&target_path, &target_dir) {
                    return Err(DeckError::Configuration(format!(
                        "The target path must be within the target directory: {:?}",
                        target_path
                    )));
                }
                Ok((target_dir, target_path))
            }
            targets => Err(DeckError::Configuration(format!(
                "Expected one or two positional arguments, got {}",
                targets.len()
            ))),
        }
    }

    fn build_config(&self, base: &BaseLayers, front_matter: &Value) -> Result<Config> {
        let extra = json!({ "presentation": front_matter });
        let merged = merge_objects(&[
            &base.cli,
            &extra,
            &base.process,
            &base.defaults,
            &base.modules,
        ]);
        let mut config: Config = serde_json::from_value(merged).map_err(|e| {
            DeckError::Configuration(format!("Invalid configuration value: {}", e))
        })?;

        let target_dir = &base.target_dir;
        config.package_dir = self.package_dir.clone();
        config.target_dir = target_dir.clone();
        config.target_path = base.target_path.clone();

        config.resolved_template_path = config
            .template_path
            .as_deref()
            .filter(|path| !path.is_empty())
            .map(|path| get_path(path, target_dir, &self.package_dir));

        config.base_url = sanitize(&config.base_url, SanitizeOptions::LEADING);
        if config.base_url == "/" {
            config.base_url.clear();
        }

        config.out_dir = reroot(target_dir, &config.out_dir);
        config.root_dir = reroot(target_dir, &config.root_dir);
        config.assets_dir = reroot(target_dir, &config.assets_dir);

        for (name, module) in config.modules.iter_mut() {
            if !is_absolute_url(&module.url) {
                module.url = sanitize(&module.url, SanitizeOptions::LEADING);
            }
            if name == "assets" {
                module.path = Some(config.assets_dir.clone());
            } else if let Some(path) = &module.path {
                module.path = Some(get_path(
                    &utils::to_posix(path),
                    target_dir,
                    &self.package_dir,
                ));
            }
        }

        config.extensions = StringList(
            config
                .extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect(),
        );

        config.sources = Sources {
            cli: base.cli.clone(),
            extra,
            process: base.process.clone(),
            defaults: base.defaults.clone(),
        };
        config.has_favicon = self.fs_cache.is_file(&config.assets_dir.join("favicon.ico"));

        Ok(config)
    }
}

/// Place `path` under `root`, whether it was given relative or absolute.
fn reroot(root: &Path, path: &Path) -> PathBuf {
    let relative = path.strip_prefix("/").unwrap_or(path);
    normalize_path(&root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn resolver(targets: &[&str], cwd: &Path) -> ConfigResolver {
        resolver_with(
            CliOptions {
                targets: targets.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            },
            cwd,
        )
    }

    fn resolver_with(cli: CliOptions, cwd: &Path) -> ConfigResolver {
        ConfigResolver::new(
            cli,
            cwd.to_path_buf(),
            PathBuf::from("/package"),
            Arc::new(FsCache::new()),
        )
    }

    #[test]
    fn get_path_resolution() {
        let base = Path::new("/base/path");
        let package = Path::new("/package");
        assert_eq!(get_path("file.txt", base, package), PathBuf::from("/base/path/file.txt"));
        assert_eq!(get_path("~file.txt", base, package), PathBuf::from("/package/file.txt"));
        assert_eq!(get_path("~/demo", base, package), PathBuf::from("/package/demo"));
        assert_eq!(get_path("../up.md", base, package), PathBuf::from("/base/up.md"));
    }

    #[test]
    fn positional_argument_arity() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolver(&[], dir.path()).base(),
            Err(DeckError::Configuration(_))
        ));
        assert!(matches!(
            resolver(&["a", "b", "c"], dir.path()).base(),
            Err(DeckError::Configuration(_))
        ));
    }

    #[test]
    fn two_arguments_guard_traversal() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("project")).unwrap();

        let escaped = resolver(&["project", "../outside.md"], dir.path()).base();
        assert!(matches!(escaped, Err(DeckError::Configuration(_))));

        let not_a_dir = resolver(&["missing", "deck.md"], dir.path()).base();
        assert!(matches!(not_a_dir, Err(DeckError::Configuration(_))));

        let config = resolver(&["project", "talks/deck.md"], dir.path()).base().unwrap();
        assert_eq!(config.target_dir, dir.path().join("project"));
        assert_eq!(config.target_path, dir.path().join("project/talks/deck.md"));
    }

    #[test]
    fn wildcard_target_roots_at_first_glob_segment() {
        let dir = TempDir::new().unwrap();
        let config = resolver(&["talks/2024*/deck.md"], dir.path()).base().unwrap();
        assert_eq!(config.target_dir, dir.path().join("talks"));
        assert_eq!(config.root_dir, dir.path().join("talks"));
    }

    #[test]
    fn paths_and_urls_are_normalized() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets/favicon.ico"), b"ico").unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"baseUrl": "slides/", "outDir": "/dist", "modules": {"extra": {"url": "vendor/extra/", "path": "lib/extra"}}}"#,
        )
        .unwrap();

        let config = resolver(&["."], dir.path()).base().unwrap();
        assert_eq!(config.base_url, "/slides");
        assert_eq!(config.out_dir, dir.path().join("dist"));
        assert_eq!(config.root_dir, dir.path().to_path_buf());
        assert_eq!(config.assets_dir, dir.path().join("assets"));
        assert!(config.has_favicon);

        let assets = config.module("assets").unwrap();
        assert_eq!(assets.url, "/assets");
        assert_eq!(assets.path.as_deref(), Some(dir.path().join("assets").as_path()));

        let extra = config.module("extra").unwrap();
        assert_eq!(extra.url, "/vendor/extra");
        assert_eq!(extra.path.as_deref(), Some(dir.path().join("lib/extra").as_path()));

        // Nothing is vendored under "/package", so the base module comes from the CDN.
        let base = config.module("base").unwrap();
        assert_eq!(base.url, "https://cdn.jsdelivr.net/npm/reveal.js@5.1.0");
        assert_eq!(base.path, None);
    }

    #[test]
    fn vendored_modules_are_served_locally() {
        let dir = TempDir::new().unwrap();
        let package = dir.path().join("package");
        fs::create_dir_all(package.join("vendor/reveal.js")).unwrap();
        let resolver = ConfigResolver::new(
            CliOptions {
                targets: vec![".".to_string()],
                ..Default::default()
            },
            dir.path().to_path_buf(),
            package.clone(),
            Arc::new(FsCache::new()),
        );

        let config = resolver.base().unwrap();
        let base = config.module("base").unwrap();
        assert_eq!(base.url, "/modules/reveal");
        assert_eq!(base.path.as_deref(), Some(package.join("vendor/reveal.js").as_path()));

        let menu = config.module("menu").unwrap();
        assert_eq!(menu.url, "https://cdn.jsdelivr.net/npm/reveal.js-menu@2.1.0");
        assert_eq!(menu.path, None);
    }

    #[test]
    fn root_base_url_is_empty() {
        let dir = TempDir::new().unwrap();
        let config = resolver(&["."], dir.path()).base().unwrap();
        assert_eq!(config.base_url, "");
        assert_eq!(config.extensions.0, vec![".md", ".markdown"]);
        assert!(!config.has_favicon);
    }

    #[test]
    fn layer_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{
                "port": 8000,
                "project": "From file",
                "presentation": {
                    "theme": "white",
                    "plugins": ["RevealNotes"],
                    "settings": {"hash": false, "menu": {"side": "right"}}
                }
            }"#,
        )
        .unwrap();

        let cli = CliOptions {
            targets: vec![".".into()],
            port: Some(9000),
            ..Default::default()
        };
        let resolver = resolver_with(cli, dir.path());
        let front_matter = json!({"theme": "league", "settings": {"menu": {"markers": false}}});
        let config = resolver.resolve(Some(&front_matter)).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.project, "From file");
        assert_eq!(config.presentation.theme, "league");
        assert_eq!(config.presentation.highlight_theme, "monokai");
        assert_eq!(config.presentation.plugins.0, vec!["RevealNotes"]);
        assert_eq!(config.presentation.settings["hash"], json!(false));
        assert_eq!(config.presentation.settings["menu"]["side"], json!("right"));
        assert_eq!(config.presentation.settings["menu"]["markers"], json!(false));
        assert_eq!(config.presentation.settings["menu"]["titleSelector"], json!("h1, h2"));
        assert_eq!(config.sources.extra, json!({"presentation": front_matter}));
        assert_eq!(config.sources.process["port"], json!(8000));
    }

    #[test]
    fn unset_cli_flags_do_not_override_the_project_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), r#"{"watch": true, "open": false}"#).unwrap();
        let config = resolver(&["."], dir.path()).base().unwrap();
        assert!(config.watch);
        assert!(config.open, "open always comes from the CLI layer");
    }

    #[test]
    fn resolution_is_memoized_per_front_matter() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&["."], dir.path());
        let first = json!({"theme": "league"});
        let same = json!({"theme": "league"});
        let other = json!({"theme": "sky"});

        let a = resolver.resolve(Some(&first)).unwrap();
        let b = resolver.resolve(Some(&same)).unwrap();
        let c = resolver.resolve(Some(&other)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(resolver.base().unwrap().presentation.theme, "black");

        resolver.clear();
        let d = resolver.resolve(Some(&first)).unwrap();
        assert!(!Arc::ptr_eq(&a, &d));
        assert_eq!(d.presentation.theme, "league");
    }

    #[test]
    fn scalar_front_matter_values_become_text() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&["."], dir.path());
        let front_matter = json!({"title": 2024, "name": true, "highlightTheme": 7});
        let config = resolver.resolve(Some(&front_matter)).unwrap();

        assert_eq!(config.presentation.title.as_deref(), Some("2024"));
        assert_eq!(config.presentation.name.as_deref(), Some("true"));
        assert_eq!(config.presentation.highlight_theme, "7");
    }

    #[test]
    fn print_path_is_resolved_against_cwd() {
        let dir = TempDir::new().unwrap();
        let cli = CliOptions {
            targets: vec![".".into()],
            print: Some(PrintTarget::Path(PathBuf::from("out/deck.pdf"))),
            ..Default::default()
        };
        let config = resolver_with(cli, dir.path()).base().unwrap();
        assert!(config.print.is_enabled());
        assert_eq!(config.print.path(), Some(dir.path().join("out/deck.pdf").as_path()));
    }
}
