// ABOUTME: Asset resolution for rendered presentations
// ABOUTME: Finds themes, scripts and styles under module roots and builds the reveal option strings

use crate::config::{Config, ModuleConfig};
use crate::errors::Result;
use crate::utils::{glob_relative, to_title_case, url_basename, url_directory, url_join, url_relative, url_stem};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;

/// A resolved asset; `path` is `None` for external URLs that are emitted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    pub url: String,
    pub path: Option<PathBuf>,
}

impl Asset {
    pub fn external(url: &str) -> Self {
        Asset {
            url: url.to_string(),
            path: None,
        }
    }

    /// Placeholder used when a named theme cannot be found.
    fn missing() -> Self {
        Asset::external("/")
    }
}

/// Themes shipped in `reveal.js/dist/theme`, listed when reveal comes from a CDN.
const REVEAL_THEMES: &[&str] = &[
    "beige", "black", "blood", "dracula", "league", "moon", "night", "serif", "simple", "sky",
    "solarized", "white",
];

/// `true` for `scheme://...` and protocol-relative `//...` URLs.
pub fn is_absolute_url(url: &str) -> bool {
    !url.contains('\n') && (url.find("://").is_some_and(|index| index > 0) || url.starts_with("//"))
}

/// Resolve asset patterns against a module root.
///
/// Absolute URLs pass through; anything else is globbed (files only, sorted)
/// under the module path and turned into a URL relative to `from_url`.
pub fn get_assets(module: &ModuleConfig, patterns: &[String], from_url: &str) -> Result<Vec<Asset>> {
    let directory = url_directory(from_url);
    let mut assets = Vec::new();
    for pattern in patterns {
        if is_absolute_url(pattern) {
            assets.push(Asset::external(pattern));
            continue;
        }
        let Some(root) = &module.path else {
            continue;
        };
        for found in glob_relative(pattern, root, true)? {
            assets.push(Asset {
                url: url_relative(&directory, &url_join(&[&module.url, &found])),
                path: Some(root.join(&found)),
            });
        }
    }
    Ok(assets)
}

/// Every discoverable theme: `theme_paths` under assets, else the bundled reveal themes.
pub fn get_themes(config: &Config, from_url: &str) -> Result<Vec<Asset>> {
    if !config.theme_paths.is_empty() {
        return get_assets(&config.assets_module(), &config.theme_paths, from_url);
    }
    match config.module("base") {
        Some(base) if base.path.is_none() && is_absolute_url(&base.url) => Ok(REVEAL_THEMES
            .iter()
            .map(|theme| Asset::external(&format!("{}/dist/theme/{}.css", base.url, theme)))
            .collect()),
        Some(base) => get_assets(base, &["dist/theme/*.css".to_string()], from_url),
        None => Ok(Vec::new()),
    }
}

/// The theme named by `presentation.theme`, matched on file stem.
pub fn get_theme(config: &Config, from_url: &str) -> Result<Asset> {
    let theme = &config.presentation.theme;
    if is_absolute_url(theme) {
        return Ok(Asset::external(theme));
    }
    Ok(get_themes(config, from_url)?
        .into_iter()
        .find(|asset| &url_stem(&asset.url) == theme)
        .unwrap_or_else(Asset::missing))
}

pub fn get_highlight_theme(config: &Config, from_url: &str) -> Result<Asset> {
    let theme = &config.presentation.highlight_theme;
    if is_absolute_url(theme) {
        return Ok(Asset::external(theme));
    }
    let Some(module) = config.module("highlight") else {
        return Ok(Asset::missing());
    };
    if module.path.is_none() && is_absolute_url(&module.url) {
        return Ok(Asset::external(&format!("{}/{}.css", module.url, theme)));
    }
    Ok(get_assets(module, &[format!("{}.css", theme)], from_url)?
        .into_iter()
        .next()
        .unwrap_or_else(Asset::missing))
}

pub fn get_scripts(config: &Config, from_url: &str) -> Result<Vec<Asset>> {
    let patterns: Vec<String> = config
        .script_paths
        .iter()
        .chain(config.presentation.scripts.iter())
        .cloned()
        .collect();
    get_assets(&config.assets_module(), &patterns, from_url)
}

pub fn get_styles(config: &Config, from_url: &str) -> Result<Vec<Asset>> {
    let patterns: Vec<String> = config
        .style_paths
        .iter()
        .chain(config.presentation.styles.iter())
        .cloned()
        .collect();
    get_assets(&config.assets_module(), &patterns, from_url)
}

/// Reveal settings as JSON, with the menu theme list filled in when absent.
pub fn get_reveal_options(config: &Config, from_url: &str) -> Result<String> {
    let mut settings = config.presentation.settings.clone();
    let needs_themes = settings
        .get("menu")
        .and_then(Value::as_object)
        .is_some_and(|menu| !menu.contains_key("themes"));

    if needs_themes {
        let themes: Vec<Value> = get_themes(config, from_url)?
            .iter()
            .map(|theme| {
                json!({
                    "name": to_title_case(url_basename(&theme.url)),
                    "theme": theme.url,
                })
            })
            .collect();
        if let Some(menu) = settings.get_mut("menu").and_then(Value::as_object_mut) {
            menu.insert("themes".to_string(), Value::Array(themes));
        }
    }

    if settings.is_null() {
        settings = json!({});
    }
    Ok(serde_json::to_string(&settings)?)
}

/// Markdown separator attributes for the reveal markdown plugin.
pub fn get_slidify_options(config: &Config) -> String {
    let separators = &config.presentation.separators;
    [
        ("data-separator", &separators.horizontal_separator),
        ("data-separator-vertical", &separators.vertical_separator),
        ("data-separator-notes", &separators.notes_separator),
    ]
    .iter()
    .filter_map(|(attribute, value)| {
        value.as_ref().map(|value| {
            let escaped = value.replace('\n', "\\n").replace('\r', "\\r");
            format!("{}=\"{}\"", attribute, escaped)
        })
    })
    .collect::<Vec<_>>()
    .join(" ")
}

pub fn get_plugins_options(config: &Config) -> String {
    config.presentation.plugins.join(",")
}
