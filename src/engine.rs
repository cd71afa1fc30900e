// ABOUTME: Template engine setup for rendered pages
// ABOUTME: Registers helpers, built-in page templates and user partials with minijinja

use crate::assets::is_absolute_url;
use crate::config::Config;
use crate::errors::{DeckError, Result};
use crate::utils::{SanitizeOptions, glob_relative, sanitize, url_directory, url_relative};
use log::debug;
use minijinja::{Environment, Error, ErrorKind, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DOCUMENT_TEMPLATE: &str = "document.html";
pub const COLLECTION_TEMPLATE: &str = "collection.html";
pub const ERROR_TEMPLATE: &str = "error.html";

const DOCUMENT_SOURCE: &str = include_str!("../templates/document.html");
const COLLECTION_SOURCE: &str = include_str!("../templates/collection.html");
const ERROR_SOURCE: &str = include_str!("../templates/error.html");

/// File suffixes registered when a partial pattern matches a directory.
const PARTIAL_EXTENSIONS: &[&str] = &["jinja", "j2", "html"];

const DEFAULT_SEPARATOR: &str = " - ";

/// Build the template environment used to render pages requested from `from_url`.
pub fn build_environment(config: &Config, from_url: &str) -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_function("concat", concat);
    env.add_function("eq", eq);

    let modules: BTreeMap<String, String> = config
        .modules
        .iter()
        .map(|(name, module)| (name.clone(), module.url.clone()))
        .collect();
    let directory = url_directory(from_url);
    env.add_filter("href", href);
    env.add_function("module", move |name: String| -> std::result::Result<Value, Error> {
        modules
            .get(&name)
            .map(|url| {
                if is_absolute_url(url) {
                    url.clone()
                } else {
                    url_relative(&directory, url)
                }
            })
            .map(|url| href(&url))
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("unknown module: {}", name),
                )
            })
    });

    env.add_template(COLLECTION_TEMPLATE, COLLECTION_SOURCE)?;
    env.add_template(ERROR_TEMPLATE, ERROR_SOURCE)?;
    match &config.resolved_template_path {
        Some(path) => {
            let source = fs::read_to_string(path).map_err(|e| {
                DeckError::Configuration(format!("Cannot read template {:?}: {}", path, e))
            })?;
            env.add_template_owned(DOCUMENT_TEMPLATE, source)?;
        }
        None => env.add_template(DOCUMENT_TEMPLATE, DOCUMENT_SOURCE)?,
    }

    register_partials(&mut env, config)?;
    Ok(env)
}

/// Join the truthy arguments; `separator=` overrides `" - "`.
fn concat(args: &[Value]) -> String {
    let (values, separator) = match args.split_last() {
        Some((last, rest)) if last.is_kwargs() => {
            let separator = last
                .get_attr("separator")
                .ok()
                .filter(Value::is_true)
                .map(|value| value.to_string());
            (rest, separator)
        }
        _ => (args, None),
    };
    values
        .iter()
        .filter(|value| value.is_true())
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(separator.as_deref().unwrap_or(DEFAULT_SEPARATOR))
}

/// Escape a URL for an HTML attribute, leaving `/` readable.
fn href(url: &str) -> Value {
    let mut escaped = String::with_capacity(url.len());
    for c in url.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    Value::from_safe_string(escaped)
}

fn eq(left: Value, right: Value) -> bool {
    left == right
}

/// Register every file matched by `partial_paths` under the assets directory,
/// named by file stem. A matched directory contributes its template files.
fn register_partials(env: &mut Environment<'static>, config: &Config) -> Result<()> {
    for pattern in config.partial_paths.iter() {
        let pattern = sanitize(pattern, SanitizeOptions::default());
        for found in glob_relative(&pattern, &config.assets_dir, false)? {
            let path = config.assets_dir.join(&found);
            if path.is_dir() {
                let mut entries: Vec<PathBuf> = fs::read_dir(&path)?
                    .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                    .filter(|entry| is_partial_file(entry))
                    .collect();
                entries.sort();
                for entry in entries {
                    register_partial(env, &entry)?;
                }
            } else {
                register_partial(env, &path)?;
            }
        }
    }
    Ok(())
}

fn is_partial_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| PARTIAL_EXTENSIONS.contains(&ext))
}

fn register_partial(env: &mut Environment<'static>, path: &Path) -> Result<()> {
    let Some(name) = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()) else {
        return Ok(());
    };
    let source = fs::read_to_string(path)?;
    debug!("Registering partial {} from {:?}", name, path);
    env.add_template_owned(name, source)?;
    Ok(())
}
