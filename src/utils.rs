// ABOUTME: Utility functions for the deckhand application
// ABOUTME: Path sanitization, memoized file lookups, glob search, config merging and URL path math

use crate::errors::{DeckError, Result};
use glob::{MatchOptions, Pattern};
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Characters that turn a path segment into a glob pattern.
const GLOB_CHARS: &[char] = &['*', '?', '[', ']', '{', '}', '!'];

/// Validate that a directory exists
pub fn validate_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(DeckError::Configuration(format!(
            "Path not found: {:?}",
            path
        )));
    }
    if !path.is_dir() {
        return Err(DeckError::Configuration(format!(
            "Path is not a directory: {:?}",
            path
        )));
    }
    Ok(())
}

/// Ensure a file's parent directory exists
pub fn ensure_parent_directory_exists(file_path: &Path) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Memoized `is_dir` / `is_file` lookups.
///
/// A single cache is shared by the resolver and the renderer; the live server
/// clears it whenever the watched trees change.
#[derive(Debug, Default)]
pub struct FsCache {
    directories: Mutex<HashMap<PathBuf, bool>>,
    files: Mutex<HashMap<PathBuf, bool>>,
}

impl FsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_directory(&self, path: &Path) -> bool {
        *self
            .directories
            .lock()
            .entry(path.to_path_buf())
            .or_insert_with(|| fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false))
    }

    pub fn is_file(&self, path: &Path) -> bool {
        *self
            .files
            .lock()
            .entry(path.to_path_buf())
            .or_insert_with(|| fs::metadata(path).map(|m| m.is_file()).unwrap_or(false))
    }

    pub fn clear(&self) {
        self.directories.lock().clear();
        self.files.lock().clear();
    }
}

/// Lexically normalize a path, folding `.` and `..` without touching the disk.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Check that `target` (relative to `base`, or absolute) stays inside `base`.
pub fn is_within_directory(target: &Path, base: &Path) -> bool {
    let base = normalize_path(base);
    let checked = normalize_path(&base.join(target));
    checked.starts_with(&base)
}

/// Resolve the project directory of a target path.
///
/// Everything before the first segment holding a glob metacharacter is the
/// directory (`a/b*/c` → `a`); otherwise the path itself when it is a
/// directory, else its parent.
pub fn get_directory(target: &Path, fs_cache: &FsCache) -> PathBuf {
    let mut directory = PathBuf::new();
    let mut has_glob = false;
    for component in target.components() {
        if component.as_os_str().to_string_lossy().contains(GLOB_CHARS) {
            has_glob = true;
            break;
        }
        directory.push(component.as_os_str());
    }
    if has_glob {
        return directory;
    }
    if fs_cache.is_directory(target) {
        return target.to_path_buf();
    }
    target
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| target.to_path_buf())
}

/// Shorten a path for log lines: relative to `cwd`, middle segments elided.
pub fn get_readable_path(path: &Path, cwd: &Path) -> String {
    let relative = path.strip_prefix(cwd).unwrap_or(path);
    let relative = to_posix(relative);
    let segments: Vec<&str> = relative.split('/').collect();
    if segments.len() > 4 {
        format!(
            "{}...{}",
            segments[..2].join("/"),
            segments[segments.len() - 2..].join("/")
        )
    } else {
        relative
    }
}

/// Load a JSON object from disk; missing or invalid files yield an empty object.
pub fn load_json(path: &Path) -> Value {
    let parsed = fs::read_to_string(path)
        .ok()
        .and_then(|data| serde_json::from_str::<Value>(&data).ok());
    match parsed {
        Some(value @ Value::Object(_)) => value,
        Some(_) => {
            warn!("Ignoring non-object JSON configuration in {:?}", path);
            Value::Object(Map::new())
        }
        None => {
            debug!("No usable JSON configuration at {:?}", path);
            Value::Object(Map::new())
        }
    }
}

/// Copy keys from `source` into `target` only where `target` lacks them.
///
/// Nested objects merge per key; any other value kind (arrays included)
/// already present in `target` is kept as is.
pub fn apply_defaults(target: &mut Value, source: &Value) {
    let (Value::Object(target), Value::Object(source)) = (target, source) else {
        return;
    };
    for (key, value) in source {
        match target.get_mut(key) {
            Some(existing) => {
                if existing.is_object() && value.is_object() {
                    apply_defaults(existing, value);
                }
            }
            None => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Merge layers in descending precedence: the first layer defining a key wins.
pub fn merge_objects(layers: &[&Value]) -> Value {
    let mut merged = Value::Object(Map::new());
    for layer in layers {
        apply_defaults(&mut merged, layer);
    }
    merged
}

/// Separator contract for [`sanitize`]: leading (trailing) slashes are
/// replaced by `prefix` (`suffix`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SanitizeOptions<'a> {
    pub prefix: &'a str,
    pub suffix: &'a str,
}

impl SanitizeOptions<'static> {
    pub const LEADING: Self = Self {
        prefix: "/",
        suffix: "",
    };
    pub const TRAILING: Self = Self {
        prefix: "",
        suffix: "/",
    };
}

/// Strip traversal sequences and query strings, then normalize the separators.
pub fn sanitize(url: &str, options: SanitizeOptions<'_>) -> String {
    let mut cleaned = url.replace("..", "");
    if let Some(index) = cleaned.find('?') {
        cleaned.truncate(index);
    }
    format!(
        "{}{}{}",
        options.prefix,
        cleaned.trim_matches('/'),
        options.suffix
    )
}

/// Coerce a JSON value into a list of strings: comma-separated strings are
/// split, arrays are kept, null yields nothing.
pub fn to_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(text) => text.split(',').map(|item| item.trim().to_string()).collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
        other => vec![other.to_string()],
    }
}

/// Title-case a file name: extension dropped, `_`/`-` runs become spaces and
/// every word start is upper-cased.
pub fn to_title_case(text: &str) -> String {
    let extension = url_extname(text);
    let text = if extension.is_empty() {
        text.to_string()
    } else {
        text.replacen(&extension, "", 1)
    };

    let mut spaced = String::with_capacity(text.len());
    let mut in_run = false;
    for ch in text.chars() {
        if ch == '_' || ch == '-' {
            if !in_run {
                spaced.push(' ');
            }
            in_run = true;
        } else {
            spaced.push(ch);
            in_run = false;
        }
    }

    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut titled = String::with_capacity(spaced.len());
    let mut previous_is_word = false;
    for ch in spaced.chars() {
        if is_word(ch) && !previous_is_word {
            titled.push(ch.to_ascii_uppercase());
        } else {
            titled.push(ch);
        }
        previous_is_word = is_word(ch);
    }
    titled.trim().to_string()
}

/// Render a path with forward slashes.
pub fn to_posix(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn glob_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    }
}

/// Match `pattern` under `cwd` and return sorted, unique, `/`-separated
/// matches relative to `cwd`. Dotfiles never match a wildcard.
pub fn glob_relative(pattern: &str, cwd: &Path, files_only: bool) -> Result<Vec<String>> {
    let full_pattern = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        format!(
            "{}/{}",
            Pattern::escape(&to_posix(cwd)).trim_end_matches('/'),
            pattern
        )
    };

    let mut matches = BTreeSet::new();
    for entry in glob::glob_with(&full_pattern, glob_options())?.flatten() {
        if files_only && !entry.is_file() {
            continue;
        }
        let relative = entry.strip_prefix(cwd).unwrap_or(&entry);
        matches.insert(to_posix(relative));
    }
    Ok(matches.into_iter().collect())
}

/// Search presentation files under `cwd`.
///
/// A filter holding `*` is used as the glob itself; any other filter matches
/// as a substring of a file or directory name. Files without an extension are
/// skipped, and when `extensions` is non-empty only those suffixes are kept.
/// Traversal segments and leading slashes are stripped from the filter.
pub fn search_files(filter: &str, cwd: &Path, extensions: &[String]) -> Result<Vec<String>> {
    // Filters come from request query strings; keep them below `cwd`.
    let filter = sanitize(filter, SanitizeOptions::default());
    let patterns = if filter.contains('*') {
        vec![filter.to_string()]
    } else if filter.is_empty() {
        vec!["**/*".to_string()]
    } else {
        vec![format!("**/*{}*", filter), format!("**/*{}*/**/*", filter)]
    };

    let mut matches = BTreeSet::new();
    for pattern in &patterns {
        matches.extend(glob_relative(pattern, cwd, true)?);
    }

    let accepted: Vec<String> = extensions.iter().map(|ext| normalize_extension(ext)).collect();
    Ok(matches
        .into_iter()
        .filter(|found| {
            let extension = url_extname(found);
            !extension.is_empty() && (accepted.is_empty() || accepted.contains(&extension))
        })
        .collect())
}

/// `"*.md"`, `"md"` and `".md"` all become `".md"`.
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim().trim_start_matches('*');
    if trimmed.starts_with('.') {
        trimmed.to_string()
    } else {
        format!(".{}", trimmed)
    }
}

/// Extension of the last URL segment, dot included (`""` for dotfiles).
pub fn url_extname(url: &str) -> String {
    let base = url_basename(url);
    match base.rfind('.') {
        Some(0) | None => String::new(),
        Some(_) if base.chars().all(|c| c == '.') => String::new(),
        Some(index) => base[index..].to_string(),
    }
}

/// Last segment of a URL, trailing slashes ignored.
pub fn url_basename(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(index) => &trimmed[index + 1..],
        None => trimmed,
    }
}

/// Last segment of a URL without its extension.
pub fn url_stem(url: &str) -> String {
    let base = url_basename(url);
    let extension = url_extname(base);
    base[..base.len() - extension.len()].to_string()
}

/// Parent of a URL path (`"/a/b.md"` → `"/a"`, `"b.md"` → `"."`).
pub fn url_dirname(url: &str) -> String {
    if url.is_empty() {
        return ".".to_string();
    }
    let trimmed = url.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    match trimmed.rfind('/') {
        None => ".".to_string(),
        Some(index) => {
            let parent = trimmed[..index].trim_end_matches('/');
            if parent.is_empty() {
                "/".to_string()
            } else {
                parent.to_string()
            }
        }
    }
}

/// Fold `.`, `..` and repeated separators in a URL path.
pub fn url_normalize(url: &str) -> String {
    if url.is_empty() {
        return ".".to_string();
    }
    let absolute = url.starts_with('/');
    let trailing = url.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in url.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let mut normalized = segments.join("/");
    if absolute {
        normalized.insert(0, '/');
    }
    if normalized.is_empty() {
        return ".".to_string();
    }
    if trailing && !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Join URL segments and normalize the result.
pub fn url_join(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/");
    url_normalize(&joined)
}

/// Relative URL leading from directory `from` to `to`; both are taken as rooted.
pub fn url_relative(from: &str, to: &str) -> String {
    let rooted = |url: &str| url_normalize(&format!("/{}", url));
    let from = rooted(from);
    let to = rooted(to);
    let from_segments: Vec<&str> = from.split('/').filter(|s| !s.is_empty()).collect();
    let to_segments: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();

    let common = from_segments
        .iter()
        .zip(to_segments.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; from_segments.len() - common];
    parts.extend(&to_segments[common..]);
    parts.join("/")
}

/// Directory part of a request URL: file URLs use their parent, directory URLs
/// are kept.
pub fn url_directory(url: &str) -> String {
    if url_extname(url).is_empty() {
        url.to_string()
    } else {
        url_dirname(url)
    }
}

struct DebounceState {
    deadline: Option<Instant>,
    shutdown: bool,
}

/// Trailing-edge debouncer: bursts of [`Debouncer::call`] within `wait` run
/// the action once, `wait` after the last call.
pub struct Debouncer {
    shared: Arc<(Mutex<DebounceState>, Condvar)>,
    wait: Duration,
    worker: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new<F>(wait: Duration, action: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new((
            Mutex::new(DebounceState {
                deadline: None,
                shutdown: false,
            }),
            Condvar::new(),
        ));
        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || {
            let (lock, condvar) = &*worker_shared;
            let mut state = lock.lock();
            loop {
                if state.shutdown {
                    break;
                }
                match state.deadline {
                    None => condvar.wait(&mut state),
                    Some(deadline) if Instant::now() >= deadline => {
                        state.deadline = None;
                        parking_lot::MutexGuard::unlocked(&mut state, &action);
                    }
                    Some(deadline) => {
                        condvar.wait_until(&mut state, deadline);
                    }
                }
            }
        });

        Self {
            shared,
            wait,
            worker: Some(worker),
        }
    }

    /// Schedule the action, pushing back any pending run.
    pub fn call(&self) {
        let (lock, condvar) = &*self.shared;
        lock.lock().deadline = Some(Instant::now() + self.wait);
        condvar.notify_one();
    }

    pub fn is_pending(&self) -> bool {
        self.shared.0.lock().deadline.is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        let (lock, condvar) = &*self.shared;
        lock.lock().shutdown = true;
        condvar.notify_one();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
