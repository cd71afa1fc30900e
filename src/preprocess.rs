// ABOUTME: Content preprocessors run before hyperlink rewriting
// ABOUTME: A name-keyed registry resolved from preprocessor glob patterns under the assets directory

use crate::config::Config;
use crate::errors::{DeckError, Result};
use crate::render::DocumentOptions;
use crate::utils::{SanitizeOptions, glob_relative, sanitize, url_stem};
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Transforms document content before it is rendered.
pub trait Preprocessor: Send + Sync {
    fn process(&self, content: &str, options: &DocumentOptions) -> Result<String>;
}

impl<F> Preprocessor for F
where
    F: Fn(&str, &DocumentOptions) -> Result<String> + Send + Sync,
{
    fn process(&self, content: &str, options: &DocumentOptions) -> Result<String> {
        self(content, options)
    }
}

/// Preprocessors available to documents, keyed by the file stem that selects them.
#[derive(Clone)]
pub struct PreprocessorRegistry {
    entries: HashMap<String, Arc<dyn Preprocessor>>,
}

impl fmt::Debug for PreprocessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("PreprocessorRegistry").field("entries", &names).finish()
    }
}

impl Default for PreprocessorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("identity", identity);
        registry.register("headings", headings);
        registry
    }
}

impl PreprocessorRegistry {
    /// A registry with the built-in `identity` and `headings` preprocessors.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, preprocessor: impl Preprocessor + 'static) {
        self.entries.insert(name.to_string(), Arc::new(preprocessor));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Preprocessor>> {
        self.entries.get(name).cloned()
    }

    /// Preprocessors selected by `preprocessor_paths`, in match order.
    ///
    /// Each match under the assets directory is looked up by file stem; with
    /// no configured paths the content passes through unchanged.
    pub fn resolve(&self, config: &Config) -> Result<Vec<Arc<dyn Preprocessor>>> {
        if config.preprocessor_paths.is_empty() {
            let identity: Arc<dyn Preprocessor> = Arc::new(identity);
            return Ok(vec![identity]);
        }

        let mut selected = Vec::new();
        for pattern in config.preprocessor_paths.iter() {
            let pattern = sanitize(pattern, SanitizeOptions::default());
            for found in glob_relative(&pattern, &config.assets_dir, true)? {
                let name = url_stem(&found);
                let preprocessor = self.get(&name).ok_or_else(|| DeckError::PreprocessorLoad {
                    path: config.assets_dir.join(&found),
                    message: format!("no preprocessor registered as {:?}", name),
                })?;
                debug!("Using preprocessor {} for {}", name, found);
                selected.push(preprocessor);
            }
        }
        Ok(selected)
    }
}

fn identity(content: &str, _options: &DocumentOptions) -> Result<String> {
    Ok(content.to_string())
}

/// Split a deck on level-one headings: `# Title` starts a new slide and
/// `#^ Title` starts a vertical slide. `\#` keeps a literal hash.
fn headings(content: &str, _options: &DocumentOptions) -> Result<String> {
    const ESCAPED_HASH: &str = "!--HASH--!";
    let content = content.replace(r"\#", ESCAPED_HASH);

    let mut result = String::with_capacity(content.len());
    let mut in_fence = false;
    let mut seen_heading = false;

    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        let heading = if in_fence { None } else { parse_heading(trimmed) };
        match heading {
            Some((vertical, text)) => {
                if seen_heading {
                    result.push_str(if vertical { "\n----\n\n" } else { "\n---\n\n" });
                }
                result.push_str(if vertical { "## " } else { "# " });
                result.push_str(text);
                seen_heading = true;
            }
            None => result.push_str(line),
        }
        result.push('\n');
    }

    Ok(result.replace(ESCAPED_HASH, "#"))
}

/// `Some((vertical, text))` for `# text`, `#text` and `#^ text`; deeper headings are left alone.
fn parse_heading(line: &str) -> Option<(bool, &str)> {
    let rest = line.strip_prefix('#')?;
    if rest.starts_with('#') {
        return None;
    }
    match rest.strip_prefix('^') {
        Some(text) => Some((true, text.trim())),
        None => Some((false, rest.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StringList;
    use std::fs;
    use tempfile::TempDir;

    fn run(name: &str, content: &str) -> String {
        let registry = PreprocessorRegistry::new();
        registry
            .get(name)
            .unwrap()
            .process(content, &DocumentOptions::default())
            .unwrap()
    }

    #[test]
    fn identity_keeps_content() {
        assert_eq!(run("identity", "# a\n\nb"), "# a\n\nb");
    }

    #[test]
    fn headings_split_slides() {
        let content = "# One\nfirst\n#Two\nsecond\n#^ Down\nbelow\n## Sub\n\\# not a slide";
        assert_eq!(
            run("headings", content),
            "# One\nfirst\n\n---\n\n# Two\nsecond\n\n----\n\n## Down\nbelow\n## Sub\n# not a slide\n"
        );
    }

    #[test]
    fn headings_skip_fenced_code() {
        let content = "# One\n```sh\n# comment\n```\n# Two";
        assert_eq!(
            run("headings", content),
            "# One\n```sh\n# comment\n```\n\n---\n\n# Two\n"
        );
    }

    #[test]
    fn custom_preprocessors_are_resolved_by_stem() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("pre")).unwrap();
        fs::write(dir.path().join("pre/shout.js"), "").unwrap();
        fs::write(dir.path().join("pre/headings.js"), "").unwrap();

        let mut registry = PreprocessorRegistry::new();
        registry.register("shout", |content: &str, _: &DocumentOptions| -> Result<String> {
            Ok(content.to_uppercase())
        });

        let mut config = Config::default();
        config.assets_dir = dir.path().to_path_buf();
        config.preprocessor_paths = StringList(vec!["pre/*.js".into()]);

        let selected = registry.resolve(&config).unwrap();
        assert_eq!(selected.len(), 2);
        let options = DocumentOptions::default();
        let mut content = "# a\n# b".to_string();
        for preprocessor in &selected {
            content = preprocessor.process(&content, &options).unwrap();
        }
        assert_eq!(content, "# A\n\n---\n\n# B\n");
    }

    #[test]
    fn unknown_preprocessor_is_a_load_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("mystery.js"), "").unwrap();

        let mut config = Config::default();
        config.assets_dir = dir.path().to_path_buf();
        config.preprocessor_paths = StringList(vec!["*.js".into()]);

        let result = PreprocessorRegistry::new().resolve(&config);
        assert!(matches!(result, Err(DeckError::PreprocessorLoad { .. })));
    }

    #[test]
    fn no_paths_means_identity() {
        let selected = PreprocessorRegistry::empty().resolve(&Config::default()).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(
            selected[0].process("x", &DocumentOptions::default()).unwrap(),
            "x"
        );
    }
}
