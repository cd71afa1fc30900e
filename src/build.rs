// ABOUTME: Static site builder for presentations
// ABOUTME: Renders documents and collections to disk and copies modules and linked files alongside

use crate::errors::{DeckError, Result};
use crate::render::Renderer;
use crate::utils::{
    SanitizeOptions, ensure_parent_directory_exists, get_readable_path, glob_relative, sanitize,
    to_posix, url_dirname, url_extname, url_join,
};
use glob::Pattern;
use log::{debug, error, info};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file waiting to be written; keyed by destination in a [`FileMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub path: PathBuf,
}

pub type FileMap = BTreeMap<PathBuf, PendingFile>;

/// Include/exclude globs matched against paths relative to the copy source.
#[derive(Debug, Clone, Default)]
pub struct CopyFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl CopyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, pattern: &str) -> Result<Self> {
        self.include.push(Pattern::new(pattern)?);
        Ok(self)
    }

    pub fn exclude(mut self, pattern: &str) -> Result<Self> {
        self.exclude.push(Pattern::new(pattern)?);
        Ok(self)
    }

    pub fn accepts(&self, relative: &str) -> bool {
        (self.include.is_empty() || self.include.iter().any(|p| p.matches(relative)))
            && !self.exclude.iter().any(|p| p.matches(relative))
    }
}

/// Register `from` (a file, or every `**/*.*` file of a directory) for
/// writing under `to`. The first registration of a destination wins.
pub fn copy(from: &Path, to: &Path, files: &mut FileMap, filter: &CopyFilter) -> Result<usize> {
    let cwd = env::current_dir().unwrap_or_default();
    let mut register = |source: PathBuf, destination: PathBuf| -> bool {
        if files.contains_key(&destination) {
            return false;
        }
        debug!(
            "❏ {} → {}",
            get_readable_path(&source, &cwd),
            get_readable_path(&destination, &cwd)
        );
        files.insert(destination, PendingFile { path: source });
        true
    };

    let mut registered = 0;
    if from.is_dir() {
        for found in glob_relative("**/*.*", from, true)? {
            if filter.accepts(&found) && register(from.join(&found), to.join(&found)) {
                registered += 1;
            }
        }
    } else if register(from.to_path_buf(), to.to_path_buf()) {
        registered += 1;
    }
    Ok(registered)
}

/// Destinations already taken by some unit of a build. Units run in
/// parallel, so each destination is handed to exactly one of them.
#[derive(Debug, Default)]
pub struct Claims {
    destinations: Mutex<HashSet<PathBuf>>,
}

impl Claims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the files whose destination nobody has claimed yet, claiming them.
    pub fn claim(&self, files: FileMap) -> FileMap {
        let mut destinations = self.destinations.lock();
        files
            .into_iter()
            .filter(|(destination, _)| {
                let fresh = destinations.insert(destination.clone());
                if !fresh {
                    debug!("Already written by this build: {:?}", destination);
                }
                fresh
            })
            .collect()
    }

    pub fn clear(&self) {
        self.destinations.lock().clear();
    }
}

/// Extension point for output minification; currently passes files through.
pub fn minify(files: FileMap) -> FileMap {
    files
}

/// Read and write every pending file on the rayon pool. Each file gets its own
/// result, in destination order; a failure never stops the others.
pub fn write(files: &FileMap) -> Vec<Result<PathBuf>> {
    let cwd = env::current_dir().unwrap_or_default();
    files
        .par_iter()
        .map(|(destination, file)| {
            debug!(
                "★ {} → {}",
                get_readable_path(&file.path, &cwd),
                get_readable_path(destination, &cwd)
            );
            write_file(&file.path, destination).map_err(|e| {
                error!("Error writing {:?} to {:?}: {}", file.path, destination, e);
                e
            })
        })
        .collect()
}

fn write_file(from: &Path, to: &Path) -> Result<PathBuf> {
    let copy_error = |source| DeckError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    let data = fs::read(from).map_err(copy_error)?;
    ensure_parent_directory_exists(to)?;
    fs::write(to, data).map_err(copy_error)?;
    Ok(to.to_path_buf())
}

/// Collapse per-file results into the first failure, if any.
fn first_failure(results: Vec<Result<PathBuf>>) -> Result<()> {
    results.into_iter().find_map(|r| r.err()).map_or(Ok(()), Err)
}

/// What a build step produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BuildUnit {
    Modules,
    Document(String),
    Collection(String),
    Print(String),
}

impl fmt::Display for BuildUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildUnit::Modules => write!(f, "modules"),
            BuildUnit::Document(url) => write!(f, "document :{}", url),
            BuildUnit::Collection(url) => write!(f, "collection :{}", url),
            BuildUnit::Print(url) => write!(f, "print :{}", url),
        }
    }
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub unit: BuildUnit,
    pub result: Result<PathBuf>,
}

/// Results of every unit of a build, in scheduling order.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub outcomes: Vec<BuildOutcome>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &BuildOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.result.is_err())
    }

    pub fn outcome(&self, unit: &BuildUnit) -> Option<&BuildOutcome> {
        self.outcomes.iter().find(|outcome| &outcome.unit == unit)
    }
}

/// Writes the static site for a set of presentation URLs.
pub struct Builder {
    renderer: Arc<Renderer>,
    claims: Claims,
}

impl Builder {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self {
            renderer,
            claims: Claims::new(),
        }
    }

    /// Copy every module with a path to `out_dir/<module url>`, leaving out
    /// the project file and presentation sources.
    pub fn build_modules(&self) -> Result<PathBuf> {
        let config = self.renderer.resolver().base()?;
        info!("Building modules to {:?}...", config.out_dir);

        let mut filter = CopyFilter::new().exclude(&Pattern::escape(&config.config))?;
        for extension in config.extensions.iter() {
            filter = filter.exclude(&format!("*{}", Pattern::escape(extension)))?;
        }

        let mut files = FileMap::new();
        for module in config.modules.values() {
            let Some(from) = &module.path else {
                continue;
            };
            if !from.exists() {
                debug!("Skipping missing module directory {:?}", from);
                continue;
            }
            let to = config.out_dir.join(module.url.trim_start_matches('/'));
            copy(from, &to, &mut files, &filter)?;
        }
        first_failure(write(&minify(self.claims.claim(files))))?;

        info!("Successfully built modules to {:?}", config.out_dir);
        Ok(config.out_dir.clone())
    }

    /// Render the document at `url` to `out_dir/<url>.html` and copy the files
    /// it links to.
    pub fn build_document(&self, url: &str) -> Result<PathBuf> {
        let config = self.renderer.resolver().base()?;
        let build_url = sanitize(url, SanitizeOptions::LEADING);
        let build_path = config
            .out_dir
            .join(with_extension(&build_url, ".html").trim_start_matches('/'));
        info!("Building \":{}\" to {:?}...", build_url, build_path);

        let (markup, hyperlinks) = self.renderer.render_document(&build_url)?;
        ensure_parent_directory_exists(&build_path)?;
        fs::write(&build_path, markup)?;

        let base_dir = config.out_dir.join(config.base_url.trim_start_matches('/'));
        let mut files = FileMap::new();
        for hyperlink in &hyperlinks {
            let relative = hyperlink
                .path
                .strip_prefix(&config.root_dir)
                .unwrap_or(&hyperlink.path);
            let destination = base_dir.join(sanitize(&to_posix(relative), SanitizeOptions::default()));
            copy(&hyperlink.path, &destination, &mut files, &CopyFilter::new())?;
        }
        first_failure(write(&minify(self.claims.claim(files))))?;

        info!("Successfully built \":{}\" to {:?}", build_url, build_path);
        Ok(build_path)
    }

    /// Render the collection at `url` in build mode to `out_dir/<url>/index.html`.
    pub fn build_collection(&self, url: &str) -> Result<PathBuf> {
        let config = self.renderer.resolver().base()?;
        let build_url = sanitize(url, SanitizeOptions::LEADING);
        let build_path = config
            .out_dir
            .join(with_extension(&build_url, "").trim_start_matches('/'))
            .join("index.html");
        info!("Building \":{}\" to {:?}...", build_url, build_path);

        let markup = self.renderer.render_collection_as(&build_url, "", true)?;
        ensure_parent_directory_exists(&build_path)?;
        fs::write(&build_path, markup)?;

        info!("Successfully built \":{}\" to {:?}", build_url, build_path);
        Ok(build_path)
    }

    /// Build modules, the given documents and every collection between the
    /// build root and each document. Units run concurrently; each one reports
    /// its own result.
    pub fn build(&self, urls: &[String]) -> Result<BuildReport> {
        let config = self.renderer.resolver().base()?;
        let build_root = if self.renderer.resolver().fs_cache().is_directory(&config.target_path) {
            let relative = config
                .target_path
                .strip_prefix(&config.root_dir)
                .unwrap_or(Path::new(""));
            url_join(&["/", &config.base_url, &to_posix(relative)])
        } else {
            url_join(&["/", &config.base_url])
        };

        self.claims.clear();
        let mut seen = HashSet::new();
        let documents: Vec<String> = urls
            .iter()
            .filter(|url| seen.insert(url.as_str()))
            .cloned()
            .collect();

        let mut units = vec![BuildUnit::Modules];
        units.extend(documents.iter().cloned().map(BuildUnit::Document));
        units.extend(
            collection_urls(&build_root, &documents)
                .into_iter()
                .map(BuildUnit::Collection),
        );

        let outcomes = units
            .into_par_iter()
            .map(|unit| {
                let result = match &unit {
                    BuildUnit::Modules => self.build_modules(),
                    BuildUnit::Document(url) => self.build_document(url),
                    BuildUnit::Collection(url) => self.build_collection(url),
                    BuildUnit::Print(url) => Err(DeckError::Configuration(format!(
                        "Print units are not built: {}",
                        url
                    ))),
                };
                if let Err(e) = &result {
                    error!("Error building {}: {}", unit, e);
                }
                BuildOutcome { unit, result }
            })
            .collect();

        Ok(BuildReport { outcomes })
    }
}

/// Replace the extension of the last URL segment (`""` drops it).
fn with_extension(url: &str, extension: &str) -> String {
    let current = url_extname(url);
    format!("{}{}", &url[..url.len() - current.len()], extension)
}

/// Collection URLs from `root` down to the directory of every document, in
/// first-seen order. Documents outside `root` only contribute their own directory.
pub fn collection_urls(root: &str, documents: &[String]) -> Vec<String> {
    let root = root.trim_end_matches('/');
    let root = if root.is_empty() { "/" } else { root };

    let mut seen = HashSet::new();
    let mut collections = Vec::new();
    let mut push = |url: String| {
        if seen.insert(url.clone()) {
            collections.push(url);
        }
    };

    for document in documents {
        let directory = url_dirname(document);
        let below = if root == "/" {
            Some(directory.trim_start_matches('/'))
        } else if directory == root {
            Some("")
        } else {
            directory
                .strip_prefix(root)
                .and_then(|rest| rest.strip_prefix('/'))
        };

        match below {
            Some(below) => {
                push(root.to_string());
                let mut current = root.to_string();
                for segment in below.split('/').filter(|s| !s.is_empty()) {
                    current = url_join(&[&current, segment]);
                    push(current.clone());
                }
            }
            None => push(directory),
        }
    }
    collections
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn claims_hand_each_destination_out_once() {
        let claims = Claims::new();
        let mut first = FileMap::new();
        first.insert(PathBuf::from("/out/a.png"), PendingFile { path: PathBuf::from("/src/a.png") });
        first.insert(PathBuf::from("/out/b.png"), PendingFile { path: PathBuf::from("/src/b.png") });
        let mut second = FileMap::new();
        second.insert(PathBuf::from("/out/b.png"), PendingFile { path: PathBuf::from("/other/b.png") });
        second.insert(PathBuf::from("/out/c.png"), PendingFile { path: PathBuf::from("/src/c.png") });

        assert_eq!(claims.claim(first).len(), 2);
        let remaining = claims.claim(second);
        assert_eq!(remaining.keys().collect::<Vec<_>>(), vec![Path::new("/out/c.png")]);

        claims.clear();
        let mut again = FileMap::new();
        again.insert(PathBuf::from("/out/a.png"), PendingFile { path: PathBuf::from("/src/a.png") });
        assert_eq!(claims.claim(again).len(), 1);
    }

    #[test]
    fn copy_registers_directory_files_once() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("from");
        fs::create_dir_all(from.join("css")).unwrap();
        fs::write(from.join("css/a.css"), "a").unwrap();
        fs::write(from.join("notes.md"), "n").unwrap();
        fs::write(from.join(".hidden.txt"), "h").unwrap();
        fs::write(from.join("LICENSE"), "l").unwrap();

        let to = dir.path().join("to");
        let mut files = FileMap::new();
        let filter = CopyFilter::new().exclude("*.md").unwrap();
        assert_eq!(copy(&from, &to, &mut files, &filter).unwrap(), 1);
        assert_eq!(
            files.get(&to.join("css/a.css")),
            Some(&PendingFile { path: from.join("css/a.css") })
        );
        assert_eq!(files.len(), 1);

        // First registration of a destination wins.
        let other = dir.path().join("other.css");
        fs::write(&other, "other").unwrap();
        assert_eq!(copy(&other, &to.join("css/a.css"), &mut files, &CopyFilter::new()).unwrap(), 0);
        assert_eq!(files[&to.join("css/a.css")].path, from.join("css/a.css"));
    }

    #[test]
    fn include_filter() {
        let filter = CopyFilter::new().include("img/*").unwrap().exclude("*.psd").unwrap();
        assert!(filter.accepts("img/a.png"));
        assert!(!filter.accepts("img/a.psd"));
        assert!(!filter.accepts("css/a.css"));
    }

    #[test]
    fn write_reports_each_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let mut files = FileMap::new();
        files.insert(dir.path().join("out/a.txt"), PendingFile { path: dir.path().join("a.txt") });
        files.insert(dir.path().join("out/b.txt"), PendingFile { path: dir.path().join("missing.txt") });

        let results = write(&files);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DeckError::Copy { .. })));
        assert_eq!(fs::read_to_string(dir.path().join("out/a.txt")).unwrap(), "a");
    }

    #[test]
    fn extensions_are_replaced() {
        assert_eq!(with_extension("/talks/intro.md", ".html"), "/talks/intro.html");
        assert_eq!(with_extension("/talks", ""), "/talks");
        assert_eq!(with_extension("/v1.2/intro", ".html"), "/v1.2/intro.html");
    }

    #[test]
    fn collections_cover_every_ancestor_below_the_root() {
        let documents = vec![
            "/talks/2024/intro.md".to_string(),
            "/talks/outro.md".to_string(),
            "/intro.md".to_string(),
        ];
        assert_eq!(
            collection_urls("/", &documents),
            vec!["/", "/talks", "/talks/2024"]
        );
        assert_eq!(
            collection_urls("/talks", &documents[..2]),
            vec!["/talks", "/talks/2024"]
        );
        assert_eq!(collection_urls("/talks", &documents[2..]), vec!["/"]);
    }
}
