// ABOUTME: Headless browser export of presentations to PDF and slide screenshots
// ABOUTME: Drives headless_chrome against the running presentation server

use crate::build::{BuildOutcome, BuildReport, BuildUnit};
use crate::config::{Config, ConfigResolver};
use crate::errors::{DeckError, Result};
use crate::utils::{SanitizeOptions, ensure_parent_directory_exists, sanitize, url_extname};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Browser window used for slide screenshots.
const SLIDE_WINDOW: (u32, u32) = (1200, 1200);

const SCREENSHOT_QUALITY: u32 = 70;

/// Reveal.js' default presentation size, in CSS pixels.
const DEFAULT_PAGE_PX: (f64, f64) = (960.0, 700.0);

const PAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Paper size in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    fn from_px(width: f64, height: f64) -> Self {
        Self {
            width: width / 96.0,
            height: height / 96.0,
        }
    }
}

/// Parse `"<w>x<h><unit>"` (units px, in, cm, mm; none means px) or a paper
/// format name such as `A4` or `Letter`.
pub fn parse_print_size(size: &str) -> Option<PageSize> {
    let size = size.trim();
    if let Some((width, rest)) = size.split_once('x') {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (height, unit) = rest.split_at(split);
        if let (Ok(width), Ok(height)) = (width.parse::<f64>(), height.parse::<f64>()) {
            let divisor = match unit {
                "" | "px" => 96.0,
                "in" => 1.0,
                "cm" => 2.54,
                "mm" => 25.4,
                _ => return None,
            };
            return Some(PageSize {
                width: width / divisor,
                height: height / divisor,
            });
        }
    }

    let (width, height) = match size.to_ascii_lowercase().as_str() {
        "letter" => (8.5, 11.0),
        "legal" => (8.5, 14.0),
        "tabloid" => (11.0, 17.0),
        "ledger" => (17.0, 11.0),
        "a0" => (33.1, 46.8),
        "a1" => (23.4, 33.1),
        "a2" => (16.54, 23.4),
        "a3" => (11.7, 16.54),
        "a4" => (8.27, 11.7),
        "a5" => (5.83, 8.27),
        "a6" => (4.13, 5.83),
        _ => return None,
    };
    Some(PageSize { width, height })
}

/// Page size for PDF export: `print_size`, then the reveal.js `width`/`height`
/// settings, then 960x700px.
pub fn page_size(config: &Config) -> PageSize {
    if let Some(size) = config.print_size.as_deref().filter(|s| !s.is_empty()) {
        match parse_print_size(size) {
            Some(page) => return page,
            None => warn!("Ignoring unrecognized print size {:?}", size),
        }
    }

    let settings = &config.presentation.settings;
    match (
        settings.get("width").and_then(Value::as_f64),
        settings.get("height").and_then(Value::as_f64),
    ) {
        (Some(width), Some(height)) => PageSize::from_px(width, height),
        _ => PageSize::from_px(DEFAULT_PAGE_PX.0, DEFAULT_PAGE_PX.1),
    }
}

/// Reveal.js hash for a `"h-v"` slide reference (`"2-1"` → `"#/2/1"`).
///
/// Only the first two segments count. Without a horizontal index there is no hash.
pub fn get_slide_url(slide: &str) -> String {
    let mut segments = slide.split('-');
    let Some(horizontal) = segments.next().and_then(parse_leading_int) else {
        return String::new();
    };
    match segments.next().and_then(parse_leading_int) {
        Some(vertical) => format!("#/{}/{}", horizontal, vertical),
        None => format!("#/{}", horizontal),
    }
}

/// Leading integer of a string, ignoring surrounding whitespace and trailing junk.
fn parse_leading_int(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let digits_start = usize::from(text.starts_with(['-', '+']));
    let digits_end = text[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(text.len(), |end| digits_start + end);
    if digits_end == digits_start {
        return None;
    }
    text[..digits_end].parse().ok()
}

/// Where the export of `url` lands: the explicit `--print` path, or
/// `out_dir/<url>.jpg` for a slide, or `out_dir/pdf/<url below the base>.pdf`.
pub fn print_path(config: &Config, url: &str, slide: Option<&str>) -> PathBuf {
    if let Some(path) = config.print.path() {
        return path.to_path_buf();
    }
    let print_url = sanitize(url, SanitizeOptions::LEADING);
    let stem = &print_url[..print_url.len() - url_extname(&print_url).len()];
    match slide {
        Some(_) => config
            .out_dir
            .join(format!("{}.jpg", stem.trim_start_matches('/'))),
        None => {
            let below_base = stem.strip_prefix(config.base_url.as_str()).unwrap_or(stem);
            config
                .out_dir
                .join("pdf")
                .join(format!("{}.pdf", below_base.trim_start_matches('/')))
        }
    }
}

/// Exports presentations served at `origin`.
pub struct Printer {
    resolver: Arc<ConfigResolver>,
    origin: String,
}

impl Printer {
    pub fn new(resolver: Arc<ConfigResolver>, origin: impl Into<String>) -> Self {
        Self {
            resolver,
            origin: origin.into(),
        }
    }

    /// Page address the browser loads for `url`.
    pub fn page_url(&self, url: &str, slide: Option<&str>) -> String {
        let print_url = sanitize(url, SanitizeOptions::LEADING);
        match slide {
            Some(slide) => format!(
                "{}{}?menu=hide{}",
                self.origin,
                print_url,
                get_slide_url(slide)
            ),
            None => format!("{}{}?menu=hide&view=print", self.origin, print_url),
        }
    }

    /// Export one presentation. `Ok(None)` when no headless browser could be launched.
    pub fn print(&self, url: &str, slide: Option<&str>) -> Result<Option<PathBuf>> {
        let config = self.resolver.base()?;
        let Some(browser) = launch(&config, slide.is_some())? else {
            return Ok(None);
        };
        self.print_with(&browser, &config, url, slide).map(Some)
    }

    /// Export each distinct URL with a single browser. `Ok(None)` when no
    /// headless browser could be launched.
    pub fn print_all(&self, urls: &[String], slide: Option<&str>) -> Result<Option<BuildReport>> {
        let config = self.resolver.base()?;
        let Some(browser) = launch(&config, slide.is_some())? else {
            return Ok(None);
        };

        let mut seen = HashSet::new();
        let outcomes = urls
            .iter()
            .filter(|url| seen.insert(url.as_str()))
            .map(|url| {
                let result = self.print_with(&browser, &config, url, slide);
                if let Err(e) = &result {
                    warn!("Unable to print \":{}\": {}", url, e);
                }
                BuildOutcome {
                    unit: BuildUnit::Print(url.clone()),
                    result,
                }
            })
            .collect();
        Ok(Some(BuildReport { outcomes }))
    }

    fn print_with(
        &self,
        browser: &Browser,
        config: &Config,
        url: &str,
        slide: Option<&str>,
    ) -> Result<PathBuf> {
        let target = self.page_url(url, slide);
        let path = print_path(config, url, slide);
        info!("Printing \"{}\" to {:?}...", target, path);

        let tab = browser
            .new_tab()
            .map_err(|e| DeckError::browser("Failed to create new tab", e))?;
        open_page(&tab, &target)?;

        let data = match slide {
            Some(_) => tab
                .capture_screenshot(
                    CaptureScreenshotFormatOption::Jpeg,
                    Some(SCREENSHOT_QUALITY),
                    None,
                    true,
                )
                .map_err(|e| DeckError::browser("Failed to capture slide", e))?,
            None => {
                let page = page_size(config);
                debug!("Printing at {:.2}in x {:.2}in", page.width, page.height);
                tab.print_to_pdf(Some(PrintToPdfOptions {
                    print_background: Some(true),
                    paper_width: Some(page.width),
                    paper_height: Some(page.height),
                    ..Default::default()
                }))
                .map_err(|e| DeckError::browser("Failed to print PDF", e))?
            }
        };
        let _ = tab.close(true);

        ensure_parent_directory_exists(&path)?;
        fs::write(&path, data)?;
        info!("Successfully printed \"{}\" to {:?}", target, path);
        Ok(path)
    }
}

fn open_page(tab: &Tab, target: &str) -> Result<()> {
    tab.navigate_to(target)
        .map_err(|e| DeckError::browser("Failed to navigate to presentation", e))?;
    tab.wait_until_navigated()
        .map_err(|e| DeckError::browser("Navigation failed", e))?;
    tab.wait_for_element_with_custom_timeout(".reveal", PAGE_TIMEOUT)
        .map_err(|e| DeckError::browser("Presentation did not load", e))?;
    // Give reveal.js time to lay out slides and load fonts.
    thread::sleep(Duration::from_millis(500));
    Ok(())
}

/// Launch headless Chrome. A browser that cannot start is a warning, not an error.
fn launch(config: &Config, slide: bool) -> Result<Option<Browser>> {
    let browser_path = config
        .browser_path
        .clone()
        .filter(|path| !path.is_empty())
        .or_else(|| env::var("BROWSER_PATH").ok().filter(|path| !path.is_empty()));
    let extra_args: Vec<OsString> = config
        .browser_args
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(OsString::from)
        .collect();

    let mut builder = LaunchOptionsBuilder::default();
    builder.headless(true);
    if slide {
        builder.window_size(Some(SLIDE_WINDOW));
    }
    if let Some(path) = browser_path {
        builder.path(Some(PathBuf::from(path)));
    }
    if !extra_args.is_empty() {
        builder.args(extra_args.iter().map(OsString::as_os_str).collect::<Vec<&OsStr>>());
    }
    let options = builder
        .build()
        .map_err(|e| DeckError::browser("Failed to build browser options", format!("{:?}", e)))?;

    info!("Launching headless browser");
    match Browser::new(options) {
        Ok(browser) => Ok(Some(browser)),
        Err(e) => {
            warn!("Unable to print, no headless browser available: {}", e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrintSetting;
    use serde_json::json;
    use std::path::Path;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn sizes_with_units() {
        let page = parse_print_size("1920x1080").unwrap();
        assert!(close(page.width, 20.0) && close(page.height, 11.25));
        let page = parse_print_size("210x297mm").unwrap();
        assert!(close(page.width, 210.0 / 25.4) && close(page.height, 297.0 / 25.4));
        let page = parse_print_size("8.5x11in").unwrap();
        assert!(close(page.width, 8.5) && close(page.height, 11.0));
        assert!(parse_print_size("10x10furlong").is_none());
    }

    #[test]
    fn named_formats() {
        assert_eq!(parse_print_size("A4"), Some(PageSize { width: 8.27, height: 11.7 }));
        assert_eq!(parse_print_size("letter"), Some(PageSize { width: 8.5, height: 11.0 }));
        assert_eq!(parse_print_size("B52"), None);
    }

    #[test]
    fn page_size_falls_back_to_settings_then_default() {
        let mut config = Config::default();
        let page = page_size(&config);
        assert!(close(page.width, 10.0) && close(page.height, 700.0 / 96.0));

        config.presentation.settings = json!({ "width": 1920, "height": 1080 });
        let page = page_size(&config);
        assert!(close(page.width, 20.0));

        config.print_size = Some("A5".into());
        assert_eq!(page_size(&config).width, 5.83);
    }

    #[test]
    fn slide_urls() {
        assert_eq!(get_slide_url("2"), "#/2");
        assert_eq!(get_slide_url("2-1"), "#/2/1");
        assert_eq!(get_slide_url(" 3px-04"), "#/3/4");
        assert_eq!(get_slide_url("title"), "");
    }

    #[test]
    fn slide_urls_need_a_horizontal_index() {
        assert_eq!(get_slide_url("x-2"), "");
        assert_eq!(get_slide_url("-1"), "");
        assert_eq!(get_slide_url(""), "");
        assert_eq!(get_slide_url("3-x"), "#/3");
        assert_eq!(get_slide_url("1-2-3"), "#/1/2");
    }

    #[test]
    fn output_paths() {
        let mut config = Config::default();
        config.out_dir = PathBuf::from("/site");
        config.base_url = "/slides".into();

        assert_eq!(
            print_path(&config, "/slides/talks/intro.md", None),
            Path::new("/site/pdf/talks/intro.pdf")
        );
        assert_eq!(
            print_path(&config, "/slides/talks/intro.md", Some("2")),
            Path::new("/site/slides/talks/intro.jpg")
        );

        config.print = PrintSetting::Path(PathBuf::from("/tmp/deck.pdf"));
        assert_eq!(print_path(&config, "/slides/intro.md", None), Path::new("/tmp/deck.pdf"));
    }

    #[test]
    fn page_urls_hide_the_menu() {
        let printer = Printer::new(
            Arc::new(ConfigResolver::new(
                Default::default(),
                PathBuf::from("."),
                PathBuf::from("."),
                Default::default(),
            )),
            "http://localhost:5000",
        );
        assert_eq!(
            printer.page_url("/intro.md", None),
            "http://localhost:5000/intro.md?menu=hide&view=print"
        );
        assert_eq!(
            printer.page_url("intro.md", Some("1-2")),
            "http://localhost:5000/intro.md?menu=hide#/1/2"
        );
    }
}
