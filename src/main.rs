// ABOUTME: Main entry point for the deckhand program.
// ABOUTME: Parses the CLI, resolves target presentations, then serves, builds or prints them.

use anyhow::{Context, bail};
use clap::Parser;
use deckhand::build::{BuildReport, Builder};
use deckhand::config::{CliOptions, ConfigResolver, PrintTarget, package_dir_from_env};
use deckhand::print::Printer;
use deckhand::render::Renderer;
use deckhand::server::Server;
use deckhand::utils::{FsCache, SanitizeOptions, sanitize, search_files, to_posix, url_join};
use deckhand::{PreprocessorRegistry, init};
use log::{error, info, warn};
use std::env;
use std::path::Path;
use std::sync::{Arc, mpsc};

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    long_about = None,
    disable_version_flag = true
)]
struct Cli {
    /// Presentation file, directory or glob; with two values, a directory and a path inside it
    #[arg(default_value = ".", num_args = 0..=2)]
    targets: Vec<String>,

    /// Build the presentations to the output directory
    #[arg(short, long)]
    build: bool,

    /// Print the presentations to PDF (or a slide to JPEG), optionally to PATH
    #[arg(short, long, value_name = "PATH", num_args = 0..=1)]
    print: Option<Option<String>>,

    /// Use every presentation found under a directory target
    #[arg(short, long)]
    all: bool,

    /// Reload open presentations when files change
    #[arg(short, long)]
    watch: bool,

    /// Project configuration file name
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Do not open the browser
    #[arg(long)]
    no_open: bool,

    /// Write a starter project into the current directory
    #[arg(short, long)]
    init: bool,

    /// Host name used in printed and opened URLs
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Slide to print as an image, as "h" or "h-v"
    #[arg(long, value_name = "ID")]
    slide: Option<String>,

    /// Print version
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,
}

impl Cli {
    fn options(&self) -> CliOptions {
        CliOptions {
            targets: self.targets.clone(),
            build: self.build,
            print: self.print.as_ref().map(|path| match path {
                Some(path) => PrintTarget::Path(path.into()),
                None => PrintTarget::Default,
            }),
            all: self.all,
            watch: self.watch,
            config: self.config.clone(),
            no_open: self.no_open,
            host: self.host.clone(),
            port: self.port,
            slide: self.slide.clone(),
        }
    }

    fn mode(&self) -> String {
        let mode: Vec<&str> = [(self.build, "build"), (self.print.is_some(), "print")]
            .into_iter()
            .filter_map(|(set, name)| set.then_some(name))
            .collect();
        if mode.is_empty() {
            "serve".to_string()
        } else {
            mode.join("+")
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("Failed to serve presentations: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = env::current_dir().context("Failed to read the current directory")?;

    if cli.init {
        let created = init::init(&cwd).context("Failed to initialize project")?;
        for path in created {
            info!("Created {:?}", path);
        }
        return Ok(());
    }

    info!("deckhand {} [{}]", env!("CARGO_PKG_VERSION"), cli.mode());

    let resolver = Arc::new(ConfigResolver::new(
        cli.options(),
        cwd,
        package_dir_from_env(),
        Arc::new(FsCache::new()),
    ));
    let config = resolver.base()?;

    let (target_url, target_urls) = find_targets(&resolver)?;
    if target_urls.is_empty() {
        bail!("No presentations found...");
    }
    let url = url_join(&["/", &config.base_url, &target_url]);
    let urls: Vec<String> = target_urls
        .iter()
        .map(|target| url_join(&["/", &config.base_url, target]))
        .collect();

    let renderer = Arc::new(Renderer::new(
        Arc::clone(&resolver),
        PreprocessorRegistry::new(),
    )?);
    let server = Server::start(Arc::clone(&renderer))?;

    if config.build {
        let report = Builder::new(Arc::clone(&renderer)).build(&urls)?;
        summarize("Build", &report);
    }
    if config.print.is_enabled() {
        let printer = Printer::new(Arc::clone(&resolver), server.origin());
        if let Some(report) = printer.print_all(&urls, config.slide.as_deref())? {
            summarize("Print", &report);
        }
    }

    if config.build || config.print.is_enabled() {
        server.shutdown();
        return Ok(());
    }

    if config.open {
        let address = format!("{}{}", server.origin(), url);
        if let Err(e) = open::that(&address) {
            warn!("Unable to open {}: {}", address, e);
        }
    }

    let (stop, stopped) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop.send(());
    })
    .context("Failed to install the Ctrl-C handler")?;
    info!("Press Ctrl-C to stop");
    let _ = stopped.recv();
    server.shutdown();
    Ok(())
}

/// The URL to open and the document URLs (relative to the base URL) the
/// target selects.
fn find_targets(resolver: &ConfigResolver) -> anyhow::Result<(String, Vec<String>)> {
    let config = resolver.base()?;
    let relative = config
        .target_path
        .strip_prefix(&config.root_dir)
        .unwrap_or(Path::new(""));
    let target_url = sanitize(&to_posix(relative), SanitizeOptions::default());

    if target_url.contains('*') {
        let found = search_files(&target_url, &config.root_dir, &config.extensions)?;
        let first = found.first().cloned().unwrap_or_default();
        return Ok((first, found));
    }

    if resolver.fs_cache().is_directory(&config.target_path) {
        let directory = config.root_dir.join(&target_url);
        let found = search_files("", &directory, &config.extensions)?
            .into_iter()
            .map(|document| url_join(&[&target_url, &document]))
            .map(|document| sanitize(&document, SanitizeOptions::default()))
            .collect();
        return Ok((target_url, found));
    }

    if resolver.fs_cache().is_file(&config.target_path) {
        return Ok((target_url.clone(), vec![target_url]));
    }
    Ok((target_url, Vec::new()))
}

fn summarize(step: &str, report: &BuildReport) {
    let failed = report.failures().count();
    if failed == 0 {
        info!("{} finished: {} unit(s)", step, report.outcomes.len());
    } else {
        warn!(
            "{} finished with {} failure(s) out of {} unit(s)",
            step,
            failed,
            report.outcomes.len()
        );
    }
}
