// ABOUTME: HTTP serving layer for live presentations
// ABOUTME: Routes requests to rendered pages or static files and pushes live reloads over WebSocket

use crate::errors::{DeckError, Result};
use crate::render::Renderer;
use crate::utils::{Debouncer, SanitizeOptions, sanitize, url_extname};
use crate::watch::FileWatcher;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tiny_http::{Header, Request, Response, StatusCode};
use tungstenite::handshake::derive_accept_key;
use tungstenite::protocol::Role;
use tungstenite::{Message, WebSocket};
use url::Url;

/// Number of threads pulling requests off the listener.
const WORKERS: usize = 4;

/// Quiet period before connected pages are told to reload.
const RELOAD_DELAY: Duration = Duration::from_millis(300);

/// Outcome of routing one request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Html { status: u16, body: String },
    Redirect { status: u16, location: String },
    File(PathBuf),
    /// Bare 404 for URLs outside the base URL.
    NotFound,
}

/// Maps request URLs to replies. Holds no connection state.
pub struct Router {
    renderer: Arc<Renderer>,
}

impl Router {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self { renderer }
    }

    /// Route a raw request URL (path plus optional query).
    pub fn route(&self, request_url: &str) -> Reply {
        let resolver = self.renderer.resolver();
        let config = match resolver.base() {
            Ok(config) => config,
            Err(e) => return self.error_page(request_url, 500, "Error loading configuration.", &e.to_string()),
        };

        let Some(request) = ParsedUrl::parse(request_url) else {
            return Reply::NotFound;
        };
        let uri = request.path.as_str();

        if uri == "/favicon.ico" {
            let favicon = config.assets_dir.join("favicon.ico");
            if is_file(&favicon) {
                return Reply::File(favicon);
            }
        }

        let assets = config.assets_module();
        let mounts = std::iter::once(&assets).chain(
            config
                .modules
                .iter()
                .filter(|(name, _)| name.as_str() != "assets")
                .map(|(_, module)| module),
        );
        for module in mounts {
            let (Some(root), Some(rest)) = (&module.path, strip_mount(uri, &module.url)) else {
                continue;
            };
            let relative = sanitize(rest, SanitizeOptions::default());
            let file = if relative.is_empty() {
                root.clone()
            } else {
                root.join(relative)
            };
            if is_file(&file) {
                return Reply::File(file);
            }
        }

        let base_url = config.base_url.as_str();
        if uri == "/" && !base_url.is_empty() {
            return Reply::Redirect {
                status: 302,
                location: base_url.to_string(),
            };
        }
        if !uri.starts_with(base_url) {
            return Reply::NotFound;
        }

        let url = sanitize(uri, SanitizeOptions::LEADING);
        let extension = url_extname(&url);

        if extension.is_empty() {
            if !uri.ends_with('/') {
                return Reply::Redirect {
                    status: 301,
                    location: format!("{}/{}", request.raw_path, request.query_suffix()),
                };
            }
            let filter = request.query_value("filter").unwrap_or_default();
            return match self.renderer.render_collection(&url, &filter) {
                Ok(body) => Reply::Html { status: 200, body },
                Err(e) => {
                    debug!("Error serving collection {}: {}", url, e);
                    self.error_page(&url, 500, "Error serving collection.", &e.to_string())
                }
            };
        }

        if config.is_document_extension(&extension) {
            return match self.renderer.render_document(&url) {
                Ok((body, _)) => Reply::Html { status: 200, body },
                Err(e) => {
                    debug!("Error serving presentation {}: {}", url, e);
                    self.error_page(&url, 500, "Error serving presentation.", &e.to_string())
                }
            };
        }

        let file = config.content_path(&url);
        if is_file(&file) {
            return Reply::File(file);
        }
        self.error_page(
            &url,
            404,
            "Page not found.",
            "The page you're looking for doesn't exist.",
        )
    }

    fn error_page(&self, url: &str, status: u16, label: &str, message: &str) -> Reply {
        Reply::Html {
            status,
            body: self.renderer.render_error(url, status, label, message),
        }
    }
}

/// Request URL split into its decoded path and query.
struct ParsedUrl {
    path: String,
    raw_path: String,
    url: Url,
}

impl ParsedUrl {
    fn parse(request_url: &str) -> Option<Self> {
        let url = Url::parse("http://localhost").ok()?.join(request_url).ok()?;
        let raw_path = url.path().to_string();
        let path = percent_decode_str(&raw_path).decode_utf8_lossy().into_owned();
        Some(Self { path, raw_path, url })
    }

    fn query_suffix(&self) -> String {
        self.url.query().map(|query| format!("?{}", query)).unwrap_or_default()
    }

    fn query_value(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }
}

/// Uncached, so files created after startup are found.
fn is_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|metadata| metadata.is_file())
}

/// Remainder of `uri` below a module mount point.
fn strip_mount<'a>(uri: &'a str, mount: &str) -> Option<&'a str> {
    let rest = uri.strip_prefix(mount)?;
    if rest.is_empty() || rest.starts_with('/') || mount.ends_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Content type for a served file, by extension.
pub fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "md" | "markdown" | "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "eot" => "application/vnd.ms-fontobject",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

/// A connected page waiting for reload notifications.
pub trait ReloadClient: Send {
    /// Deliver `message`; `false` drops the client.
    fn send(&mut self, message: &str) -> bool;
}

impl<S: Read + Write + Send> ReloadClient for WebSocket<S> {
    fn send(&mut self, message: &str) -> bool {
        WebSocket::send(self, Message::Text(message.to_string())).is_ok()
    }
}

/// Connected live-reload clients.
#[derive(Default)]
pub struct LiveReload {
    clients: Mutex<Vec<Box<dyn ReloadClient>>>,
}

impl LiveReload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, client: Box<dyn ReloadClient>) {
        self.clients.lock().push(client);
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Send `message` to every client, dropping the ones that fail. Returns
    /// the number of clients reached.
    ///
    /// Sends happen outside the lock. Clients added meanwhile are kept but
    /// not sent to.
    pub fn broadcast(&self, message: &str) -> usize {
        let mut clients = std::mem::take(&mut *self.clients.lock());
        let before = clients.len();
        clients.retain_mut(|client| client.send(message));
        let reached = clients.len();
        if reached < before {
            debug!("Dropped {} live reload client(s)", before - reached);
        }

        let mut current = self.clients.lock();
        clients.append(&mut current);
        *current = clients;
        reached
    }
}

/// The live presentation server.
pub struct Server {
    http: Arc<tiny_http::Server>,
    workers: Vec<JoinHandle<()>>,
    live_reload: Arc<LiveReload>,
    watcher: Option<FileWatcher>,
    reload: Option<Arc<Debouncer>>,
    host: String,
    port: u16,
}

impl Server {
    /// Bind the listener, start the request workers and, in watch mode, the
    /// file watcher.
    pub fn start(renderer: Arc<Renderer>) -> Result<Self> {
        let config = renderer.resolver().base()?;
        let http = tiny_http::Server::http(format!("0.0.0.0:{}", config.port))
            .map_err(|e| DeckError::Server(format!("Failed to start HTTP server: {}", e)))?;
        let port = http
            .server_addr()
            .to_ip()
            .map(|address| address.port())
            .unwrap_or(config.port);
        let http = Arc::new(http);
        let live_reload = Arc::new(LiveReload::new());
        let router = Arc::new(Router::new(Arc::clone(&renderer)));

        let mut workers = Vec::with_capacity(WORKERS);
        for index in 0..WORKERS {
            let http = Arc::clone(&http);
            let router = Arc::clone(&router);
            let live_reload = Arc::clone(&live_reload);
            let worker = thread::Builder::new()
                .name(format!("deckhand-http-{}", index))
                .spawn(move || {
                    for request in http.incoming_requests() {
                        handle_request(request, &router, &live_reload);
                    }
                })?;
            workers.push(worker);
        }

        let (watcher, reload) = if config.watch {
            let reload = {
                let live_reload = Arc::clone(&live_reload);
                Arc::new(Debouncer::new(RELOAD_DELAY, move || {
                    let reached = live_reload.broadcast("reload");
                    debug!("Sent reload to {} client(s)", reached);
                }))
            };
            let trigger = Arc::clone(&reload);
            let resolver = Arc::clone(renderer.resolver());
            let roots = vec![config.assets_dir.clone(), config.root_dir.clone()];
            let watcher = FileWatcher::start(&roots, move |_| {
                resolver.fs_cache().clear();
                resolver.clear();
                trigger.call();
            })?;
            (Some(watcher), Some(reload))
        } else {
            (None, None)
        };

        info!(
            "Presentations server running at http://{}:{}",
            config.host, port
        );

        Ok(Self {
            http,
            workers,
            live_reload,
            watcher,
            reload,
            host: config.host.clone(),
            port,
        })
    }

    /// Port actually bound (differs from the configured one when that was 0).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `http://host:port`
    pub fn origin(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn live_reload(&self) -> &Arc<LiveReload> {
        &self.live_reload
    }

    /// Stop the watcher, unblock every worker and wait for them to finish.
    pub fn shutdown(mut self) {
        info!("Shutting down server...");
        self.watcher.take();
        self.reload.take();
        for _ in 0..self.workers.len() {
            self.http.unblock();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn handle_request(request: Request, router: &Router, live_reload: &LiveReload) {
    if is_websocket_upgrade(&request) {
        accept_websocket(request, live_reload);
        return;
    }

    let url = request.url().to_string();
    let reply = router.route(&url);
    debug!("{} {} -> {}", request.method(), url, describe(&reply));
    if let Err(e) = respond(request, reply) {
        error!("Failed to send response for {}: {}", url, e);
    }
}

fn describe(reply: &Reply) -> String {
    match reply {
        Reply::Html { status, .. } => status.to_string(),
        Reply::Redirect { status, location } => format!("{} {}", status, location),
        Reply::File(path) => format!("{:?}", path),
        Reply::NotFound => "404".to_string(),
    }
}

fn header(field: &str, value: &str) -> Result<Header> {
    Header::from_bytes(field.as_bytes(), value.as_bytes())
        .map_err(|_| DeckError::Server(format!("Invalid header {}: {}", field, value)))
}

fn respond(request: Request, reply: Reply) -> Result<()> {
    match reply {
        Reply::Html { status, body } => {
            let response = Response::from_string(body)
                .with_status_code(StatusCode(status))
                .with_header(header("Content-Type", "text/html; charset=utf-8")?);
            request.respond(response)?;
        }
        Reply::Redirect { status, location } => {
            let response = Response::empty(StatusCode(status)).with_header(header("Location", &location)?);
            request.respond(response)?;
        }
        Reply::File(path) => match File::open(&path) {
            Ok(file) => {
                let response = Response::from_file(file)
                    .with_header(header("Content-Type", content_type(&path))?);
                request.respond(response)?;
            }
            Err(e) => {
                warn!("Failed to read file {:?}: {}", path, e);
                request.respond(Response::from_string("404 Not Found").with_status_code(StatusCode(404)))?;
            }
        },
        Reply::NotFound => {
            request.respond(Response::from_string("404 Not Found").with_status_code(StatusCode(404)))?;
        }
    }
    Ok(())
}

fn header_value<'a>(request: &'a Request, field: &'static str) -> Option<&'a str> {
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv(field))
        .map(|header| header.value.as_str())
}

fn is_websocket_upgrade(request: &Request) -> bool {
    header_value(request, "Upgrade").is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

fn accept_websocket(request: Request, live_reload: &LiveReload) {
    let Some(key) = header_value(&request, "Sec-WebSocket-Key").map(str::to_string) else {
        let _ = request.respond(Response::from_string("Missing Sec-WebSocket-Key").with_status_code(StatusCode(400)));
        return;
    };

    let headers = [
        header("Upgrade", "websocket"),
        header("Connection", "Upgrade"),
        header("Sec-WebSocket-Accept", &derive_accept_key(key.as_bytes())),
    ];
    let mut response = Response::new_empty(StatusCode(101));
    for header in headers {
        match header {
            Ok(header) => response.add_header(header),
            Err(e) => {
                error!("Failed to upgrade live reload connection: {}", e);
                return;
            }
        }
    }

    let stream = request.upgrade("websocket", response);
    let socket = WebSocket::from_raw_socket(stream, Role::Server, None);
    live_reload.add(Box::new(socket));
    debug!("Live reload client connected ({} total)", live_reload.client_count());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeClient {
        received: Arc<AtomicUsize>,
        alive: bool,
    }

    impl ReloadClient for FakeClient {
        fn send(&mut self, message: &str) -> bool {
            assert_eq!(message, "reload");
            if self.alive {
                self.received.fetch_add(1, Ordering::SeqCst);
            }
            self.alive
        }
    }

    #[test]
    fn broadcast_drops_dead_clients() {
        let hub = LiveReload::new();
        let received = Arc::new(AtomicUsize::new(0));
        hub.add(Box::new(FakeClient { received: Arc::clone(&received), alive: true }));
        hub.add(Box::new(FakeClient { received: Arc::clone(&received), alive: false }));
        hub.add(Box::new(FakeClient { received: Arc::clone(&received), alive: true }));

        assert_eq!(hub.broadcast("reload"), 2);
        assert_eq!(received.load(Ordering::SeqCst), 2);
        assert_eq!(hub.client_count(), 2);
    }

    /// Connects another client while it is being sent to.
    struct ReconnectingClient {
        hub: Arc<LiveReload>,
        received: Arc<AtomicUsize>,
    }

    impl ReloadClient for ReconnectingClient {
        fn send(&mut self, _message: &str) -> bool {
            self.hub.add(Box::new(FakeClient { received: Arc::clone(&self.received), alive: true }));
            false
        }
    }

    #[test]
    fn clients_added_during_a_broadcast_are_kept() {
        let hub = Arc::new(LiveReload::new());
        let received = Arc::new(AtomicUsize::new(0));
        hub.add(Box::new(FakeClient { received: Arc::clone(&received), alive: true }));
        hub.add(Box::new(ReconnectingClient { hub: Arc::clone(&hub), received: Arc::clone(&received) }));

        assert_eq!(hub.broadcast("reload"), 1);
        assert_eq!(received.load(Ordering::SeqCst), 1);
        // The reconnecting client is gone and its replacement stays.
        assert_eq!(hub.client_count(), 2);

        assert_eq!(hub.broadcast("reload"), 2);
        assert_eq!(received.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn debounced_reload_broadcasts_once() {
        let hub = Arc::new(LiveReload::new());
        let received = Arc::new(AtomicUsize::new(0));
        hub.add(Box::new(FakeClient { received: Arc::clone(&received), alive: true }));

        let target = Arc::clone(&hub);
        let reload = Debouncer::new(Duration::from_millis(100), move || {
            target.broadcast("reload");
        });
        reload.call();
        reload.call();
        reload.call();
        thread::sleep(Duration::from_millis(400));
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mounts_match_whole_segments() {
        assert_eq!(strip_mount("/assets/a.css", "/assets"), Some("/a.css"));
        assert_eq!(strip_mount("/assets", "/assets"), Some(""));
        assert_eq!(strip_mount("/assetsx/a.css", "/assets"), None);
        assert_eq!(strip_mount("/other", "/assets"), None);
    }

    #[test]
    fn parsed_urls_decode_paths_and_keep_queries() {
        let parsed = ParsedUrl::parse("/my%20talks?filter=intro&x=1").unwrap();
        assert_eq!(parsed.path, "/my talks");
        assert_eq!(parsed.raw_path, "/my%20talks");
        assert_eq!(parsed.query_suffix(), "?filter=intro&x=1");
        assert_eq!(parsed.query_value("filter").as_deref(), Some("intro"));
        assert_eq!(parsed.query_value("missing"), None);
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type(Path::new("a/b.css")), "text/css; charset=utf-8");
        assert_eq!(content_type(Path::new("logo.PNG")), "image/png");
        assert_eq!(content_type(Path::new("LICENSE")), "application/octet-stream");
    }
}
