// ABOUTME: Render engine for the deckhand application
// ABOUTME: Turns request URLs into presentation, collection and error pages plus their local hyperlinks

use crate::assets::{
    get_highlight_theme, get_plugins_options, get_reveal_options, get_scripts, get_slidify_options,
    get_styles, get_theme,
};
use crate::config::ConfigResolver;
use crate::document::parse_document;
use crate::engine::{COLLECTION_TEMPLATE, DOCUMENT_TEMPLATE, ERROR_TEMPLATE, build_environment};
use crate::errors::{DeckError, Result};
use crate::hyperlinks::{Hyperlink, HyperlinkRewriter, LinkContext};
use crate::preprocess::PreprocessorRegistry;
use crate::utils::{
    search_files, to_title_case, url_basename, url_dirname, url_extname, url_join, url_stem,
};
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::sync::Arc;

/// Values handed to preprocessors and to the document template.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentOptions {
    pub project: String,
    pub has_favicon: bool,
    pub hero: String,
    pub name: String,
    pub title: String,
    pub description: String,
    pub date: Value,
    pub author: Value,
    pub content: String,
    pub git_url: String,
    pub theme_url: String,
    pub highlight_theme_url: String,
    pub script_urls: Vec<String>,
    pub style_urls: Vec<String>,
    pub plugins_options: String,
    pub reveal_options: String,
    pub slidify_options: String,
    pub host: String,
    pub port: u16,
    pub watch: bool,
    pub extension: String,
}

/// One presentation listed on a collection page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionItem {
    pub name: String,
    pub file_name: String,
    pub title: String,
    pub endpoint: String,
    pub endpoint_url: String,
    pub live_url: String,
    pub built_url: String,
    pub item: String,
    pub item_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionOptions {
    pub project: String,
    pub has_favicon: bool,
    pub breadcrumb: String,
    pub title: String,
    pub theme_url: String,
    pub build: bool,
    pub content: Vec<CollectionItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorOptions<'a> {
    project: &'a str,
    has_favicon: bool,
    code: u16,
    label: &'a str,
    message: &'a str,
}

/// Shared by the server, the builder and the printer so that every consumer
/// produces the same markup for a URL.
pub struct Renderer {
    resolver: Arc<ConfigResolver>,
    preprocessors: PreprocessorRegistry,
    hyperlinks: HyperlinkRewriter,
}

impl Renderer {
    pub fn new(resolver: Arc<ConfigResolver>, preprocessors: PreprocessorRegistry) -> Result<Self> {
        Ok(Self {
            resolver,
            preprocessors,
            hyperlinks: HyperlinkRewriter::new()?,
        })
    }

    pub fn resolver(&self) -> &Arc<ConfigResolver> {
        &self.resolver
    }

    /// Render the presentation at `url` and return its markup with the local
    /// files it links to.
    pub fn render_document(&self, url: &str) -> Result<(String, Vec<Hyperlink>)> {
        let extension = url_extname(url);
        let name = url_stem(url);
        let title = to_title_case(&name);

        let base = self.resolver.base()?;
        let target_url = base.target_url(url).to_string();
        let target_path = base.content_path(url);
        let text = fs::read_to_string(&target_path)
            .map_err(|_| DeckError::DocumentNotFound(url.to_string()))?;
        let document = parse_document(url, &text)?;
        debug!("Rendering document {} from {:?}", url, target_path);

        let config = self.resolver.resolve(Some(&document.config))?;
        let env = build_environment(&config, url)?;
        let presentation = &config.presentation;

        let mut options = DocumentOptions {
            project: config.project.clone(),
            has_favicon: config.has_favicon,
            hero: joined_text(&presentation.hero),
            name: presentation.name.clone().unwrap_or(name),
            title: presentation.title.clone().unwrap_or(title),
            description: joined_text(&presentation.description),
            date: presentation.date.clone(),
            author: presentation.author.clone(),
            content: document.content,
            git_url: if config.git.is_empty() {
                String::new()
            } else {
                format!("{}{}", config.git, target_url)
            },
            theme_url: get_theme(&config, url)?.url,
            highlight_theme_url: get_highlight_theme(&config, url)?.url,
            script_urls: get_scripts(&config, url)?.into_iter().map(|a| a.url).collect(),
            style_urls: get_styles(&config, url)?.into_iter().map(|a| a.url).collect(),
            plugins_options: get_plugins_options(&config),
            reveal_options: get_reveal_options(&config, url)?,
            slidify_options: get_slidify_options(&config),
            host: config.host.clone(),
            port: config.port,
            watch: config.watch,
            extension,
        };

        for preprocessor in self.preprocessors.resolve(&config)? {
            options.content = preprocessor.process(&options.content, &options)?;
        }

        let document_dir = target_path
            .parent()
            .map(|dir| dir.to_path_buf())
            .unwrap_or_else(|| config.root_dir.clone());
        let assets = config.assets_module();
        let context = LinkContext {
            url,
            document_dir: &document_dir,
            assets: &assets,
        };
        let (content, hyperlinks) = self.hyperlinks.rewrite(&options.content, &context);

        options.content = env.render_str(&content, &options)?;
        let markup = env.get_template(DOCUMENT_TEMPLATE)?.render(&options)?;
        Ok((markup, hyperlinks))
    }

    /// Render the presentation listing of the directory at `url`.
    pub fn render_collection(&self, url: &str, filter: &str) -> Result<String> {
        let build = self.resolver.base()?.build;
        self.render_collection_as(url, filter, build)
    }

    /// Render a collection with item links pointing at built (`.html`) or
    /// live documents.
    pub fn render_collection_as(&self, url: &str, filter: &str, build: bool) -> Result<String> {
        let config = self.resolver.base()?;
        let target_url = config.target_url(url).to_string();
        let target_path = config.content_path(url);
        if !self.resolver.fs_cache().is_directory(&target_path) {
            return Err(DeckError::CollectionNotFound(url.to_string()));
        }
        debug!("Rendering collection {} (filter {:?})", url, filter);

        let env = build_environment(&config, url)?;
        let presentations = search_files(filter, &target_path, &config.extensions)?;
        let content = presentations
            .iter()
            .map(|presentation| collection_item(presentation, build))
            .collect();

        let options = CollectionOptions {
            project: config.project.clone(),
            has_favicon: config.has_favicon,
            breadcrumb: target_url,
            title: to_title_case(url_basename(url)),
            theme_url: get_theme(&config, url)?.url,
            build,
            content,
        };
        Ok(env.get_template(COLLECTION_TEMPLATE)?.render(&options)?)
    }

    /// Render an error page. Never fails: a template problem falls back to a
    /// bare page.
    pub fn render_error(&self, url: &str, code: u16, label: &str, message: &str) -> String {
        match self.try_render_error(url, code, label, message) {
            Ok(markup) => markup,
            Err(e) => {
                warn!("Failed to render error page for {}: {}", url, e);
                fallback_error_page(code, label, message)
            }
        }
    }

    fn try_render_error(&self, url: &str, code: u16, label: &str, message: &str) -> Result<String> {
        let config = self.resolver.base()?;
        let env = build_environment(&config, url)?;
        let options = ErrorOptions {
            project: &config.project,
            has_favicon: config.has_favicon,
            code,
            label,
            message,
        };
        Ok(env.get_template(ERROR_TEMPLATE)?.render(&options)?)
    }
}

/// Build a listing entry for a path relative to the collection directory.
pub fn collection_item(presentation: &str, build: bool) -> CollectionItem {
    let name = url_stem(presentation);
    let file_name = url_basename(presentation).to_string();
    let endpoint_url = url_dirname(presentation);
    let live_url = url_join(&[&endpoint_url, &file_name]);
    let built_url = url_join(&[&endpoint_url, &format!("{}.html", name)]);
    CollectionItem {
        title: to_title_case(&name),
        endpoint: url_join(&["/", &endpoint_url]),
        item: if build { name.clone() } else { file_name.clone() },
        item_url: if build { built_url.clone() } else { live_url.clone() },
        name,
        file_name,
        endpoint_url,
        live_url,
        built_url,
    }
}

/// Strings pass through, lists are concatenated, null is empty.
fn joined_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(joined_text).collect(),
        other => other.to_string(),
    }
}

fn fallback_error_page(code: u16, label: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{code}</title></head>\n<body>\n<h1>{code} {}</h1>\n<pre>{}</pre>\n</body>\n</html>",
        escape_html(label),
        escape_html(message),
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_items_for_live_and_built_links() {
        let live = collection_item("intro.md", false);
        assert_eq!(live.name, "intro");
        assert_eq!(live.file_name, "intro.md");
        assert_eq!(live.title, "Intro");
        assert_eq!(live.endpoint, "/");
        assert_eq!(live.endpoint_url, ".");
        assert_eq!(live.item, "intro.md");
        assert_eq!(live.item_url, "intro.md");

        let built = collection_item("talks/deep-dive.md", true);
        assert_eq!(built.title, "Deep Dive");
        assert_eq!(built.endpoint, "/talks");
        assert_eq!(built.endpoint_url, "talks");
        assert_eq!(built.live_url, "talks/deep-dive.md");
        assert_eq!(built.built_url, "talks/deep-dive.html");
        assert_eq!(built.item, "deep-dive");
        assert_eq!(built.item_url, "talks/deep-dive.html");
    }

    #[test]
    fn text_values_are_joined() {
        assert_eq!(joined_text(&json!(null)), "");
        assert_eq!(joined_text(&json!("one")), "one");
        assert_eq!(joined_text(&json!(["a", "b", 3])), "ab3");
    }

    #[test]
    fn fallback_page_escapes_its_message() {
        let page = fallback_error_page(500, "Internal Error", "<script>");
        assert!(page.contains("500 Internal Error"));
        assert!(page.contains("&lt;script&gt;"));
    }
}
