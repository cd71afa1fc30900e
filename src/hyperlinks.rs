// ABOUTME: Hyperlink rewriting for presentation content
// ABOUTME: Remaps asset shortcuts and collects local files referenced by a document

use crate::config::ModuleConfig;
use crate::errors::Result;
use crate::assets::is_absolute_url;
use crate::utils::{normalize_path, url_dirname, url_join, url_relative};
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Prefix that points a link at the assets module.
const ASSETS_PREFIX: &str = "@/";

/// A local file referenced from rendered content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperlink {
    pub url: String,
    pub path: PathBuf,
}

/// Where the links of one document are resolved from.
#[derive(Debug, Clone, Copy)]
pub struct LinkContext<'a> {
    /// Request URL of the document.
    pub url: &'a str,
    /// Directory holding the document on disk.
    pub document_dir: &'a Path,
    pub assets: &'a ModuleConfig,
}

#[derive(Debug, PartialEq, Eq)]
enum LinkTarget {
    Untouched,
    Asset(String),
    Local(Hyperlink),
}

/// Two-stage rewriter: Markdown links first, then `href` / `data-background-image`
/// attributes.
#[derive(Debug, Clone)]
pub struct HyperlinkRewriter {
    markdown: Regex,
    attributes: Regex,
}

impl HyperlinkRewriter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            markdown: Regex::new(r"\[.*\]\((.+?)\)")?,
            attributes: Regex::new(r#"(?:data-background-image|href)=["'](.+?)["']"#)?,
        })
    }

    /// Rewrite `content` and return it with the local files it references,
    /// deduplicated by path in order of first appearance.
    pub fn rewrite(&self, content: &str, context: &LinkContext<'_>) -> (String, Vec<Hyperlink>) {
        let (content, mut hyperlinks) = rewrite_stage(&self.markdown, content, context);
        let (content, attribute_links) = rewrite_stage(&self.attributes, &content, context);
        hyperlinks.extend(attribute_links);

        let mut seen = HashSet::new();
        hyperlinks.retain(|link| seen.insert(link.path.clone()));
        (content, hyperlinks)
    }
}

fn rewrite_stage(
    pattern: &Regex,
    content: &str,
    context: &LinkContext<'_>,
) -> (String, Vec<Hyperlink>) {
    let mut collected = Vec::new();
    let rewritten = pattern
        .replace_all(content, |caps: &Captures<'_>| {
            let (Some(whole), Some(target)) = (caps.get(0), caps.get(1)) else {
                return caps[0].to_string();
            };
            let reference = target.as_str().split_whitespace().next().unwrap_or("");
            let replacement = match classify(reference, context) {
                LinkTarget::Untouched => return whole.as_str().to_string(),
                LinkTarget::Asset(url) => url,
                LinkTarget::Local(link) => {
                    let url = link.url.clone();
                    collected.push(link);
                    url
                }
            };
            let start = target.start() - whole.start();
            let end = start + reference.len();
            let text = whole.as_str();
            format!("{}{}{}", &text[..start], replacement, &text[end..])
        })
        .into_owned();
    (rewritten, collected)
}

fn classify(reference: &str, context: &LinkContext<'_>) -> LinkTarget {
    if reference.is_empty() || is_absolute_url(reference) || has_scheme(reference) {
        return LinkTarget::Untouched;
    }
    if reference.starts_with('#') {
        return LinkTarget::Untouched;
    }

    let directory = url_dirname(context.url);
    if let Some(rest) = reference.strip_prefix(ASSETS_PREFIX) {
        let target = url_join(&[&context.assets.url, rest]);
        return LinkTarget::Asset(url_relative(&directory, &target));
    }

    let file = reference.split(['?', '#']).next().unwrap_or(reference);
    LinkTarget::Local(Hyperlink {
        url: url_relative(&directory, &url_join(&[&directory, reference])),
        path: normalize_path(&context.document_dir.join(file)),
    })
}

/// `mailto:`, `data:`, `tel:` and friends.
fn has_scheme(reference: &str) -> bool {
    match reference.split_once(':') {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}
