//! Web tools: page fetch, search against a JSON posts endpoint, download.
//!
//! Outbound requests share one HTTP client and a semaphore capping how many
//! run at once. The dispatch engine rate-limits these tools per host before
//! they get here.

use reqwest::Url;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

use super::files::write_atomic;
use crate::tools::{
    CallContext, HandlerError, Schema, SideEffectClass, ToolDescriptor, ToolRegistry,
    ValidatedArguments,
};
use crate::types::{Error, Result, WebConfig};

const SNIPPET_CHARS: usize = 200;

/// Tags whose text never shows up in extracted page text.
const SKIP_TAGS: [&str; 4] = ["script", "style", "noscript", "svg"];

/// Shared state for the web tools.
#[derive(Debug)]
pub struct WebTools {
    client: reqwest::Client,
    permits: Semaphore,
    config: WebConfig,
}

impl WebTools {
    pub fn new(config: WebConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            permits: Semaphore::new(config.max_concurrent.max(1)),
            config,
        })
    }

    /// Parse and vet a caller URL. Only http(s) is accepted; hosts outside
    /// the known list are allowed but logged.
    fn check_url(&self, raw: &str) -> std::result::Result<Url, HandlerError> {
        let url = Url::parse(raw).map_err(|e| HandlerError::invalid_input(format!("invalid URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HandlerError::invalid_input("only HTTP and HTTPS URLs are allowed"));
        }
        let host = url.host_str().unwrap_or_default();
        let known = self
            .config
            .allowed_hosts
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")));
        if !known {
            tracing::warn!(host, "Accessing host not in allow list");
        }
        Ok(url)
    }

    /// Held for the whole request, body included.
    async fn permit(&self) -> std::result::Result<SemaphorePermit<'_>, HandlerError> {
        self.permits
            .acquire()
            .await
            .map_err(|_| HandlerError::failed("web tools are shutting down"))
    }

    async fn get(&self, url: Url) -> std::result::Result<reqwest::Response, HandlerError> {
        self.client.get(url).send().await.map_err(network_error)
    }

    /// Read the body, failing once it exceeds the configured cap.
    async fn read_capped(&self, mut response: reqwest::Response) -> std::result::Result<Vec<u8>, HandlerError> {
        let cap = self.config.max_response_bytes;
        if let Some(len) = response.content_length() {
            if len > cap as u64 {
                return Err(too_large(len as usize, cap));
            }
        }
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(network_error)? {
            body.extend_from_slice(&chunk);
            if body.len() > cap {
                return Err(too_large(body.len(), cap));
            }
        }
        Ok(body)
    }

    async fn fetch_webpage(&self, args: ValidatedArguments) -> std::result::Result<Value, HandlerError> {
        let FetchArgs {
            url,
            include_html,
            extract_links,
        } = args.parse()?;
        let url = self.check_url(&url)?;

        let _permit = self.permit().await?;
        let response = self.get(url.clone()).await?;
        let status = response.status();
        let content_type = header_text(&response, reqwest::header::CONTENT_TYPE);
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                let v = v.to_str().ok()?;
                Some((k.as_str().to_string(), Value::String(v.to_string())))
            })
            .collect();
        let body = self.read_capped(response).await?;

        let html = String::from_utf8_lossy(&body).into_owned();
        let page = parse_page(&html, &url, extract_links);

        Ok(json!({
            "url": url.as_str(),
            "status_code": status.as_u16(),
            "content_type": content_type,
            "title": page.title,
            "description": page.description,
            "text_content": page.text,
            "html_content": include_html.then_some(html),
            "links": extract_links.then_some(page.links),
            "response_size": body.len(),
            "headers": headers,
        }))
    }

    async fn search_web(&self, args: ValidatedArguments) -> std::result::Result<Value, HandlerError> {
        let SearchArgs {
            query,
            max_results,
            language,
        } = args.parse()?;
        if query.trim().is_empty() {
            return Err(HandlerError::invalid_input("query cannot be empty"));
        }
        let endpoint = Url::parse(&self.config.search_endpoint)
            .map_err(|e| HandlerError::failed(format!("search endpoint misconfigured: {e}")))?;

        let _permit = self.permit().await?;
        let response = self.get(endpoint).await?;
        if !response.status().is_success() {
            return Err(HandlerError::failed(format!(
                "search API returned status {}",
                response.status().as_u16()
            )));
        }
        let body = self.read_capped(response).await?;
        let posts: Vec<Post> = serde_json::from_slice(&body)
            .map_err(|e| HandlerError::failed(format!("search API returned malformed JSON: {e}")))?;

        let needle = query.to_lowercase();
        let base = self.config.search_endpoint.trim_end_matches('/');
        let matching: Vec<Value> = posts
            .iter()
            .filter(|p| p.title.to_lowercase().contains(&needle) || p.body.to_lowercase().contains(&needle))
            .map(|p| {
                let id = match &p.id {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                json!({
                    "title": p.title,
                    "snippet": snippet(&p.body),
                    "url": format!("{base}/{id}"),
                    "id": p.id,
                })
            })
            .collect();
        let total_found = matching.len();
        let results: Vec<Value> = matching.into_iter().take(max_results).collect();

        Ok(json!({
            "query": query,
            "language": language,
            "max_results": max_results,
            "total_found": total_found,
            "results_returned": results.len(),
            "results": results,
        }))
    }

    async fn download_file(&self, args: ValidatedArguments, ctx: CallContext) -> std::result::Result<Value, HandlerError> {
        let DownloadArgs { url, filename } = args.parse()?;
        let url = self.check_url(&url)?;

        let filename = match filename.filter(|f| !f.trim().is_empty()) {
            Some(name) => name,
            None => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|s| !s.is_empty())
                .unwrap_or("downloaded_file")
                .to_string(),
        };
        if filename.contains(['/', '\\']) || filename == "." || filename == ".." {
            return Err(HandlerError::invalid_input("filename must be a plain file name"));
        }

        let raw_target = ctx
            .guard()
            .roots()
            .first()
            .ok_or_else(|| HandlerError::failed("no sandbox roots configured"))?
            .join(&filename)
            .to_string_lossy()
            .into_owned();
        // Fail fast on a disallowed name before spending the request.
        ctx.write_file(&raw_target)?;

        let _permit = self.permit().await?;
        let response = self.get(url.clone()).await?;
        if !response.status().is_success() {
            return Err(HandlerError::failed(format!(
                "download failed with status {}",
                response.status().as_u16()
            )));
        }
        let content_type = header_text(&response, reqwest::header::CONTENT_TYPE);
        let body = self.read_capped(response).await?;

        let target = ctx.write_file(&raw_target)?;
        write_atomic(target.as_path(), &body).await?;

        Ok(json!({
            "url": url.as_str(),
            "filename": filename,
            "size": body.len(),
            "content_type": content_type,
            "success": true,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct FetchArgs {
    url: String,
    #[serde(default)]
    include_html: bool,
    #[serde(default)]
    extract_links: bool,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    max_results: usize,
    #[serde(default = "default_language")]
    language: String,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize)]
struct DownloadArgs {
    url: String,
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
}

fn network_error(e: reqwest::Error) -> HandlerError {
    if e.is_timeout() {
        HandlerError::failed("request timed out")
    } else {
        HandlerError::failed(format!("network error: {}", e.without_url()))
    }
}

fn too_large(size: usize, cap: usize) -> HandlerError {
    HandlerError::failed(format!("response too large: {size} bytes (max {cap})"))
}

fn header_text(response: &reqwest::Response, name: reqwest::header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn snippet(body: &str) -> String {
    if body.chars().count() > SNIPPET_CHARS {
        let cut: String = body.chars().take(SNIPPET_CHARS).collect();
        format!("{cut}...")
    } else {
        body.to_string()
    }
}

// =============================================================================
// HTML extraction
// =============================================================================

#[derive(Debug, Default, PartialEq)]
struct PageSummary {
    title: String,
    description: String,
    text: String,
    links: Vec<Value>,
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

/// Pull title, meta description, readable text and (optionally) absolute
/// links out of an HTML document.
fn parse_page(html: &str, base: &Url, extract_links: bool) -> PageSummary {
    let document = Html::parse_document(html);

    let title = select_first(&document, "title")
        .map(|t| clean_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default();
    let description = select_first(&document, r#"meta[name="description"]"#)
        .and_then(|m| m.value().attr("content"))
        .unwrap_or_default()
        .to_string();

    let root = select_first(&document, "body").unwrap_or_else(|| document.root_element());
    let text = clean_whitespace(&collect_text(root).join(" "));

    let mut links = Vec::new();
    if extract_links {
        if let Ok(anchors) = Selector::parse("a[href]") {
            for anchor in document.select(&anchors) {
                let Some(href) = anchor.value().attr("href") else {
                    continue;
                };
                let Ok(absolute) = base.join(href) else {
                    continue;
                };
                links.push(json!({
                    "text": clean_whitespace(&anchor.text().collect::<String>()),
                    "url": absolute.as_str(),
                    "title": anchor.value().attr("title").unwrap_or_default(),
                }));
            }
        }
    }

    PageSummary {
        title,
        description,
        text,
        links,
    }
}

fn collect_text(element: ElementRef<'_>) -> Vec<String> {
    if SKIP_TAGS.contains(&element.value().name()) {
        return Vec::new();
    }
    let mut parts = Vec::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let t = text.trim();
                if !t.is_empty() {
                    parts.push(t.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    parts.extend(collect_text(child));
                }
            }
            _ => {}
        }
    }
    parts
}

fn clean_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// =============================================================================
// Registration
// =============================================================================

pub fn register(registry: &mut ToolRegistry, config: &WebConfig) -> Result<()> {
    let web = Arc::new(WebTools::new(config.clone())?);

    let tools = web.clone();
    registry.register(
        ToolDescriptor::new(
            "fetch_webpage",
            "Fetch and parse a webpage",
            Schema::object()
                .required("url", Schema::string().describe("URL of the webpage to fetch"))
                .optional(
                    "include_html",
                    Schema::boolean()
                        .describe("Include raw HTML content in response")
                        .default_value(json!(false)),
                )
                .optional(
                    "extract_links",
                    Schema::boolean()
                        .describe("Extract all links from the webpage")
                        .default_value(json!(false)),
                ),
        )
        .side_effect(SideEffectClass::Network)
        .url_field("url"),
        move |args: ValidatedArguments, _ctx: CallContext| {
            let tools = tools.clone();
            async move { tools.fetch_webpage(args).await }
        },
    )?;

    let tools = web.clone();
    registry.register(
        ToolDescriptor::new(
            "search_web",
            "Search the web for information (simulated)",
            Schema::object()
                .required("query", Schema::string().describe("Search query"))
                .optional(
                    "max_results",
                    Schema::integer()
                        .describe("Maximum number of results to return")
                        .min(1.0)
                        .max(50.0)
                        .default_value(json!(10)),
                )
                .optional(
                    "language",
                    Schema::string()
                        .describe("Language code for search results")
                        .default_value(json!("en")),
                ),
        )
        .side_effect(SideEffectClass::Network),
        move |args: ValidatedArguments, _ctx: CallContext| {
            let tools = tools.clone();
            async move { tools.search_web(args).await }
        },
    )?;

    let tools = web;
    registry.register(
        ToolDescriptor::new(
            "download_file",
            "Download a file from a URL into the sandbox",
            Schema::object()
                .required("url", Schema::string().describe("URL of the file to download"))
                .optional(
                    "filename",
                    Schema::string().describe("Local filename to save as (optional)"),
                ),
        )
        .side_effect(SideEffectClass::Network)
        .url_field("url"),
        move |args: ValidatedArguments, ctx: CallContext| {
            let tools = tools.clone();
            async move { tools.download_file(args, ctx).await }
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/docs/index.html").unwrap()
    }

    #[test]
    fn test_parse_page_metadata_and_text() {
        let html = r#"<html><head><title> My  Page </title>
            <meta name="description" content="A test page"></head>
            <body><h1>Hello</h1><script>var x = 1;</script><p>World</p></body></html>"#;
        let page = parse_page(html, &base(), false);

        assert_eq!(page.title, "My Page");
        assert_eq!(page.description, "A test page");
        assert_eq!(page.text, "Hello World");
        assert!(page.links.is_empty());
    }

    #[test]
    fn test_links_are_made_absolute() {
        let html = r#"<body><a href="../about.html" title="About">About us</a>
            <a href="https://other.org/x">Other</a></body>"#;
        let page = parse_page(html, &base(), true);

        assert_eq!(page.links.len(), 2);
        assert_eq!(page.links[0]["url"], "https://example.com/about.html");
        assert_eq!(page.links[0]["title"], "About");
        assert_eq!(page.links[1]["text"], "Other");
    }

    #[test]
    fn test_check_url_schemes() {
        let web = WebTools::new(WebConfig::default()).unwrap();
        assert!(web.check_url("https://example.com").is_ok());
        assert!(web.check_url("http://unknown.test/page").is_ok());
        assert!(matches!(
            web.check_url("file:///etc/passwd"),
            Err(HandlerError::InvalidInput(_))
        ));
        assert!(web.check_url("not a url").is_err());
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(250);
        let s = snippet(&long);
        assert_eq!(s.chars().count(), SNIPPET_CHARS + 3);
        assert!(s.ends_with("..."));
        assert_eq!(snippet("short"), "short");
    }
}
