//! Web tools for searching the internet and reading pages.
//!
//! `web_search` returns result lists; `fetch_content` returns a page's
//! readable text and is the tool whose results become research sources.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

use crate::error::{AgentError, Result};
use crate::tool::{
    FetchContentParams, Tool, ToolContext, ToolResult, WebSearchParams, truncate_chars,
};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("sleuth/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";
const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AgentError::internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Web Search Tool
// ─────────────────────────────────────────────────────────────────────────────

/// Search provider configuration.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum SearchProvider {
    /// DuckDuckGo HTML endpoint (no API key needed)
    #[default]
    DuckDuckGo,
    /// Brave Search API
    Brave { api_key: String },
}

impl std::fmt::Debug for SearchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuckDuckGo => f.write_str("DuckDuckGo"),
            Self::Brave { .. } => f.write_str("Brave { api_key: [REDACTED] }"),
        }
    }
}

/// Configuration for web search.
#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    /// Search provider configuration.
    pub provider: SearchProvider,
    /// Upper bound on results returned by one search.
    pub max_results: usize,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProvider::DuckDuckGo,
            max_results: 10,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A single search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Tool for searching the web.
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    client: Client,
    config: WebSearchConfig,
}

impl WebSearchTool {
    /// Create a web search tool with the default configuration (DuckDuckGo).
    pub fn new() -> Result<Self> {
        Self::with_config(WebSearchConfig::default())
    }

    /// Create a web search tool with custom configuration.
    pub fn with_config(config: WebSearchConfig) -> Result<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self { client, config })
    }

    /// Number of results to return for a requested count.
    fn result_limit(&self, requested: u64) -> usize {
        usize::try_from(requested)
            .unwrap_or(usize::MAX)
            .min(self.config.max_results)
            .max(1)
    }

    async fn search_duckduckgo(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let url = format!("{}?q={}", DUCKDUCKGO_HTML_URL, urlencoding::encode(query));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::tool(format!("DuckDuckGo request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AgentError::tool(format!(
                "DuckDuckGo search error: {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AgentError::tool(format!("Failed to read response: {}", e)))?;

        Ok(parse_duckduckgo_html(&html, limit))
    }

    async fn search_brave(
        &self,
        query: &str,
        api_key: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let url = format!(
            "{}?q={}&count={}",
            BRAVE_SEARCH_URL,
            urlencoding::encode(query),
            limit
        );

        let response = self
            .client
            .get(&url)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AgentError::tool(format!("Brave request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AgentError::tool(format!(
                "Brave search error: {}",
                response.status()
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| AgentError::tool(format!("Failed to parse response: {}", e)))?;

        Ok(parse_brave_results(&data, limit))
    }
}

/// Parse the result list out of a DuckDuckGo HTML results page.
///
/// Ads are skipped and DuckDuckGo's redirect links are resolved to the
/// target URL.
pub fn parse_duckduckgo_html(html: &str, limit: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(link_sel), Ok(snippet_sel)) = (
        Selector::parse(".result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let mut results = Vec::new();
    for result in document.select(&result_sel) {
        if results.len() >= limit {
            break;
        }
        if result.value().classes().any(|c| c == "result--ad") {
            continue;
        }

        let Some(link) = result.select(&link_sel).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href").and_then(resolve_duckduckgo_href) else {
            continue;
        };

        let title = collapse_whitespace(&link.text().collect::<String>());
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(|s| collapse_whitespace(&s.text().collect::<String>()))
            .unwrap_or_default();

        results.push(SearchResult {
            title,
            url,
            snippet,
        });
    }

    results
}

/// Turn a DuckDuckGo result href into the destination URL.
///
/// Result links usually look like `//duckduckgo.com/l/?uddg=<encoded>&rut=...`.
fn resolve_duckduckgo_href(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };

    let url = Url::parse(&absolute).ok()?;
    if let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "uddg") {
        return Some(target.into_owned());
    }

    match url.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}

/// Parse a Brave Search API response body.
pub fn parse_brave_results(data: &Value, limit: usize) -> Vec<SearchResult> {
    data["web"]["results"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|r| {
                    Some(SearchResult {
                        title: r["title"].as_str()?.to_string(),
                        url: r["url"].as_str()?.to_string(),
                        snippet: r["description"].as_str().unwrap_or("").to_string(),
                    })
                })
                .take(limit)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information on a given query. Returns a list of search results with titles, URLs, and snippets."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to look up"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (default: 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        if ctx.is_cancelled() {
            return Ok(ToolResult::error("Operation cancelled"));
        }

        let params = match WebSearchParams::try_from(params) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };
        let limit = self.result_limit(params.num_results);

        let results = match &self.config.provider {
            SearchProvider::DuckDuckGo => self.search_duckduckgo(&params.query, limit).await,
            SearchProvider::Brave { api_key } => {
                self.search_brave(&params.query, api_key, limit).await
            }
        };

        match results {
            Ok(results) => {
                tracing::debug!(query = %params.query, count = results.len(), "Search completed");
                Ok(ToolResult::json(json!({
                    "query": params.query,
                    "count": results.len(),
                    "results": results
                })))
            }
            Err(e) => Ok(ToolResult::error(format!("Search failed: {}", e))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fetch Content Tool
// ─────────────────────────────────────────────────────────────────────────────

/// Most characters of page text returned.
pub const MAX_CONTENT_CHARS: usize = 10_000;
/// Most links returned when link extraction is requested.
pub const MAX_LINKS: usize = 50;
/// Most characters of link text kept per link.
pub const MAX_LINK_TEXT_CHARS: usize = 100;

const TRUNCATION_SUFFIX: &str = "... [truncated]";

/// Elements whose text never counts as page content.
const SKIPPED_TAGS: [&str; 5] = ["script", "style", "nav", "footer", "header"];

/// Containers tried in order before falling back to `<body>`.
const CONTENT_SELECTORS: [&str; 5] = ["article", "main", ".content", "#content", ".post"];

/// Configuration for page fetching.
#[derive(Debug, Clone)]
pub struct WebFetchConfig {
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for WebFetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A link found on a fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub text: String,
    pub url: String,
}

/// Readable content extracted from an HTML page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageExtract {
    pub title: String,
    pub content: String,
    pub links: Vec<PageLink>,
}

/// Tool for fetching a page and extracting its main text.
#[derive(Debug, Clone)]
pub struct FetchContentTool {
    client: Client,
}

impl FetchContentTool {
    /// Create a fetch tool with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(WebFetchConfig::default())
    }

    /// Create a fetch tool with custom configuration.
    pub fn with_config(config: WebFetchConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout)?,
        })
    }

    async fn fetch(&self, url: &Url) -> std::result::Result<(String, String), reqwest::Error> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await?
            .error_for_status()?;
        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok((final_url, body))
    }
}

/// Extract the title, main text and (optionally) links from an HTML page.
pub fn extract_page(html: &str, extract_links: bool) -> PageExtract {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "No title".to_string());

    let container = CONTENT_SELECTORS
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|sel| document.select(&sel).find(|el| !within_skipped(el)))
        .or_else(|| {
            Selector::parse("body")
                .ok()
                .and_then(|sel| document.select(&sel).next())
        });

    let mut lines = Vec::new();
    if let Some(container) = container {
        collect_text(container, &mut lines);
    }
    let text = lines.join("\n");
    let content = match truncate_chars(&text, MAX_CONTENT_CHARS) {
        (kept, true) => format!("{}{}", kept, TRUNCATION_SUFFIX),
        (kept, false) => kept.to_string(),
    };

    let links = if extract_links {
        collect_links(&document)
    } else {
        Vec::new()
    };

    PageExtract {
        title,
        content,
        links,
    }
}

/// Gather trimmed text nodes in document order, skipping non-content elements.
fn collect_text(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            }
            Node::Element(el) if SKIPPED_TAGS.contains(&el.name()) => {}
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn within_skipped(element: &ElementRef<'_>) -> bool {
    element.ancestors().any(|node| {
        node.value()
            .as_element()
            .is_some_and(|el| SKIPPED_TAGS.contains(&el.name()))
    })
}

fn collect_links(document: &Html) -> Vec<PageLink> {
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&anchor)
        .filter(|a| !within_skipped(a))
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            if !href.starts_with("http") {
                return None;
            }
            let text = collapse_whitespace(&a.text().collect::<String>());
            Some(PageLink {
                text: truncate_chars(&text, MAX_LINK_TEXT_CHARS).0.to_string(),
                url: href.to_string(),
            })
        })
        .take(MAX_LINKS)
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl Tool for FetchContentTool {
    fn name(&self) -> &str {
        "fetch_content"
    }

    fn description(&self) -> &str {
        "Fetch the content of a web page and extract the main text. Useful for reading articles, documentation, or other web content."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL of the web page to fetch"
                },
                "extract_links": {
                    "type": "boolean",
                    "description": "Whether to also extract links from the page",
                    "default": false
                }
            },
            "required": ["url"]
        })
    }

    fn produces_sources(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        if ctx.is_cancelled() {
            return Ok(ToolResult::error("Operation cancelled"));
        }

        let params = match FetchContentParams::try_from(params) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        let (final_url, body) = match self.fetch(&params.url).await {
            Ok(fetched) => fetched,
            Err(e) => return Ok(ToolResult::error(format!("Failed to fetch URL: {}", e))),
        };

        let page = extract_page(&body, params.extract_links);
        tracing::debug!(
            url = %final_url,
            content_chars = page.content.chars().count(),
            links = page.links.len(),
            "Page fetched"
        );

        let mut result = json!({
            "title": page.title,
            "url": final_url,
            "content": page.content,
        });
        if params.extract_links {
            result["links"] = json!(page.links);
        }

        Ok(ToolResult::json(result))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
