//! Built-in research tools.
//!
//! - `web_search`: finds candidate pages
//! - `fetch_content`: reads a page; its results become sources

mod web;

use std::time::Duration;

pub use web::{
    FetchContentTool, PageExtract, PageLink, SearchProvider, SearchResult, USER_AGENT,
    WebFetchConfig, WebSearchConfig, WebSearchTool, extract_page, parse_brave_results,
    parse_duckduckgo_html,
};

use crate::error::Result;
use crate::tool::ToolRegistry;

/// Build the default tool set: `web_search` followed by `fetch_content`.
pub fn default_registry(
    provider: SearchProvider,
    max_results: usize,
    timeout: Duration,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(WebSearchTool::with_config(WebSearchConfig {
        provider,
        max_results,
        timeout,
    })?);
    registry.register(FetchContentTool::with_config(WebFetchConfig { timeout })?);
    Ok(registry)
}
