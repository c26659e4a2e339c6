//! Prompt text for the research loop.
//!
//! The system prompt tells the model how to research and how to signal
//! completion; the summarize prompt is appended once the iteration budget is
//! spent. The remaining functions build the fixed user-facing texts.

use crate::tool::truncate_chars;
use crate::types::SourceRecord;

/// System instructions sent with every LLM call.
pub const SYSTEM_PROMPT: &str = "\
You are a fast, efficient research agent. Find accurate information quickly and give a complete answer.

Keep the number of calls low:
- One or two searches are usually enough for a simple topic
- Fetch only the two or three most relevant sources
- Stop as soon as you can answer well

Approach:
1. Run one focused web search
2. Fetch the most relevant results
3. Answer as soon as you have enough information
4. Search again only if the first results were not sufficient

Tools:
- web_search: search the web with a focused, specific query
- fetch_content: read the content of a URL

When you are ready (aim for 2-4 iterations), wrap your answer in:
<research_complete>
Your answer, with citations.
</research_complete>

Be concise but thorough and cite sources by URL.";

/// Instruction appended when the iteration budget runs out.
pub const SUMMARIZE_PROMPT: &str = "\
Using the research done so far, write a complete summary of what was found.

Even if the research feels unfinished, turn the available information into a useful answer. Include:
1. Key findings from the sources you reviewed
2. Direct answers to the original query where possible
3. Citations for the sources used
4. Caveats about anything that was not fully researched

Wrap your response in:
<research_complete>
Your summary here
</research_complete>";

/// Characters of each finding shown in the fallback summary.
pub const FALLBACK_EXCERPT_CHARS: usize = 500;

/// The first user message of every session.
pub fn initial_message(query: &str) -> String {
    format!("Research this topic efficiently: {}", query)
}

/// Summary assembled from raw findings when the forced summary comes back empty.
pub fn fallback_summary(query: &str, sources: &[SourceRecord], findings: &[String]) -> String {
    let mut summary = format!(
        "Research Summary: {}\n\nNote: Maximum iterations reached. Here's what was found:\n\n",
        query
    );

    for (source, finding) in sources.iter().zip(findings) {
        let title = if source.title.is_empty() {
            "Untitled"
        } else {
            source.title.as_str()
        };
        let excerpt = match truncate_chars(finding, FALLBACK_EXCERPT_CHARS) {
            (kept, true) => format!("{}...", kept),
            (kept, false) => kept.to_string(),
        };
        summary.push_str(&format!(
            "From {}:\n{}\n\nSource: {}\n\n",
            title, excerpt, source.url
        ));
    }

    summary
}

/// Summary used when the session gathered nothing at all.
pub fn empty_result_summary(query: &str) -> String {
    format!(
        "Research on '{}' was attempted but no results were gathered. \
         Try a more specific query or increase max iterations.",
        query
    )
}
