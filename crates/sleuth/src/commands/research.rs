//! Research command - run one research session and report the result.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Args;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use sleuth_agent::{
    AgentError, CancellationToken, ResearchAgent, ResearchConfig, ResearchResult, SearchProvider,
    default_registry,
};
use sleuth_config::Settings;
use sleuth_llm::{AnthropicBackend, AnthropicConfig};

use super::Context;
use crate::export::{self, ExportFormat};

/// Arguments for the research command.
#[derive(Args, Debug)]
pub struct ResearchArgs {
    /// The research question or topic
    #[arg(required = true)]
    pub query: String,

    /// Directory to save results in
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Maximum number of research iterations
    #[arg(short = 'm', long, value_name = "N")]
    pub max_iterations: Option<u32>,

    /// Model to use
    #[arg(long)]
    pub model: Option<String>,

    /// Don't save the result to a file
    #[arg(long)]
    pub no_save: bool,

    /// Format of the saved file
    #[arg(short, long, value_enum)]
    pub format: Option<ExportFormat>,

    /// Include raw page excerpts in the saved file
    #[arg(long)]
    pub include_raw: bool,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub time_limit: Option<u64>,
}

impl ResearchArgs {
    /// Layer command-line flags over resolved settings.
    fn apply(&self, settings: &mut Settings) {
        if let Some(ref model) = self.model {
            settings.model = model.clone();
        }
        if let Some(max_iterations) = self.max_iterations {
            settings.max_iterations = max_iterations;
        }
        if let Some(ref dir) = self.output {
            settings.output_dir = dir.clone();
        }
        if self.no_save {
            settings.save = false;
        }
    }
}

/// Run the research command.
pub async fn run(args: ResearchArgs, ctx: &Context) -> Result<()> {
    let (_, mut settings) = ctx.settings()?;
    args.apply(&mut settings);
    settings.validate()?;

    let format = args.format.unwrap_or_else(|| settings.format.into());
    let agent = build_agent(&settings)?;

    let cancellation = CancellationToken::new();
    tokio::spawn({
        let token = cancellation.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping before the next model call");
                token.cancel();
            }
        }
    });

    let spinner = (!ctx.json_output).then(|| spinner(&args.query));
    let session = agent.research_with_cancellation(&args.query, cancellation.clone());
    let outcome = match args.time_limit {
        Some(secs) => {
            let limit = Duration::from_secs(secs);
            tokio::time::timeout(limit, session)
                .await
                .unwrap_or(Err(AgentError::Timeout(limit)))
        }
        None => session.await,
    };
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    cancellation.cancel();
    let result = outcome?;

    let saved = if settings.save {
        Some(export::save(
            &result,
            &settings.output_dir,
            format,
            args.include_raw,
        )?)
    } else {
        None
    };

    if ctx.json_output {
        let mut value = export::to_json(&result, args.include_raw);
        if let Some(ref path) = saved {
            value["saved_to"] = serde_json::json!(path.display().to_string());
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_result(&result, ctx.verbose);
        if let Some(path) = saved {
            let dim = Style::new().dim();
            println!("{}", dim.apply_to(format!("Saved to {}", path.display())));
        }
    }

    Ok(())
}

fn build_agent(settings: &Settings) -> Result<ResearchAgent> {
    let api_key = settings
        .api_key_value()
        .ok_or_else(|| anyhow!("no API key resolved"))?;

    let mut llm_config = AnthropicConfig::new(api_key).with_max_retries(settings.max_retries);
    if let Some(ref base_url) = settings.base_url {
        llm_config = llm_config.with_base_url(base_url);
    }
    let backend = AnthropicBackend::new(llm_config)?;

    let provider = match settings.search_provider {
        sleuth_config::SearchProvider::DuckDuckGo => SearchProvider::DuckDuckGo,
        sleuth_config::SearchProvider::Brave => SearchProvider::Brave {
            api_key: settings.search_api_key.clone().unwrap_or_default(),
        },
    };
    let tools = default_registry(
        provider,
        settings.max_search_results as usize,
        Duration::from_secs(settings.timeout_secs),
    )?;

    let config = ResearchConfig::new(&settings.model)
        .with_max_tokens(settings.max_tokens)
        .with_max_iterations(settings.max_iterations);

    Ok(ResearchAgent::builder()
        .with_backend(backend)
        .with_tools(tools)
        .with_config(config)
        .build()?)
}

fn spinner(query: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Researching: {query}"));
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn print_result(result: &ResearchResult, verbose: bool) {
    let dim = Style::new().dim();
    let bold = Style::new().bold();

    if result.completed {
        println!("{}", Style::new().green().apply_to("✓ Research complete"));
    } else {
        println!(
            "{}",
            Style::new()
                .yellow()
                .apply_to("⚠ Iteration limit reached, summary was forced")
        );
    }
    println!(
        "{}",
        dim.apply_to(format!(
            "{} iteration(s), {} source(s)",
            result.iterations,
            result.sources.len()
        ))
    );

    println!("\n{}\n", bold.apply_to("Summary"));
    println!("{}", result.summary.trim());

    if !result.sources.is_empty() {
        println!("\n{}\n", bold.apply_to("Sources"));
        for (i, source) in result.sources.iter().enumerate() {
            let title = if source.title.is_empty() {
                "Untitled"
            } else {
                source.title.as_str()
            };
            println!("  {}. {}", i + 1, title);
            println!("     {}", dim.apply_to(&source.url));
        }
    }

    println!();
    println!(
        "{}",
        dim.apply_to(format!(
            "Tokens: {} ({} in / {} out)  Cost: ${:.4}",
            result.total_tokens(),
            result.usage.input_tokens,
            result.usage.output_tokens,
            result.cost()
        ))
    );
    if verbose {
        println!("{}", dim.apply_to(format!("Model: {}", result.usage.model)));
    }
}
