//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use console::Style;
use serde_json::json;

use sleuth_config::{PROJECT_CONFIG_FILE, SleuthConfig};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show resolved settings and where the API key came from
    Show,

    /// Show which config files are checked and their precedence
    Path,

    /// Write a default ./sleuth.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
        ConfigCommand::Init { force } => cmd_init(force),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let (loaded, settings) = ctx.settings()?;
    let key_status = match &settings.api_key {
        Some(key) => format!("{} (from {})", key.masked(), key.source),
        None => "not set".to_string(),
    };

    if ctx.json_output {
        let value = json!({
            "model": settings.model,
            "max_tokens": settings.max_tokens,
            "api_key": key_status,
            "base_url": settings.base_url,
            "max_retries": settings.max_retries,
            "max_iterations": settings.max_iterations,
            "max_search_results": settings.max_search_results,
            "timeout_secs": settings.timeout_secs,
            "search_provider": settings.search_provider.to_string(),
            "output_dir": settings.output_dir.display().to_string(),
            "save": settings.save,
            "format": settings.format.to_string(),
            "config_files": loaded
                .loaded_from()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>(),
            "warnings": loaded.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("# Sleuth Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    println!("LLM:");
    println!("  model:       {}", settings.model);
    println!("  max_tokens:  {}", settings.max_tokens);
    match &settings.api_key {
        Some(_) => println!("  api_key:     {key_status}"),
        None => println!(
            "  api_key:     {}",
            Style::new().red().apply_to("not set (export ANTHROPIC_API_KEY)")
        ),
    }
    if let Some(ref base_url) = settings.base_url {
        println!("  base_url:    {base_url}");
    }
    println!("  max_retries: {}", settings.max_retries);
    println!();

    println!("Research:");
    println!("  max_iterations: {}", settings.max_iterations);
    println!();

    println!("Tools:");
    println!("  search_provider:    {}", settings.search_provider);
    println!("  max_search_results: {}", settings.max_search_results);
    println!("  timeout_secs:       {}", settings.timeout_secs);
    println!();

    println!("Output:");
    println!("  dir:    {}", settings.output_dir.display());
    println!("  save:   {}", settings.save);
    println!("  format: {}", settings.format);
    println!();

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  {} {}", Style::new().yellow().apply_to("⚠"), w);
        }
        println!();
    }

    if ctx.verbose {
        println!("{}", dim.apply_to("---\nMerged config:\n"));
        if let Ok(toml_str) = loaded.config.to_toml() {
            println!("{toml_str}");
        }
    }

    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;

    if ctx.json_output {
        let sources: Vec<_> = loaded
            .sources
            .iter()
            .map(|s| json!({ "path": s.path.display().to_string(), "loaded": s.loaded }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&sources)?);
        return Ok(());
    }

    println!("Config file search order (later overrides earlier):\n");
    for source in &loaded.sources {
        let status = if source.loaded {
            Style::new().green().apply_to("✓ loaded")
        } else {
            Style::new().dim().apply_to("· not found")
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'sleuth config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let path = PathBuf::from(PROJECT_CONFIG_FILE);
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    sleuth_config::save_config(&SleuthConfig::with_defaults(), &path)?;
    println!(
        "{} Wrote {}",
        Style::new().green().apply_to("✓"),
        path.display()
    );
    println!("Set ANTHROPIC_API_KEY in your environment before running research.");

    Ok(())
}
