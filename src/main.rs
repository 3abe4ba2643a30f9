//! treecopy CLI - Recursive file tree copy

use anyhow::Context;
use clap::Parser;
use treecopy::config::{CliArgs, CopyConfig};
use treecopy::core::CopyEngine;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(args: &CliArgs) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = if args.verbose > 0 || args.quiet {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    // Build configuration
    let config = CopyConfig::from_cli(&args).context("invalid configuration")?;

    // Print configuration if verbose
    if args.verbose > 0 && !args.quiet {
        print_config(&args, &config);
    }

    let options = config.to_options(&args.source)?;
    let summary = CopyEngine::new(options)
        .execute(&args.source, &args.destination)
        .with_context(|| {
            format!(
                "failed to copy {} to {}",
                args.source.display(),
                args.destination.display()
            )
        })?;

    // Print results
    if !args.quiet {
        summary.print_summary();
    }

    Ok(())
}

fn print_config(args: &CliArgs, config: &CopyConfig) {
    println!("=== Configuration ===");
    println!("Source:        {}", args.source.display());
    println!("Destination:   {}", args.destination.display());
    println!("Workers:       {}", config.effective_workers());
    println!("Buffer:        {}", humansize::format_size(config.buffer_size as u64, humansize::BINARY));
    println!("Symlinks:      {:?}", config.symlinks);
    println!("Existing dirs: {:?}", config.on_dir_exists);
    println!("Specials:      {}", config.specials);
    println!("Owner/times:   {}/{}", config.preserve_owner, config.preserve_times);
    if config.add_permission != 0 {
        println!("Add mode:      {:o}", config.add_permission);
    }
    if !config.exclude_patterns.is_empty() {
        println!("Exclude:       {}", config.exclude_patterns.join(", "));
    }
    println!();
}
