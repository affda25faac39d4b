//! layerconf: layered, periodically refreshed configuration.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use cli::args::{Cli, Command, DumpArgs, GetArgs, ParseArgs, RenderArgs, SourceArgs, WatchArgs};
use layerconf::config::Settings;
use layerconf::descriptor;
use layerconf::engine::Aggregator;
use layerconf::env::Env;
use layerconf::logging;
use layerconf::placeholder;
use layerconf::schedule::TokioScheduler;
use layerconf::source::{DefaultFetcher, DefaultResolver};
use layerconf::store::{ActiveConfiguration, StoreCell};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose).context("failed to initialize logging")?;

    match cli.command {
        Command::Parse(args) => run_parse(args),
        Command::Get(args) => run_get(args).await,
        Command::Dump(args) => run_dump(args).await,
        Command::Watch(args) => run_watch(args).await,
        Command::Render(args) => run_render(args).await,
    }
}

/// Validate a descriptor and print its fields with the password masked.
fn run_parse(args: ParseArgs) -> Result<()> {
    let parsed = descriptor::parse(&args.descriptor)?;
    let fields: Vec<(String, String)> = parsed
        .redacted()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    let entries = fields.iter().map(|(k, v)| (k.as_str(), Some(v.as_str())));

    if args.json {
        println!("{}", cli::format_json(entries));
    } else {
        print!("{}", cli::format_text(entries));
    }
    Ok(())
}

async fn run_get(args: GetArgs) -> Result<()> {
    let active = install(&args.sources).await?;
    let values: Vec<Option<String>> = args
        .keys
        .iter()
        .map(|key| placeholder::resolve_key(key, active))
        .collect();
    let entries = args
        .keys
        .iter()
        .zip(&values)
        .map(|(k, v)| (k.as_str(), v.as_deref()));

    if args.json {
        println!("{}", cli::format_json(entries));
    } else {
        print!("{}", cli::format_text(entries));
    }
    Ok(())
}

async fn run_dump(args: DumpArgs) -> Result<()> {
    let active = install(&args.sources).await?;
    let snapshot = active.snapshot();
    let entries = snapshot.iter().map(|(k, v)| (k.as_str(), Some(v.as_str())));

    if args.json {
        println!("{}", cli::format_json(entries));
    } else {
        print!("{}", cli::format_text(entries));
    }
    Ok(())
}

/// Print the key whenever its value changes, until interrupted.
async fn run_watch(args: WatchArgs) -> Result<()> {
    let active = install(&args.sources).await?;
    let mut ticker = tokio::time::interval(Duration::from_secs(args.every.max(1)));
    let mut last: Option<Option<String>> = None;
    let mut changes = 0usize;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let current = active.get(&args.key);
                if last.as_ref() == Some(&current) {
                    continue;
                }
                print!("{}", cli::format_text([(args.key.as_str(), current.as_deref())]));
                last = Some(current);
                changes += 1;
                if args.changes.is_some_and(|limit| changes >= limit) {
                    break;
                }
            }
        }
    }

    active.stop();
    Ok(())
}

async fn run_render(args: RenderArgs) -> Result<()> {
    let template = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let active = install(&args.sources).await?;
    print!("{}", placeholder::resolve(&template, active));
    Ok(())
}

/// Build the requested sources and install them process-wide.
async fn install(sources: &SourceArgs) -> Result<&'static ActiveConfiguration> {
    sources.validate().map_err(anyhow::Error::msg)?;

    let work_dir = std::env::current_dir().ok();
    let mut settings =
        Settings::load(work_dir.as_deref(), &Env::real()).context("failed to load settings")?;
    sources.apply(&mut settings);

    let scheduler = TokioScheduler::try_current().context("no tokio runtime available")?;
    let fetcher =
        DefaultFetcher::new(settings.http_timeout()).context("failed to build HTTP client")?;
    let engine = Aggregator::new(StoreCell::global(), Arc::new(scheduler))
        .with_resolver(Arc::new(DefaultResolver::new(
            settings.sources.resource_roots.clone(),
        )))
        .with_fetcher(Arc::new(fetcher));

    let policy = settings.policy();
    let ignore_missing = settings.sources.ignore_missing;
    let installed = match (sources.db.as_deref(), sources.locations.as_slice()) {
        (Some(db), []) => engine.install_database(db, policy).await,
        (Some(db), locations) => {
            engine
                .install_mixed(db, locations, &settings.parameter_map())
                .await
        }
        (None, [single]) if !ignore_missing => engine.install_location(single, policy).await,
        (None, locations) => {
            engine
                .install_locations(locations, ignore_missing, policy)
                .await
        }
    };
    installed.context("failed to build configuration")
}
