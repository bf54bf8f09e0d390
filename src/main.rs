// ABOUTME: CLI entrypoint for granola-export command
// ABOUTME: Handles error exit codes, command dispatch and the export worker thread

use clap::Parser;
use granola_export::{
    api::ApiClient,
    auth::resolve_credentials,
    cancel::CancelToken,
    cli::{Cli, Commands, ExportArgs, RangeArgs},
    config::ExportConfig,
    convert::extract_transcript,
    export::Exporter,
    model::{BatchOverall, FailureReason, Item},
    ports::CredentialProvider,
    progress,
    storage::{MarkdownWriter, Paths},
    verify::Verifier,
    Error, Result,
};
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("granola-export: [E{}] {}", e.exit_code(), e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = ExportConfig::load(cli.config.as_deref())?;

    match cli.command() {
        Commands::Export(args) => export(&cli, &config, &args),
        Commands::List(range) => list(&cli, &range),
        Commands::Verify { path } => verify_file(&config, &path),
        Commands::Config => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

fn api_client(cli: &Cli) -> Result<ApiClient> {
    let mut client = ApiClient::new(Some(cli.mcp_url.clone()))?;
    if cli.no_throttle {
        client = client.disable_throttle();
    } else if let Some((min, max)) = cli.throttle_ms {
        client = client.with_throttle(min, max);
    }
    Ok(client)
}

fn list(cli: &Cli, range: &RangeArgs) -> Result<()> {
    let credentials = resolve_credentials(cli.token.clone(), cli.token_file.clone())?;
    let token = credentials.get_valid_credential()?;
    let meetings = api_client(cli)?.list_meetings(&token, &range.date_range())?;

    for m in &meetings {
        println!("{}  {}  {}", m.date.format("%Y-%m-%d"), m.id, m.title);
    }
    println!("{} meetings", meetings.len());
    Ok(())
}

fn export(cli: &Cli, config: &ExportConfig, args: &ExportArgs) -> Result<()> {
    // Fails here, before any item is attempted, when no credential is usable.
    let credentials = resolve_credentials(cli.token.clone(), cli.token_file.clone())?;
    let token = credentials.get_valid_credential()?;
    let client = Arc::new(api_client(cli)?);

    let listed = client.list_meetings(&token, &args.range.date_range())?;
    let items = with_details(&client, &token, select(listed, &args.ids)?);
    if items.is_empty() {
        println!("No meetings to export.");
        return Ok(());
    }

    let writer = MarkdownWriter::new(Paths::new(args.output_dir.clone())?)?;
    println!(
        "Exporting {} meetings to {}",
        items.len(),
        writer.export_dir().display()
    );

    let cancel = CancelToken::new();
    spawn_interrupt_listener(cancel.clone());

    let (tx, rx) = mpsc::channel();
    let (outcome, rendered) = thread::scope(|s| {
        let worker = s.spawn(|| {
            let sink = tx;
            let exporter = Exporter::new(
                config,
                credentials.as_ref(),
                client.clone(),
                &writer,
                &sink,
                cancel,
            )?;
            exporter.export_batch(&items)
        });
        let rendered = progress::render(rx);
        (worker.join(), rendered)
    });

    let result = match outcome {
        Ok(result) => result?,
        Err(_) => return Err(Error::Incomplete("export worker panicked".into())),
    };
    if rendered.is_none() {
        println!("{}", progress::summary_line(&result));
    }

    match &result.overall {
        BatchOverall::Success => Ok(()),
        BatchOverall::Aborted {
            reason: FailureReason::Cancelled,
            ..
        } => Err(Error::Cancelled),
        BatchOverall::Aborted { .. } => Err(Error::Incomplete(progress::summary_line(&result))),
    }
}

/// Keeps listed order; with explicit IDs, every one must be in the listing.
fn select(listed: Vec<Item>, ids: &[String]) -> Result<Vec<Item>> {
    if ids.is_empty() {
        return Ok(listed);
    }
    if let Some(missing) = ids.iter().find(|id| !listed.iter().any(|m| &m.id == *id)) {
        return Err(Error::Config(format!(
            "meeting {} is not in the selected date range",
            missing
        )));
    }
    Ok(listed.into_iter().filter(|m| ids.contains(&m.id)).collect())
}

/// Merges participants and summaries from `get_meetings`. Missing details are
/// not fatal; the document falls back to its defaults.
fn with_details(client: &ApiClient, token: &str, items: Vec<Item>) -> Vec<Item> {
    let ids: Vec<String> = items.iter().map(|m| m.id.clone()).collect();
    let details = match client.get_meetings(token, &ids) {
        Ok(details) => details,
        Err(e) => {
            warn!(error = %e, "could not fetch meeting details");
            return items;
        }
    };

    items
        .into_iter()
        .map(|mut item| {
            if let Some(d) = details.iter().find(|d| d.id == item.id) {
                if !d.participants.is_empty() {
                    item.participants = d.participants.clone();
                }
                if d.summary.is_some() {
                    item.summary = d.summary.clone();
                }
            }
            item
        })
        .collect()
}

fn verify_file(config: &ExportConfig, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    let result = Verifier::new(&config.verification)?.verify(extract_transcript(&content));

    match result.reason {
        None => {
            println!("✓ {}: complete ({})", path.display(), result.detail);
            Ok(())
        }
        Some(reason) => Err(Error::Incomplete(format!(
            "{}: {} ({})",
            path.display(),
            reason,
            result.detail
        ))),
    }
}

/// Ctrl-C sets the batch's cancellation token.
fn spawn_interrupt_listener(cancel: CancelToken) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!(error = %e, "cannot listen for Ctrl-C");
                return;
            }
        };
        if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
            eprintln!("\nCancelling export...");
            cancel.cancel();
        }
    });
}
