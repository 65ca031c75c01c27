use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vaultgraph::{
    NoteRecord, RebuildOptions, ReindexCause, Vault, VaultEvent, VaultIndex, VaultService,
    slugify,
};

#[derive(Debug, Parser)]
#[command(
    name = "vg",
    version,
    about = "LaTeX vault indexing + knowledge-graph CLI"
)]
struct Cli {
    /// Path to the vault root.
    #[arg(long, env = "VAULTGRAPH_VAULT", global = true)]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rebuild the index snapshot.
    Index {
        /// Re-read every document instead of reusing unchanged ones.
        #[arg(long)]
        full: bool,
    },
    /// Show one note's metadata and links.
    Note {
        /// Note slug (a title is slugified first).
        slug: String,
        #[arg(long)]
        json: bool,
    },
    /// List notes referencing a note.
    Backlinks { slug: String },
    /// Print the reference graph.
    Graph {
        /// Keep only the N best-connected notes (0 = all).
        #[arg(long, default_value_t = 0)]
        max_nodes: usize,
        #[arg(long)]
        json: bool,
    },
    /// Tag usage counts.
    Tags,
    /// Most recent notes by their date metadata.
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Dangling references, orphans and asset problems.
    Doctor {
        #[arg(long)]
        json: bool,
    },
    /// Keep the index up to date while files change.
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let vault = Vault::open(require_vault(cli.vault)?)?;
    let service = VaultService::new(vault);

    match cli.command {
        Command::Index { full } => handle_index(&service, full).await?,
        Command::Note { slug, json } => {
            let index = load(&service).await?;
            let slug = slugify(&slug);
            let Some(note) = index.note(&slug) else {
                anyhow::bail!("no note with slug '{slug}'");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(note)?);
            } else {
                print_note(&index, note);
            }
        }
        Command::Backlinks { slug } => {
            let index = load(&service).await?;
            let slug = slugify(&slug);
            if index.note(&slug).is_none() {
                anyhow::bail!("no note with slug '{slug}'");
            }
            for source in index.backlinks(&slug) {
                let title = index.note(source).map(|n| n.title.as_str()).unwrap_or("");
                println!("{source}\t{title}");
            }
        }
        Command::Graph { max_nodes, json } => {
            load(&service).await?;
            let view = service.graph_view(max_nodes).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("nodes: {}", view.nodes.len());
                for node in &view.nodes {
                    println!("  {}\t{}\t{}", node.id, node.degree, node.title);
                }
                println!("edges: {}", view.edges.len());
                for edge in &view.edges {
                    println!("  {} -- {}", edge.source, edge.target);
                }
            }
        }
        Command::Tags => {
            let index = load(&service).await?;
            let mut rows: Vec<(&str, usize)> = index.tag_counts().into_iter().collect();
            rows.sort_by(|(a_tag, a_n), (b_tag, b_n)| b_n.cmp(a_n).then_with(|| a_tag.cmp(b_tag)));
            for (tag, n) in rows {
                println!("{n}\t#{tag}");
            }
        }
        Command::Recent { limit } => {
            let index = load(&service).await?;
            for note in index.notes_by_date().into_iter().take(limit) {
                let date = if note.date.is_empty() { "-" } else { note.date.as_str() };
                println!("{date}\t{}\t{}", note.slug, note.title);
            }
        }
        Command::Doctor { json } => {
            load(&service).await?;
            let report = service.health_report().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("dangling references: {}", report.dangling.len());
                for d in &report.dangling {
                    println!("  {} -> {}\t({})", d.source, d.target, d.filename);
                }
                println!("warnings: {}", report.warnings.len());
                for w in &report.warnings {
                    println!("  {}\t{}", w.path, w.message);
                }
                println!("orphans: {}", report.orphans.len());
                for slug in &report.orphans {
                    println!("  {slug}");
                }
                println!("missing assets: {}", report.missing_assets.len());
                for m in &report.missing_assets {
                    println!("  {}\t{}", m.slug, m.asset);
                }
                println!("unreferenced assets: {}", report.unreferenced_assets.len());
                for p in &report.unreferenced_assets {
                    println!("  {p}");
                }
            }
        }
        Command::Watch => handle_watch(service).await?,
    }

    Ok(())
}

async fn handle_index(service: &VaultService, full: bool) -> anyhow::Result<()> {
    let summary = service.rebuild(full).await?;
    println!("index");
    println!("  notes: {}", summary.total_notes);
    println!("  connections: {}", summary.total_connections);
    println!("  extracted: {}", summary.extracted);
    println!("  reused: {}", summary.reused);
    println!("  dangling: {}", summary.dangling);
    println!("  warnings: {}", summary.warnings);
    println!("  written: {}", service.store().path().display());
    Ok(())
}

async fn handle_watch(mut service: VaultService) -> anyhow::Result<()> {
    service
        .rebuild_with(RebuildOptions::default(), ReindexCause::InitialBuild)
        .await?;
    let mut rx = service.subscribe();

    service.start_watching().await?;
    println!("watching... (Ctrl-C to stop)");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            ev = rx.recv() => {
                match ev {
                    Ok(VaultEvent::Rebuilt { cause, summary }) => {
                        println!(
                            "rebuilt ({cause:?}): {} notes, {} connections",
                            summary.total_notes, summary.total_connections
                        );
                    }
                    Ok(VaultEvent::RebuildFailed { cause, error }) => {
                        eprintln!("rebuild failed ({cause:?}): {error}");
                    }
                    Ok(VaultEvent::Error { error, .. }) => eprintln!("watch error: {error}"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        eprintln!("(lagged {n} events)");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    service.shutdown().await;
    Ok(())
}

/// Loads the snapshot, turning "missing/corrupt" into an actionable message.
async fn load(service: &VaultService) -> anyhow::Result<Arc<VaultIndex>> {
    match service.load_index().await {
        Ok(index) => Ok(index),
        Err(err) if err.needs_rebuild() => {
            anyhow::bail!("{err}\nhint: run `vg index` to build it")
        }
        Err(err) => Err(err.into()),
    }
}

fn print_note(index: &VaultIndex, note: &NoteRecord) {
    println!("{}", note.title);
    println!("  slug: {}", note.slug);
    println!("  file: {}", note.filename);
    if !note.date.is_empty() {
        println!("  date: {}", note.date);
    }
    if !note.tags.is_empty() {
        let tags: Vec<_> = note.tags.iter().map(|t| format!("#{t}")).collect();
        println!("  tags: {}", tags.join(" "));
    }
    for asset in &note.assets {
        println!("  asset: {asset}");
    }
    for target in &note.outgoing_links {
        println!("  -> {target}");
    }
    for target in index.dangling_from(&note.slug) {
        println!("  -> {target} (dangling)");
    }
    for source in &note.backlinks {
        println!("  <- {source}");
    }
}

fn require_vault(vault: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    vault.ok_or_else(|| anyhow::anyhow!("--vault is required (or set VAULTGRAPH_VAULT)"))
}
