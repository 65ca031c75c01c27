use std::path::PathBuf;

use clap::Parser;
use vaultgraph::{Vault, VaultService, slugify};

/// Build the reference graph and inspect it.
///
/// Examples:
///   VAULTGRAPH_VAULT=/path/to/vault cargo run --example graph -- --note "Graph Theory"
#[derive(Debug, Parser)]
struct Args {
    /// Path to the vault root.
    #[arg(long, env = "VAULTGRAPH_VAULT")]
    vault: PathBuf,

    /// Note title or slug to show outgoing and incoming links for.
    #[arg(long)]
    note: Option<String>,

    /// Keep only the N best-connected notes in the summary (0 = all).
    #[arg(long, default_value_t = 20)]
    max_nodes: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let vault = Vault::open(args.vault)?;
    let service = VaultService::new(vault);
    let summary = service.rebuild(false).await?;
    println!("notes: {}", summary.total_notes);
    println!("connections: {}", summary.total_connections);
    println!("dangling: {}", summary.dangling);

    let view = service.graph_view(args.max_nodes).await?;
    println!("\ntop {} notes by degree:", view.nodes.len());
    let mut nodes = view.nodes.clone();
    nodes.sort_by(|a, b| b.degree.cmp(&a.degree).then_with(|| a.id.cmp(&b.id)));
    for n in nodes {
        println!("- {}\t{}\t{}", n.degree, n.id, n.title);
    }

    if let Some(note) = args.note {
        let slug = slugify(&note);
        let Some(record) = service.get_note(&slug).await? else {
            anyhow::bail!("no note with slug '{slug}'");
        };
        let idx = service.index().await?;
        println!("\nnote: {} ({})", record.title, record.filename);
        for target in &record.outgoing_links {
            println!("- out\t{target}");
        }
        for target in idx.dangling_from(&record.slug) {
            println!("- out\t{target}\tdangling");
        }
        for source in &record.backlinks {
            println!("- in\t{source}");
        }
    }

    Ok(())
}
