use std::path::Path;

use vaultgraph::{Error, Vault, VaultConfig, VaultService};

fn write(root: &Path, rel: &str, body: &str) -> anyhow::Result<()> {
    let p = root.join(rel);
    std::fs::create_dir_all(p.parent().unwrap())?;
    std::fs::write(p, body)?;
    Ok(())
}

fn snapshot_without_timestamp(path: &Path) -> anyhow::Result<serde_json::Value> {
    let mut value: serde_json::Value = serde_json::from_slice(&std::fs::read(path)?)?;
    value
        .as_object_mut()
        .expect("snapshot is an object")
        .remove("generated_at");
    Ok(value)
}

#[tokio::test]
async fn reference_produces_outgoing_link_and_backlink() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    write(root, "a.tex", "% title: A\nSee \\notelink{B}.\n")?;
    write(root, "b.tex", "% title: B\nNothing here.\n")?;

    let service = VaultService::new(Vault::open(root)?);
    let summary = service.rebuild(false).await?;
    assert_eq!(summary.total_notes, 2);
    assert_eq!(summary.total_connections, 1);

    let idx = service.load_index().await?;
    let a = idx.note("a").expect("note a");
    let b = idx.note("b").expect("note b");
    assert_eq!(a.outgoing_links.iter().collect::<Vec<_>>(), vec!["b"]);
    assert_eq!(b.backlinks.iter().collect::<Vec<_>>(), vec!["a"]);
    assert!(a.backlinks.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_target_is_reported_as_dangling() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    write(root, "a.tex", "% title: A\n\\notelink{ghost}\n")?;

    let service = VaultService::new(Vault::open(root)?);
    let summary = service.rebuild(false).await?;
    assert_eq!(summary.dangling, 1);

    let idx = service.snapshot().expect("snapshot after rebuild");
    assert!(idx.note("a").expect("note a").outgoing_links.is_empty());
    let dangling = idx.dangling();
    assert_eq!(dangling.len(), 1);
    assert_eq!((dangling[0].source.as_str(), dangling[0].target.as_str()), ("a", "ghost"));
    assert_eq!(dangling[0].filename.as_str_lossy(), "a.tex");
    Ok(())
}

#[tokio::test]
async fn slug_collision_fails_and_keeps_prior_snapshot() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    write(root, "x/one.tex", "% title: Graph Theory\n")?;

    let service = VaultService::new(Vault::open(root)?);
    service.rebuild(false).await?;
    let on_disk = std::fs::read(service.store().path())?;
    let before = service.snapshot().expect("snapshot");

    write(root, "y/two.tex", "% title: Graph Theory\n")?;
    let err = service.rebuild(false).await.unwrap_err();
    match err {
        Error::SlugCollision { slug, .. } => assert_eq!(slug, "graph-theory"),
        other => panic!("expected slug collision, got {other}"),
    }

    assert_eq!(std::fs::read(service.store().path())?, on_disk);
    let after = service.snapshot().expect("snapshot still present");
    assert!(std::sync::Arc::ptr_eq(&before, &after));
    assert_eq!(after.len(), 1);
    Ok(())
}

#[tokio::test]
async fn deleting_a_document_removes_its_record_and_backlinks() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    write(root, "a.tex", "% title: A\n\\notelink{B}\n")?;
    write(root, "b.tex", "% title: B\n\\notelink{A}\n")?;
    write(root, "c.tex", "% title: C\n\\notelink{A}\n")?;

    let service = VaultService::new(Vault::open(root)?);
    service.rebuild(false).await?;
    let idx = service.snapshot().expect("snapshot");
    assert_eq!(idx.backlinks("a").collect::<Vec<_>>(), vec!["b", "c"]);

    std::fs::remove_file(root.join("b.tex"))?;
    service.rebuild(false).await?;

    let idx = service.snapshot().expect("snapshot");
    assert!(idx.note("b").is_none());
    assert_eq!(idx.backlinks("a").collect::<Vec<_>>(), vec!["c"]);
    assert!(idx.notes().all(|n| !n.backlinks.contains("b")));
    assert_eq!(idx.dangling_from("a").collect::<Vec<_>>(), vec!["b"]);
    assert_eq!(idx.total_connections(), 1);
    Ok(())
}

#[tokio::test]
async fn rebuilding_unchanged_vault_is_idempotent() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    write(
        root,
        "notes/a.tex",
        "% title: Alpha\n% date: 2024-03-01\n% tags: math, graphs\n\\cite{beta,gamma}\n\\includegraphics[width=4cm]{figs/plot}\n",
    )?;
    write(root, "notes/b.tex", "% title: Beta\n\\input{alpha.tex}\n")?;
    write(root, "gamma.tex", "% title: Gamma\n")?;

    let service = VaultService::new(Vault::open(root)?);
    service.rebuild(false).await?;
    let first = snapshot_without_timestamp(service.store().path())?;

    let summary = service.rebuild(false).await?;
    assert_eq!(summary.reused, 3);
    assert_eq!(summary.extracted, 0);
    assert_eq!(snapshot_without_timestamp(service.store().path())?, first);

    service.rebuild(true).await?;
    assert_eq!(snapshot_without_timestamp(service.store().path())?, first);
    Ok(())
}

#[tokio::test]
async fn extraction_pool_size_does_not_change_the_result() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    for i in 0..40 {
        write(
            root,
            &format!("n{i:02}.tex"),
            &format!("% title: N{i:02}\n\\notelink{{N{:02}}}\n\\notelink{{N{:02}}}\n", (i + 1) % 40, (i + 7) % 40),
        )?;
    }

    let mut results = Vec::new();
    for concurrency in [1, 8] {
        let cfg = VaultConfig {
            extract_concurrency: concurrency,
            cache_dir: format!(".cache-{concurrency}").into(),
            ..VaultConfig::default()
        };
        let service = VaultService::new(Vault::with_config(root, cfg)?);
        service.rebuild(true).await?;
        results.push(snapshot_without_timestamp(service.store().path())?);
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0]["total_connections"], 80);
    Ok(())
}

#[tokio::test]
async fn edited_document_is_re_extracted() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    write(root, "a.tex", "% title: A\n")?;
    write(root, "b.tex", "% title: B\n")?;

    let service = VaultService::new(Vault::open(root)?);
    service.rebuild(false).await?;

    write(root, "a.tex", "% title: A\n% tags: new\n\\notelink{B}\n")?;
    let summary = service.rebuild(false).await?;
    assert_eq!(summary.extracted, 1);
    assert_eq!(summary.reused, 1);

    let b = service.get_note("b").await?.expect("note b");
    assert!(b.backlinks.contains("a"));
    let a = service.get_note("a").await?.expect("note a");
    assert!(a.tags.contains("new"));
    Ok(())
}
