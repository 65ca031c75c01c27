use vaultgraph::{Error, IndexStore, Vault, VaultService};

#[tokio::test]
async fn missing_and_corrupt_snapshots_require_rebuild() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    std::fs::write(root.join("a.tex"), "% title: A\n")?;

    let service = VaultService::new(Vault::open(root)?);
    let err = service.load_index().await.unwrap_err();
    assert!(matches!(err, Error::IndexMissing(_)));
    assert!(err.needs_rebuild());

    service.rebuild(false).await?;
    std::fs::write(service.store().path(), b"{\"version\": 1, \"notes\": 7}")?;

    let fresh = VaultService::new(Vault::open(root)?);
    let err = fresh.load_index().await.unwrap_err();
    assert!(matches!(err, Error::IndexCorrupt { .. }));
    assert!(err.needs_rebuild());

    // A rebuild repairs it.
    fresh.rebuild(true).await?;
    assert_eq!(fresh.load_index().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn empty_vault_is_not_a_missing_index() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let service = VaultService::new(Vault::open(temp.path())?);
    service.rebuild(false).await?;

    let idx = service.load_index().await?;
    assert!(idx.is_empty());
    assert_eq!(idx.total_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn config_file_moves_the_snapshot() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    std::fs::create_dir_all(root.join(".vaultgraph"))?;
    std::fs::write(
        root.join(".vaultgraph/config.toml"),
        "index_file = \"graph.json\"\nextract_concurrency = 2\n",
    )?;
    std::fs::write(root.join("a.tex"), "% title: A\n")?;

    let vault = Vault::open(root)?;
    assert_eq!(vault.config().extract_concurrency, 2);
    let service = VaultService::new(vault);
    service.rebuild(false).await?;

    let store = IndexStore::at(root.join(".vaultgraph/graph.json"));
    assert!(store.exists());
    assert_eq!(store.load()?.len(), 1);
    Ok(())
}

#[test]
fn malformed_config_is_reported() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    std::fs::create_dir_all(temp.path().join(".vaultgraph"))?;
    std::fs::write(temp.path().join(".vaultgraph/config.toml"), "watch_debounce_ms = \"soon\"\n")?;

    let err = Vault::open(temp.path()).unwrap_err();
    assert!(matches!(err, Error::ConfigToml { .. }));
    Ok(())
}
