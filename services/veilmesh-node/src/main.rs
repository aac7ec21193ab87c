//! Veilmesh node service.
//!
//! Hosts one mesh engine over SQLite-backed stores. The anonymity
//! network transport is an external collaborator; until an adapter is
//! attached this binary runs against the in-process loopback hub, which
//! is enough for local operation and smoke testing.

use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use veilmesh_core::{logging, Config, MemoryHub, MeshCrypto, SqliteBlobStore, SqliteItemStore};
use veilmesh_mesh::{EngineEvent, MeshEngine, MeshRuntime};

const NODE_PROTOCOL_VERSION: u32 = 1;
const NODE_RUNTIME_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    runtime_version: u32,
    protocol_version: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            runtime_version: NODE_RUNTIME_VERSION,
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let config = match parse_config_path(&args)? {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default_config(),
    };

    logging::init();

    let data_dir = PathBuf::from(&config.node.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let crypto = Arc::new(load_or_create_identity(&data_dir)?);
    let items = SqliteItemStore::open(data_dir.join("items.db"))?;
    let blobs = SqliteBlobStore::open(data_dir.join("blobs.db"))?;

    let hub = MemoryHub::new();
    let transport = hub.register(&config.node.alias);

    let engine = MeshEngine::new(
        config.clone(),
        config.node.alias.clone(),
        crypto,
        Arc::new(transport),
        Box::new(items),
        Box::new(blobs),
    );

    tracing::info!(
        identity = %engine.identity(),
        alias = %engine.alias(),
        "veilmesh node starting"
    );

    let runtime = MeshRuntime::new(engine);
    let events = runtime.event_sender();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = events.send(EngineEvent::Shutdown);
        }
    });

    runtime.run().await?;
    Ok(())
}

fn parse_config_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            return match args_iter.next() {
                Some(path) => Ok(Some(PathBuf::from(path))),
                None => Err(anyhow::anyhow!("--config was provided without a path")),
            };
        }
    }
    Ok(None)
}

/// Load the node's identity seed, creating one on first run.
fn load_or_create_identity(data_dir: &Path) -> anyhow::Result<MeshCrypto> {
    let key_path = data_dir.join("identity.key");
    if key_path.exists() {
        let seed_hex = std::fs::read_to_string(&key_path)?;
        let seed = hex::decode(seed_hex.trim()).context("identity key is not valid hex")?;
        return Ok(MeshCrypto::from_key(&seed)?);
    }

    use rand::RngCore;
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    std::fs::write(&key_path, hex::encode(seed))?;
    Ok(MeshCrypto::from_seed(&seed))
}
