//! Smoke-test harness for the Oplog Mirror tailer loop.
//!
//! There is no CLI surface at the library layer (spec.md §6): wiring a real
//! source-cluster driver and a real secondary-store adapter is the
//! enclosing process's job, which is out of scope for this crate. This
//! binary exists to exercise `Tailer::run` end to end against the
//! in-memory fakes, seeded from a small JSON fixture, the way a developer
//! would sanity-check the state machine before wiring real adapters.

use std::{
    collections::BTreeSet,
    path::PathBuf,
    time::Duration,
};

use bson::doc;
use clap::Parser;
use oplog_mirror::{
    config::TailerConfig,
    document::Namespace,
    testing::{
        InMemorySource,
        InMemoryStore,
    },
    timestamp::LogTimestamp,
    Tailer,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs the oplog mirror tailer against an in-memory fixture")]
struct Args {
    /// Connection identity used as the checkpoint file key.
    #[arg(long, default_value = "demo-shard")]
    conn_id: String,

    /// Path to the checkpoint file. Omit to run without persistence.
    #[arg(long)]
    oplog_file: Option<PathBuf>,

    /// How many fixture cycles to run before stopping.
    #[arg(long, default_value_t = 3)]
    cycles: u32,
}

fn install_tracing() {
    use tracing_subscriber::{
        layer::SubscriberExt,
        util::SubscriberInitExt,
        EnvFilter,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn seed_fixture(source: &InMemorySource) {
    let ns = Namespace::new("demo", "widgets");
    source.seed_document(&ns, bson::Bson::Int32(1), doc! {"_id": 1, "name": "bolt"});
    source.seed_document(&ns, bson::Bson::Int32(2), doc! {"_id": 2, "name": "nut"});
    source.push_entry_insert(ns.clone(), LogTimestamp::new(100, 1), doc! {"_id": 1});
    source.push_entry_update(ns.clone(), LogTimestamp::new(100, 2), doc! {"$set": {"name": "bolt-v2"}}, bson::Bson::Int32(1));
    source.push_entry_delete(ns, LogTimestamp::new(100, 3), bson::Bson::Int32(2));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_tracing();
    let args = Args::parse();

    let source = InMemorySource::new();
    seed_fixture(&source);
    let store = InMemoryStore::new();

    let mut config = TailerConfig::new(&args.conn_id)
        .with_namespace_set([Namespace::new("demo", "widgets")]);
    config.cycle_sleep = Duration::from_millis(50);
    if let Some(path) = args.oplog_file {
        config = config.with_oplog_file(path);
    }

    let tailer = Tailer::new(source, store, config);
    let stop_handle = tailer.stop_handle();

    let run_handle = tokio::spawn(async move { tailer.run().await });
    tokio::time::sleep(Duration::from_millis(50) * args.cycles).await;
    stop_handle.stop();
    run_handle.await??;

    tracing::info!("tailer stopped");
    Ok(())
}
