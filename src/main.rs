use roster_engine::config::{ControllerConfig, EngineConfig};
use roster_engine::executor::controller::ConcurrencyController;
use roster_engine::fixtures;
use roster_engine::metrics::MetricsCollector;
use roster_engine::roster::types::EpochRef;
use roster_engine::storage::memory::InMemoryRosterStore;
use roster_engine::transfer::engine::TransferEngine;
use roster_engine::transfer::types::TransferOutcome;

use rand::Rng;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

const SEASON_START: EpochRef = EpochRef {
    season_id: 2025,
    gameset_id: 1,
    gameday_id: 1,
};

/// One in this many transfers targets the next gameset.
const CROSS_EPOCH_EVERY: u32 = 5;

struct Options {
    config: Option<PathBuf>,
    users: u64,
    transfers: u64,
    high_load: bool,
    verbose: bool,
    report: Option<PathBuf>,
    latency_ms: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            config: None,
            users: 1000,
            transfers: 2000,
            high_load: false,
            verbose: false,
            report: None,
            latency_ms: 2,
        }
    }
}

fn parse_args(args: &[String]) -> anyhow::Result<Options> {
    let mut options = Options::default();
    let value = |i: usize| {
        args.get(i + 1)
            .ok_or_else(|| anyhow::anyhow!("{} requires a value", args[i]))
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                options.config = Some(PathBuf::from(value(i)?));
                i += 2;
            }
            "--users" => {
                options.users = value(i)?.parse()?;
                i += 2;
            }
            "--transfers" => {
                options.transfers = value(i)?.parse()?;
                i += 2;
            }
            "--latency-ms" => {
                options.latency_ms = value(i)?.parse()?;
                i += 2;
            }
            "--report" => {
                options.report = Some(PathBuf::from(value(i)?));
                i += 2;
            }
            "--high-load" => {
                options.high_load = true;
                i += 1;
            }
            "--verbose" => {
                options.verbose = true;
                i += 1;
            }
            "--help" | "-h" => {
                eprintln!(
                    "Usage: {} [--config <file>] [--users N] [--transfers N] [--latency-ms N] [--high-load] [--verbose] [--report <file>]",
                    args[0]
                );
                std::process::exit(0);
            }
            other => {
                tracing::warn!("Ignoring unknown argument {}", other);
                i += 1;
            }
        }
    }

    Ok(options)
}

fn tally(outcomes: &mut BTreeMap<String, u64>, outcome: &TransferOutcome) {
    let label = match outcome.code() {
        None => "COMMITTED",
        Some(code) => code.as_str(),
    };
    *outcomes.entry(label.to_string()).or_insert(0) += 1;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;

    tracing_subscriber::fmt()
        .with_max_level(if options.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut config = match &options.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if options.high_load {
        config.controller = ControllerConfig::high_load();
    }
    config.validate()?;

    tracing::info!(
        "Benchmark: {} users, {} transfers, {} partitions over {} shards",
        options.users,
        options.transfers,
        config.router.partitions,
        config.router.shards
    );

    // 1. Engine wiring:
    let metrics = Arc::new(MetricsCollector::new());
    let store = Arc::new(
        InMemoryRosterStore::new().with_latency(Duration::from_millis(options.latency_ms)),
    );
    let catalog = Arc::new(fixtures::catalog(config.rules.default_price));
    let engine = Arc::new(TransferEngine::from_config(
        &config,
        store.clone(),
        catalog,
        metrics.clone(),
    )?);
    let controller = ConcurrencyController::new(config.controller.clone(), metrics.clone());

    let started = Instant::now();
    let mut outcomes: BTreeMap<String, u64> = BTreeMap::new();

    // 2. Phase 1: one team per user
    tracing::info!("Phase 1: creating {} teams", options.users);
    let mut creates = JoinSet::new();
    for user_id in 1..=options.users {
        let engine = engine.clone();
        let controller = controller.clone();
        creates.spawn(async move {
            engine
                .submit_create(
                    &controller,
                    fixtures::tenant_key(user_id),
                    1,
                    fixtures::valid_draft(),
                    SEASON_START,
                )
                .await
        });
    }
    while let Some(joined) = creates.join_next().await {
        tally(&mut outcomes, &joined?);
    }
    tracing::info!(
        "Phase 1 done in {:?}: {} teams stored",
        started.elapsed(),
        store.roster_count()
    );

    // 3. Phase 2: random like-for-like transfers
    tracing::info!("Phase 2: running {} transfers", options.transfers);
    let phase_two = Instant::now();
    let mut transfers = JoinSet::new();
    for _ in 0..options.transfers {
        let user_id = rand::thread_rng().gen_range(1..=options.users.max(1));
        let engine = engine.clone();
        let controller = controller.clone();

        transfers.spawn(async move {
            let tenant = fixtures::tenant_key(user_id);
            let reader = engine.clone();
            let read_tenant = tenant.clone();
            let current = controller
                .execute(move || async move { reader.current_roster(&read_tenant, 1).await })
                .await;

            let roster = match current {
                Ok(Some(roster)) => roster,
                Ok(None) => return None,
                Err(err) => {
                    tracing::debug!("Skipping transfer for {}: {}", tenant, err);
                    return None;
                }
            };

            let request = {
                let mut rng = rand::thread_rng();
                let epoch = roster.epoch;
                let target = if rng.gen_range(0..CROSS_EPOCH_EVERY) == 0 {
                    EpochRef::new(epoch.season_id, epoch.gameset_id + 1, epoch.gameday_id + 1)
                } else {
                    EpochRef::new(epoch.season_id, epoch.gameset_id, epoch.gameday_id + 1)
                };
                fixtures::random_transfer(&roster, target, &mut rng)
            }?;

            Some(engine.submit_transfer(&controller, request).await)
        });
    }
    while let Some(joined) = transfers.join_next().await {
        if let Some(outcome) = joined? {
            tally(&mut outcomes, &outcome);
        }
    }
    tracing::info!("Phase 2 done in {:?}", phase_two.elapsed());

    // 4. Report
    if let Some(sample) = engine
        .team_summaries(&fixtures::tenant_key(1))
        .await?
        .first()
    {
        tracing::debug!("Sample team: {}", serde_json::to_string(sample)?);
    }

    let report = serde_json::json!({
        "elapsed_ms": started.elapsed().as_millis() as u64,
        "users": options.users,
        "transfers_attempted": options.transfers,
        "outcomes": outcomes,
        "controller": controller.metrics(),
        "operations": metrics.report(),
        "router": engine.router().distribution(),
        "store": {
            "rosters": store.roster_count(),
            "shards": store.shard_sizes(),
            "reads": store.read_count(),
            "writes": store.write_count(),
        },
        "config": config,
    });
    let rendered = serde_json::to_string_pretty(&report)?;
    println!("{}", rendered);

    if let Some(path) = &options.report {
        std::fs::write(path, &rendered)?;
        tracing::info!("Report written to {}", path.display());
    }

    Ok(())
}
