use clap::Parser;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use edgeline::api::{app_state, start_api_server, start_api_server_background};
use edgeline::cli::{Cli, Commands};
use edgeline::config::AppConfig;
use edgeline::domain::{Settlement, SimTier, Wave};
use edgeline::error::{EngineError, Result};
use edgeline::integrity::IntegrityChecker;
use edgeline::providers::OddsApiClient;
use edgeline::publish::{NoopSender, OutboundSender, TelegramSender};
use edgeline::settlement::backfill::{self, ProviderListing};
use edgeline::store::{MemoryStore, PgStore, Store};
use edgeline::{
    AuditService, EngineMetrics, FeatureFlags, IntegritySentinel, Orchestrator,
    ParlayConstructor, Publisher, SettlementEngine, SignalMachine,
};

struct Services {
    store: Arc<dyn Store>,
    pg: Option<PgStore>,
    config: Arc<AppConfig>,
    odds: Arc<OddsApiClient>,
    metrics: Arc<EngineMetrics>,
    flags: Arc<FeatureFlags>,
    audit: Arc<AuditService>,
    machine: Arc<SignalMachine>,
    parlay: Arc<ParlayConstructor>,
    settlement: Arc<SettlementEngine>,
    publisher: Arc<Publisher>,
    sentinel: Arc<IntegritySentinel>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    if let Err(err) = run(cli).await {
        error!("{}", err);
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run { port } => {
            let services = bootstrap(&cli.config).await?;
            if let Some(pg) = &services.pg {
                pg.migrate().await?;
            }
            let api_port = port.unwrap_or(services.config.api.port);
            let state = app_state(
                services.store.clone(),
                services.config.clone(),
                services.machine.clone(),
                services.parlay.clone(),
                services.settlement.clone(),
                services.flags.clone(),
                services.metrics.clone(),
            );
            let _api = start_api_server_background(state, api_port);

            let orchestrator = Arc::new(Orchestrator::new(
                services.store.clone(),
                services.config.clone(),
                services.odds.clone(),
                services.machine.clone(),
                services.publisher.clone(),
                services.settlement.clone(),
                services.sentinel.clone(),
                services.audit.clone(),
                services.metrics.clone(),
            ));
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            orchestrator.spawn_loops(shutdown_rx);

            info!("Engine running; Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
            // give loops a moment to observe the flag
            tokio::time::sleep(std::time::Duration::from_millis(250)).await;
            Ok(())
        }

        Commands::Serve { port } => {
            let services = bootstrap(&cli.config).await?;
            let api_port = port.unwrap_or(services.config.api.port);
            let state = app_state(
                services.store.clone(),
                services.config.clone(),
                services.machine.clone(),
                services.parlay.clone(),
                services.settlement.clone(),
                services.flags.clone(),
                services.metrics.clone(),
            );
            start_api_server(state, api_port).await
        }

        Commands::Simulate {
            event_id,
            iterations,
        } => {
            let services = bootstrap(&cli.config).await?;
            let event = services
                .store
                .get_event(&event_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("event {}", event_id)))?;
            let tier = SimTier::from_iterations(iterations).ok_or_else(|| {
                EngineError::Validation(format!("invalid iteration tier: {}", iterations))
            })?;
            let decisions = services
                .machine
                .evaluate_event_wave_with_tier(&event, Wave::Discovery, Some(tier))
                .await?;
            println!("{}", serde_json::to_string_pretty(&decisions)?);
            Ok(())
        }

        Commands::Grade {
            pick_id,
            admin_override,
            admin_note,
        } => {
            let services = bootstrap(&cli.config).await?;
            let admin_override = admin_override
                .map(|raw| Settlement::from_str(&raw).map_err(EngineError::Validation))
                .transpose()?;
            let record = services
                .settlement
                .grade(&pick_id, admin_override, admin_note)
                .await?;
            services.audit.record_grading(&record).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }

        Commands::IntegrityCheck { json } => {
            let services = bootstrap(&cli.config).await?;
            let pg = services.pg.as_ref().ok_or_else(|| {
                EngineError::Validation(
                    "integrity-check requires a database (dry_run is on)".to_string(),
                )
            })?;
            let report = IntegrityChecker::new(pg.pool().clone())
                .run_full_check()
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
            if !report.healthy {
                std::process::exit(3);
            }
            Ok(())
        }

        Commands::Migrate => {
            let config = load_config(&cli.config)?;
            let pg = PgStore::new(&config.database.url, config.database.max_connections).await?;
            pg.migrate().await?;
            println!("Migrations applied");
            Ok(())
        }

        Commands::BackfillProviderIds { apply } => {
            let services = bootstrap(&cli.config).await?;
            let now = chrono::Utc::now();
            let events = services
                .store
                .events_starting_between(now - chrono::Duration::days(1), now + chrono::Duration::days(7))
                .await?;

            let mut listings = Vec::new();
            for league in edgeline::domain::League::ALL {
                match services.odds.fetch_odds(league).await {
                    Ok(polled) => {
                        for item in polled {
                            if let Some(id) = item
                                .event
                                .provider_event_id(&services.config.providers.provider_name)
                            {
                                listings.push(ProviderListing {
                                    provider_event_id: id.to_string(),
                                    home_team_name: item.event.home_team_name.clone(),
                                    away_team_name: item.event.away_team_name.clone(),
                                    start_time: item.event.start_time,
                                });
                            }
                        }
                    }
                    Err(err) => warn!("Listing fetch failed for {}: {}", league, err),
                }
            }

            let candidates = backfill::propose(
                &events,
                &listings,
                &services.config.providers.provider_name,
            );
            for candidate in &candidates {
                println!(
                    "{} -> {} ({} / {}, confidence {:.2})",
                    candidate.event_id,
                    candidate.provider_event_id,
                    candidate.provider_home,
                    candidate.provider_away,
                    candidate.confidence
                );
            }
            if apply {
                let applied = backfill::apply(
                    services.store.clone(),
                    &candidates,
                    &services.config.providers.provider_name,
                )
                .await?;
                println!("Applied {} mappings", applied);
            } else {
                println!("{} candidates (re-run with --apply to write)", candidates.len());
            }
            Ok(())
        }
    }
}

fn load_config(path: &str) -> Result<AppConfig> {
    let config = AppConfig::load_from(path)?;
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(EngineError::ConfigInvalid(errors.join("; ")));
    }
    Ok(config)
}

/// Build the full service graph from config.
async fn bootstrap(config_path: &str) -> Result<Services> {
    let config = Arc::new(load_config(config_path)?);

    let (store, pg): (Arc<dyn Store>, Option<PgStore>) = if config.dry_run {
        info!("Dry-run mode: in-memory store, no outbound posts");
        (Arc::new(MemoryStore::new()), None)
    } else {
        let pg = PgStore::new(&config.database.url, config.database.max_connections).await?;
        (Arc::new(pg.clone()), Some(pg))
    };

    let metrics = Arc::new(EngineMetrics::new());
    let flags = Arc::new(FeatureFlags::new(store.clone()));
    let audit = Arc::new(AuditService::new(store.clone()));
    let odds = Arc::new(OddsApiClient::new(&config.providers)?);

    let machine = Arc::new(SignalMachine::new(
        store.clone(),
        config.clone(),
        metrics.clone(),
    ));
    let parlay = Arc::new(ParlayConstructor::new(store.clone(), config.parlay.clone()));
    let settlement = Arc::new(SettlementEngine::new(
        store.clone(),
        odds.clone(),
        config.grading.clone(),
        config.providers.provider_name.clone(),
        metrics.clone(),
    ));

    let sender: Arc<dyn OutboundSender> =
        if config.dry_run || config.publisher.bot_token.is_empty() {
            Arc::new(NoopSender::default())
        } else {
            Arc::new(TelegramSender::new(
                config.publisher.bot_token.clone(),
                config.publisher.chat_id.clone(),
            )?)
        };
    let publisher = Arc::new(Publisher::new(
        store.clone(),
        sender,
        flags.clone(),
        config.publisher.clone(),
        metrics.clone(),
    ));

    let sentinel = Arc::new(IntegritySentinel::new(
        store.clone(),
        flags.clone(),
        metrics.clone(),
        audit.clone(),
        config.sentinel.clone(),
    ));

    Ok(Services {
        store,
        pg,
        config,
        odds,
        metrics,
        flags,
        audit,
        machine,
        parlay,
        settlement,
        publisher,
        sentinel,
    })
}

fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,edgeline=debug,sqlx=warn"));

    // File logging when a writable log dir is configured. The rolling
    // appender panics if it cannot create its first file, so preflight.
    let log_dir = std::env::var("EDGELINE_LOG_DIR").ok();
    let file_layer = log_dir.and_then(|dir| {
        if std::fs::create_dir_all(&dir).is_err() {
            eprintln!("Warning: could not create log dir {}, file logging disabled", dir);
            return None;
        }
        let test_path = std::path::Path::new(&dir).join(".edgeline_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);
                let appender = tracing_appender::rolling::daily(&dir, "edgeline.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                // keep the guard alive for the process lifetime
                Box::leak(Box::new(guard));
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: log dir {} not writable ({}), file logging disabled",
                    dir, e
                );
                None
            }
        }
    });

    let console_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}
