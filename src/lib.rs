pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod decision;
pub mod domain;
pub mod error;
pub mod flags;
pub mod integrity;
pub mod metrics;
pub mod orchestrator;
pub mod parlay;
pub mod providers;
pub mod publish;
pub mod sentinel;
pub mod settlement;
pub mod signals;
pub mod sim;
pub mod store;

pub use audit::AuditService;
pub use config::AppConfig;
pub use decision::{DecisionComputer, DecisionInputs, IntegrityValidator};
pub use error::{EngineError, Result};
pub use flags::FeatureFlags;
pub use metrics::EngineMetrics;
pub use orchestrator::Orchestrator;
pub use parlay::ParlayConstructor;
pub use providers::OddsApiClient;
pub use publish::Publisher;
pub use sentinel::IntegritySentinel;
pub use settlement::SettlementEngine;
pub use signals::SignalMachine;
pub use sim::SimulationEngine;
pub use store::{Caller, Collection, MemoryStore, PgStore, Store, WriterMatrix};
