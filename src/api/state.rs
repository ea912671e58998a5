use std::sync::Arc;

use crate::config::AppConfig;
use crate::flags::FeatureFlags;
use crate::metrics::EngineMetrics;
use crate::parlay::ParlayConstructor;
use crate::settlement::SettlementEngine;
use crate::signals::SignalMachine;
use crate::store::Store;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub machine: Arc<SignalMachine>,
    pub parlay: Arc<ParlayConstructor>,
    pub settlement: Arc<SettlementEngine>,
    pub flags: Arc<FeatureFlags>,
    pub metrics: Arc<EngineMetrics>,
}
