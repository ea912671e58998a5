use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::League;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Versions the whole threshold set; serialized into every inputs_hash
    /// so a config change rotates decision hashes.
    #[serde(default = "default_config_version")]
    pub config_version: String,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub api: ApiConfig,
    pub providers: ProviderConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Per-league model and threshold parameters, keyed by league code.
    #[serde(default = "default_league_map")]
    pub leagues: BTreeMap<String, LeagueConfig>,
    #[serde(default)]
    pub grading: GradingConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub parlay: ParlayConfig,
    #[serde(default)]
    pub sentinel: SentinelConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Route all writes to the in-memory store and stub the outbound sender
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Comma-separated origins via EDGELINE_API__CORS_ORIGINS
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Bearer token required on admin-scoped routes
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            cors_origins: Vec::new(),
            admin_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub odds_base_url: String,
    pub odds_api_key: String,
    /// Key used in provider_event_map lookups
    #[serde(default = "default_provider_name")]
    pub provider_name: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Bounded exponential backoff for failed provider calls
    #[serde(default = "default_backoff_min_secs")]
    pub backoff_min_secs: u64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_model_version")]
    pub model_version: String,
    /// Iteration tier per wave ("10k" | "25k" | "50k" | "100k")
    #[serde(default = "default_discovery_tier")]
    pub discovery_tier: String,
    #[serde(default = "default_validation_tier")]
    pub validation_tier: String,
    #[serde(default = "default_publish_tier")]
    pub publish_tier: String,
    /// Hard wall-clock ceiling; exceeding it aborts with SIM_TIMEOUT
    #[serde(default = "default_sim_wall_clock_secs")]
    pub wall_clock_ceiling_secs: u64,
    /// Blend weight pulling team strength toward the market-implied
    /// expectation before simulation begins
    #[serde(default = "default_market_anchor_weight")]
    pub market_anchor_weight: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            model_version: default_model_version(),
            discovery_tier: default_discovery_tier(),
            validation_tier: default_validation_tier(),
            publish_tier: default_publish_tier(),
            wall_clock_ceiling_secs: default_sim_wall_clock_secs(),
            market_anchor_weight: default_market_anchor_weight(),
        }
    }
}

/// Per-league model parameters and decision thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    /// EDGE threshold in points (spread/total)
    pub edge_threshold: f64,
    /// EDGE threshold in EV (moneyline)
    pub ml_edge_threshold: f64,
    /// Max |Δ edge| between waves before a signal goes unstable (points)
    pub stability_tolerance_points: f64,
    /// Same, for moneyline EV
    pub stability_tolerance_ev: f64,
    /// American-odds shift defining worst_acceptable_odds at entry lock
    pub odds_tolerance_cents: i32,
    /// League mean of a single team's score (mean-reversion target)
    pub team_score_mean: f64,
    /// Per-team score standard deviation (gaussian leagues)
    pub team_score_std: f64,
    /// Drive-based leagues: offensive drives per team per game
    #[serde(default)]
    pub drives_per_team: u32,
    /// Period leagues: scoring segments per game (innings, periods)
    #[serde(default)]
    pub segments_per_game: u32,
    /// Period leagues: expected score per segment per team
    #[serde(default)]
    pub segment_lambda: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GradingConfig {
    #[serde(default = "default_settlement_rules_version")]
    pub settlement_rules_version: String,
    #[serde(default = "default_clv_rules_version")]
    pub clv_rules_version: String,
    #[serde(default = "default_grade_source")]
    pub grade_source: String,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            settlement_rules_version: default_settlement_rules_version(),
            clv_rules_version: default_clv_rules_version(),
            grade_source: default_grade_source(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    /// Queue entries older than this are dropped, not posted
    #[serde(default = "default_freshness_minutes")]
    pub freshness_minutes: i64,
    /// At most one post per (event, market) within this window
    #[serde(default = "default_post_window_minutes")]
    pub post_window_minutes: i64,
    /// Phrases the copy validator hard-blocks
    #[serde(default = "default_forbidden_phrases")]
    pub forbidden_phrases: Vec<String>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            freshness_minutes: default_freshness_minutes(),
            post_window_minutes: default_post_window_minutes(),
            forbidden_phrases: default_forbidden_phrases(),
        }
    }
}

/// Profile-specific parlay rule set.
#[derive(Debug, Clone, Deserialize)]
pub struct ParlayProfileRules {
    pub min_parlay_weight: f64,
    pub min_edges: usize,
    pub min_picks: usize,
    pub allow_lean: bool,
    pub max_high_vol_legs: usize,
    pub max_same_event: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParlayConfig {
    #[serde(default = "default_premium_rules")]
    pub premium: ParlayProfileRules,
    #[serde(default = "default_balanced_rules")]
    pub balanced: ParlayProfileRules,
    #[serde(default = "default_speculative_rules")]
    pub speculative: ParlayProfileRules,
    /// Bound on the seeded combination search
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,
}

impl Default for ParlayConfig {
    fn default() -> Self {
        Self {
            premium: default_premium_rules(),
            balanced: default_balanced_rules(),
            speculative: default_speculative_rules(),
            max_combinations: default_max_combinations(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentinelConfig {
    #[serde(default = "default_sentinel_cadence_secs")]
    pub cadence_secs: u64,
    #[serde(default = "default_sentinel_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_integrity_violation_rate")]
    pub integrity_violation_rate: f64,
    #[serde(default = "default_missing_selection_id_rate")]
    pub missing_selection_id_rate: f64,
    #[serde(default = "default_missing_snapshot_hash_rate")]
    pub missing_snapshot_hash_rate: f64,
    #[serde(default = "default_post_validation_fail_rate")]
    pub post_validation_fail_rate: f64,
    /// Warning when the EDGE rate drops this fraction vs the 30-min baseline
    #[serde(default = "default_edge_rate_collapse")]
    pub edge_rate_collapse: f64,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            cadence_secs: default_sentinel_cadence_secs(),
            window_secs: default_sentinel_window_secs(),
            integrity_violation_rate: default_integrity_violation_rate(),
            missing_selection_id_rate: default_missing_selection_id_rate(),
            missing_snapshot_hash_rate: default_missing_snapshot_hash_rate(),
            post_validation_fail_rate: default_post_validation_fail_rate(),
            edge_rate_collapse: default_edge_rate_collapse(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_odds_poll_secs")]
    pub odds_poll_secs: u64,
    #[serde(default = "default_wave_check_secs")]
    pub wave_check_secs: u64,
    #[serde(default = "default_settlement_sweep_secs")]
    pub settlement_sweep_secs: u64,
    /// Hour (UTC) at which the nightly calibration snapshot runs
    #[serde(default = "default_calibration_hour_utc")]
    pub calibration_hour_utc: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            odds_poll_secs: default_odds_poll_secs(),
            wave_check_secs: default_wave_check_secs(),
            settlement_sweep_secs: default_settlement_sweep_secs(),
            calibration_hour_utc: default_calibration_hour_utc(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_path = config_dir.as_ref();

        let mut builder = Config::builder()
            .set_default("database.max_connections", default_max_connections())?
            .set_default("api.port", default_api_port() as i64)?;

        if config_path.is_file() {
            builder = builder.add_source(File::from(config_path).required(true));
        } else {
            builder = builder
                .add_source(File::from(config_path.join("default.toml")).required(false))
                .add_source(
                    File::from(config_path.join(
                        std::env::var("EDGELINE_ENV")
                            .unwrap_or_else(|_| "development".to_string()),
                    ))
                    .required(false),
                );
        }

        builder = builder.add_source(
            Environment::with_prefix("EDGELINE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("api.cors_origins")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn league(&self, league: League) -> Option<&LeagueConfig> {
        self.leagues.get(league.as_str())
    }

    /// Validate config invariants. Returns list of problems (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.database.url.trim().is_empty() && !self.dry_run {
            errors.push("database.url must be set unless dry_run".to_string());
        }
        for league in League::ALL {
            match self.league(league) {
                None => errors.push(format!("leagues.{} missing", league.as_str())),
                Some(cfg) => {
                    if cfg.edge_threshold <= 0.5 {
                        errors.push(format!(
                            "leagues.{}.edge_threshold must exceed the 0.5pt LEAN floor, got {}",
                            league, cfg.edge_threshold
                        ));
                    }
                    if cfg.ml_edge_threshold <= 0.01 {
                        errors.push(format!(
                            "leagues.{}.ml_edge_threshold must exceed the 1% EV floor, got {}",
                            league, cfg.ml_edge_threshold
                        ));
                    }
                    if cfg.team_score_mean <= 0.0 {
                        errors.push(format!("leagues.{}.team_score_mean must be > 0", league));
                    }
                }
            }
        }
        for (name, tier) in [
            ("discovery_tier", &self.simulation.discovery_tier),
            ("validation_tier", &self.simulation.validation_tier),
            ("publish_tier", &self.simulation.publish_tier),
        ] {
            if tier.parse::<crate::domain::SimTier>().is_err() {
                errors.push(format!("simulation.{} invalid tier: {}", name, tier));
            }
        }
        if !(0.0..=1.0).contains(&self.simulation.market_anchor_weight) {
            errors.push(format!(
                "simulation.market_anchor_weight must be in [0,1], got {}",
                self.simulation.market_anchor_weight
            ));
        }
        if self.providers.backoff_min_secs > self.providers.backoff_max_secs {
            errors.push("providers backoff: min exceeds max".to_string());
        }
        errors
    }

    /// A config usable by tests and dry runs: defaults for every league,
    /// no database, no provider credentials.
    pub fn default_dry_run() -> Self {
        Self {
            config_version: default_config_version(),
            database: DatabaseConfig {
                url: String::new(),
                max_connections: default_max_connections(),
            },
            api: ApiConfig::default(),
            providers: ProviderConfig {
                odds_base_url: "https://api.the-odds-api.com".to_string(),
                odds_api_key: String::new(),
                provider_name: default_provider_name(),
                request_timeout_secs: default_request_timeout_secs(),
                backoff_min_secs: default_backoff_min_secs(),
                backoff_max_secs: default_backoff_max_secs(),
            },
            simulation: SimulationConfig::default(),
            leagues: default_league_map(),
            grading: GradingConfig::default(),
            publisher: PublisherConfig::default(),
            parlay: ParlayConfig::default(),
            sentinel: SentinelConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            logging: LoggingConfig::default(),
            dry_run: true,
        }
    }
}

fn default_config_version() -> String {
    "cfg-v1".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_api_port() -> u16 {
    8090
}

fn default_provider_name() -> String {
    "oddsapi".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_backoff_min_secs() -> u64 {
    10
}

fn default_backoff_max_secs() -> u64 {
    600
}

fn default_model_version() -> String {
    "mc-v1".to_string()
}

fn default_discovery_tier() -> String {
    "10k".to_string()
}

fn default_validation_tier() -> String {
    "25k".to_string()
}

fn default_publish_tier() -> String {
    "50k".to_string()
}

fn default_sim_wall_clock_secs() -> u64 {
    30
}

fn default_market_anchor_weight() -> f64 {
    0.15
}

fn default_settlement_rules_version() -> String {
    "sr-v1".to_string()
}

fn default_clv_rules_version() -> String {
    "clv-v1".to_string()
}

fn default_grade_source() -> String {
    "engine".to_string()
}

fn default_freshness_minutes() -> i64 {
    30
}

fn default_post_window_minutes() -> i64 {
    240
}

fn default_forbidden_phrases() -> Vec<String> {
    [
        "take the dog",
        "fade the favorite",
        "misprice",
        "lock",
        "guaranteed",
        "can't lose",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_premium_rules() -> ParlayProfileRules {
    ParlayProfileRules {
        min_parlay_weight: 7.0,
        min_edges: 2,
        min_picks: 0,
        allow_lean: false,
        max_high_vol_legs: 1,
        max_same_event: 1,
    }
}

fn default_balanced_rules() -> ParlayProfileRules {
    ParlayProfileRules {
        min_parlay_weight: 5.0,
        min_edges: 1,
        min_picks: 1,
        allow_lean: true,
        max_high_vol_legs: 2,
        max_same_event: 1,
    }
}

fn default_speculative_rules() -> ParlayProfileRules {
    ParlayProfileRules {
        min_parlay_weight: 3.0,
        min_edges: 0,
        min_picks: 0,
        allow_lean: true,
        max_high_vol_legs: 3,
        max_same_event: 2,
    }
}

fn default_max_combinations() -> usize {
    20_000
}

fn default_sentinel_cadence_secs() -> u64 {
    60
}

fn default_sentinel_window_secs() -> u64 {
    300
}

fn default_integrity_violation_rate() -> f64 {
    0.005
}

fn default_missing_selection_id_rate() -> f64 {
    0.001
}

fn default_missing_snapshot_hash_rate() -> f64 {
    0.001
}

fn default_post_validation_fail_rate() -> f64 {
    0.01
}

fn default_edge_rate_collapse() -> f64 {
    0.9
}

fn default_odds_poll_secs() -> u64 {
    60
}

fn default_wave_check_secs() -> u64 {
    30
}

fn default_settlement_sweep_secs() -> u64 {
    300
}

fn default_calibration_hour_utc() -> u32 {
    8
}

fn league_cfg(
    edge_threshold: f64,
    ml_edge_threshold: f64,
    team_score_mean: f64,
    team_score_std: f64,
) -> LeagueConfig {
    LeagueConfig {
        edge_threshold,
        ml_edge_threshold,
        stability_tolerance_points: 1.0,
        stability_tolerance_ev: 0.025,
        odds_tolerance_cents: 10,
        team_score_mean,
        team_score_std,
        drives_per_team: 0,
        segments_per_game: 0,
        segment_lambda: 0.0,
    }
}

fn default_league_map() -> BTreeMap<String, LeagueConfig> {
    let mut map = BTreeMap::new();

    map.insert("NBA".to_string(), league_cfg(2.0, 0.05, 113.0, 12.0));
    map.insert("NCAAB".to_string(), league_cfg(2.5, 0.06, 72.0, 10.0));

    let mut nfl = league_cfg(2.5, 0.05, 22.0, 9.0);
    nfl.drives_per_team = 11;
    map.insert("NFL".to_string(), nfl);

    let mut ncaaf = league_cfg(3.0, 0.06, 28.0, 11.0);
    ncaaf.drives_per_team = 12;
    map.insert("NCAAF".to_string(), ncaaf);

    let mut mlb = league_cfg(1.5, 0.04, 4.6, 3.0);
    mlb.segments_per_game = 9;
    mlb.segment_lambda = 0.51;
    map.insert("MLB".to_string(), mlb);

    let mut nhl = league_cfg(1.0, 0.04, 3.0, 1.7);
    nhl.segments_per_game = 3;
    nhl.segment_lambda = 1.0;
    map.insert("NHL".to_string(), nhl);

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dry_run_is_valid() {
        let cfg = AppConfig::default_dry_run();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn test_every_league_has_defaults() {
        let cfg = AppConfig::default_dry_run();
        for league in League::ALL {
            assert!(cfg.league(league).is_some(), "missing {}", league);
        }
    }

    #[test]
    fn test_validate_rejects_threshold_below_lean_floor() {
        let mut cfg = AppConfig::default_dry_run();
        cfg.leagues.get_mut("NBA").unwrap().edge_threshold = 0.3;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.contains("edge_threshold")));
    }
}
