use std::path::PathBuf;
use tracing::{info, warn};

/// Weight file read when neither `--file` nor `DRIFTDASH_DATA_FILE` is given.
pub const DEFAULT_DATA_FILE: &str =
    "model_202402191144_eval_20240102_through_20240306_DF-Positions.txt";

pub const DEFAULT_PORTFOLIO_VALUE: f64 = 50_000.0;
pub const DEFAULT_DRIFT_BAND: f64 = 0.02;
/// Absolute drift above which the summary reports "Needs Rebalance".
pub const DEFAULT_REBALANCE_THRESHOLD: f64 = 0.02;

// ── Parameter Controls ──────────────────────────────────────────────────────
pub const BAND_MIN: f64 = 0.0;
pub const BAND_MAX: f64 = 0.10;
pub const BAND_STEP: f64 = 0.005;
pub const VALUE_STEP: f64 = 500.0;

// ── Views ───────────────────────────────────────────────────────────────────
/// Number of largest holdings drawn in the allocation history.
pub const HISTORY_TOP_N: usize = 8;
/// Drift monitor x-axis is fixed to ±this.
pub const DRIFT_AXIS_LIMIT: f64 = 0.15;

pub const TRADE_FILE_NAME: &str = "trade_suggestions.txt";
pub const TRADE_FILE_MIME: &str = "text/plain";

pub const ENV_DATA_FILE: &str = "DRIFTDASH_DATA_FILE";
pub const ENV_PORTFOLIO_VALUE: &str = "DRIFTDASH_PORTFOLIO_VALUE";
pub const ENV_DRIFT_BAND: &str = "DRIFTDASH_DRIFT_BAND";
pub const ENV_REBALANCE_THRESHOLD: &str = "DRIFTDASH_REBALANCE_THRESHOLD";
pub const ENV_EXPORT_DIR: &str = "DRIFTDASH_EXPORT_DIR";

/// Runtime parameters shared by every front-end.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub data_file: PathBuf,
    pub portfolio_value: f64,
    pub drift_band: f64,
    pub rebalance_threshold: f64,
    pub export_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            portfolio_value: DEFAULT_PORTFOLIO_VALUE,
            drift_band: DEFAULT_DRIFT_BAND,
            rebalance_threshold: DEFAULT_REBALANCE_THRESHOLD,
            export_dir: PathBuf::from("."),
        }
    }
}

/// Values given on the command line; `None` falls through to env/defaults.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub data_file: Option<PathBuf>,
    pub portfolio_value: Option<f64>,
    pub drift_band: Option<f64>,
    pub rebalance_threshold: Option<f64>,
}

impl Settings {
    /// Reads `.env` (if any) and the process environment, then applies CLI
    /// overrides on top.
    pub fn resolve(overrides: Overrides) -> Self {
        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => warn!("Ignoring unreadable .env file: {}", e),
        }
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Precedence: override > `lookup(key)` > constant default.
    pub fn resolve_with(overrides: Overrides, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Settings::default();

        let data_file = overrides
            .data_file
            .or_else(|| env_nonempty(&lookup, ENV_DATA_FILE).map(PathBuf::from))
            .unwrap_or(defaults.data_file);
        let export_dir = env_nonempty(&lookup, ENV_EXPORT_DIR)
            .map(PathBuf::from)
            .unwrap_or(defaults.export_dir);

        let portfolio_value = overrides
            .portfolio_value
            .or_else(|| env_f64(&lookup, ENV_PORTFOLIO_VALUE))
            .unwrap_or(defaults.portfolio_value);
        let drift_band = overrides
            .drift_band
            .or_else(|| env_f64(&lookup, ENV_DRIFT_BAND))
            .unwrap_or(defaults.drift_band);
        let rebalance_threshold = overrides
            .rebalance_threshold
            .or_else(|| env_f64(&lookup, ENV_REBALANCE_THRESHOLD))
            .unwrap_or(defaults.rebalance_threshold);

        Self {
            data_file,
            portfolio_value: clamp_value(portfolio_value),
            drift_band: clamp_band(drift_band),
            rebalance_threshold: rebalance_threshold.max(0.0),
            export_dir,
        }
    }
}

fn env_nonempty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_f64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<f64> {
    let raw = env_nonempty(lookup, key)?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            warn!("Unparseable {}={} ; using default", key, raw);
            None
        }
    }
}

/// Keeps a drift band inside the slider range.
pub fn clamp_band(band: f64) -> f64 {
    if band.is_nan() {
        return DEFAULT_DRIFT_BAND;
    }
    band.clamp(BAND_MIN, BAND_MAX)
}

/// Portfolio value input accepts anything non-negative.
pub fn clamp_value(value: f64) -> f64 {
    if value.is_nan() {
        return DEFAULT_PORTFOLIO_VALUE;
    }
    value.max(0.0)
}
