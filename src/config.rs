use crate::error::ConfigError;
use crate::regime::{Regime, RegimeMap};
use directories::ProjectDirs;
use knuffel::Decode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_BOOTSTRAP_SIZE: usize = 60;
pub const DEFAULT_SUPPRESSION_WINDOW: u64 = 1;
pub const DEFAULT_EMA_ALPHA: f64 = 0.2;
pub const DEFAULT_SPIKE_MULTIPLIER: f64 = 1.75;
pub const DEFAULT_HYSTERESIS_FRACTION: f64 = 0.1;
pub const DEFAULT_DEVIATION_PERCENTILE: f64 = 99.9;
pub const DEFAULT_FALLBACK_COOLING: f64 = 2.0;
pub const DEFAULT_FALLBACK_IDLE: f64 = 1.0;
pub const DEFAULT_DURATION_SHORT: f64 = 0.5;
pub const DEFAULT_DURATION_LONG: f64 = 1.5;
pub const DEFAULT_DURATION_COOLING: f64 = 10.0;
pub const DEFAULT_DURATION_IDLE: f64 = 15.0;

/// On-disk configuration, `config.kdl`. Every node and property is optional.
#[derive(Decode, Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    #[knuffel(child)]
    pub detector: Option<DetectorNode>,
    #[knuffel(child)]
    pub scoring: Option<ScoringNode>,
    #[knuffel(child)]
    pub hysteresis: Option<HysteresisNode>,
    #[knuffel(child)]
    pub fallback: Option<FallbackNode>,
    #[knuffel(child)]
    pub duration: Option<DurationNode>,
}

#[derive(Decode, Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorNode {
    #[knuffel(property)]
    pub bootstrap_size: Option<u64>,
    #[knuffel(property)]
    pub suppression_window: Option<u64>,
}

#[derive(Decode, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringNode {
    #[knuffel(property)]
    pub ema_alpha: Option<f64>,
    #[knuffel(property)]
    pub spike_multiplier: Option<f64>,
    #[knuffel(property)]
    pub deviation_percentile: Option<f64>,
}

#[derive(Decode, Debug, Clone, Default, Serialize, Deserialize)]
pub struct HysteresisNode {
    #[knuffel(property)]
    pub fraction: Option<f64>,
}

/// Deviation thresholds used when bootstrap saw fewer than two samples of a
/// regime. In the signal's own units (watts for the reference load).
#[derive(Decode, Debug, Clone, Default, Serialize, Deserialize)]
pub struct FallbackNode {
    #[knuffel(property)]
    pub cooling: Option<f64>,
    #[knuffel(property)]
    pub idle: Option<f64>,
}

/// Phase length limits, as multiples of the learned length, and the seed
/// lengths (in samples) for regimes absent from the bootstrap window.
#[derive(Decode, Debug, Clone, Default, Serialize, Deserialize)]
pub struct DurationNode {
    #[knuffel(property)]
    pub short: Option<f64>,
    #[knuffel(property)]
    pub long: Option<f64>,
    #[knuffel(property)]
    pub cooling: Option<f64>,
    #[knuffel(property)]
    pub idle: Option<f64>,
}

impl GuardConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        knuffel::parse("config.kdl", content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// `config.kdl` in the per-user config directory, if one can be determined.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "phaseguard", "phaseguard")
            .map(|dirs| dirs.config_dir().join("config.kdl"))
    }

    /// Resolves defaults and validates ranges.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let detector = self.detector.clone().unwrap_or_default();
        let scoring = self.scoring.clone().unwrap_or_default();
        let hysteresis = self.hysteresis.clone().unwrap_or_default();
        let fallback = self.fallback.clone().unwrap_or_default();
        let duration = self.duration.clone().unwrap_or_default();

        let settings = Settings {
            bootstrap_size: match detector.bootstrap_size {
                Some(n) => usize::try_from(n).map_err(|_| ConfigError::Invalid {
                    field: "bootstrap-size",
                    reason: format!("{} does not fit in usize", n),
                })?,
                None => DEFAULT_BOOTSTRAP_SIZE,
            },
            suppression_window: detector.suppression_window.unwrap_or(DEFAULT_SUPPRESSION_WINDOW),
            ema_alpha: scoring.ema_alpha.unwrap_or(DEFAULT_EMA_ALPHA),
            spike_multiplier: scoring.spike_multiplier.unwrap_or(DEFAULT_SPIKE_MULTIPLIER),
            deviation_percentile: scoring
                .deviation_percentile
                .unwrap_or(DEFAULT_DEVIATION_PERCENTILE),
            hysteresis_fraction: hysteresis.fraction.unwrap_or(DEFAULT_HYSTERESIS_FRACTION),
            fallback_threshold: RegimeMap::new(
                fallback.idle.unwrap_or(DEFAULT_FALLBACK_IDLE),
                fallback.cooling.unwrap_or(DEFAULT_FALLBACK_COOLING),
            ),
            duration_short: duration.short.unwrap_or(DEFAULT_DURATION_SHORT),
            duration_long: duration.long.unwrap_or(DEFAULT_DURATION_LONG),
            duration_seed: RegimeMap::new(
                duration.idle.unwrap_or(DEFAULT_DURATION_IDLE),
                duration.cooling.unwrap_or(DEFAULT_DURATION_COOLING),
            ),
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Validated detector parameters. Immutable for the lifetime of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub bootstrap_size: usize,
    pub suppression_window: u64,
    pub ema_alpha: f64,
    pub spike_multiplier: f64,
    pub deviation_percentile: f64,
    pub hysteresis_fraction: f64,
    pub fallback_threshold: RegimeMap<f64>,
    pub duration_short: f64,
    pub duration_long: f64,
    pub duration_seed: RegimeMap<f64>,
}

impl Settings {
    pub fn with_bootstrap_size(mut self, bootstrap_size: usize) -> Self {
        self.bootstrap_size = bootstrap_size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: String) -> ConfigError {
            ConfigError::Invalid { field, reason }
        }

        if self.bootstrap_size == 0 {
            return Err(invalid("bootstrap-size", "must be at least 1".into()));
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(invalid("ema-alpha", format!("{} is outside (0, 1]", self.ema_alpha)));
        }
        if !(self.spike_multiplier.is_finite() && self.spike_multiplier > 0.0) {
            return Err(invalid("spike-multiplier", format!("{} must be positive", self.spike_multiplier)));
        }
        if !(0.0..=100.0).contains(&self.deviation_percentile) {
            return Err(invalid(
                "deviation-percentile",
                format!("{} is outside [0, 100]", self.deviation_percentile),
            ));
        }
        if !(0.0..1.0).contains(&self.hysteresis_fraction) {
            return Err(invalid("fraction", format!("{} is outside [0, 1)", self.hysteresis_fraction)));
        }
        for (regime, &value) in self.fallback_threshold.iter() {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(regime.name(), format!("fallback {} must be finite and non-negative", value)));
            }
        }
        if !(self.duration_short.is_finite() && self.duration_short >= 0.0) {
            return Err(invalid("short", format!("{} must be finite and non-negative", self.duration_short)));
        }
        if !(self.duration_long.is_finite() && self.duration_long > self.duration_short) {
            return Err(invalid(
                "long",
                format!("{} must be finite and above short ({})", self.duration_long, self.duration_short),
            ));
        }
        for (regime, &value) in self.duration_seed.iter() {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(regime.name(), format!("duration seed {} must be positive", value)));
            }
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bootstrap_size: DEFAULT_BOOTSTRAP_SIZE,
            suppression_window: DEFAULT_SUPPRESSION_WINDOW,
            ema_alpha: DEFAULT_EMA_ALPHA,
            spike_multiplier: DEFAULT_SPIKE_MULTIPLIER,
            deviation_percentile: DEFAULT_DEVIATION_PERCENTILE,
            hysteresis_fraction: DEFAULT_HYSTERESIS_FRACTION,
            fallback_threshold: RegimeMap::new(DEFAULT_FALLBACK_IDLE, DEFAULT_FALLBACK_COOLING),
            duration_short: DEFAULT_DURATION_SHORT,
            duration_long: DEFAULT_DURATION_LONG,
            duration_seed: RegimeMap::new(DEFAULT_DURATION_IDLE, DEFAULT_DURATION_COOLING),
        }
    }
}

/// Renders in the same KDL layout [`GuardConfig`] reads.
impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "detector bootstrap-size={} suppression-window={}",
            self.bootstrap_size, self.suppression_window
        )?;
        writeln!(
            f,
            "scoring ema-alpha={:?} spike-multiplier={:?} deviation-percentile={:?}",
            self.ema_alpha, self.spike_multiplier, self.deviation_percentile
        )?;
        writeln!(f, "hysteresis fraction={:?}", self.hysteresis_fraction)?;
        writeln!(
            f,
            "fallback cooling={:?} idle={:?}",
            self.fallback_threshold[Regime::Cooling],
            self.fallback_threshold[Regime::Idle]
        )?;
        write!(
            f,
            "duration short={:?} long={:?} cooling={:?} idle={:?}",
            self.duration_short,
            self.duration_long,
            self.duration_seed[Regime::Cooling],
            self.duration_seed[Regime::Idle]
        )
    }
}
