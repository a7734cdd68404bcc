pub mod args;
pub mod config;
pub mod detector;
pub mod duration;
pub mod error;
pub mod event;
pub mod monitor;
pub mod regime;
pub mod util;

pub use config::{GuardConfig, Settings};
pub use detector::{Assessment, DetectorStats, PhaseDetector};
pub use duration::{CompletedPhase, DurationAnomaly};
pub use error::{ConfigError, DetectorError};
pub use event::{AnomalyEvent, Category, EventPolicy, PhasePolicy, Severity, SpikePolicy};
pub use monitor::{Monitor, Observation};
pub use regime::{Regime, RegimeMap};
