use crate::config::Settings;
use crate::detector::{Assessment, PhaseDetector};
use crate::error::{ConfigError, DetectorError, Result};
use crate::regime::Regime;
use log::debug;

/// Outcome of feeding one sample to a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// Sample went into the bootstrap window
    Bootstrapping { collected: usize, needed: usize },
    /// Sample completed the window and the detector bootstrapped
    Bootstrapped { global_threshold: f64, regime: Regime },
    Scored(Assessment),
}

impl Observation {
    pub fn is_anomalous(&self) -> bool {
        matches!(self, Observation::Scored(a) if a.anomalous)
    }
}

/// Feeds a single source's raw stream into a [`PhaseDetector`], collecting the
/// bootstrap window first and numbering samples from 0.
#[derive(Debug, Clone)]
pub struct Monitor {
    detector: PhaseDetector,
    window: Vec<f64>,
    observed: u64,
}

impl Monitor {
    pub fn new(settings: Settings) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            window: Vec::with_capacity(settings.bootstrap_size),
            detector: PhaseDetector::with_settings(settings)?,
            observed: 0,
        })
    }

    pub fn observe(&mut self, power: f64) -> Result<Observation> {
        let index = self.observed;

        if self.detector.is_bootstrapped() {
            let assessment = self.detector.assess(power, index)?;
            self.observed += 1;
            return Ok(Observation::Scored(assessment));
        }

        if !(power.is_finite() && power >= 0.0) {
            return Err(DetectorError::InvalidPower { index, value: power });
        }
        self.window.push(power);
        self.observed += 1;

        let needed = self.detector.settings().bootstrap_size.max(1);
        if self.window.len() < needed {
            debug!("Bootstrap progress: {}/{}", self.window.len(), needed);
            return Ok(Observation::Bootstrapping {
                collected: self.window.len(),
                needed,
            });
        }

        self.detector.bootstrap(&self.window)?;
        self.window = Vec::new();
        match (self.detector.global_threshold(), self.detector.current_regime()) {
            (Some(global_threshold), Some(regime)) => Ok(Observation::Bootstrapped { global_threshold, regime }),
            _ => Err(DetectorError::NotBootstrapped),
        }
    }

    pub fn detector(&self) -> &PhaseDetector {
        &self.detector
    }

    /// Samples accepted so far, bootstrap window included.
    pub fn observed(&self) -> u64 {
        self.observed
    }
}
