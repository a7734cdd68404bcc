//! Phase-aware spike detector for a two-regime power signal.
//!
//! A bootstrap window fixes a global split point between the idle and cooling
//! regimes, a hysteresis band around it, and one deviation threshold per
//! regime. After that each sample is checked against the exponential moving
//! average of whichever regime is active, and phase lengths are checked
//! against the running average for their regime.

use crate::config::Settings;
use crate::duration::{CompletedPhase, DurationAnomaly, PhaseTimer};
use crate::error::{ConfigError, DetectorError, Result};
use crate::regime::{Regime, RegimeMap};
use crate::util::{abs_deviations, mean, percentile};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Values derived from the bootstrap window. Written once, never updated.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Baseline {
    global_threshold: f64,
    hysteresis_band: f64,
    deviation_threshold: RegimeMap<f64>,
}

/// Detail for one processed sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub index: u64,
    pub power: f64,
    /// Regime after the transition rule ran for this sample
    pub regime: Regime,
    pub transitioned: bool,
    pub suppressed: bool,
    /// Regime EMA the sample was compared against, before any update
    pub reference_ema: Option<f64>,
    pub deviation: Option<f64>,
    pub spike_threshold: f64,
    /// Power spike verdict, the value `process_sample` returns
    pub anomalous: bool,
    /// Phase that ended on this sample, if it transitioned
    pub completed: Option<CompletedPhase>,
    /// Samples since the running phase began
    pub phase_length: u64,
    pub expected_length: f64,
    /// Running phase has outlasted the upper duration bound
    pub phase_overrun: bool,
}

impl Assessment {
    pub fn duration_anomaly(&self) -> Option<DurationAnomaly> {
        self.completed.and_then(|phase| phase.anomaly)
    }
}

/// Running counters over processed samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorStats {
    /// Every accepted sample, suppressed and unseeded ones included
    pub processed: u64,
    /// Power spikes only
    pub anomalies: u64,
    pub transitions: u64,
    pub suppressed: u64,
    /// Samples skipped because the active regime had no EMA seed
    pub unseeded: u64,
    pub phases_too_short: u64,
    pub phases_too_long: u64,
    /// Samples seen while the running phase was overrun
    pub overrun_samples: u64,
}

impl DetectorStats {
    /// Spikes over processed samples, 0 when nothing was processed.
    pub fn anomaly_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.anomalies as f64 / self.processed as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseDetector {
    settings: Settings,
    baseline: Option<Baseline>,
    current_regime: Regime,
    last_transition_index: Option<u64>,
    last_index: Option<u64>,
    regime_ema: RegimeMap<Option<f64>>,
    phases: PhaseTimer,
    stats: DetectorStats,
}

impl PhaseDetector {
    /// Detector with default settings and the given bootstrap window size.
    pub fn new(bootstrap_size: usize) -> std::result::Result<Self, ConfigError> {
        Self::with_settings(Settings::default().with_bootstrap_size(bootstrap_size))
    }

    /// Fails when `settings` does not pass [`Settings::validate`].
    pub fn with_settings(settings: Settings) -> std::result::Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            phases: PhaseTimer::new(&settings),
            settings,
            baseline: None,
            current_regime: Regime::Idle,
            last_transition_index: None,
            last_index: None,
            regime_ema: RegimeMap::default(),
            stats: DetectorStats::default(),
        })
    }

    /// Derives thresholds and per-regime seeds from the leading window.
    ///
    /// Every supplied value is used, even past `bootstrap_size`. On error the
    /// detector is left untouched.
    pub fn bootstrap(&mut self, window: &[f64]) -> Result<()> {
        if self.baseline.is_some() {
            return Err(DetectorError::AlreadyBootstrapped);
        }
        if window.len() < self.settings.bootstrap_size || window.is_empty() {
            return Err(DetectorError::InsufficientBootstrap {
                needed: self.settings.bootstrap_size.max(1),
                got: window.len(),
            });
        }
        for (i, &value) in window.iter().enumerate() {
            check_power(i as u64, value)?;
        }

        let global_threshold = mean(window);
        if !global_threshold.is_finite() {
            return Err(DetectorError::NonFiniteThreshold { mean: global_threshold });
        }
        let hysteresis_band = self.settings.hysteresis_fraction * global_threshold;

        let mut members: RegimeMap<Vec<f64>> = RegimeMap::default();
        for &value in window {
            members[Regime::classify(value, global_threshold)].push(value);
        }

        let mut regime_ema = RegimeMap::default();
        let mut deviation_threshold = self.settings.fallback_threshold;
        for (regime, values) in members.iter() {
            if values.is_empty() {
                continue;
            }
            let center = mean(values);
            regime_ema[regime] = Some(center);
            if values.len() > 1 {
                deviation_threshold[regime] =
                    percentile(&abs_deviations(values, center), self.settings.deviation_percentile);
            }
        }

        // window is non-empty, checked above
        let last = window[window.len() - 1];
        self.current_regime = Regime::classify(last, global_threshold);
        self.regime_ema = regime_ema;
        self.phases.seed(&members);
        self.baseline = Some(Baseline {
            global_threshold,
            hysteresis_band,
            deviation_threshold,
        });

        info!(
            "Bootstrap complete over {} samples. Threshold: {:.2}W (±{:.2}W), starting in {}",
            window.len(),
            global_threshold,
            hysteresis_band,
            self.current_regime
        );
        for regime in Regime::ALL {
            match regime_ema[regime] {
                Some(ema) => info!(
                    "  {}: {} samples, EMA {:.2}W, deviation threshold {:.3}W, expected phase {:.1} samples",
                    regime,
                    members[regime].len(),
                    ema,
                    deviation_threshold[regime],
                    self.phases.expected(regime)
                ),
                None => info!(
                    "  {}: no samples, unseeded (deviation threshold {:.3}W, expected phase {:.1} samples)",
                    regime,
                    deviation_threshold[regime],
                    self.phases.expected(regime)
                ),
            }
        }

        Ok(())
    }

    /// Processes one post-bootstrap sample and reports whether it is anomalous.
    pub fn process_sample(&mut self, value: f64, index: u64) -> Result<bool> {
        self.assess(value, index).map(|a| a.anomalous)
    }

    /// Like [`process_sample`](Self::process_sample), returning the full detail.
    pub fn assess(&mut self, value: f64, index: u64) -> Result<Assessment> {
        let baseline = self.baseline.ok_or(DetectorError::NotBootstrapped)?;
        if let Some(last) = self.last_index {
            if index <= last {
                return Err(DetectorError::OutOfOrderInput { index, last });
            }
        }
        check_power(index, value)?;
        self.last_index = Some(index);
        self.stats.processed += 1;

        let previous = self.current_regime;
        let transitioned = self.apply_transition(&baseline, value, index);
        let regime = self.current_regime;
        let completed = transitioned.then(|| self.close_phase(previous, index));
        let phase_length = self.phases.elapsed(index);
        let expected_length = self.phases.expected(regime);
        let phase_overrun = self.phases.is_overrun(regime, phase_length);
        if phase_overrun {
            self.stats.overrun_samples += 1;
            debug!(
                "{} phase overrun at #{}: {} samples, expected {:.1}",
                regime, index, phase_length, expected_length
            );
        }

        let spike_threshold = self.settings.spike_multiplier * baseline.deviation_threshold[regime];
        let reference_ema = self.regime_ema[regime];

        let mut assessment = Assessment {
            index,
            power: value,
            regime,
            transitioned,
            suppressed: false,
            reference_ema,
            deviation: None,
            spike_threshold,
            anomalous: false,
            completed,
            phase_length,
            expected_length,
            phase_overrun,
        };

        if self.is_suppressed(index) {
            self.stats.suppressed += 1;
            assessment.suppressed = true;
            return Ok(assessment);
        }

        let Some(ema) = reference_ema else {
            self.stats.unseeded += 1;
            return Ok(assessment);
        };

        let deviation = (value - ema).abs();
        assessment.deviation = Some(deviation);
        assessment.anomalous = deviation > spike_threshold;

        if assessment.anomalous {
            self.stats.anomalies += 1;
            warn!(
                "Spike at #{}: {:.2}W, expected {:.2}W in {} (deviation {:.2}W > {:.2}W)",
                index, value, ema, regime, deviation, spike_threshold
            );
        } else {
            let alpha = self.settings.ema_alpha;
            self.regime_ema[regime] = Some(alpha * value + (1.0 - alpha) * ema);
        }

        Ok(assessment)
    }

    fn apply_transition(&mut self, baseline: &Baseline, value: f64, index: u64) -> bool {
        let upper = baseline.global_threshold + baseline.hysteresis_band;
        let lower = baseline.global_threshold - baseline.hysteresis_band;
        let next = match self.current_regime {
            Regime::Idle if value > upper => Regime::Cooling,
            Regime::Cooling if value < lower => Regime::Idle,
            _ => return false,
        };
        debug!("Phase change at #{}: {} -> {} ({:.2}W)", index, self.current_regime, next, value);
        self.current_regime = next;
        self.last_transition_index = Some(index);
        self.stats.transitions += 1;
        true
    }

    fn close_phase(&mut self, regime: Regime, index: u64) -> CompletedPhase {
        let phase = self.phases.complete(regime, index);
        match phase.anomaly {
            Some(DurationAnomaly::TooShort) => self.stats.phases_too_short += 1,
            Some(DurationAnomaly::TooLong) => self.stats.phases_too_long += 1,
            None => {}
        }
        if let Some(anomaly) = phase.anomaly {
            warn!(
                "{} at #{}: {} lasted {} samples, expected {:.1}",
                anomaly, index, regime, phase.length, phase.expected
            );
        }
        phase
    }

    fn is_suppressed(&self, index: u64) -> bool {
        self.last_transition_index
            .is_some_and(|t| index - t <= self.settings.suppression_window)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn global_threshold(&self) -> Option<f64> {
        self.baseline.map(|b| b.global_threshold)
    }

    pub fn hysteresis_band(&self) -> Option<f64> {
        self.baseline.map(|b| b.hysteresis_band)
    }

    pub fn deviation_threshold(&self, regime: Regime) -> Option<f64> {
        self.baseline.map(|b| b.deviation_threshold[regime])
    }

    /// `None` before bootstrap.
    pub fn current_regime(&self) -> Option<Regime> {
        self.baseline.map(|_| self.current_regime)
    }

    pub fn regime_ema(&self, regime: Regime) -> Option<f64> {
        self.regime_ema[regime]
    }

    /// Expected phase length in samples.
    pub fn expected_phase_length(&self, regime: Regime) -> f64 {
        self.phases.expected(regime)
    }

    pub fn last_transition_index(&self) -> Option<u64> {
        self.last_transition_index
    }

    pub fn stats(&self) -> &DetectorStats {
        &self.stats
    }
}

fn check_power(index: u64, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DetectorError::InvalidPower { index, value })
    }
}
