use crate::detector::Assessment;
use crate::duration::DurationAnomaly;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    PowerSpike,
    PhaseTooShort,
    PhaseTooLong,
    /// Running phase is past its upper bound
    DurationExceeded,
    /// Spike while the running phase is overrun
    CombinedCritical,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::PowerSpike => "power_spike",
            Category::PhaseTooShort => "phase_too_short",
            Category::PhaseTooLong => "phase_too_long",
            Category::DurationExceeded => "duration_exceeded",
            Category::CombinedCritical => "critical_combined",
        })
    }
}

/// Record handed to whatever stores or forwards anomalies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub source: String,
    pub index: u64,
    pub power: f64,
    pub severity: Severity,
    pub category: Category,
}

impl AnomalyEvent {
    /// `None` when the policy does not turn this assessment into an event.
    pub fn from_assessment(source: &str, assessment: &Assessment, policy: &dyn EventPolicy) -> Option<Self> {
        let (severity, category) = policy.classify(assessment)?;
        Some(Self {
            source: source.to_string(),
            index: assessment.index,
            power: assessment.power,
            severity,
            category,
        })
    }
}

impl fmt::Display for AnomalyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} {:.2}W severity={} type={}",
            self.source, self.index, self.power, self.severity, self.category
        )
    }
}

/// Maps a detector verdict onto severity and category.
pub trait EventPolicy {
    fn classify(&self, assessment: &Assessment) -> Option<(Severity, Category)>;
}

/// Every flagged sample is a medium power spike.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpikePolicy;

impl EventPolicy for SpikePolicy {
    fn classify(&self, assessment: &Assessment) -> Option<(Severity, Category)> {
        assessment
            .anomalous
            .then_some((Severity::Medium, Category::PowerSpike))
    }
}

/// Spikes plus phase-duration verdicts. A completed phase that was too short
/// or too long outranks everything else on its sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhasePolicy;

impl EventPolicy for PhasePolicy {
    fn classify(&self, a: &Assessment) -> Option<(Severity, Category)> {
        match a.duration_anomaly() {
            Some(DurationAnomaly::TooShort) => return Some((Severity::Medium, Category::PhaseTooShort)),
            Some(DurationAnomaly::TooLong) => return Some((Severity::Medium, Category::PhaseTooLong)),
            None => {}
        }
        match (a.anomalous, a.phase_overrun) {
            (true, true) => Some((Severity::Critical, Category::CombinedCritical)),
            (true, false) => Some((Severity::Medium, Category::PowerSpike)),
            (false, true) => Some((Severity::Low, Category::DurationExceeded)),
            (false, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::CompletedPhase;
    use crate::regime::Regime;

    fn assessment(anomalous: bool) -> Assessment {
        Assessment {
            index: 65,
            power: 200.0,
            regime: Regime::Cooling,
            transitioned: false,
            suppressed: false,
            reference_ema: Some(50.0),
            deviation: Some(150.0),
            spike_threshold: 0.0,
            anomalous,
            completed: None,
            phase_length: 4,
            expected_length: 10.0,
            phase_overrun: false,
        }
    }

    /// Escalates by how far past the threshold the sample landed.
    struct RatioPolicy;

    impl EventPolicy for RatioPolicy {
        fn classify(&self, a: &Assessment) -> Option<(Severity, Category)> {
            if !a.anomalous {
                return None;
            }
            let ratio = a.power / a.reference_ema?;
            let severity = if ratio >= 3.0 { Severity::Critical } else { Severity::Low };
            Some((severity, Category::PowerSpike))
        }
    }

    #[test]
    fn test_spike_policy_only_emits_for_anomalies() {
        let event = AnomalyEvent::from_assessment("fridge-01", &assessment(true), &SpikePolicy).unwrap();
        assert_eq!(event.severity, Severity::Medium);
        assert_eq!(event.category, Category::PowerSpike);
        assert_eq!(event.to_string(), "fridge-01 #65 200.00W severity=medium type=power_spike");

        assert!(AnomalyEvent::from_assessment("fridge-01", &assessment(false), &SpikePolicy).is_none());
    }

    #[test]
    fn test_phase_policy_priority() {
        let mut a = assessment(true);
        a.phase_overrun = true;
        let event = AnomalyEvent::from_assessment("f", &a, &PhasePolicy).unwrap();
        assert_eq!((event.severity, event.category), (Severity::Critical, Category::CombinedCritical));

        a.completed = Some(CompletedPhase {
            regime: Regime::Idle,
            length: 2,
            expected: 15.0,
            partial: false,
            anomaly: Some(DurationAnomaly::TooShort),
        });
        let event = AnomalyEvent::from_assessment("f", &a, &PhasePolicy).unwrap();
        assert_eq!(event.category, Category::PhaseTooShort);
        assert_eq!(event.to_string(), "f #65 200.00W severity=medium type=phase_too_short");

        let mut quiet = assessment(false);
        assert!(AnomalyEvent::from_assessment("f", &quiet, &PhasePolicy).is_none());
        quiet.phase_overrun = true;
        let event = AnomalyEvent::from_assessment("f", &quiet, &PhasePolicy).unwrap();
        assert_eq!(event.category, Category::DurationExceeded);
        assert!(AnomalyEvent::from_assessment("f", &quiet, &SpikePolicy).is_none());
    }

    #[test]
    fn test_custom_policy() {
        let event = AnomalyEvent::from_assessment("x", &assessment(true), &RatioPolicy).unwrap();
        assert_eq!(event.severity, Severity::Critical);
        assert!(Severity::Critical > Severity::Medium);
    }
}
