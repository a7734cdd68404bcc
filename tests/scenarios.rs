//! End-to-end detection scenarios over synthetic compressor loads.

use phaseguard::{
    AnomalyEvent, Category, DurationAnomaly, Monitor, Observation, PhaseDetector, PhasePolicy, Regime, Settings,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const IDLE_W: f64 = 5.0;
const COOLING_W: f64 = 80.0;
const IDLE_LEN: usize = 15;
const COOLING_LEN: usize = 10;

/// Square-wave compressor cycle with uniform noise, starting idle.
fn cycled_load(rng: &mut StdRng, len: usize, noise: f64) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let base = if i % (IDLE_LEN + COOLING_LEN) < IDLE_LEN { IDLE_W } else { COOLING_W };
            base + rng.gen_range(-noise..noise)
        })
        .collect()
}

fn is_mid_cooling(i: usize) -> bool {
    let pos = i % (IDLE_LEN + COOLING_LEN);
    pos >= IDLE_LEN + 3 && pos < IDLE_LEN + COOLING_LEN - 1
}

#[test]
fn single_outlier_window_then_spike() {
    let mut window = vec![50.0; 60];
    window[30] = 10.0;

    let mut detector = PhaseDetector::new(60).unwrap();
    detector.bootstrap(&window).unwrap();
    assert_eq!(detector.global_threshold(), Some(2960.0 / 60.0));
    assert_eq!(detector.hysteresis_band(), Some(0.1 * (2960.0 / 60.0)));
    assert_eq!(detector.current_regime(), Some(Regime::Cooling));

    for index in 60..65 {
        assert!(!detector.process_sample(50.0, index).unwrap(), "index {}", index);
    }
    assert!(detector.process_sample(200.0, 65).unwrap());
    for index in 66..75 {
        assert!(!detector.process_sample(50.0, index).unwrap(), "index {}", index);
    }
    assert_eq!(detector.regime_ema(Regime::Cooling), Some(50.0));
    assert_eq!(detector.stats().anomalies, 1);
}

#[test]
fn cooling_spikes_are_flagged_on_noisy_cycle() {
    let mut rng = StdRng::seed_from_u64(17);
    let mut load = cycled_load(&mut rng, 1000, 0.5);
    let spikes: Vec<usize> = (100..1000).filter(|&i| is_mid_cooling(i) && i % 7 == 0).collect();
    assert!(!spikes.is_empty());
    for &i in &spikes {
        load[i] = 300.0;
    }

    let mut monitor = Monitor::new(Settings::default()).unwrap();
    let mut flagged = Vec::new();
    for &power in &load {
        if let Observation::Scored(a) = monitor.observe(power).unwrap() {
            if a.anomalous {
                flagged.push(a.index as usize);
            }
        }
    }

    for i in &spikes {
        assert!(flagged.contains(i), "spike at {} not flagged", i);
    }
    let false_positives = flagged.iter().filter(|i| !spikes.contains(i)).count();
    assert!(
        false_positives * 20 < load.len(),
        "{} false positives out of {}",
        false_positives,
        load.len()
    );

    let stats = monitor.detector().stats();
    let expected_cycles = (load.len() - 60) / (IDLE_LEN + COOLING_LEN);
    assert!(stats.transitions as usize >= 2 * expected_cycles - 2);
}

#[test]
fn regime_tracking_follows_the_cycle() {
    let mut rng = StdRng::seed_from_u64(3);
    let load = cycled_load(&mut rng, 300, 0.5);
    let mut monitor = Monitor::new(Settings::default().with_bootstrap_size(50)).unwrap();

    for (i, &power) in load.iter().enumerate() {
        if let Observation::Scored(a) = monitor.observe(power).unwrap() {
            let expected = if i % (IDLE_LEN + COOLING_LEN) < IDLE_LEN { Regime::Idle } else { Regime::Cooling };
            assert_eq!(a.regime, expected, "sample {} ({:.2}W)", i, power);
        }
    }
}

/// An idle-phase spike crosses the band and reads as a phase change, so the
/// suppression window swallows it.
#[test]
fn idle_spike_reads_as_transition() {
    let mut detector = PhaseDetector::new(4).unwrap();
    detector.bootstrap(&[80.0, 80.0, 5.0, 5.0]).unwrap();
    assert_eq!(detector.current_regime(), Some(Regime::Idle));

    let a = detector.assess(300.0, 4).unwrap();
    assert!(a.transitioned);
    assert!(a.suppressed);
    assert!(!a.anomalous);
    assert_eq!(detector.current_regime(), Some(Regime::Cooling));
}

/// An anomalous sample is never folded in, so a sustained shift keeps being
/// flagged until a phase change.
#[test]
fn sustained_shift_is_never_absorbed() {
    let mut detector = PhaseDetector::new(4).unwrap();
    detector.bootstrap(&[5.0, 5.0, 80.0, 80.0]).unwrap();

    for index in 4..40 {
        assert!(detector.process_sample(95.0, index).unwrap(), "index {}", index);
    }
    assert_eq!(detector.regime_ema(Regime::Cooling), Some(80.0));
}

#[test]
fn fallback_thresholds_come_from_settings() {
    let mut settings = Settings::default().with_bootstrap_size(3);
    settings.fallback_threshold[Regime::Cooling] = 20.0;

    let mut detector = PhaseDetector::with_settings(settings).unwrap();
    detector.bootstrap(&[1.0, 1.0, 100.0]).unwrap();
    assert_eq!(detector.deviation_threshold(Regime::Cooling), Some(20.0));
    // 1.75 * 20 = 35
    assert!(!detector.process_sample(130.0, 3).unwrap());
    assert!(detector.process_sample(200.0, 4).unwrap());
}

/// A cooling phase stuck at four times its usual length is reported when it
/// ends, and its tail is marked as overrun while it runs.
#[test]
fn stuck_compressor_is_a_long_phase() {
    let mut rng = StdRng::seed_from_u64(29);
    let mut load = cycled_load(&mut rng, 600, 0.5);
    let stuck_start = 16 * (IDLE_LEN + COOLING_LEN) + IDLE_LEN;
    let stuck_len = 4 * COOLING_LEN;
    for power in &mut load[stuck_start..stuck_start + stuck_len] {
        *power = COOLING_W + rng.gen_range(-0.5..0.5);
    }

    let mut monitor = Monitor::new(Settings::default()).unwrap();
    let mut long_phases = Vec::new();
    let mut overrun = Vec::new();
    for &power in &load {
        if let Observation::Scored(a) = monitor.observe(power).unwrap() {
            if a.duration_anomaly() == Some(DurationAnomaly::TooLong) {
                long_phases.push(a);
            }
            if a.phase_overrun {
                overrun.push(a.index as usize);
            }
        }
    }

    assert_eq!(long_phases.len(), 1);
    let ended = long_phases[0];
    assert_eq!(ended.index as usize, stuck_start + stuck_len);
    let phase = ended.completed.unwrap();
    assert_eq!(phase.regime, Regime::Cooling);
    assert_eq!(phase.length as usize, stuck_len);
    assert!(!ended.anomalous);

    assert!(!overrun.is_empty());
    assert!(overrun.iter().all(|&i| i > stuck_start && i < stuck_start + stuck_len));
    assert_eq!(monitor.detector().stats().phases_too_long, 1);
    assert_eq!(monitor.detector().stats().overrun_samples, overrun.len() as u64);

    let event = AnomalyEvent::from_assessment("fridge-01", &ended, &PhasePolicy).unwrap();
    assert_eq!(event.category, Category::PhaseTooLong);
}
