use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use phaseguard::args::{Cli, Commands};
use phaseguard::util::power_parser;
use phaseguard::{AnomalyEvent, EventPolicy, GuardConfig, Monitor, Observation, PhasePolicy, Settings, SpikePolicy};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::process;

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        log::error!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => {
            println!("{}", settings);
        }
        Commands::Detect { input, source, bootstrap_size, durations } => {
            let settings = match bootstrap_size {
                Some(n) => settings.with_bootstrap_size(n),
                None => settings,
            };
            let reader: Box<dyn BufRead> = if input == "-" {
                Box::new(BufReader::new(io::stdin()))
            } else {
                let file = File::open(&input).with_context(|| format!("Failed to open {}", input))?;
                Box::new(BufReader::new(file))
            };
            let policy: &dyn EventPolicy = if durations { &PhasePolicy } else { &SpikePolicy };
            detect(reader, &source, settings, policy)?;
        }
    }

    Ok(())
}

fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let config = match explicit {
        Some(path) => GuardConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => match GuardConfig::default_path().filter(|p| p.exists()) {
            Some(path) => {
                info!("Loading config from {}", path.display());
                GuardConfig::load(&path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?
            }
            None => GuardConfig::default(),
        },
    };
    config.settings().context("Invalid configuration")
}

fn detect(reader: impl BufRead, source: &str, settings: Settings, policy: &dyn EventPolicy) -> Result<()> {
    let mut monitor = Monitor::new(settings).context("Invalid detector settings")?;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        let Some(power) = parse_line(&line).with_context(|| format!("Line {}", line_no + 1))? else {
            continue;
        };

        match monitor.observe(power).with_context(|| format!("Line {}", line_no + 1))? {
            Observation::Bootstrapping { .. } => {}
            Observation::Bootstrapped { global_threshold, regime } => {
                info!("Detector ready: threshold {:.2}W, starting in {}", global_threshold, regime);
            }
            Observation::Scored(assessment) => {
                if let Some(event) = AnomalyEvent::from_assessment(source, &assessment, policy) {
                    println!("{}", event);
                }
            }
        }
    }

    let detector = monitor.detector();
    if !detector.is_bootstrapped() {
        warn!(
            "Input ended after {} samples, before the {}-sample bootstrap window filled",
            monitor.observed(),
            detector.settings().bootstrap_size
        );
        return Ok(());
    }

    let stats = detector.stats();
    println!(
        "{} samples, {} processed, {} spikes ({:.2}%), {} phase changes ({} too short, {} too long)",
        monitor.observed(),
        stats.processed,
        stats.anomalies,
        stats.anomaly_rate() * 100.0,
        stats.transitions,
        stats.phases_too_short,
        stats.phases_too_long
    );
    Ok(())
}

/// Blank lines and `#` comments yield `None`.
fn parse_line(line: &str) -> Result<Option<f64>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    power_parser(line).map(Some).map_err(anyhow::Error::msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("  50.5 ").unwrap(), Some(50.5));
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("# header").unwrap(), None);
        assert!(parse_line("fifty").is_err());
    }

    #[test]
    fn test_detect_reports_bad_line() {
        let input = "10\n20\nbad\n";
        let err = detect(input.as_bytes(), "t", Settings::default().with_bootstrap_size(2), &SpikePolicy).unwrap_err();
        assert!(format!("{:#}", err).contains("Line 3"));
    }

    #[test]
    fn test_detect_runs_short_input() {
        let input = "10\n20\n";
        assert!(detect(input.as_bytes(), "t", Settings::default(), &SpikePolicy).is_ok());
    }

    #[test]
    fn test_detect_rejects_invalid_settings() {
        let mut settings = Settings::default();
        settings.ema_alpha = 5.0;
        let err = detect("10\n".as_bytes(), "t", settings, &PhasePolicy).unwrap_err();
        assert!(format!("{:#}", err).contains("ema-alpha"));
    }
}
