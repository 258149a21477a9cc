//! Command line front end for lbad
//!
//! Replays a point recording (or, once a sensor driver is linked, a live
//! sensor) through the detection pipeline and logs every classification.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser};
use lbad_core::{AnomalyDetector, PipelineConfig, TimerMode};
use lbad_detection::{LogSink, NearestModelDetector, Pipeline};
use lbad_io::{validate_broadcast_code, FilePointSource, Pacing, BROADCAST_CODE_LEN};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "anomaly_detection")]
#[command(about = "Background filtering and shape anomaly detection for LiDAR point streams", long_about = None)]
#[command(group(ArgGroup::new("input").required(true).args(["broadcast_code", "file"])))]
struct Cli {
    /// Broadcast code of the lidar sensor
    #[arg(short = 'b', value_name = "BROADCAST_CODE")]
    broadcast_code: Option<String>,

    /// Recording with the 3D points to read
    #[arg(short = 'f', value_name = "FILE")]
    file: Option<PathBuf>,

    /// Frame duration in milliseconds [default: 100]
    #[arg(short = 'd', value_name = "MS")]
    frame_time: Option<u64>,

    /// Chronometers to run: notime, char, anom or all [default: notime]
    #[arg(short = 't', value_name = "MODE", value_parser = parse_timer_mode)]
    time_mode: Option<TimerMode>,

    /// Time during which scanned points are learned as background, in milliseconds [default: 500]
    #[arg(short = 'g', value_name = "MS")]
    background_time: Option<u64>,

    /// Minimum reflectivity a point needs not to be discarded [default: 0]
    #[arg(short = 'r', value_name = "REFLECTIVITY")]
    min_reflectivity: Option<f32>,

    /// Model library: a JSON file or a directory of JSON files
    #[arg(short = 'm', long = "models", value_name = "PATH")]
    models: Option<PathBuf>,

    /// JSON pipeline configuration; command line options override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Handoff queue capacity [default: 16]
    #[arg(short = 'q', long = "queue", value_name = "FRAMES")]
    queue_capacity: Option<usize>,

    /// Replay the recording at the pace of its timestamps
    #[arg(long)]
    realtime: bool,

    /// Show debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => PipelineConfig::default(),
        };

        if let Some(frame_time) = self.frame_time {
            config.frame_time_ms = frame_time;
        }
        if let Some(mode) = self.time_mode {
            config.timer_mode = mode;
        }
        if let Some(background_time) = self.background_time {
            config.background_time_ms = background_time;
        }
        if let Some(min_reflectivity) = self.min_reflectivity {
            config.min_reflectivity = min_reflectivity;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_timer_mode(value: &str) -> Result<TimerMode, String> {
    match value {
        "notime" => Ok(TimerMode::Untimed),
        "char" => Ok(TimerMode::Characterization),
        "anom" => Ok(TimerMode::AnomalyDetection),
        "all" => Ok(TimerMode::All),
        other => Err(format!(
            "unknown time mode '{}' (expected notime, char, anom or all)",
            other
        )),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = cli.pipeline_config()?;
    info!(
        frame_time_ms = config.frame_time_ms,
        background_time_ms = config.background_time_ms,
        min_reflectivity = config.min_reflectivity,
        timer_mode = ?config.timer_mode,
        "configuration"
    );

    let detector = Arc::new(NearestModelDetector::new(&config.detector)?);
    if let Some(path) = &cli.models {
        detector
            .load_models(path)
            .context("Cannot start without the requested model library")?;
    }

    let source = match (&cli.broadcast_code, &cli.file) {
        (Some(code), _) => {
            validate_broadcast_code(code).with_context(|| {
                format!("Broadcast code must have {} characters", BROADCAST_CODE_LEN)
            })?;
            bail!("No sensor driver is linked into this build; cannot connect to {}", code);
        }
        (None, Some(file)) => {
            let pacing = if cli.realtime { Pacing::Realtime } else { Pacing::Unpaced };
            FilePointSource::open(file)
                .with_context(|| format!("Failed to open recording {}", file.display()))?
                .with_pacing(pacing)
        }
        (None, None) => bail!("Either -b or -f is required"),
    };

    let mut pipeline = Pipeline::new(config, detector)?;
    let report = pipeline.run(source, LogSink)?;
    for line in report.to_string().lines() {
        info!("{}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_input_with_overrides() {
        let cli = Cli::try_parse_from([
            "anomaly_detection",
            "-f",
            "scan.csv",
            "-d",
            "50",
            "-t",
            "all",
            "-g",
            "250",
            "-r",
            "12.5",
            "-q",
            "4",
        ])
        .unwrap();

        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.frame_time_ms, 50);
        assert_eq!(config.timer_mode, TimerMode::All);
        assert_eq!(config.background_time_ms, 250);
        assert_eq!(config.min_reflectivity, 12.5);
        assert_eq!(config.queue_capacity, 4);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["anomaly_detection", "-f", "scan.csv"]).unwrap();
        assert_eq!(cli.pipeline_config().unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_input_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["anomaly_detection"]).is_err());
        assert!(Cli::try_parse_from([
            "anomaly_detection",
            "-f",
            "scan.csv",
            "-b",
            "3GGDJ6K00100451"
        ])
        .is_err());
    }

    #[test]
    fn test_time_modes() {
        assert_eq!(parse_timer_mode("notime"), Ok(TimerMode::Untimed));
        assert_eq!(parse_timer_mode("char"), Ok(TimerMode::Characterization));
        assert_eq!(parse_timer_mode("anom"), Ok(TimerMode::AnomalyDetection));
        assert!(parse_timer_mode("fast").is_err());
        assert!(Cli::try_parse_from(["anomaly_detection", "-f", "a.csv", "-t", "fast"]).is_err());
    }

    #[test]
    fn test_invalid_override_rejected() {
        let cli = Cli::try_parse_from(["anomaly_detection", "-f", "scan.csv", "-d", "0"]).unwrap();
        assert!(cli.pipeline_config().is_err());
    }
}
