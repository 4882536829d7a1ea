use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which rendering backend the pipeline hands jobs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum RendererKind {
    /// espeak-ng + ffmpeg
    Ffmpeg,
    /// Random delay and placeholder output, no external tools
    Simulated,
}

impl FromStr for RendererKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(RendererKind::Ffmpeg),
            "simulated" => Ok(RendererKind::Simulated),
            other => Err(format!("RENDERER must be 'ffmpeg' or 'simulated', got '{}'", other)),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Maximum JSON payload size in bytes
    /// Default: 1MB
    pub max_payload_size: usize,

    /// Directory for the daily rolling log files
    pub log_dir: PathBuf,

    /// Where finished videos are written
    pub output_dir: PathBuf,

    pub renderer: RendererKind,
    pub ffmpeg_path: PathBuf,
    pub espeak_path: PathBuf,

    /// Interval between intermediate progress updates of a timed stage
    pub stage_tick: Duration,

    /// Multiplier applied to the simulated stage durations; 0 skips them
    pub stage_time_scale: f64,

    /// Queue depth of each progress subscriber
    pub subscriber_buffer: usize,

    pub simulated_max_delay_secs: u64,
    pub simulated_failure_rate: f64,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Every variable is optional:
    /// - HOST / PORT: bind address (default: 127.0.0.1:8080)
    /// - MAX_PAYLOAD_SIZE: request payload limit in bytes (default: 1048576)
    /// - LOG_DIR: log directory (default: logs)
    /// - OUTPUT_DIR: generated videos (default: generated_videos)
    /// - RENDERER: ffmpeg | simulated (default: ffmpeg)
    /// - FFMPEG_PATH / ESPEAK_PATH: tool binaries (default: ffmpeg / espeak-ng)
    /// - STAGE_TICK_MS: intermediate progress interval (default: 1000)
    /// - STAGE_TIME_SCALE: simulated stage duration multiplier (default: 1.0)
    /// - SUBSCRIBER_BUFFER: per-subscriber queue depth (default: 64)
    /// - SIMULATED_MAX_DELAY_SECS / SIMULATED_FAILURE_RATE: simulated renderer (default: 5 / 0.0)
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let renderer = match env::var("RENDERER") {
            Ok(value) => value.parse()?,
            Err(_) => RendererKind::Ffmpeg,
        };

        let stage_time_scale: f64 = parse_or("STAGE_TIME_SCALE", 1.0)?;
        if !stage_time_scale.is_finite() || stage_time_scale < 0.0 {
            return Err(format!("STAGE_TIME_SCALE must be a non-negative number, got {}", stage_time_scale));
        }

        let simulated_failure_rate: f64 = parse_or("SIMULATED_FAILURE_RATE", 0.0)?;
        if !(0.0..=1.0).contains(&simulated_failure_rate) {
            return Err(format!(
                "SIMULATED_FAILURE_RATE must be between 0 and 1, got {}",
                simulated_failure_rate
            ));
        }

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_or("PORT", 8080)?,
            max_payload_size: parse_or("MAX_PAYLOAD_SIZE", 1024 * 1024)?,
            log_dir: path_or("LOG_DIR", "logs"),
            output_dir: path_or("OUTPUT_DIR", "generated_videos"),
            renderer,
            ffmpeg_path: path_or("FFMPEG_PATH", "ffmpeg"),
            espeak_path: path_or("ESPEAK_PATH", "espeak-ng"),
            stage_tick: Duration::from_millis(parse_or("STAGE_TICK_MS", 1000)?),
            stage_time_scale,
            subscriber_buffer: parse_or("SUBSCRIBER_BUFFER", 64)?,
            simulated_max_delay_secs: parse_or("SIMULATED_MAX_DELAY_SECS", 5)?,
            simulated_failure_rate,
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset
fn parse_or<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e| format!("Invalid {} '{}': {}", key, value, e)),
        Err(_) => Ok(default),
    }
}

fn path_or(key: &str, default: &str) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_kind_parses_case_insensitively() {
        assert_eq!("FFmpeg".parse::<RendererKind>(), Ok(RendererKind::Ffmpeg));
        assert_eq!("simulated".parse::<RendererKind>(), Ok(RendererKind::Simulated));
        assert!("gpu".parse::<RendererKind>().is_err());
    }

    #[test]
    fn parse_or_falls_back_for_unset_keys() {
        assert_eq!(parse_or("VIDGEN_TEST_SURELY_UNSET", 42u16), Ok(42));
        assert_eq!(path_or("VIDGEN_TEST_SURELY_UNSET", "out"), PathBuf::from("out"));
    }
}
