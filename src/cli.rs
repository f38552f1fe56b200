//! `clap`-derived argument parsing and the `Config` it resolves into.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use clap::Parser;

use crate::error::Error;
use crate::path::NormalizationForm;
use crate::size::parse_size;

/// Default pseudo-random seed (§4.D).
const DEFAULT_SEED: u32 = 4;
/// Default block size, 128 KiB.
const DEFAULT_BLOCK_SIZE: &str = "128K";
/// Default pre-generated block count.
const DEFAULT_PRE_GENERATED_BLOCKS: usize = 100;
/// Default uniform modification time, chosen to match the historical tool
/// this filesystem's document format was enumerated from.
const DEFAULT_MTIME: &str = "2017-10-17";

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Maps onto `tracing::Level`. `WARNING` maps to `WARN`; `CRITICAL` maps
    /// to `ERROR` (there is no more severe tracing level) and is expected to
    /// be visually distinguished by the message itself, not the level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error | LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}

/// Mounts a declarative JSON tree as a read-only synthetic filesystem.
#[derive(Debug, Parser)]
#[command(name = "phantomfs", version, about)]
pub struct Cli {
    /// Path to the JSON document describing the tree to mount.
    pub document: PathBuf,

    /// Directory to mount the synthesized filesystem at.
    pub mountpoint: PathBuf,

    #[arg(long, value_enum, default_value = "INFO")]
    pub log_level: LogLevel,

    #[arg(long)]
    pub log_to_syslog: bool,

    /// Minimum seconds between admitted operations. 0 disables rate limiting.
    #[arg(long, default_value_t = 0.0)]
    pub rate_limit: f64,

    /// Maximum operations admitted per one-second window. 0 disables the cap.
    #[arg(long, default_value_t = 0)]
    pub iop_limit: u32,

    #[arg(long)]
    pub report_stats: bool,

    #[arg(long, default_value = DEFAULT_BLOCK_SIZE)]
    pub block_size: String,

    #[arg(long, default_value_t = DEFAULT_PRE_GENERATED_BLOCKS)]
    pub pre_generated_blocks: usize,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u32,

    /// Single character used to fill every byte of every file, in fill mode.
    #[arg(long, conflicts_with = "semi_random")]
    pub fill_char: Option<String>,

    /// Use the deterministic block cache instead of a constant fill byte.
    #[arg(long)]
    pub semi_random: bool,

    #[arg(long)]
    pub no_macos_cache_files: bool,

    #[arg(long)]
    pub ignore_appledouble: bool,

    #[arg(long, default_value_t = 0)]
    pub uid: u32,

    #[arg(long, default_value_t = 0)]
    pub gid: u32,

    /// Uniform modification time, as `YYYY-MM-DD` or a Unix epoch integer.
    #[arg(long, default_value = DEFAULT_MTIME)]
    pub mtime: String,

    #[arg(long, value_enum, default_value = "NFD")]
    pub unicode_normalization: NormalizationForm,
}

/// Content-synthesis mode selected by `--fill-char` / `--semi-random`.
#[derive(Debug, Clone)]
pub enum ContentMode {
    Fill(u8),
    SemiRandom,
}

/// Fully validated, ready-to-use configuration derived from [`Cli`].
#[derive(Debug, Clone)]
pub struct Config {
    pub document: PathBuf,
    pub mountpoint: PathBuf,
    pub log_level: LogLevel,
    pub log_to_syslog: bool,
    pub rate_limit_seconds: f64,
    pub iop_limit: u32,
    pub report_stats: bool,
    pub block_size: u64,
    pub pre_generated_blocks: usize,
    pub seed: u32,
    pub content_mode: ContentMode,
    pub include_cache_files: bool,
    pub ignore_appledouble: bool,
    pub uid: u32,
    pub gid: u32,
    pub mtime: SystemTime,
    pub unicode_normalization: NormalizationForm,
}

impl Config {
    /// Validates and resolves a parsed [`Cli`] into a [`Config`]. Every
    /// failure here is a semantically invalid value `clap` could not itself
    /// range-check, so all of them become `Error::InvalidConfig`.
    pub fn from_cli(cli: Cli) -> Result<Self, Error> {
        let block_size = parse_size(&cli.block_size)?;

        let content_mode = if cli.semi_random {
            ContentMode::SemiRandom
        } else {
            let raw = cli.fill_char.as_deref().unwrap_or("\0");
            let mut chars = raw.chars();
            let first = chars.next().unwrap_or('\0');
            if chars.next().is_some() || !first.is_ascii() {
                return Err(Error::InvalidConfig(format!(
                    "--fill-char must be exactly one ASCII character, got {raw:?}"
                )));
            }
            ContentMode::Fill(first as u8)
        };

        let mtime = parse_mtime(&cli.mtime)?;

        Ok(Config {
            document: cli.document,
            mountpoint: cli.mountpoint,
            log_level: cli.log_level,
            log_to_syslog: cli.log_to_syslog,
            rate_limit_seconds: cli.rate_limit,
            iop_limit: cli.iop_limit,
            report_stats: cli.report_stats,
            block_size,
            pre_generated_blocks: cli.pre_generated_blocks,
            seed: cli.seed,
            content_mode,
            include_cache_files: !cli.no_macos_cache_files,
            ignore_appledouble: cli.ignore_appledouble,
            uid: cli.uid,
            gid: cli.gid,
            mtime,
            unicode_normalization: cli.unicode_normalization,
        })
    }
}

/// Parses `--mtime` as either `YYYY-MM-DD` or a raw Unix epoch integer.
fn parse_mtime(raw: &str) -> Result<SystemTime, Error> {
    let raw = raw.trim();

    if let Ok(epoch) = raw.parse::<u64>() {
        return Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(epoch));
    }

    let parts: Vec<&str> = raw.split('-').collect();
    let [y, m, d] = parts[..] else {
        return Err(Error::InvalidConfig(format!("invalid --mtime: {raw:?}")));
    };
    let (y, m, d): (i64, u32, u32) = (
        y.parse().map_err(|_| Error::InvalidConfig(format!("invalid --mtime year: {raw:?}")))?,
        m.parse().map_err(|_| Error::InvalidConfig(format!("invalid --mtime month: {raw:?}")))?,
        d.parse().map_err(|_| Error::InvalidConfig(format!("invalid --mtime day: {raw:?}")))?,
    );
    let epoch_days = days_from_civil(y, m, d)
        .ok_or_else(|| Error::InvalidConfig(format!("invalid --mtime date: {raw:?}")))?;
    Ok(SystemTime::UNIX_EPOCH + Duration::from_secs((epoch_days as u64) * 86_400))
}

/// Howard Hinnant's civil-from-days algorithm, inverted: days since the
/// epoch for a given proleptic-Gregorian `(year, month, day)`. Avoids
/// pulling in a full calendar crate for a single CLI default conversion.
fn days_from_civil(y: i64, m: u32, d: u32) -> Option<i64> {
    if !(1..=12).contains(&m) || !(1..=31).contains(&d) {
        return None;
    }
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (m as i64 + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    Some(era * 146_097 + doe - 719_468)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            document: PathBuf::from("doc.json"),
            mountpoint: PathBuf::from("/mnt"),
            log_level: LogLevel::Info,
            log_to_syslog: false,
            rate_limit: 0.0,
            iop_limit: 0,
            report_stats: false,
            block_size: DEFAULT_BLOCK_SIZE.to_string(),
            pre_generated_blocks: DEFAULT_PRE_GENERATED_BLOCKS,
            seed: DEFAULT_SEED,
            fill_char: None,
            semi_random: false,
            no_macos_cache_files: false,
            ignore_appledouble: false,
            uid: 0,
            gid: 0,
            mtime: DEFAULT_MTIME.to_string(),
            unicode_normalization: NormalizationForm::Nfd,
        }
    }

    #[test]
    fn default_fill_char_is_nul_byte() {
        let config = Config::from_cli(base_cli()).unwrap();
        assert!(matches!(config.content_mode, ContentMode::Fill(0)));
    }

    #[test]
    fn rejects_multi_character_fill_char() {
        let mut cli = base_cli();
        cli.fill_char = Some("AB".to_string());
        let err = Config::from_cli(cli).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn semi_random_ignores_fill_char() {
        let mut cli = base_cli();
        cli.semi_random = true;
        let config = Config::from_cli(cli).unwrap();
        assert!(matches!(config.content_mode, ContentMode::SemiRandom));
    }

    #[test]
    fn parses_default_mtime() {
        let config = Config::from_cli(base_cli()).unwrap();
        let expected = SystemTime::UNIX_EPOCH + Duration::from_secs(1_508_198_400);
        assert_eq!(config.mtime, expected);
    }

    #[test]
    fn parses_epoch_mtime() {
        let mut cli = base_cli();
        cli.mtime = "1000".to_string();
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.mtime, SystemTime::UNIX_EPOCH + Duration::from_secs(1000));
    }

    #[test]
    fn rejects_malformed_mtime() {
        let mut cli = base_cli();
        cli.mtime = "not-a-date".to_string();
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn block_size_is_parsed_through_size_module() {
        let config = Config::from_cli(base_cli()).unwrap();
        assert_eq!(config.block_size, 128 * 1024);
    }
}
