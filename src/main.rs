use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use fuser::MountOption;

use phantomfs::block_cache::BlockCache;
use phantomfs::cli::{Cli, Config, ContentMode};
use phantomfs::error::{Error, EXIT_CLI_MISUSE};
use phantomfs::fs::PhantomFs;
use phantomfs::limiter::Limiter;
use phantomfs::logging;
use phantomfs::path::Sanitizer;
use phantomfs::size::humanize_bytes;
use phantomfs::stats::{Counters, StatsReporter};
use phantomfs::synth::{ContentSynthesizer, FillSynth, SemiRandomSynth};
use phantomfs::tree::load_document;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::from_cli(cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(EXIT_CLI_MISUSE as u8);
        }
    };

    logging::init(config.log_level, config.log_to_syslog);

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(config: Config) -> Result<(), Error> {
    let bytes = fs::read(&config.document)
        .map_err(|e| Error::InvalidDocument(format!("{}: {e}", config.document.display())))?;

    let (index, report) = load_document(
        &bytes,
        config.unicode_normalization,
        config.include_cache_files,
        config.uid,
        config.gid,
        config.mtime,
    )?;
    tracing::info!(
        total_files = report.total_files,
        total_bytes = report.total_bytes,
        "loaded document: {} files, {}",
        report.total_files,
        humanize_bytes(report.total_bytes)
    );

    let synth = match config.content_mode {
        ContentMode::Fill(byte) => ContentSynthesizer::Fill(FillSynth::new(byte)),
        ContentMode::SemiRandom => {
            let block_cache = Arc::new(BlockCache::generate(
                config.seed,
                config.pre_generated_blocks,
                config.block_size as usize,
            ));
            ContentSynthesizer::SemiRandom(SemiRandomSynth::new(block_cache))
        }
    };

    let sanitizer = Arc::new(Sanitizer::new(config.unicode_normalization));
    let limiter = Arc::new(Limiter::new(config.rate_limit_seconds, config.iop_limit));
    let counters = Arc::new(Counters::default());

    let reporter = if config.report_stats {
        Some(StatsReporter::spawn(Arc::clone(&counters)))
    } else {
        None
    };

    let filesystem = PhantomFs::new(
        Arc::new(index),
        Arc::new(synth),
        sanitizer,
        limiter,
        counters,
        config.ignore_appledouble,
    );

    let options = vec![
        MountOption::RO,
        MountOption::FSName("phantomfs".to_string()),
        MountOption::AutoUnmount,
    ];

    tracing::info!(mountpoint = %config.mountpoint.display(), "mounting");
    let result = fuser::mount2(filesystem, &config.mountpoint, &options)
        .map_err(|e| Error::MountError(e.to_string()));

    if let Some(reporter) = reporter {
        reporter.stop();
    }

    result
}
