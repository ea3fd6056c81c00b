//! Host hooks for worker diagnostics and fatal crashes.

/// Receives free-form diagnostic output. Must not fail.
pub trait DiagnosticSink {
    /// Records `args` under `tag`.
    fn log(&self, tag: &str, args: &[String]);
}

impl<F: Fn(&str, &[String])> DiagnosticSink for F {
    fn log(&self, tag: &str, args: &[String]) {
        self(tag, args)
    }
}

/// Forwards diagnostics to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn log(&self, tag: &str, args: &[String]) {
        tracing::info!("{tag} {}", args.join(" "));
    }
}

/// Receives the description of a fatal, unrecoverable fault.
///
/// The host is expected to terminate or fully restart the application; the
/// client stays crashed either way.
pub trait CrashHandler {
    /// Handles the crash.
    fn crash(&self, description: &str);
}

impl<F: Fn(&str)> CrashHandler for F {
    fn crash(&self, description: &str) {
        self(description)
    }
}

/// Logs the crash at error level and leaves the process running.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrashHandler;

impl CrashHandler for LogCrashHandler {
    fn crash(&self, description: &str) {
        tracing::error!("{description}");
    }
}
