//! File-backed payment flow log.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::ports::{PaymentFlowEvent, PaymentFlowLog};

/// Appends one line per event to a file and mirrors it to tracing.
///
/// Appends are serialised by a mutex so concurrent callbacks never interleave
/// partial lines. The first I/O failure switches the sink to tracing-only.
pub struct FilePaymentFlowLog {
    path: PathBuf,
    file_enabled: AtomicBool,
    write_lock: Mutex<()>,
}

impl FilePaymentFlowLog {
    /// Creates the log, making parent directories as needed.
    ///
    /// Never fails: if the directory cannot be created the sink starts in
    /// tracing-only mode.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_enabled = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => match fs::create_dir_all(parent) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Unable to prepare payment flow log directory; file logging disabled"
                    );
                    false
                }
            },
            None => true,
        };

        Self {
            path,
            file_enabled: AtomicBool::new(file_enabled),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_file_enabled(&self) -> bool {
        self.file_enabled.load(Ordering::Relaxed)
    }

    fn append(&self, line: &str) {
        if !self.is_file_enabled() {
            return;
        }
        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", line));

        if let Err(e) = result {
            self.file_enabled.store(false, Ordering::Relaxed);
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to write payment flow log; file logging disabled"
            );
        }
    }
}

impl PaymentFlowLog for FilePaymentFlowLog {
    fn log(&self, event: PaymentFlowEvent) {
        let line = event.to_line();
        tracing::info!("PaymentFlow | {}", line);
        self.append(&line);
    }
}
