use std::path::Path;

use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};

pub const LOG_FILE_PREFIX: &str = "crynux-chat";
pub const LOG_FILE_SUFFIX: &str = "log";

/// Rotated files kept on disk, oldest deleted first.
pub const MAX_LOG_FILES: usize = 5;

/// Daily-rotated `crynux-chat.<date>.log` under `dir`, created if missing.
pub fn file_appender(dir: &Path) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
}
