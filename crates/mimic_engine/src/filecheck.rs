//! File-content triggers: crash-if-file and error-if-file.
//!
//! Read failures are fail-safe: the trigger is skipped with a log line.
//! A crash match is fatal and takes the whole process down, which is the
//! point; the orchestrator owns recovery.

use behavior_dsl::{CrashFile, ErrorFile};

/// Exit code used when a crash trigger fires.
const CRASH_EXIT_CODE: i32 = 3;

/// Scans the crash trigger's file and aborts the process on a match.
pub async fn crash_check(check: &CrashFile) {
    let Some(content) = read_target(&check.path).await else {
        return;
    };
    if let Some(needle) = first_match(&content, &check.needles) {
        tracing::error!(
            path = %check.path,
            needle = %needle,
            "fatal: forbidden content found, aborting process"
        );
        std::process::exit(CRASH_EXIT_CODE);
    }
}

/// Scans the error trigger's file; a match yields the configured status
/// and a descriptive body.
pub async fn error_check(check: &ErrorFile) -> Option<(u16, String)> {
    let content = read_target(&check.path).await?;
    let needle = first_match(&content, &check.needles)?;
    Some((
        check.code,
        format!("file {} contains forbidden content '{needle}'", check.path),
    ))
}

async fn read_target(path: &str) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::debug!(path = %path, error = %e, "file trigger skipped");
            None
        }
    }
}

fn first_match<'a>(content: &str, needles: &'a [String]) -> Option<&'a str> {
    needles
        .iter()
        .find(|needle| content.contains(needle.as_str()))
        .map(String::as_str)
}
