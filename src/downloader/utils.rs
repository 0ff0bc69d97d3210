// Helper functions shared across the download pipeline

use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};

/// Run a command and collect its output, killing it on timeout.
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, String> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to start {}: {}", program, e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| format!("Failed to capture stdout from {}", program))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| format!("Failed to capture stderr from {}", program))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stdout: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stderr: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });

    let waited = timeout(TokioDuration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res.map_err(|e| format!("Failed to wait for {}: {}", program, e))?;
            let stdout = stdout_task
                .await
                .map_err(|e| format!("stdout task failed: {}", e))??;
            let stderr = stderr_task
                .await
                .map_err(|e| format!("stderr task failed: {}", e))??;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(format!("Timed out after {}s", timeout_secs))
        }
    }
}

/// Check a URL against the configured domain allow-list.
///
/// Coarse substring containment by design: no scheme or host parsing is
/// performed, so a token embedded anywhere in the URL matches. Runs before
/// any network activity.
pub fn is_allowed_domain(url: &str, allowed_domains: &[String]) -> bool {
    allowed_domains.iter().any(|domain| {
        let domain = domain.trim();
        !domain.is_empty() && url.contains(domain)
    })
}

/// Truncate a filename to `max_length` characters, preserving the extension.
///
/// Counts Unicode characters, not bytes, so multi-byte titles are never cut
/// mid-character. Extension preservation is abandoned only when the
/// extension alone fills the whole budget.
pub fn truncate_filename(filename: &str, max_length: usize) -> String {
    if filename.chars().count() <= max_length {
        return filename.to_string();
    }

    let last_dot = match filename.rfind('.') {
        Some(idx) => idx,
        // No extension, just truncate
        None => return filename.chars().take(max_length).collect(),
    };

    let ext = &filename[last_dot..];
    let ext_len = ext.chars().count();
    if ext_len >= max_length {
        // Extension is too long, just truncate everything
        return filename.chars().take(max_length).collect();
    }

    let base: String = filename[..last_dot]
        .chars()
        .take(max_length - ext_len)
        .collect();
    format!("{}{}", base, ext)
}

/// Produce the final on-disk name: truncate to the configured bound and
/// append the quality label as `_{label}` before the extension.
///
/// The truncation budget is pre-reduced by the label's length so the final
/// name never exceeds `max_length`, label included. Empty and "Unknown"
/// labels are ignored.
pub fn sanitize_filename(filename: &str, max_length: usize, quality: Option<&str>) -> String {
    let suffix = match quality {
        Some(q) if !q.is_empty() && q != "Unknown" => format!("_{}", q),
        _ => return truncate_filename(filename, max_length),
    };

    let budget = max_length.saturating_sub(suffix.chars().count());
    let truncated = truncate_filename(filename, budget);

    match truncated.rfind('.') {
        Some(idx) => format!("{}{}{}", &truncated[..idx], suffix, &truncated[idx..]),
        None => format!("{}{}", truncated, suffix),
    }
}
