//! Output formatting utilities

use console::{style, Style};
use dropship_core::DistributionResult;
use dropship_stores::UploadReleaseResult;

use crate::cli::OutputFormat;

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", style("→").blue(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Create a styled key-value line
pub fn key_value(key: &str, value: &str) -> String {
    format!("  {}: {}", style(key).dim(), value)
}

/// Style for paths
pub fn path_style() -> Style {
    Style::new().cyan()
}

/// Style for links
pub fn url_style() -> Style {
    Style::new().cyan().underlined()
}

/// Print a distribution result in the requested format
///
/// JSON output is the backend's response as received; text output is the
/// typed view.
pub fn print_result(
    result: &DistributionResult,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(result.raw_json())?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    success(&format!("Delivered via {}", result.service()));
    println!();
    for line in result_lines(result)? {
        println!("{}", line);
    }
    Ok(())
}

/// Text lines describing a result
pub fn result_lines(result: &DistributionResult) -> anyhow::Result<Vec<String>> {
    let mut lines = Vec::new();

    match result {
        DistributionResult::DeployGate(r) => {
            let upload = r.typed();
            lines.push(header(&format!("{} ({})", upload.name, upload.package_name)));
            lines.push(key_value(
                "Version",
                &format!("{} ({})", upload.version_name, upload.version_code),
            ));
            lines.push(key_value("Revision", &upload.revision.to_string()));
            lines.push(key_value("Platform", &upload.os_name));
            lines.push(key_value("Uploaded by", &upload.user.name));
            if let Some(message) = &upload.message {
                lines.push(key_value("Message", message));
            }
            lines.push(key_value("Download", &url_style().apply_to(&upload.file).to_string()));
            if let Some(distribution) = &upload.distribution {
                lines.push(key_value("Distribution", &distribution.title));
                lines.push(key_value(
                    "Distribution page",
                    &url_style().apply_to(&distribution.url).to_string(),
                ));
            }
        }
        DistributionResult::Firebase(r) => {
            let release = r.typed();
            let result_text = match release.result {
                UploadReleaseResult::ReleaseUnmodified => {
                    style(release.result.to_string()).yellow().to_string()
                }
                _ => style(release.result.to_string()).green().to_string(),
            };
            lines.push(header(&release.name));
            lines.push(key_value("Result", &result_text));
            lines.push(key_value(
                "Version",
                &format!("{} ({})", release.display_version, release.build_version),
            ));
            if let Some(notes) = &release.release_notes {
                lines.push(key_value("Release notes", notes));
            }
            if let Some(created) = &release.create_time {
                lines.push(key_value("Created", &created.to_rfc3339()));
            }
            for (label, uri) in [
                ("Console", &release.firebase_console_uri),
                ("Testing", &release.testing_uri),
            ] {
                if let Some(uri) = uri {
                    lines.push(key_value(label, &url_style().apply_to(uri).to_string()));
                }
            }
        }
        DistributionResult::TestFlight(r) => {
            let upload = r.typed();
            lines.push(key_value(
                "Status",
                upload.success_message.as_deref().unwrap_or("Upload accepted"),
            ));
            if let Some(uuid) = &upload.delivery_uuid {
                lines.push(key_value("Delivery UUID", uuid));
            }
            if let Some(version) = &upload.tool_version {
                lines.push(key_value("Transporter", version));
            }
        }
        DistributionResult::Custom(r) => {
            for line in serde_json::to_string_pretty(r.typed())?.lines() {
                lines.push(format!("  {}", line));
            }
        }
        DistributionResult::Local(r) => {
            let local = r.typed();
            lines.push(key_value("Action", &local.side_effect.to_string()));
            lines.push(key_value(
                "Destination",
                &path_style()
                    .apply_to(local.destination_path.display())
                    .to_string(),
            ));
            if let Some(mode) = &local.file_mode {
                lines.push(key_value("Mode", mode));
            }
        }
    }

    Ok(lines)
}
