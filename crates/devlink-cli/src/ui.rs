//! UI utilities for Devlink CLI.

use std::time::Duration;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Width of the progress bar drawn by [`progress_bar`], brackets excluded.
pub const BAR_WIDTH: usize = 24;

fn scale(value: f64) -> (f64, &'static str) {
    let mut value = value;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    (value, SIZE_UNITS[unit])
}

/// Two decimals at most, trailing zeros dropped.
fn trim_decimals(value: f64) -> String {
    let formatted = format!("{:.2}", value);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Format a byte count as "1.5 KB", "12 MB" and so on.
pub fn format_size(bytes: u64) -> String {
    let (value, unit) = scale(bytes as f64);
    format!("{} {}", trim_decimals(value), unit)
}

/// Format a transfer rate in bytes per second.
pub fn format_speed(bytes_per_sec: f64) -> String {
    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return "0 B/s".to_string();
    }
    let (value, unit) = scale(bytes_per_sec);
    format!("{} {}/s", trim_decimals(value), unit)
}

/// Format an estimated time remaining.
///
/// Unknown or zero estimates read "Calculating...".
pub fn format_eta(remaining: Option<Duration>) -> String {
    let Some(remaining) = remaining.filter(|d| !d.is_zero()) else {
        return "Calculating...".to_string();
    };

    let secs = remaining.as_secs_f64();
    if secs < 60.0 {
        format!("{}s", secs.round())
    } else if secs < 3600.0 {
        format!("{}m {}s", (secs / 60.0).floor(), (secs % 60.0).round())
    } else {
        let whole = remaining.as_secs();
        format!("{}h {}m", whole / 3600, (whole % 3600) / 60)
    }
}

/// Draw a fixed-width bar for a 0-100 percentage.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn progress_bar(percent: f64) -> String {
    let percent = if percent.is_finite() {
        percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let filled = (percent / 100.0 * BAR_WIDTH as f64) as usize;
    format!(
        "[{}{}]",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}

/// Short tag for a listing entry, from its kind.
pub fn kind_icon(kind: &str, is_directory: bool) -> &'static str {
    if is_directory {
        return "[dir]";
    }
    match kind {
        "image" | "jpg" | "jpeg" | "png" | "gif" | "webp" | "svg" => "[img]",
        "video" | "mp4" | "mov" | "mkv" | "webm" => "[vid]",
        "audio" | "mp3" | "wav" | "flac" | "ogg" => "[aud]",
        "txt" | "md" | "doc" | "docx" | "pdf" => "[txt]",
        "zip" | "rar" | "7z" | "tar" | "gz" => "[zip]",
        "js" | "ts" | "rs" | "py" | "html" | "css" | "json" => "[src]",
        _ => "[file]",
    }
}
