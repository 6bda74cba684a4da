use std::time::Duration;

use anyhow::anyhow;

/// Format a duration as a PBS walltime string, e.g. 01:05:02.
/// Hours are not wrapped at 24; PBS accepts values like 120:00:00.
pub fn format_walltime(duration: &Duration) -> String {
    let mut seconds = duration.as_secs();
    let hours = seconds / 3600;
    seconds %= 3600;
    let minutes = seconds / 60;
    seconds %= 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Parses time strings in the format [[hh:]mm:]ss.
/// Individual time values may be zero padded.
pub fn parse_hms_time(input: &str) -> anyhow::Result<Duration> {
    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() > 3
        || parts
            .iter()
            .any(|part| part.is_empty() || !part.bytes().all(|c| c.is_ascii_digit()))
    {
        return Err(anyhow!("Expected a [[HH:]MM:]SS value, got {input:?}"));
    }

    let mut seconds: u64 = 0;
    for part in parts {
        seconds = seconds * 60 + part.parse::<u64>()?;
    }
    Ok(Duration::from_secs(seconds))
}

/// Parses a walltime in either `HH:MM:SS` or humantime format (2hours).
pub fn parse_walltime(text: &str) -> anyhow::Result<Duration> {
    parse_hms_time(text)
        .or_else(|_| humantime::parse_duration(text))
        .map_err(|e| {
            anyhow!("Could not parse walltime. Use either `HH:MM:SS` or humantime format (2hours): {e:?}")
        })
}
