use std::fs::File;

use anyhow::Context;
use time::{format_description::parse_borrowed, OffsetDateTime};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

/// Send the referee's own traces to a timestamped file in the working directory.
///
/// Fails if another global subscriber is already installed.
pub fn init_logger() -> anyhow::Result<()> {
    let file_name = get_log_file_name()?;
    let file = File::create(&file_name)
        .with_context(|| format!("could not create log file '{file_name}'"))?;
    let writer = BoxMakeWriter::new(file);
    let local_offset =
        time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        parse_borrowed::<2>("[year]-[month]-[day] [hour]:[minute]:[second]")
            .context("invalid timer format")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    set_global_default(subscriber).context(
        "could not set global default tracing subscriber. Consider disabling logs if you are already setting a subscriber",
    )
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = parse_borrowed::<2>("[year]-[month]-[day]_[hour]:[minute]:[second]_referee.log")
        .context("invalid log file name format")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).context("could not format log file name")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_name_is_timestamped() {
        let name = get_log_file_name().unwrap();
        assert!(name.ends_with("_referee.log"), "{name}");
        // 2025-01-31_12:00:00_referee.log
        assert_eq!(name.len(), "2025-01-31_12:00:00_referee.log".len());
        assert_eq!(name.as_bytes()[10], b'_');
    }
}
