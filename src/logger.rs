use std::fs::File;
use std::io;
use std::path::Path;

use time::{format_description, OffsetDateTime, UtcOffset};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

/// Initialize the global tracing subscriber. Will panic on error.
///
/// With a log directory, full-detail logs go to a timestamped file in
/// it; otherwise INFO-and-up goes to stderr (stdout stays reserved for
/// the results tables).
pub fn init_logger(log_dir: Option<&Path>) {
    let local_offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]").unwrap(),
    );

    let (writer, max_level) = match log_dir {
        Some(dir) => {
            let file = File::create(dir.join(get_log_file_name())).unwrap();
            (BoxMakeWriter::new(file), Level::TRACE)
        }
        None => (BoxMakeWriter::new(io::stderr), Level::INFO),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level)
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    let _ = set_global_default(subscriber);
}

fn get_log_file_name() -> String {
    let format = format_description::parse("[year]-[month]-[day]_[hour]:[minute]:[second]_log.txt")
        .unwrap();
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).unwrap()
}
