#![allow(dead_code)]

use std::time::Duration;

/// Long enough that a test only ever hits it when something is wrong.
pub const GENEROUS: Duration = Duration::from_secs(10);

pub fn trace_init() {
    use tracing_subscriber::filter::{EnvFilter, LevelFilter};
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_thread_names(true)
        .try_init();
}
