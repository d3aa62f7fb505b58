use anyhow::Result;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;

/// Installs the stderr subscriber. Warnings (anchor misses, skipped fonts)
/// are always shown; `verbose` adds progress and per-anchor detail.
pub fn init(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let _ = fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .with_level(true)
        .without_time()
        .try_init();
    Ok(())
}
