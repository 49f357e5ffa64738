pub use tracing::{self, debug, error, info, instrument, trace, warn};
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Sets up logging for any crate in the workspace, aborting the process on panic
pub fn setup_log() {
    std::panic::set_hook(Box::new(|info| {
        error!(target: "veilnet", "Panic occurred: {}", info);
        std::process::exit(1);
    }));

    setup_log_no_panic_hook()
}

/// Sets up logging without touching the panic hook. Safe to call repeatedly;
/// only the first subscriber wins.
pub fn setup_log_no_panic_hook() {
    let _ = SubscriberBuilder::default()
        .with_line_number(true)
        .with_file(true)
        .with_env_filter(EnvFilter::from_default_env())
        .finish()
        .try_init();
}
