pub mod config;
pub mod session;
pub mod view;

#[cfg(test)]
mod testing;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use session::{Session, UserDirectory};
pub use view::ChannelView;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used. Calling
/// this twice is harmless, the second subscriber is simply not installed.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Tracing initialised");
    }
}
