pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use config::{AppConfig, Environment, VideoConfig};
pub use error::{ClassifiedError, ErrorKind, TransportError};
pub use session::{Job, JobSession, SessionPhase, SessionState};
pub use transport::{HttpTransport, JobStatus, JobTransport, MediaSource, StatusResponse};

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over the environment's default level.
pub fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.environment.default_log_filter()));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_err()
    {
        eprintln!("Tracing subscriber already installed");
    }
}
