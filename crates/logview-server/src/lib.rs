//! logview-server — HTTP surface for logview.
//!
//! ```text
//! Registry ──instances()──► [ActiveBackend] ──► routes::router ──► axum::serve
//!    ▲
//!    └── registry::builtin(ServerSettings): dirfiles, docker, systemd
//! ```

pub mod error;
pub mod registry;
pub mod routes;
pub mod server;
pub mod settings;

pub use error::ApiError;
pub use registry::{ActiveBackend, Registry, RegistryError};
pub use routes::router;
pub use server::serve;
pub use settings::ServerSettings;
