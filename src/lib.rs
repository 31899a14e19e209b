pub mod config;
pub mod error;
pub mod input_loader;
pub mod session;
pub mod form;
pub mod extractor;
pub mod property;
pub mod output;
pub mod orchestrator;
pub mod delay_manager;
pub mod logger;

// Exporting types for convenience
pub use config::{AmbiguityPolicy, ClientConfig, RunConfig};
pub use error::{ExtractionError, FetchError, FetchErrorKind, RunError, SetupError};
pub use extractor::Extractor;
pub use orchestrator::{Orchestrator, RunSummary};
pub use property::{PropertyRecord, Status};
pub use session::{HttpTransport, SessionClient, Transport};
