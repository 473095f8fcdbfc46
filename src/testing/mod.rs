//! In-memory stand-ins for the management plane, the HTTP transport and the
//! timer. Used by the test suites and by dry-run mode.

pub mod management;
pub mod sleeper;
pub mod transport;

pub use management::InMemoryManagementClient;
pub use sleeper::RecordingSleeper;
pub use transport::{InMemoryTransport, ScriptedTransport};
