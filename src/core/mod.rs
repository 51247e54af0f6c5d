pub mod config;
pub mod driver;
pub mod form;
pub mod session;

pub use config::{ArtifactConfig, ChromeConfig, Config, SessionConfig};
pub use driver::{share, Driver, HttpAware, Interactive, ProfileAware, Visual};
pub use form::{EntryState, FieldEntry, Fingerprint, FormState};
pub use session::{SessionCache, SessionState};
