//! Read-only client for the cluster REST API.
//!
//! ```rust,no_run
//! use iris::credentials::CredentialStore;
//! use iris::session::{AuthOptions, Session};
//! use iris::{versions, walker};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = CredentialStore::from_env()?;
//!     let mut session = Session::new()?;
//!     let outcome = session.authenticate(&AuthOptions::direct("mycluster", "admin", "local"), &store);
//!     if !outcome.is_connected() {
//!         return Ok(());
//!     }
//!
//!     let doc = versions::select_document(versions::search(&session, "vm1")?, "vm1", "Nightly")?;
//!     let snapshots = doc.snapshots();
//!     let mut paths: Vec<String> = Vec::new();
//!     walker::walk_snapshot(&session, versions::latest(&snapshots)?, &mut paths)?;
//!     Ok(())
//! }
//! ```

pub mod credentials;
pub mod date;
pub mod display;
pub mod error;
pub mod request;
pub mod session;
pub mod transport;
pub mod versions;
pub mod walker;

pub use request::ApiResponse;
pub use session::{AuthOptions, AuthOutcome, ClusterRef, Mode, Session};
pub use transport::{Method, ReqwestTransport, Transport};
#[cfg(any(test, feature = "testing"))]
pub use transport::ScriptedTransport;
