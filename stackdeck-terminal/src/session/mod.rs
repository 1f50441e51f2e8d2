//! Session model and registry

mod registry;
#[allow(clippy::module_inception)]
mod session;

pub use registry::SessionRegistry;
pub use session::{OpenRequest, Session, SessionState};
