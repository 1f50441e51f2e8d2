pub mod catalog;
pub mod service;
pub mod session;
pub mod site;

pub use catalog::*;
pub use service::*;
pub use session::*;
pub use site::*;
