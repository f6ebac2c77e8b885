//! Caller identity
//!
//! Login and session storage belong to the host application. The services
//! only need to know who is calling and which listings the current browser
//! session has already viewed.

pub mod session;

pub use session::{Principal, ViewerSession};
