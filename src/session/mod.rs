//! Generation session management

mod registry;

pub use registry::{SessionRegistry, SessionState};
