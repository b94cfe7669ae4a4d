mod manager;
mod multiplexer;

pub use manager::{SessionManager, WaitOutcome};
pub use multiplexer::{Multiplexer, Screen};

use crate::config::ServerKind;

/// Every session this tool manages carries this prefix, so a `screen -ls`
/// line can be attributed to us.
pub const SESSION_PREFIX: &str = "mineworker";

pub fn session_name(kind: ServerKind) -> String {
    format!("{SESSION_PREFIX}_{kind}")
}
