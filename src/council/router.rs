//! Turn Router
//!
//! Pure state inspection. No model calls happen here.

use crate::types::{SessionState, Stage};

/// The stage that should handle the next message for this session
pub fn route(state: &SessionState) -> Stage {
    state.phase().stage()
}
