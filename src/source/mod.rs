//! Session input for the activity classifier.
//!
//! This module turns recorded sessions (one CSV file per sensor group) into
//! row-aligned [`SessionTable`]s for the windower.

pub mod loader;
pub mod types;

// Re-export commonly used types
pub use loader::{discover_sessions, load_session, load_stream, session_id, SourceLayout};
pub use types::{Axis, SensorGroup, SensorSample, SensorStream, SessionTable, AXES_PER_GROUP};
