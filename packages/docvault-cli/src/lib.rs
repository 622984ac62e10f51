//! # docvault-cli
//!
//! Automation front-end for the revision store. Every library operation is
//! reachable as a subcommand:
//!
//! ```bash
//! docvault import --kind print --machine 7 drawing.pdf --notes "rev B"
//! docvault history --kind print --machine 7 --name drawing
//! docvault rollback --kind print --machine 7 --name drawing --revision 12
//! docvault doc import --line L1 --machine M20 --type manual Spindle_Manual.pdf
//! docvault inspect --json
//! ```
//!
//! Handlers return an exit code: `0` success, `2` when a check found a
//! problem (`verify`, `inspect`). Errors bubble up as `anyhow::Error`.

pub mod docs;
pub mod files;
pub mod render;
pub mod session;

/// Exit code for checks that ran but found a problem
pub const EXIT_CHECK_FAILED: u8 = 2;
