//! Native dialogs used when paths are missing from the configuration and
//! to confirm the compiled table.

pub mod dialogs;
