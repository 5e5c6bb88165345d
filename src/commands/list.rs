use std::sync::Arc;

use anyhow::Result;

use crate::cli::GlobalOpts;
use crate::logging::{Log as _, Logger};

use super::CommandSetup;

/// Run the list command, printing stored snapshots oldest first.
///
/// # Errors
///
/// Returns an error if the storage backend cannot be enumerated.
pub fn run(global: &GlobalOpts, log: &Arc<Logger>) -> Result<i32> {
    let setup = CommandSetup::init(global, log)?;
    let backend = setup.open_storage()?;

    let locations = backend.list()?;
    if locations.is_empty() {
        log.info(&format!(
            "no snapshots in {}",
            setup.config.storage_location.display()
        ));
        return Ok(0);
    }
    for location in locations {
        println!("{location}");
    }
    Ok(0)
}
