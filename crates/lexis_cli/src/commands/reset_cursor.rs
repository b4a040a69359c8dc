//! Reset-cursor command implementation.

use super::{CommandResult, Context};
use lexis_storage::CursorStore;

/// Runs the reset-cursor command.
pub fn run(ctx: &Context) -> CommandResult<()> {
    ctx.store().reset_cursors()?;
    println!("pull cursors reset; the next pull starts from the beginning");
    Ok(())
}
