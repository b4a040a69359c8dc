//! Push, pull and sync command implementations.

use super::{CommandResult, Context};

/// Runs one push job.
pub async fn push(ctx: &Context) -> CommandResult<()> {
    let coordinator = ctx.coordinator()?;
    let event = coordinator.start_push().wait().await;
    ctx.report_run(&event)
}

/// Runs one pull job.
pub async fn pull(ctx: &Context) -> CommandResult<()> {
    let coordinator = ctx.coordinator()?;
    let event = coordinator.start_pull().wait().await;
    ctx.report_run(&event)
}

/// Pushes local changes, then pulls remote ones.
pub async fn sync(ctx: &Context) -> CommandResult<()> {
    let coordinator = ctx.coordinator()?;
    let (pushed, pulled) = coordinator.sync_now().await;
    let pushed = ctx.report_run(&pushed);
    let pulled = ctx.report_run(&pulled);
    coordinator.shutdown().await;
    pushed.and(pulled)
}
