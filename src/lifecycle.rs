use std::future::Future;

use propagation_kernel::{settings::Settings, InitCtx, ModuleRegistry};

/// Drive the registry through init, start and `serve`, then stop every
/// module whatever happened before.
///
/// The first failure is returned. A stop failure after an earlier one is
/// only logged.
pub async fn run<F>(registry: &ModuleRegistry, settings: &Settings, serve: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let ctx = InitCtx { settings };

    let outcome = match boot(registry, &ctx).await {
        Ok(()) => serve.await,
        Err(err) => Err(err),
    };

    // Flush spans even when startup or the server failed.
    let stopped = registry.stop_all().await;

    match (outcome, stopped) {
        (Err(err), Err(stop_err)) => {
            tracing::error!(error = ?stop_err, "shutdown failed after an earlier error");
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
        (Ok(()), stopped) => stopped,
    }
}

async fn boot(registry: &ModuleRegistry, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
    registry.init_all(ctx).await?;
    registry.start_all(ctx).await
}
