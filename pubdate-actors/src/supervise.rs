use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast;

const FIRST_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Run a fallible unit repeatedly until shutdown, with exponential backoff.
///
/// `Ok` from the unit is a clean stop; `Err` restarts it after a pause that
/// doubles up to 30 seconds.
pub async fn supervise<F, Fut>(
    name: &'static str,
    mut run_once: F,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let mut backoff = FIRST_BACKOFF;
    loop {
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            res = run_once() => {
                match res {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        tracing::warn!(unit = name, error = ?e, backoff_ms = backoff.as_millis() as u64, "supervise.unit.restart");
                        tokio::select! {
                            _ = shutdown.recv() => return Ok(()),
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn crashed_units_are_restarted() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = broadcast::channel(1);
        let counter = runs.clone();
        supervise(
            "flaky",
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        anyhow::bail!("crash");
                    }
                    Ok(())
                }
            },
            rx,
        )
        .await
        .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_backoff() {
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(supervise(
            "always-failing",
            || async { Err::<(), _>(anyhow::anyhow!("crash")) },
            rx,
        ));
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
