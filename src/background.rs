//! The two perpetual loops: price simulation and exchange-rate refresh.
//!
//! Each loop runs as its own tokio task and stops when the shutdown
//! channel flips to `true` (or its sender is dropped). A failing tick is
//! logged and retried after a backoff; it never ends the loop.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::exchange_rate::ExchangeRateUpdater;
use crate::domain::simulator::PriceSimulator;
use crate::ports::market_port::MarketPort;

pub type ShutdownSender = watch::Sender<bool>;
pub type ShutdownReceiver = watch::Receiver<bool>;

pub fn shutdown_channel() -> (ShutdownSender, ShutdownReceiver) {
    watch::channel(false)
}

/// Wait on `shutdown` for at most `delay`. Returns true if shutdown was signalled.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut ShutdownReceiver) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    let changed = tokio::select! {
        _ = tokio::time::sleep(delay) => return false,
        changed = shutdown.changed() => changed,
    };
    changed.is_err() || *shutdown.borrow()
}

pub fn spawn_price_simulator<M>(
    simulator: Arc<PriceSimulator<M>>,
    interval: Duration,
    backoff: Duration,
    mut shutdown: ShutdownReceiver,
) -> JoinHandle<()>
where
    M: MarketPort + Send + Sync + ?Sized + 'static,
{
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "price simulator started");
        let mut delay = interval;
        loop {
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }

            let sim = Arc::clone(&simulator);
            let outcome =
                tokio::task::spawn_blocking(move || sim.tick(&mut rand::thread_rng())).await;

            delay = match outcome {
                Ok(Ok(count)) => {
                    tracing::debug!(count, "prices updated");
                    interval
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, backoff_secs = backoff.as_secs(), "price simulation failed");
                    backoff
                }
                Err(e) => {
                    tracing::error!(error = %e, backoff_secs = backoff.as_secs(), "price simulation task panicked");
                    backoff
                }
            };
        }
        tracing::info!("price simulator stopped");
    })
}

/// The first refresh happens immediately, then every `interval`.
pub fn spawn_rate_updater(
    updater: Arc<ExchangeRateUpdater>,
    interval: Duration,
    mut shutdown: ShutdownReceiver,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "exchange rate updater started");
        loop {
            let mut refresh = tokio::spawn({
                let updater = Arc::clone(&updater);
                async move {
                    updater.tick(&mut StdRng::from_entropy()).await;
                }
            });
            tokio::select! {
                joined = &mut refresh => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "exchange rate refresh panicked");
                    }
                }
                _ = shutdown.changed() => {
                    refresh.abort();
                    break;
                }
            }
            if sleep_or_shutdown(interval, &mut shutdown).await {
                break;
            }
        }
        tracing::info!("exchange rate updater stopped");
    })
}
