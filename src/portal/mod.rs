//! The harvester for the supplier's customer portal.
//!
//! A run is two tasks: the [`navigator`] decides where to go next and the
//! [`bridge`] execution side owns the live page. They only talk through the
//! bridge's command and event channels.

pub mod bridge;
#[cfg(feature = "browser")]
mod chrome;
pub mod classify;
pub mod driver;
pub mod error;
pub mod extract;
mod html;
pub mod layout;
pub mod navigator;
pub mod sentinel;
pub mod site;
pub mod wait;

#[cfg(feature = "browser")]
pub use chrome::ChromeDriver;
pub use classify::{route_documents, Classifier, Routed};
pub use driver::PageDriver;
pub use error::{HarvestError, HarvestResult};
pub use layout::{LayoutKind, PageLayout};
pub use navigator::{
    AuthState, ContractPosition, ContractReport, HarvestSettings, Navigator, PendingError,
    RunSummary,
};
pub use sentinel::{PageErrorKind, PageEvent};
pub use wait::{ManualWait, WaitPolicy};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::credentials::AccountVault;
use crate::storage::DocumentSink;

/// Run one harvest over `driver`, from login to the last contract.
///
/// The optional `run_timeout` of the settings bounds the whole run,
/// manual login included; `cancel` stops it at the next await point.
pub async fn harvest(
    driver: Arc<dyn PageDriver>,
    vault: Arc<dyn AccountVault>,
    sink: Arc<dyn DocumentSink>,
    settings: HarvestSettings,
    cancel: CancellationToken,
) -> HarvestResult<RunSummary> {
    harvest_with_clock(driver, vault, sink, settings, cancel, Arc::new(SystemClock)).await
}

/// [`harvest`] with page errors stamped by `clock`.
pub async fn harvest_with_clock(
    driver: Arc<dyn PageDriver>,
    vault: Arc<dyn AccountVault>,
    sink: Arc<dyn DocumentSink>,
    settings: HarvestSettings,
    cancel: CancellationToken,
    clock: Arc<dyn Clock>,
) -> HarvestResult<RunSummary> {
    let run_timeout = settings.timing.run_timeout;
    let (client, events, execution) = bridge::spawn(driver);
    let navigator = Navigator::new(client, events, vault, sink, settings, cancel)?.with_clock(clock);

    let outcome = match run_timeout {
        Some(limit) => tokio::time::timeout(limit, navigator.run())
            .await
            .unwrap_or(Err(HarvestError::Timeout {
                what: "the whole harvest run".to_string(),
                waited: limit,
            })),
        None => navigator.run().await,
    };

    // The navigator owned the only client; the execution side stops once
    // its last command is done.
    if let Err(err) = execution.await {
        tracing::warn!(error = %err, "Page execution task failed");
    }
    outcome
}
