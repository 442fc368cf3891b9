// # Control Panel Trait
//
// The embedded HTTP panel is started with each manager generation (never in
// run-once mode) and stopped, with a bounded timeout, before the next one.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::manager::ReloadHandle;
use crate::traits::IpSource;

/// Everything a panel needs to answer requests for one generation
#[derive(Clone)]
pub struct PanelContext {
    /// Settings of the running generation
    pub settings: Arc<Settings>,
    /// Where mutations are persisted; `None` makes the panel read-only
    pub config_path: Option<PathBuf>,
    pub ip_source: Arc<dyn IpSource>,
    /// Requests a manager restart with new settings
    pub reload: ReloadHandle,
    /// When the process started
    pub started_at: DateTime<Utc>,
}

/// Embedded HTTP control panel
#[async_trait]
pub trait ControlPanel: Send + Sync {
    /// Serve until `cancel` fires
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown after cancellation
    /// - `Err(Error)`: The listener could not be bound or the server failed
    async fn serve(&self, ctx: PanelContext, cancel: CancellationToken) -> Result<(), crate::Error>;
}
