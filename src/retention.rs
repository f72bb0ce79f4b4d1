use chrono::{DateTime, Duration, Utc};
use error_stack::Report;
use tracing::debug;

use crate::error::StorageError;
use crate::model::PurgeStats;
use crate::storage::Storage;

pub const DEFAULT_WINDOW_DAYS: u32 = 7;
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Age-based cleanup of ticks and indicator samples.
///
/// Runs inline on the ingestion path rather than on a timer, so each write
/// also pays for deleting whatever has expired since the previous write.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    window: Duration,
}

impl RetentionPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_days(days: u32) -> Self {
        Self::new(Duration::days(i64::from(days)))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Oldest timestamp that survives a purge at `now`. A window reaching
    /// past the calendar range keeps everything.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Delete every row strictly older than `now - window`.
    pub async fn purge(
        &self,
        storage: &dyn Storage,
        now: DateTime<Utc>,
    ) -> Result<PurgeStats, Report<StorageError>> {
        let cutoff = self.cutoff(now);
        let stats = storage.purge(cutoff).await?;
        if stats.ticks > 0 || stats.indicators > 0 {
            debug!(
                cutoff = %cutoff,
                ticks = stats.ticks,
                indicators = stats.indicators,
                "expired rows purged"
            );
        }
        Ok(stats)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_days(DEFAULT_WINDOW_DAYS)
    }
}
