//! Minimum spacing between consecutive register writes.
use std::time::Duration;
use tokio::time::Instant;

/// Spacing the kettle's BLE stack tolerates between writes.
pub const DEFAULT_WRITE_SPACING: Duration = Duration::from_millis(200);

#[derive(Debug)]
pub struct Debouncer {
    spacing: Duration,
    last_write: Option<Instant>,
}

impl Debouncer {
    /// Creates a debouncer enforcing `spacing` between writes.
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_write: None,
        }
    }

    /// Waits out the rest of the spacing since the previous write, then marks
    /// the current instant as the time of the next write.
    pub async fn ready(&mut self) {
        if let Some(last_write) = self.last_write {
            let elapsed = last_write.elapsed();
            if elapsed < self.spacing {
                let remaining = self.spacing - elapsed;
                log::trace!("Debouncing write for {remaining:?}");
                tokio::time::sleep(remaining).await;
            }
        }
        self.last_write = Some(Instant::now());
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_WRITE_SPACING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_write_is_not_delayed() {
        let mut debouncer = Debouncer::default();
        let start = Instant::now();
        debouncer.ready().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_only_for_the_remainder() {
        let mut debouncer = Debouncer::default();
        debouncer.ready().await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let start = Instant::now();
        debouncer.ready().await;
        assert_eq!(start.elapsed(), Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(500)).await;
        let start = Instant::now();
        debouncer.ready().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
