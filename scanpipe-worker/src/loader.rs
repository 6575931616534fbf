//! Image loading with bounded retries
//!
//! The upload writer and the watch loop race: a scan can observe a file the
//! uploader has not finished flushing. A failed decode is therefore retried
//! a fixed number of times with a fixed delay before the failure becomes
//! definitive.

use image::RgbImage;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot load image {path} after {attempts} attempts: {reason}")]
    Unreadable {
        path: String,
        attempts: usize,
        reason: String,
    },
}

/// Bounded-retry image loader
#[derive(Debug, Clone)]
pub struct ImageLoader {
    retries: usize,
    delay: Duration,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl ImageLoader {
    pub fn new(retries: usize, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Load and decode the image at `path`. One immediate attempt, then up
    /// to `retries` delayed attempts before the failure is definitive.
    pub async fn load(&self, path: &Path) -> Result<RgbImage, LoadError> {
        let mut last_error = String::new();
        let attempts = self.retries + 1;

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.delay).await;
            }

            match image::open(path) {
                Ok(decoded) => return Ok(decoded.to_rgb8()),
                Err(e) => {
                    debug!(
                        path = %path.display(),
                        attempt = attempt + 1,
                        error = %e,
                        "image not readable yet"
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(LoadError::Unreadable {
            path: path.display().to_string(),
            attempts,
            reason: last_error,
        })
    }
}
