//! Upload directory observation
//!
//! A fixed-interval scan of the upload directory stands in for filesystem
//! creation events: any `{id}.jpg` without a terminal marker that has not
//! been handled this session is picked up and processed fully before the
//! next one. One scan pass per tick, one request in flight at a time.

use crate::processor::Processor;
use scanpipe_common::{RequestState, RequestStore, Result};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Watcher {
    store: RequestStore,
    poll_interval: Duration,
    seen: HashSet<String>,
}

impl Watcher {
    pub fn new(store: RequestStore, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
            seen: HashSet::new(),
        }
    }

    /// Watch loop; runs until the task is cancelled.
    pub async fn run(mut self, processor: &Processor) -> Result<()> {
        info!(
            upload_dir = %self.store.upload_dir().display(),
            interval_secs = self.poll_interval.as_secs(),
            "watching upload directory"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            for request_id in self.scan()? {
                info!(request_id = %request_id, "new file detected");
                processor.process(&request_id).await;
            }
        }
    }

    /// One scan pass: unprocessed request ids, oldest name first.
    pub fn scan(&mut self) -> Result<Vec<String>> {
        let mut fresh = Vec::new();

        for entry in std::fs::read_dir(self.store.upload_dir())? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "cannot read upload directory entry");
                    continue;
                }
            };

            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jpg") {
                continue;
            }
            let Some(request_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            if self.seen.contains(request_id) {
                continue;
            }

            // Requests already in a terminal state (processed by a previous
            // worker run) are remembered but not reprocessed.
            match self.store.state(request_id) {
                RequestState::Done | RequestState::Error => {
                    debug!(request_id = %request_id, "already terminal, skipping");
                    self.seen.insert(request_id.to_string());
                }
                RequestState::Pending => {
                    self.seen.insert(request_id.to_string());
                    fresh.push(request_id.to_string());
                }
                RequestState::Unknown => {}
            }
        }

        fresh.sort();
        Ok(fresh)
    }
}
