// Cursor-following event poller.
//
// Starts from the `latest` page, then repeatedly asks for events `newer`
// than the last one seen, handing each batch over oldest-first.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::NimbusClient;
use crate::error::Error;
use crate::models::{ChangeEvent, EventMode};

/// Default pause between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Polls one appliance's event log, tracking the resume cursor.
pub struct EventStream<'a> {
    client: &'a NimbusClient,
    serial: String,
    cursor: Option<String>,
    poll_interval: Duration,
}

impl<'a> EventStream<'a> {
    pub fn new(client: &'a NimbusClient, serial: impl Into<String>) -> Self {
        Self {
            client,
            serial: serial.into(),
            cursor: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Resume after a known event instead of starting from `latest`.
    pub fn resume_after(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The id of the newest event handed out so far.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Fetch the next batch, oldest-first, and advance the cursor past it.
    pub async fn next_batch(&mut self) -> Result<Vec<ChangeEvent>, Error> {
        let page = match self.cursor.as_deref() {
            None => {
                self.client
                    .get_events(&self.serial, EventMode::Latest, None)
                    .await?
            }
            Some(cursor) => {
                self.client
                    .get_events(&self.serial, EventMode::Newer, Some(cursor))
                    .await?
            }
        };

        let events = page.into_oldest_first();
        if let Some(last) = events.last() {
            self.cursor = Some(last.id.clone());
        }
        debug!(serial = %self.serial, count = events.len(), cursor = ?self.cursor, "event batch");
        Ok(events)
    }

    /// Poll until cancelled or a fetch fails, calling `on_event` for each
    /// event in order.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
        mut on_event: impl FnMut(ChangeEvent),
    ) -> Result<(), Error> {
        loop {
            let batch = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                batch = self.next_batch() => batch?,
            };
            for event in batch {
                on_event(event);
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
