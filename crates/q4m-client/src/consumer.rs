//! Consumer workflow over a [`QueueSession`].
//!
//! A consumer takes one row at a time: `consume` waits for and reads a row,
//! then the caller finishes it with `end`, hands it back with `abort`, or
//! pushes a copy to the tail of the queue with `retry`.

use crate::connection::{Connection, Row};
use crate::error::{ConsumerError, QueueError};
use crate::row::{decode_as, decode_row, FetchStyle, Fetched, WorkItem};
use crate::session::QueueSession;
use serde::de::DeserializeOwned;
use tracing::{info, instrument, warn};

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

/// Row-at-a-time consumer.
pub struct Consumer<C> {
    session: QueueSession<C>,
    held: Option<WorkItem>,
    table: Option<String>,
}

impl<C: Connection> Consumer<C> {
    pub fn new(session: QueueSession<C>) -> Self {
        Self {
            session,
            held: None,
            table: None,
        }
    }

    /// The item read by the last successful `consume`.
    pub fn held_item(&self) -> Option<&WorkItem> {
        self.held.as_ref()
    }

    /// The table of the last `consume` call.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn session(&self) -> &QueueSession<C> {
        &self.session
    }

    pub fn into_session(self) -> QueueSession<C> {
        self.session
    }

    /// Wait for a row of `table`, take ownership and read it in `style`.
    #[instrument(skip(self, style), fields(style = %style))]
    pub async fn consume(
        &mut self,
        table: &str,
        style: &FetchStyle,
    ) -> Result<Fetched, ConsumerError> {
        let wrap = |source: QueueError| ConsumerError::Consume {
            table: table.to_string(),
            style: style.to_string(),
            source,
        };

        let row = self.take_row(table).await.map_err(wrap)?;
        self.held = Some(row.clone().into_item());

        decode_row(row, style).map_err(|e| wrap(e.into()))
    }

    /// [`consume`](Self::consume) deserializing the row into `T`.
    #[instrument(skip(self))]
    pub async fn consume_as<T: DeserializeOwned>(
        &mut self,
        table: &str,
    ) -> Result<T, ConsumerError> {
        let wrap = |source: QueueError| ConsumerError::Consume {
            table: table.to_string(),
            style: std::any::type_name::<T>().to_string(),
            source,
        };

        let row = self.take_row(table).await.map_err(wrap)?;
        self.held = Some(row.clone().into_item());

        decode_as(row).map_err(|e| wrap(e.into()))
    }

    async fn take_row(&mut self, table: &str) -> Result<Row, QueueError> {
        self.held = None;
        self.table = Some(table.to_string());
        self.session.wait_single_table(table).await?;
        self.session.dequeue_row().await
    }

    /// Finish the owned row. Does nothing when no row is owned.
    pub async fn end(&mut self) -> Result<(), ConsumerError> {
        if self.session.is_owner() {
            self.session
                .end()
                .await
                .map_err(|source| ConsumerError::End { source })?;
        }
        self.held = None;
        Ok(())
    }

    /// Hand the owned row back to the queue. Does nothing when no row is
    /// owned.
    pub async fn abort(&mut self) -> Result<(), ConsumerError> {
        if self.session.is_owner() {
            self.session
                .abort()
                .await
                .map_err(|source| ConsumerError::Abort { source })?;
        }
        self.held = None;
        Ok(())
    }

    /// Re-enqueue the held item on its table and finish the original row.
    ///
    /// Not atomic: if the enqueue succeeds and the end fails, the queue holds
    /// both copies until the connection releases the original.
    #[instrument(skip(self), fields(table = ?self.table))]
    pub async fn retry(&mut self) -> Result<(), ConsumerError> {
        let (Some(item), Some(table)) = (self.held.as_ref(), self.table.as_deref()) else {
            return Err(ConsumerError::NothingToRetry);
        };
        let wrap = |source: QueueError| ConsumerError::Retry {
            item: serde_json::to_string(item).unwrap_or_else(|_| format!("{:?}", item)),
            source,
        };

        self.session.enqueue(table, item).await.map_err(wrap)?;

        if self.session.is_owner() {
            if let Err(source) = self.session.end().await {
                warn!(
                    table,
                    error = %source,
                    "Item re-enqueued but the original row was not ended"
                );
                return Err(wrap(source));
            }
        }

        info!(table, "Item re-enqueued for retry");
        self.held = None;
        Ok(())
    }
}
