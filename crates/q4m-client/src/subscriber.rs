//! Producer side: pushes work items onto queue tables.

use crate::connection::Connection;
use crate::error::{QueueError, SubscriberError, ValidationError};
use crate::row::WorkItem;
use crate::session::QueueSession;
use tracing::instrument;

#[cfg(test)]
#[path = "subscriber_tests.rs"]
mod tests;

/// Enqueues work items through a [`QueueSession`].
pub struct Subscriber<C> {
    session: QueueSession<C>,
}

impl<C: Connection> Subscriber<C> {
    pub fn new(session: QueueSession<C>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &QueueSession<C> {
        &self.session
    }

    pub fn into_session(self) -> QueueSession<C> {
        self.session
    }

    /// Enqueue `item` on `table`.
    ///
    /// An empty item is rejected before the session is used.
    #[instrument(skip(self, item), fields(columns = item.len()))]
    pub async fn subscribe(
        &mut self,
        table: &str,
        item: &WorkItem,
    ) -> Result<(), SubscriberError> {
        let wrap = |source: QueueError| SubscriberError {
            table: table.to_string(),
            item: serde_json::to_string(item).unwrap_or_else(|_| format!("{:?}", item)),
            source,
        };

        if item.is_empty() {
            return Err(wrap(ValidationError::EmptyItem.into()));
        }

        self.session.enqueue(table, item).await.map_err(wrap)
    }
}
