//! Cursor-driven consumption of a user's event stream.
//!
//! A consumer reads its cursor, lists the next page of events after it, hands
//! the page to a handler, and moves the cursor to the last event. All four
//! steps share one transaction, so a failing handler leaves the cursor where
//! it was and the page is delivered again on the next call.

use tracing::debug;

use crate::dbc::Dbc;
use crate::entities::{UserEvent, UserEventCursor, UserEventCursorRepo, UserEventRepo};
use crate::errors::Result;
use crate::ids::{Id, redact_id};
use crate::sqlite::query::clamp_limit;
use crate::store::Store;
use crate::tx::TxOptions;

/// Result of one [`EventConsumer::consume_page`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageOutcome {
    /// Events handed to the handler.
    pub processed: usize,
    /// The page was short: nothing is left after the cursor.
    pub reached_tail: bool,
}

/// Named consumer of user event streams.
#[derive(Clone, Debug)]
pub struct EventConsumer {
    store: Store,
    events: UserEventRepo,
    cursors: UserEventCursorRepo,
    consumer: String,
    page_size: i64,
}

impl EventConsumer {
    /// Consumer with the default page size.
    pub fn new(store: Store, consumer: impl Into<String>) -> Self {
        Self {
            events: UserEventRepo::with_store(store.clone()),
            cursors: UserEventCursorRepo::with_store(store.clone()),
            store,
            consumer: consumer.into(),
            page_size: clamp_limit(None),
        }
    }

    /// Override the page size (clamped like any list limit).
    #[must_use]
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = clamp_limit(Some(page_size));
        self
    }

    /// Consumer name.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Deliver the next page after this consumer's cursor for `user_id`.
    pub fn consume_page<F>(&self, dbc: &Dbc<'_>, user_id: Id, handler: F) -> Result<PageOutcome>
    where
        F: FnOnce(&Dbc<'_>, &[UserEvent]) -> Result<()>,
    {
        if user_id.is_nil() || self.consumer.is_empty() {
            return Ok(PageOutcome {
                processed: 0,
                reached_tail: true,
            });
        }
        self.store.transact(dbc, TxOptions::serializable(), |tx| {
            let mut cursor = self
                .cursors
                .find(tx, user_id, &self.consumer)?
                .unwrap_or_else(|| UserEventCursor::new(user_id, self.consumer.as_str()));
            let page = self.events.list_after_cursor(
                tx,
                user_id,
                cursor.last_created_at,
                cursor.last_event_id,
                Some(self.page_size),
            )?;
            let Some(last) = page.last() else {
                return Ok(PageOutcome {
                    processed: 0,
                    reached_tail: true,
                });
            };
            let (created_at, event_id) = (last.base.created_at, last.base.id);

            handler(tx, &page)?;
            cursor.advance_to(created_at, event_id);
            self.cursors.upsert(tx, &mut cursor)?;

            let processed = page.len();
            Ok(PageOutcome {
                processed,
                reached_tail: i64::try_from(processed).unwrap_or(i64::MAX) < self.page_size,
            })
        })
    }

    /// Deliver pages until the tail. Returns the number of events handled.
    pub fn drain<F>(&self, dbc: &Dbc<'_>, user_id: Id, mut handler: F) -> Result<usize>
    where
        F: FnMut(&Dbc<'_>, &[UserEvent]) -> Result<()>,
    {
        let mut total = 0;
        loop {
            let outcome = self.consume_page(dbc, user_id, &mut handler)?;
            total += outcome.processed;
            if outcome.reached_tail {
                break;
            }
        }
        debug!(
            consumer = %self.consumer,
            user = %redact_id(&user_id),
            events = total,
            "stream drained"
        );
        Ok(total)
    }
}
