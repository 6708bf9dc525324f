//! `Stream` adapter over a change subscription.
//!
//! A subscriber that falls more than `channel_capacity` changes behind loses
//! the oldest ones. The stream reports that as a single
//! [`TableChangeEvent::Lagged`] carrying the number of dropped changes, then
//! carries on with the oldest change still buffered.

use std::collections::HashSet;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::change::{TableChange, TableChangeEvent};

/// Committed changes from one subscription, optionally limited to a set of
/// tables. Lag notices are never filtered out.
pub struct TableChangeStream {
   changes: BroadcastStream<TableChange>,
   tables: Option<HashSet<String>>,
}

impl TableChangeStream {
   pub fn new(rx: broadcast::Receiver<TableChange>) -> Self {
      Self {
         changes: BroadcastStream::new(rx),
         tables: None,
      }
   }

   /// Only yield changes to `tables`.
   pub fn filter_tables<I, S>(mut self, tables: I) -> Self
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      self.tables = Some(tables.into_iter().map(Into::into).collect());
      self
   }

   fn wants(&self, change: &TableChange) -> bool {
      self
         .tables
         .as_ref()
         .is_none_or(|tables| tables.contains(&change.table))
   }
}

impl Stream for TableChangeStream {
   type Item = TableChangeEvent;

   fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
      loop {
         let event = match ready!(Pin::new(&mut self.changes).poll_next(cx)) {
            None => return Poll::Ready(None),
            Some(Ok(change)) if self.wants(&change) => TableChangeEvent::Change(change),
            Some(Ok(_)) => continue,
            Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
               warn!(missed, "Change subscriber fell behind; raise channel_capacity");
               TableChangeEvent::Lagged(missed)
            }
         };
         return Poll::Ready(Some(event));
      }
   }
}

/// `into_stream` for change receivers.
pub trait TableChangeStreamExt {
   fn into_stream(self) -> TableChangeStream;
}

impl TableChangeStreamExt for broadcast::Receiver<TableChange> {
   fn into_stream(self) -> TableChangeStream {
      TableChangeStream::new(self)
   }
}
