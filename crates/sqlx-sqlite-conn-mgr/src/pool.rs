//! Growable pool of read-only connections
//!
//! The pool hands each caller a connection nobody else is using, opening a new
//! one whenever every existing connection is busy. There is no upper bound;
//! instead, after a quiet period the idle connections are closed down to one.
//!
//! ## Bookkeeping
//!
//! Every connection is either `available` or `busy`, never both. Both sets,
//! together with the drain timer flag, live behind one mutex that is only held
//! for short synchronous updates; SQL work runs outside it on the connection's
//! own [`ConnectionQueue`].
//!
//! ## Idle drain
//!
//! ```text
//! release ──► drain scheduled? ──no──► sleep(drain_delay) ──► fire
//!                                                              │
//!        available <= 1 ◄──────────────────────────────────────┤ do nothing
//!        busy non-empty ◄──────────────────────────────────────┤ schedule again
//!        otherwise ◄───────────────────────────────────────────┘ close all idle but one
//! ```

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::Mutex;
use sqlx::sqlite::SqliteConnection;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::{ConnectionOptions, PrepareFn};
use crate::queue::ConnectionQueue;
use crate::{Error, Result};

/// Snapshot of how many connections the pool holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
   /// Idle connections ready to be handed out
   pub available: usize,
   /// Connections currently running a caller's closure
   pub busy: usize,
}

impl PoolStatus {
   /// Total number of open connections
   pub fn total(&self) -> usize {
      self.available + self.busy
   }
}

/// Pool of read-only connections with adaptive size.
///
/// Cloning is cheap and yields a handle to the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
   inner: Arc<PoolInner>,
}

struct PoolInner {
   options: ConnectionOptions,
   prepare: Option<PrepareFn>,
   drain_delay: Duration,
   state: Mutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
   available: IndexMap<Uuid, Arc<ConnectionQueue>>,
   busy: IndexMap<Uuid, Arc<ConnectionQueue>>,
   drain_scheduled: bool,
   closed: bool,
}

impl ConnectionPool {
   /// Create an empty pool. Connections are opened read-only from `options`
   /// on demand, and `prepare` runs once on each of them before first use.
   pub fn new(
      options: ConnectionOptions,
      prepare: Option<PrepareFn>,
      drain_delay: Duration,
   ) -> Self {
      Self {
         inner: Arc::new(PoolInner {
            options: options.into_read_only(),
            prepare,
            drain_delay,
            state: Mutex::new(PoolState::default()),
         }),
      }
   }

   /// Run `f` on a connection that no other caller is using.
   ///
   /// The connection goes back to the pool afterwards whether `f` succeeded,
   /// failed or panicked, and even if the caller stops awaiting.
   pub async fn execute<F, T>(&self, f: F) -> Result<T>
   where
      F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send + 'static,
      T: Send + 'static,
   {
      let lease = self.acquire().await?;
      let result = lease.queue.execute(f).await;
      drop(lease);
      result
   }

   /// Current number of available and busy connections
   pub fn status(&self) -> PoolStatus {
      let state = self.inner.state.lock();
      PoolStatus {
         available: state.available.len(),
         busy: state.busy.len(),
      }
   }

   /// Delay between the last release and the idle drain
   pub fn drain_delay(&self) -> Duration {
      self.inner.drain_delay
   }

   /// Whether [`close`](Self::close) has been called
   pub fn is_closed(&self) -> bool {
      self.inner.state.lock().closed
   }

   /// Close every idle connection and refuse further work.
   ///
   /// Connections that are busy when this is called are closed as soon as
   /// their caller is done with them.
   pub async fn close(&self) -> Result<()> {
      let idle: Vec<Arc<ConnectionQueue>> = {
         let mut state = self.inner.state.lock();
         if state.closed {
            return Ok(());
         }
         state.closed = true;
         state.available.drain(..).map(|(_, queue)| queue).collect()
      };

      debug!(closing = idle.len(), "Closing read pool");
      close_all(idle).await
   }

   async fn acquire(&self) -> Result<Lease> {
      {
         let mut state = self.inner.state.lock();
         if state.closed {
            return Err(Error::DatabaseClosed);
         }
         if let Some((id, queue)) = state.available.pop() {
            state.busy.insert(id, Arc::clone(&queue));
            trace!(connection = %id, "Reusing idle read connection");
            return Ok(Lease::new(&self.inner, queue));
         }
      }

      // Every connection is busy: open another one outside the lock. A failed
      // open leaves the sets untouched.
      let queue = Arc::new(
         ConnectionQueue::open(&self.inner.options, self.inner.prepare.as_ref()).await?,
      );

      {
         let mut state = self.inner.state.lock();
         if !state.closed {
            state.busy.insert(queue.id(), Arc::clone(&queue));
            debug!(
               connection = %queue.id(),
               total = state.available.len() + state.busy.len(),
               "Opened read connection"
            );
            return Ok(Lease::new(&self.inner, queue));
         }
      }

      if let Err(err) = close_all(vec![queue]).await {
         warn!(error = %err, "Failed to close read connection opened during close");
      }
      Err(Error::DatabaseClosed)
   }
}

impl fmt::Debug for ConnectionPool {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("ConnectionPool")
         .field("location", &self.inner.options.location)
         .field("drain_delay", &self.inner.drain_delay)
         .field("status", &self.status())
         .finish()
   }
}

impl PoolInner {
   fn release(self: &Arc<Self>, id: Uuid) {
      let mut state = self.state.lock();
      let Some(queue) = state.busy.shift_remove(&id) else {
         return;
      };

      if state.closed {
         drop(state);
         trace!(connection = %id, "Pool closed, dropping released connection");
         drop(queue);
         return;
      }

      state.available.insert(id, queue);
      trace!(connection = %id, "Released read connection");
      self.schedule_drain(&mut state);
   }

   fn schedule_drain(self: &Arc<Self>, state: &mut PoolState) {
      if state.drain_scheduled || state.closed {
         return;
      }

      let Ok(runtime) = Handle::try_current() else {
         warn!("No tokio runtime available, idle read connections will not be drained");
         return;
      };

      state.drain_scheduled = true;
      let pool: Weak<PoolInner> = Arc::downgrade(self);
      let delay = self.drain_delay;
      runtime.spawn(async move {
         tokio::time::sleep(delay).await;
         if let Some(pool) = pool.upgrade() {
            pool.drain().await;
         }
      });
   }

   async fn drain(self: &Arc<Self>) {
      let excess: Vec<Arc<ConnectionQueue>> = {
         let mut state = self.state.lock();
         state.drain_scheduled = false;

         if state.closed || state.available.len() <= 1 {
            return;
         }
         if !state.busy.is_empty() {
            trace!(busy = state.busy.len(), "Read connections in use, deferring drain");
            self.schedule_drain(&mut state);
            return;
         }

         state.available.drain(1..).map(|(_, queue)| queue).collect()
      };

      debug!(closing = excess.len(), "Draining idle read connections");
      if let Err(err) = close_all(excess).await {
         warn!(error = %err, "Failed to close drained read connection");
      }
   }
}

async fn close_all(queues: Vec<Arc<ConnectionQueue>>) -> Result<()> {
   let mut first_err = None;
   for queue in queues {
      // A queue still referenced elsewhere closes when its last owner drops it
      let Ok(queue) = Arc::try_unwrap(queue) else {
         continue;
      };
      if let Err(err) = queue.close().await {
         first_err.get_or_insert(err);
      }
   }
   first_err.map_or(Ok(()), Err)
}

/// A busy connection on loan to one caller; returns it to the pool on drop.
struct Lease {
   pool: Arc<PoolInner>,
   queue: Arc<ConnectionQueue>,
}

impl Lease {
   fn new(pool: &Arc<PoolInner>, queue: Arc<ConnectionQueue>) -> Self {
      Self {
         pool: Arc::clone(pool),
         queue,
      }
   }
}

impl Drop for Lease {
   fn drop(&mut self) {
      self.pool.release(self.queue.id());
   }
}
