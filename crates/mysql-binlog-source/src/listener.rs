//! Listener registration and per-table dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::StreamError;
use crate::event::DmlEvent;

/// Receives row-change events for one table.
///
/// Any `Fn(DmlEvent) -> anyhow::Result<()>` closure is a handler.
#[async_trait]
pub trait DmlEventHandler: Send + Sync {
    async fn on_dml_event(&self, event: DmlEvent) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> DmlEventHandler for F
where
    F: Fn(DmlEvent) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_dml_event(&self, event: DmlEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// How a listener is invoked relative to the read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Awaited inline; an error stops streaming.
    Sync,
    /// Queued to a dedicated worker. Events reach the handler in stream order
    /// and errors are logged, never propagated.
    ///
    /// The queue is unbounded so a slow handler never stalls the read loop;
    /// its backlog is held in memory instead. A warning is logged every
    /// 10 000 pending events and [`ListenerRegistry::async_backlog`] reports
    /// the current size.
    Async,
}

/// Pending events per async listener between backlog warnings.
const BACKLOG_WARN_EVERY: usize = 10_000;

struct AsyncQueue {
    sender: mpsc::UnboundedSender<DmlEvent>,
    /// Events queued or being handled
    backlog: Arc<AtomicUsize>,
    worker: JoinHandle<()>,
}

struct Listener {
    mode: DispatchMode,
    schema: String,
    table: String,
    handler: Arc<dyn DmlEventHandler>,
    queue: Mutex<Option<AsyncQueue>>,
}

impl Listener {
    async fn deliver(&self, event: DmlEvent) -> Result<(), StreamError> {
        match self.mode {
            DispatchMode::Sync => {
                self.handler
                    .on_dml_event(event)
                    .await
                    .map_err(|source| StreamError::Listener {
                        schema: self.schema.clone(),
                        table: self.table.clone(),
                        source,
                    })
            }
            DispatchMode::Async => {
                self.enqueue(event);
                Ok(())
            }
        }
    }

    fn enqueue(&self, event: DmlEvent) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let queue = queue.get_or_insert_with(|| self.spawn_worker());
        let pending = queue.backlog.fetch_add(1, Ordering::Relaxed) + 1;
        if queue.sender.send(event).is_err() {
            queue.backlog.fetch_sub(1, Ordering::Relaxed);
            error!(
                "Async listener worker for {}.{} is gone; dropping event",
                self.schema, self.table
            );
        } else if pending % BACKLOG_WARN_EVERY == 0 {
            warn!(
                "Async listener for {}.{} is {} events behind",
                self.schema, self.table, pending
            );
        }
    }

    fn spawn_worker(&self) -> AsyncQueue {
        let (sender, mut receiver) = mpsc::unbounded_channel::<DmlEvent>();
        let backlog = Arc::new(AtomicUsize::new(0));
        let handled = Arc::clone(&backlog);
        let handler = Arc::clone(&self.handler);
        let schema = self.schema.clone();
        let table = self.table.clone();
        debug!("Starting async listener worker for {}.{}", schema, table);
        let worker = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = handler.on_dml_event(event).await {
                    error!("Async listener for {}.{} failed: {:#}", schema, table, e);
                }
                handled.fetch_sub(1, Ordering::Relaxed);
            }
        });
        AsyncQueue {
            sender,
            backlog,
            worker,
        }
    }

    fn backlog(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(0, |queue| queue.backlog.load(Ordering::Relaxed))
    }

    fn take_queue(&self) -> Option<AsyncQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Shared, cloneable handle to the set of registered listeners.
///
/// Registration may happen from any task, including from inside a handler;
/// a listener added while an event is being dispatched starts with the next
/// event.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Arc<RwLock<HashMap<(String, String), Vec<Arc<Listener>>>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events on exactly `schema`.`table`.
    ///
    /// Registering the same handler twice is allowed; it is then invoked twice
    /// per event, in registration order.
    pub fn add_listener<H>(
        &self,
        mode: DispatchMode,
        schema: &str,
        table: &str,
        handler: H,
    ) -> Result<(), StreamError>
    where
        H: DmlEventHandler + 'static,
    {
        if schema.is_empty() {
            return Err(StreamError::InvalidArgument(
                "listener schema name must not be empty".to_string(),
            ));
        }
        if table.is_empty() {
            return Err(StreamError::InvalidArgument(
                "listener table name must not be empty".to_string(),
            ));
        }

        let listener = Arc::new(Listener {
            mode,
            schema: schema.to_string(),
            table: table.to_string(),
            handler: Arc::new(handler),
            queue: Mutex::new(None),
        });

        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners
            .entry((schema.to_string(), table.to_string()))
            .or_default()
            .push(listener);
        debug!("Registered {:?} listener for {}.{}", mode, schema, table);
        Ok(())
    }

    pub fn listener_count(&self, schema: &str, table: &str) -> usize {
        self.snapshot(schema, table).len()
    }

    /// Events handed to async listeners that their workers have not finished.
    pub fn async_backlog(&self) -> usize {
        self.all().iter().map(|listener| listener.backlog()).sum()
    }

    fn snapshot(&self, schema: &str, table: &str) -> Vec<Arc<Listener>> {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        listeners
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn all(&self) -> Vec<Arc<Listener>> {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        listeners.values().flatten().cloned().collect()
    }

    /// Deliver `event` to every listener registered for its table, in
    /// registration order. Stops at the first synchronous listener error.
    pub(crate) async fn dispatch(&self, event: &DmlEvent) -> Result<(), StreamError> {
        for listener in self.snapshot(&event.schema, &event.table) {
            listener.deliver(event.clone()).await?;
        }
        Ok(())
    }

    /// Close every async queue and wait until workers have handled what was
    /// already queued. Listeners stay registered; a later dispatch starts new
    /// workers.
    pub async fn drain(&self) {
        for listener in self.all() {
            let Some(AsyncQueue { sender, worker, .. }) = listener.take_queue() else {
                continue;
            };
            drop(sender);
            if let Err(e) = worker.await {
                warn!(
                    "Async listener worker for {}.{} ended abnormally: {}",
                    listener.schema, listener.table, e
                );
            }
        }
    }

    /// Stop async workers without waiting for queued events.
    pub(crate) fn abort_workers(&self) {
        for listener in self.all() {
            if let Some(queue) = listener.take_queue() {
                queue.worker.abort();
            }
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        let mut tables: Vec<String> = listeners
            .iter()
            .map(|((schema, table), l)| format!("{schema}.{table} x{}", l.len()))
            .collect();
        tables.sort();
        f.debug_struct("ListenerRegistry")
            .field("tables", &tables)
            .finish()
    }
}
