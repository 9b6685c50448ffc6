//! The throttled-message queue and the dedicated worker thread that drains
//! it, modeled on this workspace's other owning-thread-plus-channel workers:
//! a `JoinHandle` blocks on a `crossbeam_channel::Receiver` instead of
//! parking on a kernel wait-queue, and shutdown is a message plus a join
//! rather than a flag-and-wake pair.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::context::HomaContext;
use crate::message::Message;
use crate::transmit;

/// Shortest-remaining-message-first queue of messages that hit the NIC
/// budget in [`transmit::transmit_ready`] and need the pacer to resume them.
#[derive(Default)]
pub struct ThrottledQueue {
    inner: Mutex<VecDeque<Arc<Message>>>,
}

impl ThrottledQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `message` in ascending-remaining-bytes order. No-op if the
    /// message is already linked (tracked by [`Message::mark_queued`], not by
    /// scanning the list).
    pub fn enqueue(&self, message: Arc<Message>) -> bool {
        if !message.mark_queued() {
            return false;
        }
        let remaining = message.remaining_bytes();
        let mut queue = self.inner.lock().unwrap();
        let pos = queue
            .iter()
            .position(|m| m.remaining_bytes() > remaining)
            .unwrap_or(queue.len());
        queue.insert(pos, message);
        true
    }

    /// Pacer-only: if `message` has exhausted its grant or packet chain,
    /// unlink it and reset its queued flag. The node is re-initialized to a
    /// detached state on every call, even if the message was not actually
    /// found linked — only the head is ever consumed, so a stale detach is
    /// harmless and keeps this idempotent.
    pub fn dequeue_if_done(&self, message: &Arc<Message>) {
        if !message.is_send_complete() {
            return;
        }
        let mut queue = self.inner.lock().unwrap();
        if let Some(pos) = queue.iter().position(|m| Arc::ptr_eq(m, message)) {
            queue.remove(pos);
        }
        message.mark_dequeued();
    }

    /// Snapshot-read the first element. A concurrent `enqueue` that has not
    /// yet taken the lock simply isn't observed yet; this never follows a
    /// stale pointer past the head because removal only ever happens under
    /// the same lock.
    pub fn peek_head(&self) -> Option<Arc<Message>> {
        self.inner.lock().unwrap().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) enum Signal {
    Wake,
    Shutdown,
}

/// Registered by the running pacer worker so [`crate::context::HomaContext::enqueue_throttled`]
/// can wake it without either side depending on the other's type directly.
/// Empty until [`pacer_start`] registers a sender; a message enqueued before
/// that point is still found, because the worker checks `peek_head` before
/// ever parking on its channel.
#[derive(Default)]
pub(crate) struct PacerWaker {
    tx: Mutex<Option<crossbeam_channel::Sender<Signal>>>,
}

impl PacerWaker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn register(&self, tx: crossbeam_channel::Sender<Signal>) {
        *self.tx.lock().unwrap() = Some(tx);
    }

    /// Best-effort wake: a missing or disconnected sender (no worker started
    /// yet, or already stopped) is silently ignored.
    pub(crate) fn notify(&self) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.try_send(Signal::Wake);
        }
    }
}

/// Handle to the running pacer worker thread. Dropping it without calling
/// [`PacerHandle::stop`] leaks the thread (matches `JoinHandle`'s own
/// semantics); callers are expected to call `stop` explicitly.
pub struct PacerHandle {
    tx: crossbeam_channel::Sender<Signal>,
    exit: Arc<AtomicBool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl PacerHandle {
    /// Wake the worker because a message was just enqueued. Idempotent: a
    /// burst of enqueues collapses to however many wakeups the channel has
    /// capacity for, which is fine since a spurious wakeup just re-checks an
    /// empty queue and parks again.
    pub fn notify_enqueued(&self) {
        let _ = self.tx.try_send(Signal::Wake);
    }

    /// Request shutdown and block until the worker thread has exited.
    pub fn stop(&self) {
        self.exit.store(true, Ordering::Release);
        let _ = self.tx.send(Signal::Shutdown);
        if let Some(handle) = self.join.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// Start the pacer worker thread. The worker calls `transmit_ready` for the
/// head of `ctx.pacer_queue` whenever the NIC budget allows, and parks
/// (blocks on its channel) when the queue is empty.
pub fn pacer_start(ctx: Arc<HomaContext>) -> PacerHandle {
    let (tx, rx) = crossbeam_channel::unbounded::<Signal>();
    ctx.pacer_wake.register(tx.clone());
    let exit = Arc::new(AtomicBool::new(false));
    let worker_exit = Arc::clone(&exit);

    let join = std::thread::Builder::new()
        .name("homa-pacer".into())
        .spawn(move || {
            tracing::info!("homa pacer worker started");
            loop {
                if worker_exit.load(Ordering::Acquire) {
                    break;
                }
                if ctx.pacer_queue.peek_head().is_none() {
                    match rx.recv() {
                        Ok(Signal::Wake) => continue,
                        Ok(Signal::Shutdown) | Err(_) => break,
                    }
                }
                pacer_burst(&ctx);
            }
            tracing::info!("homa pacer worker stopped");
        })
        .expect("failed to spawn homa pacer thread");

    PacerHandle {
        tx,
        exit,
        join: Mutex::new(Some(join)),
    }
}

/// One unit of pacer work: spin for NIC budget, then push packets for the
/// best-eligible message until it throttles again or drains.
fn pacer_burst(ctx: &HomaContext) {
    let rates = ctx.config.rates();
    while (ctx.clock.now_cycles() + rates.max_nic_queue_cycles) < ctx.link_idle.get() {
        std::hint::spin_loop();
    }

    let Some(message) = ctx.pacer_queue.peek_head() else {
        return;
    };

    if !transmit::try_transmit_ready(&message, ctx) {
        // SOCKET_BUSY: a user-context holder has the lock. Retry next burst.
        return;
    }

    ctx.pacer_queue.dequeue_if_done(&message);
}
