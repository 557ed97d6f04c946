//! Hand-off of engine and render notifications to the UI-owning thread
//!
//! Engine events and frame-ready signals arrive on native threads. They are
//! posted through a [`UiDispatcher`] and only consumed by the [`UiQueue`],
//! which cannot leave the thread that created it.

use crate::engine::EngineEvent;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

/// Work for the UI thread
#[derive(Debug, Clone, PartialEq)]
pub enum UiMessage {
    /// Notification from the engine's event queue
    Engine(EngineEvent),
    /// The engine has a frame ready to draw
    DrawFrame,
    /// Present failed on the surface of this generation
    DeviceLost { generation: u64 },
}

type Waker = dyn Fn() + Send + Sync;

/// Cloneable sending side; safe to use from any thread
#[derive(Clone)]
pub struct UiDispatcher {
    tx: Sender<UiMessage>,
    waker: Arc<Waker>,
}

impl UiDispatcher {
    /// Queue `message` and wake the UI loop
    ///
    /// Returns false once the UI side is gone.
    pub fn post(&self, message: UiMessage) -> bool {
        if self.tx.send(message).is_err() {
            return false;
        }
        (self.waker)();
        true
    }
}

/// Receiving side, pinned to the thread that created it
pub struct UiQueue {
    rx: Receiver<UiMessage>,
    _not_send: PhantomData<Rc<()>>,
}

impl UiQueue {
    /// Next queued message without blocking
    pub fn try_next(&self) -> Option<UiMessage> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block up to `timeout` for the next message
    pub fn next_timeout(&self, timeout: Duration) -> Option<UiMessage> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Messages currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create a dispatcher/queue pair; `waker` runs after every post
pub fn channel<W>(waker: W) -> (UiDispatcher, UiQueue)
where
    W: Fn() + Send + Sync + 'static,
{
    let (tx, rx) = crossbeam_channel::unbounded();
    (
        UiDispatcher {
            tx,
            waker: Arc::new(waker),
        },
        UiQueue {
            rx,
            _not_send: PhantomData,
        },
    )
}
