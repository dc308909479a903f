//! Message queue that runs closures on the GUI-owning thread.
//!
//! Background threads never touch the engine directly. They post closures
//! through a [`GuiDispatcher`]; the thread that owns the engine drains them in
//! submission order inside [`GuiEventLoop::run`].

use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use log::debug;

use crate::error::{Result, VisError};

/// Closure executed with exclusive access to the engine.
pub type Task<E> = Box<dyn FnOnce(&mut E) + Send>;

enum Message<E> {
    Task(Task<E>),
    Close,
}

/// Create a connected dispatcher / event loop pair.
pub fn gui_channel<E: 'static>() -> (GuiDispatcher<E>, GuiEventLoop<E>) {
    let (tx, rx) = unbounded();
    let gui_thread = Arc::new(OnceLock::new());
    (
        GuiDispatcher {
            tx,
            gui_thread: Arc::clone(&gui_thread),
        },
        GuiEventLoop { rx, gui_thread },
    )
}

/// Cloneable handle for submitting work to the GUI thread.
pub struct GuiDispatcher<E> {
    tx: Sender<Message<E>>,
    gui_thread: Arc<OnceLock<ThreadId>>,
}

impl<E> Clone for GuiDispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            gui_thread: Arc::clone(&self.gui_thread),
        }
    }
}

impl<E: 'static> GuiDispatcher<E> {
    /// Schedule `task` to run once on the GUI thread. Never blocks.
    pub fn post<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&mut E) + Send + 'static,
    {
        self.tx
            .send(Message::Task(Box::new(task)))
            .map_err(|_| VisError::DispatcherClosed)
    }

    /// Run `task` on the GUI thread and wait for its result.
    ///
    /// Must not be called from the GUI thread itself; that would always time out.
    pub fn call<R, F>(&self, task: F, timeout: Duration) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut E) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = bounded(1);
        self.post(move |engine| {
            let _ = reply_tx.send(task(engine));
        })?;
        match reply_rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => Err(VisError::DispatcherTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(VisError::DispatcherClosed),
        }
    }

    /// Ask the event loop to return after the tasks already queued.
    pub fn close(&self) -> Result<()> {
        self.tx
            .send(Message::Close)
            .map_err(|_| VisError::DispatcherClosed)
    }

    /// Number of messages waiting to be processed.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    /// True when called from the thread running the event loop.
    pub fn on_gui_thread(&self) -> bool {
        self.gui_thread.get() == Some(&thread::current().id())
    }
}

/// Receiving end of the queue, owned by the GUI thread.
pub struct GuiEventLoop<E> {
    rx: Receiver<Message<E>>,
    gui_thread: Arc<OnceLock<ThreadId>>,
}

impl<E: 'static> GuiEventLoop<E> {
    /// Run queued tasks until closed. Blocks the calling thread, which becomes
    /// the GUI thread.
    ///
    /// Returns the number of tasks executed. Tasks still queued behind the
    /// close message are dropped without running.
    pub fn run(self, engine: &mut E) -> usize {
        let _ = self.gui_thread.set(thread::current().id());

        let mut executed = 0;
        for message in self.rx.iter() {
            match message {
                Message::Task(task) => {
                    task(engine);
                    executed += 1;
                }
                Message::Close => break,
            }
        }

        debug!("GUI event loop exiting after {} tasks", executed);
        executed
    }
}
