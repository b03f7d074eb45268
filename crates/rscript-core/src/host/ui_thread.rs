//! A dedicated thread standing in for a host's UI thread.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use super::{HostError, UiCallback, UiDispatcher};

/// Runs posted callbacks one at a time, in order, on a single named thread.
pub struct UiThread {
    sender: Mutex<Option<Sender<UiCallback>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl UiThread {
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<UiCallback>();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            for callback in receiver {
                if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
                    tracing::error!("UI callback panicked");
                }
            }
        })?;
        let thread_id = handle.thread().id();

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
            thread_id,
        })
    }

    /// Id of the UI thread, to assert where code runs.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Stop accepting callbacks, let queued ones finish and join the thread.
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!("UI thread terminated abnormally");
            }
        }
    }
}

impl UiDispatcher for UiThread {
    fn run_on_ui_thread(&self, callback: UiCallback) -> Result<(), HostError> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(HostError::DispatcherUnavailable("UI thread has shut down".to_string()));
        };
        sender
            .send(callback)
            .map_err(|_| HostError::DispatcherUnavailable("UI thread has exited".to_string()))
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn test_callbacks_run_in_order_on_ui_thread() {
        let ui = UiThread::spawn("test-ui").unwrap();
        let (tx, rx) = channel();
        for i in 0..3 {
            let tx = tx.clone();
            ui.run_on_ui_thread(Box::new(move || {
                tx.send((i, thread::current().id())).unwrap();
            }))
            .unwrap();
        }

        let seen: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(seen.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(seen.iter().all(|(_, id)| *id == ui.thread_id()));
    }

    #[test]
    fn test_panicking_callback_keeps_thread_alive() {
        let ui = UiThread::spawn("test-ui").unwrap();
        ui.run_on_ui_thread(Box::new(|| panic!("boom"))).unwrap();

        let (tx, rx) = channel();
        ui.run_on_ui_thread(Box::new(move || tx.send(()).unwrap())).unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_post_after_shutdown_fails() {
        let ui = UiThread::spawn("test-ui").unwrap();
        ui.shutdown();
        let err = ui.run_on_ui_thread(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, HostError::DispatcherUnavailable(_)));
    }
}
