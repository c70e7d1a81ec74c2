//! Asynchronous write queue
//!
//! Writes are handed to a worker thread over a bounded channel, so at most
//! `depth` writes are in flight and the caller never waits on the device
//! unless the queue is full. `read` and `sync` are barriers: they wait for
//! every earlier write to complete, which keeps read-your-writes and lets a
//! caller order "write slot, sync, then supersede" explicitly.
//!
//! A failed write is reported by the next barrier. From then on the queue
//! is crashed: later writes are dropped and every read, write and sync
//! fails with `StoreError::Crashed`.

use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use crossbeam::channel::{bounded, Sender};
use parking_lot::Mutex;

use crate::error::{Result, StoreError};

use super::Storage;

enum Request {
    Write { offset: u64, data: Bytes },
    Barrier { done: Sender<()> },
}

/// First write failure seen by the worker
enum Failure {
    Pending(StoreError),
    Reported,
}

struct Shared {
    sender: Option<Sender<Request>>,
    failure: Arc<Mutex<Option<Failure>>>,
    worker: Option<JoinHandle<()>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// A device wrapper that issues writes asynchronously
#[derive(Clone)]
pub struct QueuedStorage<S: Storage + Send + 'static> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S: Storage + Send + 'static> QueuedStorage<S> {
    /// Wrap `inner` with a queue of at most `depth` in-flight writes
    pub fn new(inner: S, depth: usize) -> Self {
        let (sender, receiver) = bounded::<Request>(depth.max(1));
        let failure = Arc::new(Mutex::new(None));

        let device = inner.clone();
        let worker_failure = Arc::clone(&failure);
        let worker = std::thread::spawn(move || {
            for request in receiver {
                match request {
                    Request::Write { offset, data } => {
                        let mut slot = worker_failure.lock();
                        if slot.is_some() {
                            continue;
                        }
                        if let Err(err) = device.write(offset, &data) {
                            *slot = Some(Failure::Pending(err));
                        }
                    }
                    Request::Barrier { done } => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Self {
            inner,
            shared: Arc::new(Shared {
                sender: Some(sender),
                failure,
                worker: Some(worker),
            }),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail once any queued write has failed
    fn check(&self) -> Result<()> {
        let mut failure = self.shared.failure.lock();
        match failure.take() {
            None => Ok(()),
            Some(Failure::Pending(err)) => {
                *failure = Some(Failure::Reported);
                Err(err)
            }
            Some(Failure::Reported) => {
                *failure = Some(Failure::Reported);
                Err(StoreError::Crashed)
            }
        }
    }

    fn send(&self, request: Request) -> Result<()> {
        let sender = self
            .shared
            .sender
            .as_ref()
            .ok_or(StoreError::Crashed)?;
        sender.send(request).map_err(|_| StoreError::Crashed)
    }

    /// Wait for every queued write, then surface any failure
    fn barrier(&self) -> Result<()> {
        let (done, wait) = bounded(1);
        self.send(Request::Barrier { done })?;
        wait.recv().map_err(|_| StoreError::Crashed)?;
        self.check()
    }
}

impl<S: Storage + Send + 'static> Storage for QueuedStorage<S> {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.barrier()?;
        self.inner.read(offset, buf)
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.check()?;
        self.send(Request::Write {
            offset,
            data: Bytes::copy_from_slice(data),
        })
    }

    fn sync(&self) -> Result<()> {
        self.barrier()?;
        self.inner.sync()
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }
}
