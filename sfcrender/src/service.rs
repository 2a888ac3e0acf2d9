//! # Render service
//!
//! Render and delete requests arrive independently from many callers. The service hands them to
//! a fixed pool of worker threads over a bounded channel. Every submission returns a
//! [`PendingRender`], on which the caller blocks with an explicit timeout.

use crate::render::{CreateRequest, RenderedPaths, RspRenderer};
use crate::Error;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::*;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Requests waiting for a worker before `submit` blocks.
pub const QUEUE_DEPTH: usize = 1024;

enum Job {
    Create(CreateRequest, Sender<Result<RenderedPaths, Error>>),
    Delete(String, Sender<Result<(), Error>>),
}

/// Answer to a submitted request.
#[derive(Debug)]
pub struct PendingRender<T> {
    receiver: Receiver<Result<T, Error>>,
}

impl<T> PendingRender<T> {
    /// Block until the request is done, at most `timeout`.
    pub fn wait(self, timeout: Duration) -> Result<T, Error> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::RequestTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ServiceStopped),
        }
    }
}

/// Worker pool in front of a [`RspRenderer`].
#[derive(Debug)]
pub struct RenderService {
    renderer: Arc<RspRenderer>,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl RenderService {
    /// Start as many workers as the renderer configuration asks for.
    pub fn start(renderer: Arc<RspRenderer>) -> Self {
        let workers = renderer.config().workers();
        Self::with_workers(renderer, workers)
    }

    pub fn with_workers(renderer: Arc<RspRenderer>, workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = bounded::<Job>(QUEUE_DEPTH);
        let handles = (0..workers)
            .map(|id| {
                let renderer = renderer.clone();
                let receiver = receiver.clone();
                thread::spawn(move || Self::worker_loop(id, renderer, receiver))
            })
            .collect();
        info!("Render service started with {} workers", workers);
        Self { renderer, sender: Some(sender), workers: handles }
    }

    fn worker_loop(id: usize, renderer: Arc<RspRenderer>, receiver: Receiver<Job>) {
        // ends once every sender is gone and the queue is drained
        for job in receiver.iter() {
            match job {
                Job::Create(request, reply) => {
                    trace!("Worker {} renders {}", id, request.path_spec);
                    if reply.send(renderer.create_rendered_path(&request)).is_err() {
                        debug!("Caller of {} stopped waiting", request.path_spec);
                    }
                }
                Job::Delete(name, reply) => {
                    trace!("Worker {} deletes {}", id, name);
                    if reply.send(renderer.delete_rendered_path(&name)).is_err() {
                        debug!("Caller of delete {} stopped waiting", name);
                    }
                }
            }
        }
        trace!("Worker {} stopped", id);
    }

    fn enqueue(&self, job: Job) -> Result<(), Error> {
        match &self.sender {
            Some(sender) => sender.send(job).map_err(|_| Error::ServiceStopped),
            None => Err(Error::ServiceStopped),
        }
    }

    /// Queue a render request.
    pub fn submit(&self, request: CreateRequest) -> Result<PendingRender<RenderedPaths>, Error> {
        let (reply, receiver) = bounded(1);
        self.enqueue(Job::Create(request, reply))?;
        Ok(PendingRender { receiver })
    }

    /// Queue the deletion of a rendered path.
    pub fn submit_delete(&self, name: impl Into<String>) -> Result<PendingRender<()>, Error> {
        let (reply, receiver) = bounded(1);
        self.enqueue(Job::Delete(name.into(), reply))?;
        Ok(PendingRender { receiver })
    }

    pub fn renderer(&self) -> &Arc<RspRenderer> {
        &self.renderer
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting requests, finish the queued ones and join the workers.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("A render worker panicked");
            }
        }
    }
}

impl Drop for RenderService {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Create(request, _) => write!(f, "Create({})", request.path_spec),
            Job::Delete(name, _) => write!(f, "Delete({})", name),
        }
    }
}
