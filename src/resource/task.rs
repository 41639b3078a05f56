use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::{ResourceError, ResourceManager};

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Background load of one or more resource sets.
///
/// Dropping the task cancels it and waits for the worker to stop.
pub struct LoadTask {
    token: CancellationToken,
    handle: Option<JoinHandle<Result<usize, ResourceError>>>,
}

impl LoadTask {
    pub fn spawn(manager: Arc<ResourceManager>, sets: Vec<u32>) -> Result<Self, ResourceError> {
        let token = CancellationToken::new();
        let worker_token = token.clone();

        let handle = thread::Builder::new()
            .name("resource-loader".to_string())
            .spawn(move || {
                let mut total = 0;
                for set in sets {
                    total += manager.load_resource_set(set, &worker_token)?;
                }
                debug!(total, "resource loader finished");
                Ok(total)
            })
            .map_err(|e| ResourceError::Worker(e.to_string()))?;

        Ok(Self {
            token,
            handle: Some(handle),
        })
    }

    /// Non-blocking. Yields the outcome exactly once, after the worker exits.
    pub fn poll(&mut self) -> Option<Result<usize, ResourceError>> {
        if !self.handle.as_ref()?.is_finished() {
            return None;
        }
        self.handle.take().map(join)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Block until the worker exits.
    pub fn wait(mut self) -> Result<usize, ResourceError> {
        match self.handle.take() {
            Some(handle) => join(handle),
            None => Err(ResourceError::Worker("result already taken".to_string())),
        }
    }
}

fn join(handle: JoinHandle<Result<usize, ResourceError>>) -> Result<usize, ResourceError> {
    handle
        .join()
        .unwrap_or_else(|_| Err(ResourceError::Worker("loader thread panicked".to_string())))
}

impl Drop for LoadTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.token.cancel();
            if let Err(e) = join(handle) {
                if !matches!(e, ResourceError::Cancelled) {
                    warn!("resource loader stopped with error: {}", e);
                }
            }
        }
    }
}
