use std::sync::Arc;

use kelp_consensus::validation_error::ErrorCode;
use tokio::sync::Semaphore;

/// Executor for the CPU-heavy part of transaction validation. Work is
/// offloaded to the runtime's blocking thread pool, with a semaphore keeping
/// the number of in-flight validations small (further submissions queue on
/// the semaphore). A single-threaded configuration runs the work inline on
/// the caller, with identical semantics.
#[derive(Debug)]
pub enum ValidationPool {
    Inline,
    Workers { permits: Arc<Semaphore> },
}

impl ValidationPool {
    pub fn new(max_concurrency: usize) -> Self {
        Self::Workers {
            permits: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    pub fn inline() -> Self {
        Self::Inline
    }

    /// Run a validation job. A job that panics surfaces as
    /// `ErrorCode::Unknown`.
    pub async fn run<T, F>(&self, job: F) -> Result<T, ErrorCode>
    where
        F: FnOnce() -> Result<T, ErrorCode> + Send + 'static,
        T: Send + 'static,
    {
        match self {
            Self::Inline => job(),
            Self::Workers { permits } => {
                let _permit = permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| ErrorCode::Unknown)?;
                tokio::task::spawn_blocking(job)
                    .await
                    .map_err(|_| ErrorCode::Unknown)?
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_runs_on_caller() {
        let pool = ValidationPool::inline();
        let result = pool.run(|| Ok(40 + 2)).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn workers_run_jobs() {
        let pool = ValidationPool::new(2);
        let result = pool.run(|| Ok("done")).await;
        assert_eq!(result, Ok("done"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panics_surface_as_unknown() {
        let pool = ValidationPool::new(2);
        let result: Result<(), ErrorCode> = pool.run(|| panic!("worker crashed")).await;
        assert_eq!(result, Err(ErrorCode::Unknown));
    }

    #[tokio::test]
    async fn errors_propagate() {
        let pool = ValidationPool::inline();
        let result: Result<(), ErrorCode> = pool.run(|| Err(ErrorCode::CostExceeded)).await;
        assert_eq!(result, Err(ErrorCode::CostExceeded));
    }
}
