/// The result type used by the worker.
pub type WorkerResult<T> = anyhow::Result<T>;
