/// Recommended error type for code driving a run. Setup failures, such as an unreadable script or
/// a worker binary that cannot be found, are reported through this type while failures during a run
/// are delivered as [crate::prelude::CoordinatorEvent::Error].
pub type SurgeResult<T> = anyhow::Result<T>;
