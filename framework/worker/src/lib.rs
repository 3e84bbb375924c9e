mod arrivals;
mod channel;
mod executor;
mod serve;
mod types;

pub mod prelude {
    pub use crate::arrivals::arrival_offsets;
    pub use crate::serve::serve;
    pub use crate::types::WorkerResult;
}
