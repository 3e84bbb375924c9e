use std::env;
use std::num::NonZeroUsize;

use anyhow::{anyhow, bail, Context};

use crate::types::SurgeResult;

/// Environment variable that sets the number of worker processes when none is given explicitly.
pub const POOL_SIZE_ENV: &str = "SURGE_WORKERS";

/// The number of worker processes to spawn for a run. Never zero, because a run without workers
/// would never complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSize(NonZeroUsize);

impl Default for PoolSize {
    fn default() -> Self {
        Self(NonZeroUsize::MIN)
    }
}

impl PoolSize {
    pub fn new(workers: usize) -> SurgeResult<Self> {
        NonZeroUsize::new(workers)
            .map(Self)
            .ok_or_else(|| anyhow!("The worker pool needs at least one worker"))
    }

    /// Read the pool size from [POOL_SIZE_ENV], using a single worker if it is not set.
    pub fn from_env() -> SurgeResult<Self> {
        match env::var(POOL_SIZE_ENV) {
            Ok(value) => parse_pool_size(Some(&value)),
            Err(env::VarError::NotPresent) => parse_pool_size(None),
            Err(e) => Err(e).with_context(|| format!("Cannot read '{POOL_SIZE_ENV}'")),
        }
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

fn parse_pool_size(value: Option<&str>) -> SurgeResult<PoolSize> {
    match value.map(str::trim) {
        None => Ok(PoolSize::default()),
        Some("") => bail!("'{POOL_SIZE_ENV}' is set to an empty string"),
        Some(value) => {
            let workers = value.parse::<usize>().with_context(|| {
                format!("'{POOL_SIZE_ENV}={value}' is not a valid number of workers")
            })?;
            PoolSize::new(workers)
        }
    }
}
