use crate::error::SetupError;
use rand::Rng;
use std::fmt::Debug;
use std::time::Duration;

/// Decides how long a virtual user waits between iterations.
pub trait PacingPolicy: Debug + Send + Sync + 'static {
    fn next_delay(&self) -> Duration;
}

/// Start the next iteration straight away.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

impl PacingPolicy for NoPacing {
    fn next_delay(&self) -> Duration {
        Duration::ZERO
    }
}

/// Wait the same amount of time after every iteration.
#[derive(Debug, Clone, Copy)]
pub struct FixedPacing(pub Duration);

impl PacingPolicy for FixedPacing {
    fn next_delay(&self) -> Duration {
        self.0
    }
}

/// Wait a random amount of time, uniformly distributed in `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct UniformPacing {
    min: Duration,
    max: Duration,
}

impl UniformPacing {
    pub fn new(min: Duration, max: Duration) -> Result<Self, SetupError> {
        if min > max {
            return Err(SetupError::InvalidPacing { min, max });
        }
        Ok(Self { min, max })
    }
}

impl PacingPolicy for UniformPacing {
    fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }

        rand::thread_rng().gen_range(self.min..=self.max)
    }
}
