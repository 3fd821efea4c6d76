use std::{fmt::Display, str::FromStr, thread, time::Duration};

use crate::errors::BPError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerType {
    Priority,      // run one vertex per dispatch
    Splash(usize), // run a breadth-first tree of at most this many vertices per dispatch
}

impl FromStr for SchedulerType {
    type Err = BPError;

    // Accepts "priority", "splash" and "splash(<size>)"
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            BPError::invalid_config(format!(
                "unknown scheduler \"{}\", options are {{priority, splash(<size>)}}",
                name
            ))
        };
        match name {
            "priority" => Ok(SchedulerType::Priority),
            "splash" => Ok(SchedulerType::Splash(100)),
            _ => {
                let size = name
                    .strip_prefix("splash(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(invalid)?;
                size.trim()
                    .parse()
                    .map(SchedulerType::Splash)
                    .map_err(|_| invalid())
            }
        }
    }
}

impl Display for SchedulerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerType::Priority => write!(f, "priority"),
            SchedulerType::Splash(size) => write!(f, "splash({})", size),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    bound: f64,            // residual above which the receiving vertex is rescheduled
    damping: f64,          // weight of the previous message when damping
    max_updates: usize,    // cap on the total number of vertex updates
    time_max: Duration,    // cap on the wall-clock running time
    num_workers: usize,
    scheduler: SchedulerType,
    initial_priority: f64, // priority every vertex is seeded with
}

impl EngineOptions {
    pub fn default() -> Self {
        EngineOptions {
            bound: 1e-15,
            damping: 0.1,
            max_updates: 10_000_000,
            time_max: Duration::new(20 * 60, 0), // 20 minutes
            num_workers: thread::available_parallelism().map_or(1, |workers| workers.get()),
            scheduler: SchedulerType::Splash(100),
            initial_priority: 100.,
        }
    }

    pub fn set_bound(&mut self, value: f64) -> &mut Self {
        self.bound = value;
        self
    }

    pub fn set_damping(&mut self, value: f64) -> &mut Self {
        self.damping = value;
        self
    }

    pub fn set_max_updates(&mut self, value: usize) -> &mut Self {
        self.max_updates = value;
        self
    }

    pub fn set_time_max(&mut self, value: Duration) -> &mut Self {
        self.time_max = value;
        self
    }

    pub fn set_num_workers(&mut self, value: usize) -> &mut Self {
        self.num_workers = value;
        self
    }

    pub fn set_scheduler(&mut self, value: SchedulerType) -> &mut Self {
        self.scheduler = value;
        self
    }

    pub fn set_initial_priority(&mut self, value: f64) -> &mut Self {
        self.initial_priority = value;
        self
    }

    pub fn bound(&self) -> f64 {
        self.bound
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    pub fn max_updates(&self) -> usize {
        self.max_updates
    }

    pub fn time_max(&self) -> Duration {
        self.time_max
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn scheduler(&self) -> SchedulerType {
        self.scheduler
    }

    pub fn initial_priority(&self) -> f64 {
        self.initial_priority
    }

    pub fn validate(&self) -> Result<(), BPError> {
        if !(0. ..=1.).contains(&self.damping) {
            return Err(BPError::invalid_config(format!(
                "damping must lie in [0, 1], got {}",
                self.damping
            )));
        }
        if !(self.bound >= 0.) {
            return Err(BPError::invalid_config(format!(
                "bound must be non-negative, got {}",
                self.bound
            )));
        }
        if self.num_workers == 0 {
            return Err(BPError::invalid_config("at least one worker is required"));
        }
        if self.scheduler == SchedulerType::Splash(0) {
            return Err(BPError::invalid_config("splash size must be positive"));
        }
        if !(self.initial_priority > 0.) {
            return Err(BPError::invalid_config(format!(
                "initial priority must be positive, got {}",
                self.initial_priority
            )));
        }
        Ok(())
    }
}
