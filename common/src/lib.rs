pub mod alarm;
pub mod config;
pub mod error;
pub mod platform;
pub mod schedule;
pub mod scheduler;
pub mod types;

pub use alarm::AlarmEngine;
pub use config::{
    DailyTime, LoopConfig, NetworkConfig, RetryPolicy, RuntimeConfig, ScheduleConfig,
};
pub use error::{ConfigError, SchedulerError};
pub use platform::{
    Connectivity, OutputActuator, Sleeper, SystemClock, ThreadSleeper, TimeSource,
};
pub use schedule::{format_epoch, next_occurrence, start_of_day, SECONDS_PER_DAY};
pub use scheduler::{Scheduler, Step};
pub use types::{Decision, DesiredState, OutputLevel, Transition};
