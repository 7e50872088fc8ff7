use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid daily time `{0}`, expected HH:MM")]
    InvalidTime(String),
    #[error("hour {0} out of range (0-23)")]
    HourOutOfRange(u8),
    #[error("minute {0} out of range (0-59)")]
    MinuteOutOfRange(u8),
    #[error("on and off times are both {0}")]
    IdenticalTargets(String),
    #[error("utc offset {0}s must be less than one day")]
    OffsetOutOfRange(i32),
    #[error("invalid switch pin {0}")]
    InvalidPin(i32),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("time source has not synced yet")]
    NotSynced,
    #[error("network still down after {attempts} attempts")]
    ConnectivityExhausted { attempts: u32 },
    #[error("network connect failed: {0}")]
    Connectivity(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to drive output: {0}")]
    Actuator(#[source] Box<dyn std::error::Error + Send + Sync>),
}
