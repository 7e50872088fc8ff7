use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DailyTime {
    hour: u8,
    minute: u8,
}

impl DailyTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, ConfigError> {
        if hour > 23 {
            return Err(ConfigError::HourOutOfRange(hour));
        }
        if minute > 59 {
            return Err(ConfigError::MinuteOutOfRange(minute));
        }
        Ok(Self { hour, minute })
    }

    pub fn seconds_from_midnight(self) -> i64 {
        self.hour as i64 * 3_600 + self.minute as i64 * 60
    }
}

impl fmt::Display for DailyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for DailyTime {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidTime(value.to_string());
        let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for DailyTime {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DailyTime> for String {
    fn from(value: DailyTime) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub on_time: DailyTime,
    pub off_time: DailyTime,
    pub utc_offset_secs: i32,
    pub switch_pin: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            on_time: DailyTime {
                hour: 19,
                minute: 30,
            },
            off_time: DailyTime {
                hour: 23,
                minute: 0,
            },
            utc_offset_secs: 3_600,
            switch_pin: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub interval_ms: u64,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            max_attempts: None,
        }
    }

    pub fn bounded(interval_ms: u64, max_attempts: u32) -> Self {
        Self {
            interval_ms,
            max_attempts: Some(max_attempts),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub connect_retry: RetryPolicy,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            connect_retry: RetryPolicy::unbounded(500),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    pub startup_delay_ms: u64,
    #[serde(default)]
    pub max_sleep_secs: Option<u64>,
    pub sync_retry: RetryPolicy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            startup_delay_ms: 1_000,
            max_sleep_secs: None,
            sync_retry: RetryPolicy::unbounded(1_000),
        }
    }
}

impl LoopConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn sleep_for(&self, remaining_secs: u64) -> Duration {
        let secs = match self.max_sleep_secs {
            Some(max) => remaining_secs.min(max),
            None => remaining_secs,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub scheduler: LoopConfig,
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let schedule = &self.schedule;
        if schedule.on_time == schedule.off_time {
            return Err(ConfigError::IdenticalTargets(schedule.on_time.to_string()));
        }
        if schedule.utc_offset_secs.unsigned_abs() >= 86_400 {
            return Err(ConfigError::OffsetOutOfRange(schedule.utc_offset_secs));
        }
        if schedule.switch_pin < 0 {
            return Err(ConfigError::InvalidPin(schedule.switch_pin));
        }
        Ok(())
    }
}
