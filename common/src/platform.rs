use std::{error::Error, time::Duration};

use chrono::Utc;

use crate::types::OutputLevel;

pub trait TimeSource {
    fn refresh(&mut self) -> bool;

    // None until the first successful sync.
    fn now(&self) -> Option<i64>;
}

pub trait OutputActuator {
    type Error: Error + Send + Sync + 'static;

    fn set_level(&mut self, level: OutputLevel) -> Result<(), Self::Error>;
}

pub trait Connectivity {
    type Error: Error + Send + Sync + 'static;

    fn is_connected(&mut self) -> bool;

    fn begin_connect(&mut self) -> Result<(), Self::Error>;

    fn power_down(&mut self);
}

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    utc_offset_secs: i32,
}

impl SystemClock {
    pub fn new(utc_offset_secs: i32) -> Self {
        Self { utc_offset_secs }
    }

    pub fn epoch(&self) -> i64 {
        Utc::now().timestamp() + self.utc_offset_secs as i64
    }
}

impl TimeSource for SystemClock {
    fn refresh(&mut self) -> bool {
        true
    }

    fn now(&self) -> Option<i64> {
        Some(self.epoch())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
