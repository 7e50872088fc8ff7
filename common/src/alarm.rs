use log::info;

use crate::{
    config::DailyTime,
    platform::OutputActuator,
    schedule::{format_epoch, next_occurrence},
    types::{Decision, DesiredState, OutputLevel, Transition},
};

#[derive(Debug, Clone)]
pub struct AlarmEngine {
    on_time: DailyTime,
    off_time: DailyTime,

    desired: DesiredState,
    next_alarm_epoch: i64,
}

impl AlarmEngine {
    pub fn new(on_time: DailyTime, off_time: DailyTime) -> Self {
        Self {
            on_time,
            off_time,
            desired: DesiredState::On,
            next_alarm_epoch: 0,
        }
    }

    pub fn desired_state(&self) -> DesiredState {
        self.desired
    }

    pub fn next_alarm_epoch(&self) -> i64 {
        self.next_alarm_epoch
    }

    pub fn on_time(&self) -> DailyTime {
        self.on_time
    }

    pub fn off_time(&self) -> DailyTime {
        self.off_time
    }

    pub fn target_for(&self, state: DesiredState) -> DailyTime {
        match state {
            DesiredState::On => self.on_time,
            DesiredState::Off => self.off_time,
        }
    }

    pub fn initialize<A>(&mut self, actuator: &mut A, now: i64) -> Result<Transition, A::Error>
    where
        A: OutputActuator + ?Sized,
    {
        self.desired = DesiredState::Off;
        self.fire(actuator, now)
    }

    pub fn evaluate(&self, now: i64) -> Decision {
        if now > self.next_alarm_epoch {
            Decision::Fire
        } else {
            Decision::Wait(self.next_alarm_epoch.abs_diff(now))
        }
    }

    pub fn fire<A>(&mut self, actuator: &mut A, now: i64) -> Result<Transition, A::Error>
    where
        A: OutputActuator + ?Sized,
    {
        let applied = self.desired;
        let level = applied.level();

        info!("turn light {}", applied.as_str().to_lowercase());
        // State only advances once the write succeeded.
        actuator.set_level(level)?;

        let next_state = applied.opposite();
        let target = self.target_for(next_state);
        self.next_alarm_epoch = next_occurrence(now, target);
        self.desired = next_state;

        info!(
            "[now: {}] next alarm ({}) at {} ({})",
            now,
            target,
            self.next_alarm_epoch,
            format_epoch(self.next_alarm_epoch)
        );

        Ok(Transition {
            applied,
            level,
            next_state,
            next_alarm_epoch: self.next_alarm_epoch,
        })
    }

    pub fn expected_level(&self) -> OutputLevel {
        self.desired.opposite().level()
    }
}
