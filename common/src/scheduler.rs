use std::time::Duration;

use log::{info, warn};

use crate::{
    alarm::AlarmEngine,
    config::{LoopConfig, RetryPolicy},
    error::SchedulerError,
    platform::{Connectivity, OutputActuator, Sleeper, TimeSource},
    types::{Decision, Transition},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fired(Transition),
    Slept(Duration),
}

pub struct Scheduler<C, A, N, S> {
    engine: AlarmEngine,
    clock: C,
    actuator: A,
    network: N,
    sleeper: S,
    connect_retry: RetryPolicy,
    config: LoopConfig,
}

impl<C, A, N, S> Scheduler<C, A, N, S>
where
    C: TimeSource,
    A: OutputActuator,
    N: Connectivity,
    S: Sleeper,
{
    pub fn new(
        engine: AlarmEngine,
        clock: C,
        actuator: A,
        network: N,
        sleeper: S,
        connect_retry: RetryPolicy,
        config: LoopConfig,
    ) -> Self {
        Self {
            engine,
            clock,
            actuator,
            network,
            sleeper,
            connect_retry,
            config,
        }
    }

    pub fn engine(&self) -> &AlarmEngine {
        &self.engine
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn start(&mut self) -> Result<Transition, SchedulerError> {
        self.ensure_connected()?;
        let now = self.wait_for_sync()?;

        let transition = self
            .engine
            .initialize(&mut self.actuator, now)
            .map_err(|err| SchedulerError::Actuator(Box::new(err)))?;
        info!(
            "schedule armed: on at {}, off at {}, output {}",
            self.engine.on_time(),
            self.engine.off_time(),
            self.engine.expected_level().as_str()
        );

        self.sleeper.sleep(self.config.startup_delay());
        Ok(transition)
    }

    pub fn run_iteration(&mut self) -> Result<Step, SchedulerError> {
        self.ensure_connected()?;
        self.clock.refresh();
        let now = self.clock.now().ok_or(SchedulerError::NotSynced)?;

        match self.engine.evaluate(now) {
            Decision::Fire => {
                let transition = self
                    .engine
                    .fire(&mut self.actuator, now)
                    .map_err(|err| SchedulerError::Actuator(Box::new(err)))?;
                Ok(Step::Fired(transition))
            }
            Decision::Wait(remaining) => {
                let duration = self.config.sleep_for(remaining);
                info!("set alarm in {remaining} seconds");
                if duration.as_secs() < remaining {
                    info!("sleep capped at {}s", duration.as_secs());
                }

                self.network.power_down();
                self.sleeper.sleep(duration);
                Ok(Step::Slept(duration))
            }
        }
    }

    pub fn run(&mut self) -> ! {
        while let Err(err) = self.start() {
            warn!("scheduler startup failed: {err}");
            self.sleeper.sleep(self.config.sync_retry.interval());
        }

        loop {
            if let Err(err) = self.run_iteration() {
                warn!("scheduler iteration failed: {err}");
                self.sleeper.sleep(self.config.sync_retry.interval());
            }
        }
    }

    fn ensure_connected(&mut self) -> Result<(), SchedulerError> {
        if self.network.is_connected() {
            return Ok(());
        }

        info!("connecting to network");
        self.network
            .begin_connect()
            .map_err(|err| SchedulerError::Connectivity(Box::new(err)))?;

        let mut attempt = 0_u32;
        loop {
            attempt = attempt.saturating_add(1);
            if !self.connect_retry.allows(attempt) {
                return Err(SchedulerError::ConnectivityExhausted {
                    attempts: attempt - 1,
                });
            }

            self.sleeper.sleep(self.connect_retry.interval());
            if self.network.is_connected() {
                info!("network connected after {attempt} checks");
                return Ok(());
            }
            info!("waiting for network ({attempt})");
        }
    }

    fn wait_for_sync(&mut self) -> Result<i64, SchedulerError> {
        let retry = self.config.sync_retry;
        let mut attempt = 1_u32;
        loop {
            if self.clock.refresh() {
                if let Some(now) = self.clock.now() {
                    return Ok(now);
                }
            }

            attempt = attempt.saturating_add(1);
            if !retry.allows(attempt) {
                return Err(SchedulerError::NotSynced);
            }
            warn!("time not synced yet, retrying in {}ms", retry.interval_ms);
            self.sleeper.sleep(retry.interval());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, convert::Infallible, fmt, rc::Rc};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::DailyTime,
        types::{DesiredState, OutputLevel},
    };

    #[derive(Clone)]
    struct SimTime(Rc<Cell<i64>>);

    impl SimTime {
        fn get(&self) -> i64 {
            self.0.get()
        }

        fn set(&self, epoch: i64) {
            self.0.set(epoch);
        }
    }

    struct MockClock {
        time: SimTime,
        syncs_needed: u32,
    }

    impl TimeSource for MockClock {
        fn refresh(&mut self) -> bool {
            self.syncs_needed = self.syncs_needed.saturating_sub(1);
            self.syncs_needed == 0
        }

        fn now(&self) -> Option<i64> {
            (self.syncs_needed == 0).then(|| self.time.get())
        }
    }

    #[derive(Default)]
    struct MockRelay {
        writes: Vec<OutputLevel>,
        broken: bool,
    }

    #[derive(Debug)]
    struct RelayStuck;

    impl fmt::Display for RelayStuck {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("relay stuck")
        }
    }

    impl std::error::Error for RelayStuck {}

    impl OutputActuator for MockRelay {
        type Error = RelayStuck;

        fn set_level(&mut self, level: OutputLevel) -> Result<(), Self::Error> {
            if self.broken {
                return Err(RelayStuck);
            }
            self.writes.push(level);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockNetwork {
        offline_checks: u32,
        connects: u32,
        power_downs: u32,
    }

    impl Connectivity for MockNetwork {
        type Error = Infallible;

        fn is_connected(&mut self) -> bool {
            if self.offline_checks == 0 {
                return true;
            }
            self.offline_checks -= 1;
            false
        }

        fn begin_connect(&mut self) -> Result<(), Self::Error> {
            self.connects += 1;
            Ok(())
        }

        fn power_down(&mut self) {
            self.power_downs += 1;
        }
    }

    struct MockSleeper {
        time: SimTime,
        slept: Vec<Duration>,
    }

    impl Sleeper for MockSleeper {
        fn sleep(&mut self, duration: Duration) {
            self.time.set(self.time.get() + duration.as_secs() as i64);
            self.slept.push(duration);
        }
    }

    type TestScheduler = Scheduler<MockClock, MockRelay, MockNetwork, MockSleeper>;

    fn scheduler(now: i64, network: MockNetwork, config: LoopConfig) -> (TestScheduler, SimTime) {
        let time = SimTime(Rc::new(Cell::new(now)));
        let engine = AlarmEngine::new(
            DailyTime::new(19, 30).unwrap(),
            DailyTime::new(23, 0).unwrap(),
        );
        let scheduler = Scheduler::new(
            engine,
            MockClock {
                time: time.clone(),
                syncs_needed: 0,
            },
            MockRelay::default(),
            network,
            MockSleeper {
                time: time.clone(),
                slept: Vec::new(),
            },
            RetryPolicy::unbounded(500),
            config,
        );
        (scheduler, time)
    }

    fn quiet_config() -> LoopConfig {
        LoopConfig {
            startup_delay_ms: 0,
            ..LoopConfig::default()
        }
    }

    #[test]
    fn start_forces_output_off() {
        let (mut scheduler, _) = scheduler(0, MockNetwork::default(), quiet_config());

        let transition = scheduler.start().unwrap();

        assert_eq!(transition.level, OutputLevel::Inactive);
        assert_eq!(scheduler.actuator().writes, vec![OutputLevel::Inactive]);
        assert_eq!(scheduler.engine().next_alarm_epoch(), 70_200);
    }

    #[test]
    fn waits_full_remaining_time_in_one_sleep() {
        let (mut scheduler, time) = scheduler(0, MockNetwork::default(), quiet_config());
        scheduler.start().unwrap();

        let step = scheduler.run_iteration().unwrap();

        assert_eq!(step, Step::Slept(Duration::from_secs(70_200)));
        assert_eq!(time.get(), 70_200);
        assert_eq!(scheduler.network().power_downs, 1);
        assert_eq!(scheduler.actuator().writes.len(), 1);
    }

    #[test]
    fn runs_a_full_day() {
        let (mut scheduler, time) = scheduler(0, MockNetwork::default(), quiet_config());
        scheduler.start().unwrap();

        let mut fired = Vec::new();
        while time.get() < 86_400 {
            if let Step::Fired(transition) = scheduler.run_iteration().unwrap() {
                fired.push((time.get(), transition.applied));
            }
            // Wake exactly on the alarm, then tick a second past it.
            if scheduler.engine().evaluate(time.get()) == Decision::Wait(0) {
                time.set(time.get() + 1);
            }
        }

        assert_eq!(
            fired,
            vec![(70_201, DesiredState::On), (82_801, DesiredState::Off)]
        );
        assert_eq!(
            scheduler.actuator().writes,
            vec![
                OutputLevel::Inactive,
                OutputLevel::Active,
                OutputLevel::Inactive
            ]
        );
        assert_eq!(scheduler.engine().next_alarm_epoch(), 156_600);
    }

    #[test]
    fn overdue_alarm_fires_without_sleeping() {
        let (mut scheduler, time) = scheduler(0, MockNetwork::default(), quiet_config());
        scheduler.start().unwrap();
        time.set(90_000);

        let step = scheduler.run_iteration().unwrap();

        assert!(matches!(step, Step::Fired(t) if t.applied == DesiredState::On));
        assert_eq!(scheduler.engine().next_alarm_epoch(), 82_800 + 86_400);
        assert!(scheduler.sleeper.slept.iter().all(Duration::is_zero));
    }

    #[test]
    fn caps_long_sleeps() {
        let config = LoopConfig {
            max_sleep_secs: Some(3_600),
            ..quiet_config()
        };
        let (mut scheduler, time) = scheduler(0, MockNetwork::default(), config);
        scheduler.start().unwrap();

        assert_eq!(
            scheduler.run_iteration().unwrap(),
            Step::Slept(Duration::from_secs(3_600))
        );
        assert_eq!(time.get(), 3_600);
        assert_eq!(
            scheduler.run_iteration().unwrap(),
            Step::Slept(Duration::from_secs(3_600))
        );
    }

    #[test]
    fn reconnects_before_evaluating() {
        let network = MockNetwork {
            offline_checks: 3,
            ..MockNetwork::default()
        };
        let (mut scheduler, _) = scheduler(0, network, quiet_config());

        scheduler.start().unwrap();

        assert_eq!(scheduler.network().connects, 1);
        assert_eq!(
            scheduler.sleeper.slept[..3].to_vec(),
            vec![Duration::from_millis(500); 3]
        );
    }

    #[test]
    fn bounded_connect_retry_gives_up() {
        let network = MockNetwork {
            offline_checks: 100,
            ..MockNetwork::default()
        };
        let (mut scheduler, _) = scheduler(0, network, quiet_config());
        scheduler.connect_retry = RetryPolicy::bounded(500, 4);

        let err = scheduler.run_iteration().unwrap_err();

        assert!(matches!(
            err,
            SchedulerError::ConnectivityExhausted { attempts: 4 }
        ));
        assert_eq!(scheduler.sleeper.slept.len(), 4);
    }

    #[test]
    fn unsynced_clock_fails_fast() {
        let (mut scheduler, _) = scheduler(0, MockNetwork::default(), quiet_config());
        scheduler.clock.syncs_needed = 5;

        let err = scheduler.run_iteration().unwrap_err();

        assert!(matches!(err, SchedulerError::NotSynced));
        assert!(scheduler.actuator().writes.is_empty());
    }

    #[test]
    fn start_waits_for_first_sync() {
        let config = LoopConfig {
            sync_retry: RetryPolicy::bounded(1_000, 5),
            ..quiet_config()
        };
        let (mut scheduler, _) = scheduler(0, MockNetwork::default(), config);
        scheduler.clock.syncs_needed = 3;

        scheduler.start().unwrap();

        // Two failed refreshes, one sleep each, then the zero startup delay.
        assert_eq!(
            scheduler.sleeper.slept,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(1),
                Duration::ZERO
            ]
        );
        assert_eq!(scheduler.engine().next_alarm_epoch(), 70_200);
    }

    #[test]
    fn start_gives_up_when_sync_is_bounded() {
        let config = LoopConfig {
            sync_retry: RetryPolicy::bounded(1_000, 2),
            ..quiet_config()
        };
        let (mut scheduler, _) = scheduler(0, MockNetwork::default(), config);
        scheduler.clock.syncs_needed = 10;

        assert!(matches!(scheduler.start(), Err(SchedulerError::NotSynced)));
        assert!(scheduler.actuator().writes.is_empty());
    }

    #[test]
    fn actuator_failure_is_reported_and_retried() {
        let (mut scheduler, time) = scheduler(0, MockNetwork::default(), quiet_config());
        scheduler.start().unwrap();
        time.set(70_201);
        scheduler.actuator.broken = true;

        let err = scheduler.run_iteration().unwrap_err();
        assert!(matches!(err, SchedulerError::Actuator(_)));
        assert_eq!(scheduler.engine().desired_state(), DesiredState::On);

        scheduler.actuator.broken = false;
        let step = scheduler.run_iteration().unwrap();
        assert!(matches!(step, Step::Fired(t) if t.level == OutputLevel::Active));
    }
}
