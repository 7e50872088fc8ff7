use std::{convert::Infallible, path::PathBuf, thread};

use anyhow::Context;
use tracing::{debug, info};

use lightswitch_common::{
    format_epoch, AlarmEngine, Connectivity, DailyTime, OutputActuator, OutputLevel, RuntimeConfig,
    Scheduler, SystemClock, ThreadSleeper, TimeSource,
};

/// Stands in for the relay GPIO and logs every write.
struct SimulatedRelay {
    pin: i32,
    level: Option<OutputLevel>,
}

impl OutputActuator for SimulatedRelay {
    type Error = Infallible;

    fn set_level(&mut self, level: OutputLevel) -> Result<(), Self::Error> {
        if self.level != Some(level) {
            info!("GPIO{} -> {}", self.pin, level.as_str());
        }
        self.level = Some(level);
        Ok(())
    }
}

/// The desktop is assumed to stay online.
struct HostNetwork;

impl Connectivity for HostNetwork {
    type Error = Infallible;

    fn is_connected(&mut self) -> bool {
        true
    }

    fn begin_connect(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn power_down(&mut self) {
        debug!("radio power down skipped on host");
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_config(|key| std::env::var(key).ok())?;
    config.validate().context("invalid runtime config")?;

    let schedule = &config.schedule;
    let clock = SystemClock::new(schedule.utc_offset_secs);
    info!(
        "light switch simulation: on {}, off {}, utc offset {}s, local time {}",
        schedule.on_time,
        schedule.off_time,
        schedule.utc_offset_secs,
        clock.now().map(format_epoch).unwrap_or_default(),
    );

    let mut scheduler = Scheduler::new(
        AlarmEngine::new(schedule.on_time, schedule.off_time),
        clock,
        SimulatedRelay {
            pin: schedule.switch_pin,
            level: None,
        },
        HostNetwork,
        ThreadSleeper,
        config.network.connect_retry,
        config.scheduler.clone(),
    );

    // Plain thread so Ctrl-C can end the process mid-sleep.
    thread::Builder::new()
        .name("scheduler".into())
        .spawn(move || {
            scheduler.run();
        })
        .context("failed to spawn scheduler thread")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    Ok(())
}

fn load_config(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<RuntimeConfig> {
    let mut config = match env("LIGHTSWITCH_CONFIG") {
        Some(path) => {
            let path = PathBuf::from(path);
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => RuntimeConfig::default(),
    };

    if let Some(value) = env("LIGHT_ON") {
        config.schedule.on_time = value.parse::<DailyTime>().context("invalid LIGHT_ON")?;
    }
    if let Some(value) = env("LIGHT_OFF") {
        config.schedule.off_time = value.parse::<DailyTime>().context("invalid LIGHT_OFF")?;
    }
    if let Some(value) = env("UTC_OFFSET_SECS") {
        config.schedule.utc_offset_secs = value.parse::<i32>().context("invalid UTC_OFFSET_SECS")?;
    }

    Ok(config)
}
