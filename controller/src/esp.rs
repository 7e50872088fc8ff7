use core::convert::TryInto;

use anyhow::{anyhow, Context};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    sntp::{EspSntp, SyncStatus},
    sys::EspError,
    wifi::EspWifi,
};
use log::{info, warn};

use lightswitch_common::{
    config::NetworkConfig, format_epoch, AlarmEngine, Connectivity, OutputActuator, OutputLevel,
    RuntimeConfig, Scheduler, SystemClock, ThreadSleeper, TimeSource,
};

struct RelayPin {
    pin: PinDriver<'static, AnyOutputPin, Output>,
}

impl OutputActuator for RelayPin {
    type Error = EspError;

    fn set_level(&mut self, level: OutputLevel) -> Result<(), Self::Error> {
        match level {
            OutputLevel::Active => self.pin.set_high(),
            OutputLevel::Inactive => self.pin.set_low(),
        }
    }
}

struct WifiLink {
    wifi: EspWifi<'static>,
}

impl Connectivity for WifiLink {
    type Error = EspError;

    fn is_connected(&mut self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.is_up().unwrap_or(false)
    }

    fn begin_connect(&mut self) -> Result<(), Self::Error> {
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        self.wifi.connect()
    }

    fn power_down(&mut self) {
        match self.wifi.stop() {
            Ok(()) => info!("wifi stopped until next wake"),
            Err(err) => warn!("failed to stop wifi: {err}"),
        }
    }
}

/// System clock that only counts as synced once SNTP has completed at least
/// one exchange since boot.
struct SntpClock {
    sntp: EspSntp<'static>,
    clock: SystemClock,
    synced: bool,
}

impl SntpClock {
    fn new(sntp: EspSntp<'static>, utc_offset_secs: i32) -> Self {
        Self {
            sntp,
            clock: SystemClock::new(utc_offset_secs),
            synced: false,
        }
    }
}

impl TimeSource for SntpClock {
    fn refresh(&mut self) -> bool {
        if !self.synced && self.sntp.get_sync_status() == SyncStatus::Completed {
            self.synced = true;
            info!("SNTP synced, local time {}", format_epoch(self.clock.epoch()));
        }
        self.synced
    }

    fn now(&self) -> Option<i64> {
        self.synced.then(|| self.clock.epoch())
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut runtime = RuntimeConfig::default();
    ensure_wifi_defaults(&mut runtime);
    runtime.validate().context("invalid built-in config")?;

    let schedule = &runtime.schedule;
    info!(
        "light on {}, off {}, utc offset {}s, switch GPIO{}, ssid `{}`",
        schedule.on_time,
        schedule.off_time,
        schedule.utc_offset_secs,
        schedule.switch_pin,
        runtime.network.wifi_ssid,
    );

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals { modem, .. } = Peripherals::take()?;

    let relay = init_relay(schedule.switch_pin)?;
    let wifi = init_wifi(modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;

    let sntp = EspSntp::new_default().context("failed to start SNTP")?;
    info!("SNTP initialized");

    let mut scheduler = Scheduler::new(
        AlarmEngine::new(schedule.on_time, schedule.off_time),
        SntpClock::new(sntp, schedule.utc_offset_secs),
        relay,
        wifi,
        ThreadSleeper,
        runtime.network.connect_retry,
        runtime.scheduler.clone(),
    );
    scheduler.run()
}

fn ensure_wifi_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        runtime.network.wifi_ssid = option_env!("WIFI_SSID").unwrap_or("CHANGE_ME").to_string();
    }

    if runtime.network.wifi_pass.is_empty() {
        runtime.network.wifi_pass = option_env!("WIFI_PASS").unwrap_or("CHANGE_ME").to_string();
    }
}

fn init_relay(pin: i32) -> anyhow::Result<RelayPin> {
    let pin = unsafe { PinDriver::output(AnyOutputPin::new(pin)) }
        .with_context(|| format!("failed to configure switch GPIO{pin}"))?;
    Ok(RelayPin { pin })
}

/// Configures the station interface. Association itself is left to the
/// scheduler, which reconnects at the top of every iteration.
fn init_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<WifiLink> {
    let mut wifi = EspWifi::new(modem, sys_loop, Some(nvs_partition))?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    info!("wifi configured for `{}`", network.wifi_ssid);
    Ok(WifiLink { wifi })
}
