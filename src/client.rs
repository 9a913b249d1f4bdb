//! Asynchronous client for the Fellow Stagg EKG Pro kettle.
//!
//! [`Kettle`] serializes every operation on one device behind an async lock,
//! keeps at most one live link, caches the last known register and spaces
//! writes so the kettle's BLE stack keeps up. Every command is a
//! read-modify-write of the whole 17 byte register.

use crate::cache::StateCache;
use crate::connection::{ConnectionManager, DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_BACKOFF};
use crate::debounce::{Debouncer, DEFAULT_WRITE_SPACING};
use crate::error::Result;
use crate::protocol::{self as proto, ClockMode, KettleState, Mutation, Register};
use crate::transport::{Connector, Link, NotifyFn};
use chrono::Timelike;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Pause between disabling and re-enabling the schedule during a change.
pub const DEFAULT_SCHEDULE_PHASE_DELAY: Duration = Duration::from_millis(300);

/// Callback invoked with the decoded state of every notification.
pub type Observer = Arc<dyn Fn(&KettleState) + Send + Sync>;

type WallClock = Box<dyn Fn() -> proto::ClockTime + Send + Sync>;

/// Tunables of a [`Kettle`] client.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct ClientOptions {
    pub connect_attempts: u32,
    /// Pause after the first failed connection attempt, growing with each further one.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub connect_backoff: Duration,
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub write_spacing: Duration,
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub schedule_phase_delay: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_backoff: DEFAULT_CONNECT_BACKOFF,
            write_spacing: DEFAULT_WRITE_SPACING,
            schedule_phase_delay: DEFAULT_SCHEDULE_PHASE_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulePhase {
    DisablePending,
    EnablePending,
}

struct Session<L> {
    connection: ConnectionManager<L>,
    debouncer: Debouncer,
    /// Schedule whose enable write has not happened yet.
    pending_schedule: Option<proto::ScheduleRequest>,
}

fn local_clock() -> proto::ClockTime {
    let now = chrono::Local::now();
    proto::ClockTime::clamped(now.hour() as u8, now.minute() as u8)
}

/// Client for a single kettle, reached through the connector `C`.
pub struct Kettle<C: Connector> {
    connector: C,
    options: ClientOptions,
    session: Mutex<Session<C::Link>>,
    cache: Arc<parking_lot::Mutex<StateCache>>,
    observer: Arc<parking_lot::Mutex<Option<Observer>>>,
    clock: WallClock,
}

impl<C: Connector> Kettle<C> {
    /// Creates a client with default [`ClientOptions`].
    pub fn new(connector: C) -> Self {
        Self::with_options(connector, ClientOptions::default())
    }

    /// Creates a client with the given options.
    pub fn with_options(connector: C, options: ClientOptions) -> Self {
        Self {
            connector,
            session: Mutex::new(Session {
                connection: ConnectionManager::new(options.connect_attempts, options.connect_backoff),
                debouncer: Debouncer::new(options.write_spacing),
                pending_schedule: None,
            }),
            options,
            cache: Arc::new(parking_lot::Mutex::new(StateCache::Empty)),
            observer: Arc::new(parking_lot::Mutex::new(None)),
            clock: Box::new(local_clock),
        }
    }

    /// Replaces the local wall clock stamped into every write.
    pub fn with_clock(
        mut self,
        clock: impl Fn() -> proto::ClockTime + Send + Sync + 'static,
    ) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// The options this client was created with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Registers a callback for state pushed by the kettle.
    pub fn set_observer(&self, observer: impl Fn(&KettleState) + Send + Sync + 'static) {
        *self.observer.lock() = Some(Arc::new(observer));
    }

    /// Removes the notification callback.
    pub fn clear_observer(&self) {
        *self.observer.lock() = None;
    }

    /// The last known state, without touching the device.
    pub fn cached_state(&self) -> Option<KettleState> {
        self.cache.lock().state()
    }

    /// Whether a link is currently held. The device itself is not contacted.
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.connection.is_connected()
    }

    /// A schedule change whose second write was interrupted.
    pub async fn pending_schedule(&self) -> Option<proto::ScheduleRequest> {
        self.session.lock().await.pending_schedule
    }

    /// Reads and decodes the current kettle state.
    ///
    /// Failures are logged and tear the link down, the poll then yields `None`.
    pub async fn poll(&self, device: &C::Device) -> Option<KettleState> {
        let mut session = self.session.lock().await;
        match self.refresh(&mut session, device).await {
            Ok(register) => Some(proto::decode(&register)),
            Err(err) => {
                error!("Cannot poll kettle: {err}");
                self.teardown(&mut session).await;
                None
            }
        }
    }

    /// Switches the kettle on or off. The hold time doubles as the power state,
    /// switching on restores a 30 minute hold when none was set.
    pub async fn set_power(&self, device: &C::Device, on: bool) -> Result<()> {
        self.run(device, Mutation::Power(on)).await
    }

    /// Sets the target temperature, given in `unit`. Out of range values are clamped.
    pub async fn set_temperature(
        &self,
        device: &C::Device,
        value: f32,
        unit: proto::TemperatureUnit,
    ) -> Result<()> {
        let temperature = proto::Temperature::clamped(value, unit);
        self.run(device, Mutation::TargetTemperature(temperature))
            .await
    }

    /// Sets how long the kettle keeps temperature after heating, 0 - 60 minutes.
    /// 0 disables holding.
    pub async fn set_hold_time(&self, device: &C::Device, minutes: u8) -> Result<()> {
        self.run(device, Mutation::HoldTime(proto::HoldTime::clamped(minutes)))
            .await
    }

    /// Enables or disables boiling the water before it cools to the target.
    pub async fn set_pre_boil(&self, device: &C::Device, enabled: bool) -> Result<()> {
        self.run(device, Mutation::PreBoil(enabled)).await
    }

    /// Sets the chime volume, 0 mutes the kettle.
    pub async fn set_chime_volume(&self, device: &C::Device, volume: u8) -> Result<()> {
        self.run(device, Mutation::ChimeVolume(proto::ChimeVolume::clamped(volume)))
            .await
    }

    /// Switches the display unit. Stored temperatures are unaffected.
    pub async fn set_units(&self, device: &C::Device, unit: proto::TemperatureUnit) -> Result<()> {
        self.run(device, Mutation::Units(unit)).await
    }

    /// Sets the kettle clock, optionally along with its display mode.
    ///
    /// Unlike the other setters, an out of range time is rejected before
    /// anything is sent.
    pub async fn set_clock_time(
        &self,
        device: &C::Device,
        hour: u8,
        minute: u8,
        mode: Option<ClockMode>,
    ) -> Result<()> {
        let time = proto::ClockTime::new(hour, minute)?;
        self.run(device, Mutation::Clock { time, mode }).await
    }

    /// Sets the kettle clock to the local wall clock.
    pub async fn sync_clock(&self, device: &C::Device) -> Result<()> {
        let time = (self.clock)();
        self.run(device, Mutation::Clock { time, mode: None })
            .await
    }

    /// Sets the altitude compensation, rounded to the kettle's 30 m steps.
    pub async fn set_altitude(&self, device: &C::Device, meters: u16) -> Result<()> {
        let altitude = proto::Altitude::clamped(meters);
        if altitude.meters() != meters {
            info!("Altitude {meters} m rounded to {altitude}");
        }
        self.run(device, Mutation::Altitude(altitude)).await
    }

    /// Configures the brew schedule.
    ///
    /// `ScheduleMode::Off` disables it in a single write. Enabling or changing
    /// an active schedule disables it first and enables the new one after
    /// [`ClientOptions::schedule_phase_delay`], the kettle ignores edits to a
    /// running schedule otherwise.
    pub async fn set_schedule(
        &self,
        device: &C::Device,
        mode: proto::ScheduleMode,
        hour: u8,
        minute: u8,
        temperature_celsius: f32,
    ) -> Result<()> {
        let mut session = self.session.lock().await;
        session.pending_schedule = None;
        let result = match mode {
            proto::ScheduleMode::Off => self
                .mutate(&mut session, device, &Mutation::ClearSchedule)
                .await
                .map(|_| ()),
            _ => {
                let request =
                    proto::ScheduleRequest::clamped(mode, hour, minute, temperature_celsius);
                self.change_schedule(&mut session, device, request).await
            }
        };
        self.settle(&mut session, result, "schedule").await
    }

    /// Finishes a schedule change interrupted between its two writes.
    ///
    /// Returns `false` when nothing was pending.
    pub async fn resume_schedule(&self, device: &C::Device) -> Result<bool> {
        let mut session = self.session.lock().await;
        let Some(request) = session.pending_schedule else {
            return Ok(false);
        };
        info!("Resuming schedule {} at {}", request.mode, request.time);
        let result = self
            .change_schedule(&mut session, device, request)
            .await
            .map(|_| true);
        self.settle(&mut session, result, "schedule").await
    }

    /// Closes the link. Safe to call when not connected.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        self.teardown(&mut session).await;
    }

    async fn run(&self, device: &C::Device, mutation: Mutation) -> Result<()> {
        let mut session = self.session.lock().await;
        let result = self.mutate(&mut session, device, &mutation).await;
        self.settle(&mut session, result.map(|_| ()), &mutation.to_string())
            .await
    }

    /// Tears the link down after a failed operation and passes the result on.
    async fn settle<T>(
        &self,
        session: &mut Session<C::Link>,
        result: Result<T>,
        what: &str,
    ) -> Result<T> {
        if let Err(err) = &result {
            error!("Cannot apply {what}: {err}");
            self.teardown(session).await;
        }
        result
    }

    async fn teardown(&self, session: &mut Session<C::Link>) {
        session.connection.teardown().await;
        self.cache.lock().clear();
    }

    async fn change_schedule(
        &self,
        session: &mut Session<C::Link>,
        device: &C::Device,
        request: proto::ScheduleRequest,
    ) -> Result<()> {
        let (register, _) = self.fresh(session, device).await?;
        let mut phase = if register.schedule_enabled() {
            SchedulePhase::DisablePending
        } else {
            SchedulePhase::EnablePending
        };
        loop {
            debug!("Schedule change: {phase:?}");
            match phase {
                SchedulePhase::DisablePending => {
                    self.mutate(session, device, &Mutation::SuspendSchedule)
                        .await?;
                    session.pending_schedule = Some(request);
                    tokio::time::sleep(self.options.schedule_phase_delay).await;
                    phase = SchedulePhase::EnablePending;
                }
                SchedulePhase::EnablePending => {
                    let mutation = Mutation::EnableSchedule {
                        once: request.mode == proto::ScheduleMode::Once,
                        time: request.time,
                        temperature: request.temperature,
                    };
                    self.mutate(session, device, &mutation).await?;
                    session.pending_schedule = None;
                    return Ok(());
                }
            }
        }
    }

    async fn mutate(
        &self,
        session: &mut Session<C::Link>,
        device: &C::Device,
        mutation: &Mutation,
    ) -> Result<Register> {
        let (register, sequence) = self.fresh(session, device).await?;
        let next = proto::encode(&register, mutation, sequence, (self.clock)());

        session.debouncer.ready().await;
        session.connection.link()?.write(next.as_bytes()).await?;
        debug!("Wrote register {next}");
        self.cache.lock().record_write(next, sequence.wrapping_add(1));

        info!("Applied {mutation}");
        Ok(next)
    }

    /// Cached register and sequence, read from the device when the cache is empty.
    async fn fresh(
        &self,
        session: &mut Session<C::Link>,
        device: &C::Device,
    ) -> Result<(Register, u8)> {
        if self.connect(session, device).await? {
            self.cache.lock().clear();
        }
        let cached = self.cache.lock().snapshot();
        match cached {
            Some(snapshot) => Ok(snapshot),
            None => {
                let register = self.read(session).await?;
                Ok((register, register.counter()))
            }
        }
    }

    async fn refresh(
        &self,
        session: &mut Session<C::Link>,
        device: &C::Device,
    ) -> Result<Register> {
        self.connect(session, device).await?;
        self.read(session).await
    }

    async fn connect(&self, session: &mut Session<C::Link>, device: &C::Device) -> Result<bool> {
        session
            .connection
            .ensure_connected(&self.connector, device, self.notify_fn())
            .await
    }

    async fn read(&self, session: &mut Session<C::Link>) -> Result<Register> {
        let data = session.connection.link()?.read().await?;
        let register = Register::try_from(data.as_slice())?;
        debug!("Read register {register}");
        self.cache.lock().store(register);
        Ok(register)
    }

    fn notify_fn(&self) -> NotifyFn {
        let cache = Arc::clone(&self.cache);
        let observer = Arc::clone(&self.observer);
        Arc::new(move |data: &[u8]| {
            let register = match Register::try_from(data) {
                Ok(register) => register,
                Err(err) => {
                    warn!("Ignoring notification: {err}");
                    return;
                }
            };
            debug!("Notified register {register}");
            cache.lock().store(register);
            // Called unlocked, the observer may replace itself.
            let observer = observer.lock().clone();
            if let Some(observer) = observer {
                observer(&proto::decode(&register));
            }
        })
    }
}
