//! Register layout and codec for the Stagg EKG Pro configuration characteristic.
//!
//! The kettle exposes its whole configuration as a single 17-byte register that
//! can only be read and written as a unit. This module owns every bit position
//! of that register: [`Register`] wraps the raw bytes with named accessors,
//! [`decode`] projects a register into a [`KettleState`], and [`encode`] applies
//! a [`Mutation`] to produce the next register to transmit.
//!
//! | Offset | Meaning |
//! |---|---|
//! | 0 | status flags, `0x08` = schedule enabled |
//! | 1 | control flags, `0x02` = Celsius, `0x08` = pre-boil |
//! | 2-3 | altitude, 15 bits, `0x80` folded into byte 3 |
//! | 4 | target temperature, Celsius x 2 |
//! | 6 | schedule temperature, Celsius x 2, `0xC0` = unset |
//! | 8-9 | schedule minute, hour |
//! | 10-11 | clock minute, hour |
//! | 12 | clock mode |
//! | 13 | hold minutes |
//! | 14 | chime volume |
//! | 15 | menu language |
//! | 16 | sequence counter, `0x08` overlays the schedule sub-mode |

use std::fmt;
use std::str::FromStr;

/// Errors raised while validating values for the register.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("register must be 17 bytes long, got {0}")]
    InvalidLength(usize),
    #[error("hour {0} is out of range (0 - 23)")]
    HourOutOfRange(u8),
    #[error("minute {0} is out of range (0 - 59)")]
    MinuteOutOfRange(u8),
    #[error("unknown clock mode '{0}', expected off, digital or analog")]
    UnknownClockMode(String),
    #[error("unknown schedule mode '{0}', expected off, once or daily")]
    UnknownScheduleMode(String),
    #[error("unknown temperature unit '{0}', expected celsius or fahrenheit")]
    UnknownUnit(String),
}

pub const REGISTER_LEN: usize = 17;

pub const STATUS_BYTE: usize = 0;
pub const STATUS_SCHEDULE_ENABLED: u8 = 0x08;

pub const CONTROL_BYTE: usize = 1;
pub const CONTROL_CELSIUS: u8 = 0x02;
pub const CONTROL_PRE_BOIL: u8 = 0x08;

pub const ALTITUDE_LOW_BYTE: usize = 2;
pub const ALTITUDE_HIGH_BYTE: usize = 3;
pub const ALTITUDE_HIGH_OFFSET: u8 = 0x80;
pub const ALTITUDE_HIGH_MASK: u8 = 0x7F;

pub const TARGET_TEMPERATURE_BYTE: usize = 4;

pub const SCHEDULE_TEMPERATURE_BYTE: usize = 6;
pub const SCHEDULE_TEMPERATURE_UNSET: u8 = 0xC0;
pub const SCHEDULE_MINUTE_BYTE: usize = 8;
pub const SCHEDULE_HOUR_BYTE: usize = 9;

pub const CLOCK_MINUTE_BYTE: usize = 10;
pub const CLOCK_HOUR_BYTE: usize = 11;
pub const CLOCK_MODE_BYTE: usize = 12;

pub const HOLD_TIME_BYTE: usize = 13;
pub const CHIME_VOLUME_BYTE: usize = 14;
pub const LANGUAGE_BYTE: usize = 15;

pub const COUNTER_BYTE: usize = 16;
pub const COUNTER_SCHEDULE_ONCE: u8 = 0x08;

/// The kettle's configuration register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register([u8; REGISTER_LEN]);

impl Register {
    /// Wraps raw register bytes as read from the kettle.
    pub const fn from_bytes(bytes: [u8; REGISTER_LEN]) -> Self {
        Self(bytes)
    }

    /// The bytes to transmit.
    pub fn as_bytes(&self) -> &[u8; REGISTER_LEN] {
        &self.0
    }

    /// Lowercase hex dump, used for logging and the raw debug field.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|byte| format!("{byte:02x}")).collect()
    }

    fn flag(&self, byte: usize, mask: u8) -> bool {
        self.0[byte] & mask != 0
    }

    fn set_flag(&mut self, byte: usize, mask: u8, on: bool) {
        if on {
            self.0[byte] |= mask;
        } else {
            self.0[byte] &= !mask;
        }
    }

    /// Schedule enable flag, byte 0 bit 0x08.
    pub fn schedule_enabled(&self) -> bool {
        self.flag(STATUS_BYTE, STATUS_SCHEDULE_ENABLED)
    }

    /// Sets or clears the schedule enable flag.
    pub fn set_schedule_enabled(&mut self, enabled: bool) {
        self.set_flag(STATUS_BYTE, STATUS_SCHEDULE_ENABLED, enabled)
    }

    /// Display unit, byte 1 bit 0x02 (set = Celsius).
    pub fn unit(&self) -> TemperatureUnit {
        if self.flag(CONTROL_BYTE, CONTROL_CELSIUS) {
            TemperatureUnit::Celsius
        } else {
            TemperatureUnit::Fahrenheit
        }
    }

    /// Selects the display unit.
    pub fn set_unit(&mut self, unit: TemperatureUnit) {
        self.set_flag(
            CONTROL_BYTE,
            CONTROL_CELSIUS,
            unit == TemperatureUnit::Celsius,
        )
    }

    /// Pre-boil flag, byte 1 bit 0x08.
    pub fn pre_boil(&self) -> bool {
        self.flag(CONTROL_BYTE, CONTROL_PRE_BOIL)
    }

    /// Sets or clears the pre-boil flag.
    pub fn set_pre_boil(&mut self, enabled: bool) {
        self.set_flag(CONTROL_BYTE, CONTROL_PRE_BOIL, enabled)
    }

    /// The 15-bit altitude value as stored, before quantization.
    pub fn altitude_raw(&self) -> u16 {
        (((self.0[ALTITUDE_HIGH_BYTE] & ALTITUDE_HIGH_MASK) as u16) << 8)
            | self.0[ALTITUDE_LOW_BYTE] as u16
    }

    /// Stores the altitude split over bytes 2 and 3, with the 0x80 offset in the high byte.
    pub fn set_altitude(&mut self, altitude: Altitude) {
        let meters = altitude.meters();
        self.0[ALTITUDE_LOW_BYTE] = (meters & 0xFF) as u8;
        self.0[ALTITUDE_HIGH_BYTE] = ALTITUDE_HIGH_OFFSET | ((meters >> 8) as u8 & ALTITUDE_HIGH_MASK);
    }

    /// Target temperature, byte 4.
    pub fn target_temperature(&self) -> Temperature {
        Temperature::from_raw(self.0[TARGET_TEMPERATURE_BYTE])
    }

    /// Sets the target temperature.
    pub fn set_target_temperature(&mut self, temperature: Temperature) {
        self.0[TARGET_TEMPERATURE_BYTE] = temperature.raw();
    }

    /// `None` when the unset sentinel is stored.
    pub fn schedule_temperature(&self) -> Option<Temperature> {
        match self.0[SCHEDULE_TEMPERATURE_BYTE] {
            SCHEDULE_TEMPERATURE_UNSET => None,
            raw => Some(Temperature::from_raw(raw)),
        }
    }

    /// Sets the schedule temperature, `None` stores the unset sentinel.
    pub fn set_schedule_temperature(&mut self, temperature: Option<Temperature>) {
        self.0[SCHEDULE_TEMPERATURE_BYTE] =
            temperature.map_or(SCHEDULE_TEMPERATURE_UNSET, |t| t.raw());
    }

    /// Schedule time of day, bytes 9 (hour) and 8 (minute).
    pub fn schedule_time(&self) -> ClockTime {
        ClockTime::raw(self.0[SCHEDULE_HOUR_BYTE], self.0[SCHEDULE_MINUTE_BYTE])
    }

    /// Sets the schedule time of day.
    pub fn set_schedule_time(&mut self, time: ClockTime) {
        self.0[SCHEDULE_HOUR_BYTE] = time.hour();
        self.0[SCHEDULE_MINUTE_BYTE] = time.minute();
    }

    /// Kettle clock, bytes 11 (hour) and 10 (minute).
    pub fn clock_time(&self) -> ClockTime {
        ClockTime::raw(self.0[CLOCK_HOUR_BYTE], self.0[CLOCK_MINUTE_BYTE])
    }

    /// Sets the kettle clock.
    pub fn set_clock_time(&mut self, time: ClockTime) {
        self.0[CLOCK_HOUR_BYTE] = time.hour();
        self.0[CLOCK_MINUTE_BYTE] = time.minute();
    }

    /// Clock face, byte 12.
    pub fn clock_mode(&self) -> ClockMode {
        ClockMode::from_raw(self.0[CLOCK_MODE_BYTE])
    }

    /// Sets the clock face.
    pub fn set_clock_mode(&mut self, mode: ClockMode) {
        self.0[CLOCK_MODE_BYTE] = mode.raw();
    }

    /// Hold time in minutes, byte 13.
    pub fn hold_time(&self) -> HoldTime {
        HoldTime(self.0[HOLD_TIME_BYTE])
    }

    /// Sets the hold time.
    pub fn set_hold_time(&mut self, hold_time: HoldTime) {
        self.0[HOLD_TIME_BYTE] = hold_time.minutes();
    }

    /// Chime volume, byte 14.
    pub fn chime_volume(&self) -> ChimeVolume {
        ChimeVolume(self.0[CHIME_VOLUME_BYTE])
    }

    /// Sets the chime volume.
    pub fn set_chime_volume(&mut self, volume: ChimeVolume) {
        self.0[CHIME_VOLUME_BYTE] = volume.level();
    }

    /// Menu language, byte 15.
    pub fn language(&self) -> Language {
        Language::from_raw(self.0[LANGUAGE_BYTE])
    }

    /// The full counter byte, including the schedule sub-mode overlay.
    pub fn counter(&self) -> u8 {
        self.0[COUNTER_BYTE]
    }

    /// Overwrites the whole counter byte, overlay bit included.
    pub fn set_counter(&mut self, counter: u8) {
        self.0[COUNTER_BYTE] = counter;
    }

    /// Schedule sub-mode bit overlaid on the counter: set = once, clear = daily.
    pub fn schedule_once(&self) -> bool {
        self.flag(COUNTER_BYTE, COUNTER_SCHEDULE_ONCE)
    }

    /// Sets the once/daily overlay bit.
    pub fn set_schedule_once(&mut self, once: bool) {
        self.set_flag(COUNTER_BYTE, COUNTER_SCHEDULE_ONCE, once)
    }
}

impl TryFrom<&[u8]> for Register {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; REGISTER_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| Error::InvalidLength(bytes.len()))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Unit the kettle displays temperatures in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Unit letter as shown on the kettle.
    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "C",
            TemperatureUnit::Fahrenheit => "F",
        }
    }

    /// Converts a value in this unit to Celsius.
    pub fn to_celsius(&self, value: f32) -> f32 {
        match self {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
        }
    }

    /// Converts a Celsius value into this unit.
    pub fn from_celsius(&self, celsius: f32) -> f32 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    /// Brewing range offered to users, narrower than what the register accepts.
    pub fn display_range(&self) -> std::ops::RangeInclusive<f32> {
        match self {
            TemperatureUnit::Celsius => DISPLAY_MIN_CELSIUS..=DISPLAY_MAX_CELSIUS,
            TemperatureUnit::Fahrenheit => DISPLAY_MIN_FAHRENHEIT..=DISPLAY_MAX_FAHRENHEIT,
        }
    }
}

pub const DISPLAY_MIN_CELSIUS: f32 = 40.0;
pub const DISPLAY_MAX_CELSIUS: f32 = 100.0;
pub const DISPLAY_MIN_FAHRENHEIT: f32 = 104.0;
pub const DISPLAY_MAX_FAHRENHEIT: f32 = 212.0;

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemperatureUnit::Celsius => write!(f, "celsius"),
            TemperatureUnit::Fahrenheit => write!(f, "fahrenheit"),
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" | "celsius" => Ok(TemperatureUnit::Celsius),
            "f" | "fahrenheit" => Ok(TemperatureUnit::Fahrenheit),
            _ => Err(Error::UnknownUnit(s.to_string())),
        }
    }
}

/// A temperature in the kettle's native resolution of half a degree Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Temperature(u8);

impl Temperature {
    pub const MIN_CELSIUS: f32 = 0.0;
    pub const MAX_CELSIUS: f32 = 100.0;

    /// Converts `value` from `unit` and clamps it to 0 - 100 °C.
    pub fn clamped(value: f32, unit: TemperatureUnit) -> Self {
        let celsius = unit.to_celsius(value);
        let celsius = if celsius.is_nan() {
            Self::MIN_CELSIUS
        } else {
            celsius.clamp(Self::MIN_CELSIUS, Self::MAX_CELSIUS)
        };
        Self((celsius * 2.0).round() as u8)
    }

    /// Wraps a raw register value in half degrees Celsius.
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Raw register value in half degrees Celsius.
    pub const fn raw(&self) -> u8 {
        self.0
    }

    /// Temperature in Celsius, half degree resolution.
    pub fn celsius(&self) -> f32 {
        self.0 as f32 / 2.0
    }

    /// Temperature converted into `unit`.
    pub fn in_unit(&self, unit: TemperatureUnit) -> f32 {
        unit.from_celsius(self.celsius())
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°C", self.celsius())
    }
}

/// Altitude compensation in meters, always a multiple of [`Altitude::STEP`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Altitude(u16);

impl Altitude {
    pub const MIN: u16 = 0;
    pub const MAX: u16 = 3000;
    pub const STEP: u16 = 30;

    /// Rounds to the nearest step, halves to the even step.
    pub fn quantize(meters: u16) -> u16 {
        let steps = meters / Self::STEP;
        let rest = meters % Self::STEP;
        let half = Self::STEP / 2;
        let steps = if rest > half || (rest == half && steps % 2 == 1) {
            steps + 1
        } else {
            steps
        };
        steps * Self::STEP
    }

    /// Clamps to 0 - 3000 m and quantizes.
    pub fn clamped(meters: u16) -> Self {
        Self(Self::quantize(meters.clamp(Self::MIN, Self::MAX)))
    }

    /// Quantizes a raw register value without clamping it.
    pub fn from_raw(raw: u16) -> Self {
        Self(Self::quantize(raw))
    }

    /// Altitude in meters, a multiple of 30.
    pub const fn meters(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Altitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} m", self.0)
    }
}

/// Hold time in minutes, 0 disables holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HoldTime(u8);

impl HoldTime {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 60;
    pub const OFF: HoldTime = HoldTime(0);
    /// Applied by a power-on when no hold time is set.
    pub const POWER_ON_DEFAULT: HoldTime = HoldTime(30);

    /// Clamps to 0 - 60 minutes.
    pub fn clamped(minutes: u8) -> Self {
        Self(minutes.clamp(Self::MIN, Self::MAX))
    }

    /// Hold time in minutes.
    pub const fn minutes(&self) -> u8 {
        self.0
    }

    /// Whether the kettle holds temperature at all.
    pub const fn is_enabled(&self) -> bool {
        self.0 != 0
    }
}

/// Chime volume 1 - 10, 0 disables the chime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ChimeVolume(u8);

impl ChimeVolume {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 10;

    /// Clamps to 0 - 10.
    pub fn clamped(level: u8) -> Self {
        Self(level.clamp(Self::MIN, Self::MAX))
    }

    /// Volume level 0 - 10.
    pub const fn level(&self) -> u8 {
        self.0
    }

    /// Whether the chime sounds at all.
    pub const fn is_enabled(&self) -> bool {
        self.0 != 0
    }
}

/// A 24-hour wall-clock time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub const HOUR_MAX: u8 = 23;
    pub const MINUTE_MAX: u8 = 59;

    /// Validates hour and minute, rejecting anything outside 0 - 23 / 0 - 59.
    pub fn new(hour: u8, minute: u8) -> Result<Self, Error> {
        if hour > Self::HOUR_MAX {
            return Err(Error::HourOutOfRange(hour));
        }
        if minute > Self::MINUTE_MAX {
            return Err(Error::MinuteOutOfRange(minute));
        }
        Ok(Self { hour, minute })
    }

    /// Like [`ClockTime::new`], but saturates instead of failing.
    pub fn clamped(hour: u8, minute: u8) -> Self {
        Self {
            hour: hour.min(Self::HOUR_MAX),
            minute: minute.min(Self::MINUTE_MAX),
        }
    }

    // Register contents are reported as-is, the device is not trusted to stay in range.
    const fn raw(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    /// Hour, 0 - 23.
    pub const fn hour(&self) -> u8 {
        self.hour
    }

    /// Minute, 0 - 59.
    pub const fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid time '{s}', expected HH:MM"))?;
        let hour = hour
            .trim()
            .parse::<u8>()
            .map_err(|e| format!("Invalid hour '{hour}': {e}"))?;
        let minute = minute
            .trim()
            .parse::<u8>()
            .map_err(|e| format!("Invalid minute '{minute}': {e}"))?;
        ClockTime::new(hour, minute).map_err(|e| e.to_string())
    }
}

/// Clock face shown on the kettle display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockMode {
    Off,
    Digital,
    Analog,
    Unknown(u8),
}

impl ClockMode {
    /// Decodes byte 12, keeping unknown values.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ClockMode::Off,
            1 => ClockMode::Digital,
            2 => ClockMode::Analog,
            other => ClockMode::Unknown(other),
        }
    }

    /// Byte 12 value.
    pub fn raw(&self) -> u8 {
        match self {
            ClockMode::Off => 0,
            ClockMode::Digital => 1,
            ClockMode::Analog => 2,
            ClockMode::Unknown(raw) => *raw,
        }
    }
}

impl fmt::Display for ClockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockMode::Off => write!(f, "off"),
            ClockMode::Digital => write!(f, "digital"),
            ClockMode::Analog => write!(f, "analog"),
            ClockMode::Unknown(_) => write!(f, "unknown"),
        }
    }
}

impl FromStr for ClockMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(ClockMode::Off),
            "digital" => Ok(ClockMode::Digital),
            "analog" => Ok(ClockMode::Analog),
            _ => Err(Error::UnknownClockMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScheduleMode {
    #[default]
    Off,
    Once,
    Daily,
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleMode::Off => write!(f, "off"),
            ScheduleMode::Once => write!(f, "once"),
            ScheduleMode::Daily => write!(f, "daily"),
        }
    }
}

impl FromStr for ScheduleMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(ScheduleMode::Off),
            "once" => Ok(ScheduleMode::Once),
            "daily" => Ok(ScheduleMode::Daily),
            _ => Err(Error::UnknownScheduleMode(s.to_string())),
        }
    }
}

/// Menu language of the kettle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    English,
    French,
    Spanish,
    SimplifiedChinese,
    TraditionalChinese,
    Unknown(u8),
}

impl Language {
    /// Decodes byte 15, keeping unknown values.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Language::English,
            1 => Language::French,
            2 => Language::Spanish,
            3 => Language::SimplifiedChinese,
            4 => Language::TraditionalChinese,
            other => Language::Unknown(other),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::English => write!(f, "english"),
            Language::French => write!(f, "french"),
            Language::Spanish => write!(f, "spanish"),
            Language::SimplifiedChinese => write!(f, "simplified_chinese"),
            Language::TraditionalChinese => write!(f, "traditional_chinese"),
            Language::Unknown(raw) => write!(f, "unknown_{raw}"),
        }
    }
}

/// A validated request for the brew schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub mode: ScheduleMode,
    pub time: ClockTime,
    pub temperature: Temperature,
}

impl ScheduleRequest {
    pub const DEFAULT_HOUR: u8 = 7;
    pub const DEFAULT_MINUTE: u8 = 0;
    pub const DEFAULT_CELSIUS: f32 = 85.0;

    /// Clamps time of day and temperature (°C) into range.
    pub fn clamped(mode: ScheduleMode, hour: u8, minute: u8, celsius: f32) -> Self {
        Self {
            mode,
            time: ClockTime::clamped(hour, minute),
            temperature: Temperature::clamped(celsius, TemperatureUnit::Celsius),
        }
    }
}

/// Decoded schedule settings. Temperatures are in the kettle's display unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub enabled: bool,
    pub mode: ScheduleMode,
    pub time: Option<ClockTime>,
    pub temperature: Option<f32>,
}

/// Snapshot of the kettle configuration decoded from a [`Register`].
#[derive(Debug, Clone, PartialEq)]
pub struct KettleState {
    /// Target temperature in `unit`.
    pub target_temperature: f32,
    pub unit: TemperatureUnit,
    pub pre_boil: bool,
    pub altitude: Altitude,
    pub clock: ClockTime,
    pub clock_mode: ClockMode,
    pub hold_time: HoldTime,
    pub chime_volume: ChimeVolume,
    pub language: Language,
    pub schedule: Schedule,
    pub counter: u8,
    pub register: Register,
}

/// Decodes a register into the semantic kettle state.
pub fn decode(register: &Register) -> KettleState {
    let unit = register.unit();
    let enabled = register.schedule_enabled();

    let (mode, temperature) = match register.schedule_temperature() {
        Some(temperature) if enabled => {
            let mode = if register.schedule_once() {
                ScheduleMode::Once
            } else {
                ScheduleMode::Daily
            };
            (mode, Some(temperature.in_unit(unit)))
        }
        _ => (ScheduleMode::Off, None),
    };

    KettleState {
        target_temperature: register.target_temperature().in_unit(unit),
        unit,
        pre_boil: register.pre_boil(),
        altitude: Altitude::from_raw(register.altitude_raw()),
        clock: register.clock_time(),
        clock_mode: register.clock_mode(),
        hold_time: register.hold_time(),
        chime_volume: register.chime_volume(),
        language: register.language(),
        schedule: Schedule {
            enabled,
            mode,
            time: enabled.then(|| register.schedule_time()),
            temperature,
        },
        counter: register.counter(),
        register: *register,
    }
}

/// A single change to the kettle configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mutation {
    TargetTemperature(Temperature),
    HoldTime(HoldTime),
    /// The kettle has no power bit, the hold time stands in for it.
    Power(bool),
    PreBoil(bool),
    ChimeVolume(ChimeVolume),
    Units(TemperatureUnit),
    Clock {
        time: ClockTime,
        mode: Option<ClockMode>,
    },
    Altitude(Altitude),
    /// Turns the schedule off and clears its time and temperature.
    ClearSchedule,
    /// Turns the schedule off, keeping its time. First phase of a schedule change.
    SuspendSchedule,
    EnableSchedule {
        once: bool,
        time: ClockTime,
        temperature: Temperature,
    },
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::TargetTemperature(t) => write!(f, "target temperature {t}"),
            Mutation::HoldTime(h) => write!(f, "hold time {} min", h.minutes()),
            Mutation::Power(on) => write!(f, "power {}", if *on { "on" } else { "off" }),
            Mutation::PreBoil(on) => write!(f, "pre-boil {on}"),
            Mutation::ChimeVolume(v) => write!(f, "chime volume {}", v.level()),
            Mutation::Units(unit) => write!(f, "units {unit}"),
            Mutation::Clock { time, mode: None } => write!(f, "clock {time}"),
            Mutation::Clock {
                time,
                mode: Some(mode),
            } => write!(f, "clock {time} ({mode})"),
            Mutation::Altitude(a) => write!(f, "altitude {a}"),
            Mutation::ClearSchedule => write!(f, "schedule off"),
            Mutation::SuspendSchedule => write!(f, "schedule suspend"),
            Mutation::EnableSchedule {
                once,
                time,
                temperature,
            } => write!(
                f,
                "schedule {} at {time}, {temperature}",
                if *once { "once" } else { "daily" }
            ),
        }
    }
}

/// Applies `mutation` to `register` and stamps the result for transmission.
///
/// Every encoded register carries `now` as the device clock (unless the
/// mutation sets the clock itself) and the counter `sequence + 1`. While a
/// schedule is enabled the once/daily bit overlaid on the counter is kept.
pub fn encode(register: &Register, mutation: &Mutation, sequence: u8, now: ClockTime) -> Register {
    let mut next = *register;

    match *mutation {
        Mutation::TargetTemperature(temperature) => next.set_target_temperature(temperature),
        Mutation::HoldTime(hold_time) => next.set_hold_time(hold_time),
        Mutation::Power(true) => {
            if !next.hold_time().is_enabled() {
                next.set_hold_time(HoldTime::POWER_ON_DEFAULT);
            }
        }
        Mutation::Power(false) => next.set_hold_time(HoldTime::OFF),
        Mutation::PreBoil(enabled) => next.set_pre_boil(enabled),
        Mutation::ChimeVolume(volume) => next.set_chime_volume(volume),
        Mutation::Units(unit) => next.set_unit(unit),
        Mutation::Clock { time, mode } => {
            next.set_clock_time(time);
            if let Some(mode) = mode {
                next.set_clock_mode(mode);
            }
        }
        Mutation::Altitude(altitude) => next.set_altitude(altitude),
        Mutation::ClearSchedule => {
            next.set_schedule_enabled(false);
            next.set_schedule_temperature(None);
            next.set_schedule_time(ClockTime::default());
        }
        Mutation::SuspendSchedule => {
            next.set_schedule_enabled(false);
            next.set_schedule_temperature(None);
        }
        Mutation::EnableSchedule {
            time, temperature, ..
        } => {
            next.set_schedule_enabled(true);
            next.set_schedule_temperature(Some(temperature));
            next.set_schedule_time(time);
        }
    }

    if !matches!(mutation, Mutation::Clock { .. }) {
        next.set_clock_time(now);
    }

    let schedule_once = match *mutation {
        Mutation::EnableSchedule { once, .. } => Some(once),
        _ if next.schedule_enabled() => Some(register.schedule_once()),
        _ => None,
    };
    next.set_counter(sequence.wrapping_add(1));
    if let Some(once) = schedule_once {
        next.set_schedule_once(once);
    }

    next
}

/// A user-visible projection of [`KettleState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    TargetTemperature,
    Units,
    Hold,
    HoldTime,
    PreBoil,
    ChimeVolume,
    ChimeEnabled,
    ClockMode,
    ClockTime,
    Altitude,
    Language,
    ScheduleEnabled,
    ScheduleMode,
    ScheduleTime,
    ScheduleTemperature,
    Counter,
    Raw,
}

impl Field {
    pub const ALL: [Field; 17] = [
        Field::TargetTemperature,
        Field::Units,
        Field::Hold,
        Field::HoldTime,
        Field::PreBoil,
        Field::ChimeVolume,
        Field::ChimeEnabled,
        Field::ClockMode,
        Field::ClockTime,
        Field::Altitude,
        Field::Language,
        Field::ScheduleEnabled,
        Field::ScheduleMode,
        Field::ScheduleTime,
        Field::ScheduleTemperature,
        Field::Counter,
        Field::Raw,
    ];

    /// Name used on the command line and in MQTT topics.
    pub fn key(&self) -> &'static str {
        match self {
            Field::TargetTemperature => "target_temp",
            Field::Units => "units",
            Field::Hold => "hold",
            Field::HoldTime => "hold_time_minutes",
            Field::PreBoil => "pre_boil_enabled",
            Field::ChimeVolume => "chime_volume",
            Field::ChimeEnabled => "chime_enabled",
            Field::ClockMode => "clock_mode",
            Field::ClockTime => "clock_time",
            Field::Altitude => "altitude_meters",
            Field::Language => "language",
            Field::ScheduleEnabled => "schedule_enabled",
            Field::ScheduleMode => "schedule_mode",
            Field::ScheduleTime => "schedule_time",
            Field::ScheduleTemperature => "schedule_temperature",
            Field::Counter => "counter",
            Field::Raw => "raw_data",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Absent,
    Bool(bool),
    Integer(i64),
    Float(f32),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Absent => write!(f, "none"),
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value:.1}"),
            FieldValue::Text(value) => write!(f, "{value}"),
        }
    }
}

impl KettleState {
    /// Extracts a single field.
    pub fn project(&self, field: Field) -> FieldValue {
        match field {
            Field::TargetTemperature => FieldValue::Float(self.target_temperature),
            Field::Units => FieldValue::Text(self.unit.symbol().to_string()),
            Field::Hold => FieldValue::Bool(self.hold_time.is_enabled()),
            Field::HoldTime => FieldValue::Integer(self.hold_time.minutes().into()),
            Field::PreBoil => FieldValue::Bool(self.pre_boil),
            Field::ChimeVolume => FieldValue::Integer(self.chime_volume.level().into()),
            Field::ChimeEnabled => FieldValue::Bool(self.chime_volume.is_enabled()),
            Field::ClockMode => FieldValue::Text(self.clock_mode.to_string()),
            Field::ClockTime => FieldValue::Text(self.clock.to_string()),
            Field::Altitude => FieldValue::Integer(self.altitude.meters().into()),
            Field::Language => FieldValue::Text(self.language.to_string()),
            Field::ScheduleEnabled => FieldValue::Bool(self.schedule.enabled),
            Field::ScheduleMode => FieldValue::Text(self.schedule.mode.to_string()),
            Field::ScheduleTime => self
                .schedule
                .time
                .map_or(FieldValue::Absent, |t| FieldValue::Text(t.to_string())),
            Field::ScheduleTemperature => self
                .schedule
                .temperature
                .map_or(FieldValue::Absent, FieldValue::Float),
            Field::Counter => FieldValue::Integer(self.counter.into()),
            Field::Raw => FieldValue::Text(self.register.to_hex()),
        }
    }

    /// Fields whose projection differs from `previous`.
    pub fn changed_fields(&self, previous: &KettleState) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|field| self.project(*field) != previous.project(*field))
            .collect()
    }
}

impl fmt::Display for KettleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in Field::ALL.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{field}: {}", self.project(*field))?;
        }
        Ok(())
    }
}
