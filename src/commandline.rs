use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use stagg_ekg_lib::protocol as proto;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

fn parse_characteristic(s: &str) -> Result<Uuid, String> {
    Uuid::parse_str(s).map_err(|e| format!("Invalid characteristic UUID '{s}': {e}"))
}

fn parse_unit(s: &str) -> Result<proto::TemperatureUnit, String> {
    s.parse().map_err(|e: proto::Error| e.to_string())
}

fn parse_clock_mode(s: &str) -> Result<proto::ClockMode, String> {
    s.parse().map_err(|e: proto::Error| e.to_string())
}

fn parse_schedule_mode(s: &str) -> Result<proto::ScheduleMode, String> {
    s.parse().map_err(|e: proto::Error| e.to_string())
}

fn parse_clock_time(s: &str) -> Result<proto::ClockTime, String> {
    s.parse()
}

fn parse_switch(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(format!("Invalid switch value '{s}', expected on or off")),
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliConnection {
    /// Connect to a kettle via Bluetooth LE.
    Ble {
        /// Bluetooth address of the kettle.
        /// Example: "AA:BB:CC:DD:EE:FF". Use `scan` to find it.
        #[arg(short, long, verbatim_doc_comment)]
        address: String,

        /// UUID of the kettle's configuration characteristic.
        #[arg(short, long, value_parser = parse_characteristic)]
        characteristic: Uuid,

        /// Kettle commands.
        #[command(subcommand)]
        command: CliCommands,
    },
    /// Scan for nearby Bluetooth LE devices and flag the kettles among them.
    Scan {
        /// List every device, not only kettles.
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum DaemonOutput {
    /// Continuously poll the kettle and print its state to the console.
    Console,
    /// Continuously poll the kettle and publish its state to an MQTT broker.
    /// The broker is configured in the `mqtt` section of the config file.
    #[clap(verbatim_doc_comment)]
    Mqtt,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Run in daemon mode: continuously poll the kettle state at a specified interval.
    /// Output can be directed to stdout or an MQTT broker.
    #[clap(verbatim_doc_comment)]
    Daemon {
        /// Interval for polling the kettle (e.g., "5s", "1m")
        #[arg(value_parser = humantime::parse_duration, short, long, default_value = "5s")]
        poll_interval: Duration,

        /// Specifies the output.
        #[command(subcommand)]
        output: DaemonOutput,
    },

    /// Read and print the full kettle state.
    Read,

    /// Switch the kettle on or off.
    Power {
        #[arg(value_parser = parse_switch, action = clap::ArgAction::Set)]
        on: bool,
    },

    /// Set the target temperature.
    /// Values outside 0 - 100 °C are clamped.
    #[clap(verbatim_doc_comment)]
    SetTemperature {
        /// Temperature in the given unit.
        value: f32,

        /// Unit of `value`: celsius or fahrenheit.
        #[arg(short, long, default_value = "celsius", value_parser = parse_unit)]
        unit: proto::TemperatureUnit,
    },

    /// Set the hold time in minutes (0 - 60, 0 turns holding off).
    SetHoldTime { minutes: u8 },

    /// Enable or disable pre-boil.
    SetPreBoil {
        #[arg(value_parser = parse_switch, action = clap::ArgAction::Set)]
        on: bool,
    },

    /// Set the chime volume (0 - 10, 0 mutes the kettle).
    SetChimeVolume { volume: u8 },

    /// Set the display unit: celsius or fahrenheit.
    SetUnits {
        #[arg(value_parser = parse_unit)]
        unit: proto::TemperatureUnit,
    },

    /// Set the kettle clock.
    SetClock {
        /// Time of day as HH:MM.
        #[arg(value_parser = parse_clock_time)]
        time: proto::ClockTime,

        /// Clock face: off, digital or analog.
        #[arg(short, long, value_parser = parse_clock_mode)]
        mode: Option<proto::ClockMode>,
    },

    /// Set the kettle clock to the local time.
    SyncClock,

    /// Set the altitude compensation in meters.
    /// Rounded to 30 m steps and limited to 3000 m.
    #[clap(verbatim_doc_comment)]
    SetAltitude { meters: u16 },

    /// Configure the brew schedule.
    SetSchedule {
        /// Schedule mode: off, once or daily.
        #[arg(value_parser = parse_schedule_mode)]
        mode: proto::ScheduleMode,

        /// Time of day as HH:MM.
        #[arg(short, long, default_value = "07:00", value_parser = parse_clock_time)]
        time: proto::ClockTime,

        /// Water temperature in °C.
        #[arg(long, default_value_t = proto::ScheduleRequest::DEFAULT_CELSIUS)]
        temperature: f32,
    },
}

const fn about_text() -> &'static str {
    "Stagg EKG Pro kettle CLI - Control Fellow Stagg EKG Pro kettles via Bluetooth LE."
}

#[derive(Parser, Debug)]
#[command(name="kettlectl", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warn.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// Specifies the connection method and kettle commands.
    #[command(subcommand)]
    pub connection: CliConnection,

    /// Configuration file, defaults to "stagg.yml" in the working directory when present.
    #[arg(global = true, long)]
    pub config_file: Option<PathBuf>,

    /// How long to scan for Bluetooth LE devices.
    /// Examples: "5s", "10s".
    #[arg(global = true, long, default_value = "5s", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub scan_timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn parse_set_schedule() {
        let args = CliArgs::try_parse_from([
            "kettlectl",
            "ble",
            "-a",
            "AA:BB:CC:DD:EE:FF",
            "-c",
            "0000fff1-0000-1000-8000-00805f9b34fb",
            "set-schedule",
            "once",
            "--time",
            "08:30",
        ])
        .unwrap();
        let CliConnection::Ble { command, .. } = args.connection else {
            panic!("expected ble connection");
        };
        assert_eq!(
            command,
            CliCommands::SetSchedule {
                mode: proto::ScheduleMode::Once,
                time: proto::ClockTime::new(8, 30).unwrap(),
                temperature: proto::ScheduleRequest::DEFAULT_CELSIUS,
            }
        );
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(parse_clock_time("24:00").is_err());
        assert!(parse_switch("maybe").is_err());
        assert!(parse_unit("kelvin").is_err());
        assert_eq!(parse_switch("ON"), Ok(true));
    }
}
