//! Stagg EKG Pro kettle CLI
//!
//! A command-line interface (CLI) application for controlling Fellow Stagg EKG Pro
//! kettles over Bluetooth LE.
//!
//! This tool allows users to:
//! - Scan for nearby kettles.
//! - Read the full kettle state.
//! - Set the target temperature, hold time, pre-boil, chime volume and display unit.
//! - Set or synchronize the kettle clock and set the altitude compensation.
//! - Configure the brew schedule.
//! - Run in a continuous daemon mode to poll the kettle and either print its
//!   state to the console or publish it to an MQTT broker.
//!
//! The CLI leverages the `stagg_ekg_lib` crate for protocol definitions and client operations.

use anyhow::{bail, Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use stagg_ekg_lib::{
    ble,
    client::Kettle,
    protocol::{self as proto, Field, KettleState},
};
use std::{panic, time::Duration};
use tokio::time::MissedTickBehavior;

mod commandline;
mod config;
mod mqtt;

type BleKettle = Kettle<ble::BleConnector>;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

macro_rules! print_state {
    ($kettle:expr, $device:expr) => {
        match $kettle.poll($device).await {
            Some(state) => println!("{state}"),
            None => bail!("Cannot read kettle state"),
        }
    };
}

async fn handle_scan(duration: Duration, all: bool) -> Result<()> {
    info!("Scanning for {duration:?}...");
    let devices = ble::scan(duration)
        .await
        .with_context(|| "Cannot scan for Bluetooth LE devices")?;

    let mut found = 0;
    for device in devices.iter().filter(|d| all || d.is_kettle) {
        found += 1;
        let rssi = device
            .rssi
            .map_or_else(|| "n/a".to_string(), |rssi| format!("{rssi} dBm"));
        let marker = if device.is_kettle { "*" } else { " " };
        println!("{marker} {}  {}  (RSSI {rssi})", device.address, device.name);
    }
    if found == 0 {
        println!("No kettle found.");
    }
    Ok(())
}

/// Polls the kettle until Ctrl-C, printing or publishing every state.
async fn run_daemon(
    kettle: &BleKettle,
    device: &ble::Peripheral,
    poll_interval: Duration,
    publisher: Option<&mqtt::Publisher>,
) -> Result<()> {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut previous: Option<KettleState> = None;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received Ctrl-C, stopping daemon");
                break;
            }
            _ = interval.tick() => {}
        }

        let Some(state) = kettle.poll(device).await else {
            if previous.take().is_some() {
                warn!("Kettle became unavailable");
                if let Some(publisher) = publisher {
                    publisher.set_available(false).await?;
                }
            }
            continue;
        };

        let changed = match &previous {
            Some(previous) => state.changed_fields(previous),
            None => {
                if let Some(publisher) = publisher {
                    publisher.set_available(true).await?;
                }
                Field::ALL.to_vec()
            }
        };
        if !changed.is_empty() {
            let keys: Vec<&str> = changed.iter().map(Field::key).collect();
            info!("Data changes detected: {}", keys.join(", "));
        }

        match publisher {
            Some(publisher) => publisher.publish(&state, &changed).await?,
            None => println!("{state}\n"),
        }
        previous = Some(state);
    }
    Ok(())
}

async fn execute(
    kettle: &BleKettle,
    device: &ble::Peripheral,
    command: &commandline::CliCommands,
    config: &config::Config,
) -> Result<()> {
    match command {
        commandline::CliCommands::Daemon {
            poll_interval,
            output,
        } => {
            info!("Starting daemon mode: output={output:?}, interval={poll_interval:?}");
            match output {
                commandline::DaemonOutput::Console => {
                    run_daemon(kettle, device, *poll_interval, None).await?;
                }
                commandline::DaemonOutput::Mqtt => {
                    let Some(mqtt_config) = &config.mqtt else {
                        bail!("The config file has no mqtt section");
                    };
                    let publisher = mqtt::Publisher::connect(mqtt_config).await?;
                    let result = run_daemon(kettle, device, *poll_interval, Some(&publisher)).await;
                    publisher.disconnect().await?;
                    result?;
                }
            }
        }
        commandline::CliCommands::Read => {
            info!("Executing: Read State");
            print_state!(kettle, device);
        }
        commandline::CliCommands::Power { on } => {
            let label = if *on { "on" } else { "off" };
            info!("Executing: Power {label}");
            kettle
                .set_power(device, *on)
                .await
                .with_context(|| format!("Failed to switch the kettle {label}"))?;
            println!("Kettle switched {label}.");
        }
        commandline::CliCommands::SetTemperature { value, unit } => {
            info!("Executing: Set Temperature to {value} {}", unit.symbol());
            if !unit.display_range().contains(value) {
                warn!(
                    "{value} {} is outside the brewing range {:?}",
                    unit.symbol(),
                    unit.display_range()
                );
            }
            kettle
                .set_temperature(device, *value, *unit)
                .await
                .with_context(|| format!("Failed to set temperature to {value}"))?;
            println!("Target temperature set to {value} {}.", unit.symbol());
        }
        commandline::CliCommands::SetHoldTime { minutes } => {
            info!("Executing: Set Hold Time to {minutes} min");
            kettle
                .set_hold_time(device, *minutes)
                .await
                .with_context(|| format!("Failed to set hold time to {minutes}"))?;
            println!("Hold time set to {} min.", proto::HoldTime::clamped(*minutes).minutes());
        }
        commandline::CliCommands::SetPreBoil { on } => {
            info!("Executing: Set Pre-Boil to {on}");
            kettle
                .set_pre_boil(device, *on)
                .await
                .with_context(|| "Failed to set pre-boil")?;
            println!("Pre-boil {}.", if *on { "enabled" } else { "disabled" });
        }
        commandline::CliCommands::SetChimeVolume { volume } => {
            info!("Executing: Set Chime Volume to {volume}");
            kettle
                .set_chime_volume(device, *volume)
                .await
                .with_context(|| format!("Failed to set chime volume to {volume}"))?;
            println!(
                "Chime volume set to {}.",
                proto::ChimeVolume::clamped(*volume).level()
            );
        }
        commandline::CliCommands::SetUnits { unit } => {
            info!("Executing: Set Units to {unit}");
            kettle
                .set_units(device, *unit)
                .await
                .with_context(|| format!("Failed to set units to {unit}"))?;
            println!("Display unit set to {unit}.");
        }
        commandline::CliCommands::SetClock { time, mode } => {
            info!("Executing: Set Clock to {time}");
            kettle
                .set_clock_time(device, time.hour(), time.minute(), *mode)
                .await
                .with_context(|| format!("Failed to set clock to {time}"))?;
            println!("Clock set to {time}.");
        }
        commandline::CliCommands::SyncClock => {
            info!("Executing: Sync Clock");
            kettle
                .sync_clock(device)
                .await
                .with_context(|| "Failed to synchronize the clock")?;
            println!("Clock synchronized to local time.");
        }
        commandline::CliCommands::SetAltitude { meters } => {
            info!("Executing: Set Altitude to {meters} m");
            kettle
                .set_altitude(device, *meters)
                .await
                .with_context(|| format!("Failed to set altitude to {meters} m"))?;
            println!("Altitude set to {}.", proto::Altitude::clamped(*meters));
        }
        commandline::CliCommands::SetSchedule {
            mode,
            time,
            temperature,
        } => {
            info!("Executing: Set Schedule {mode} at {time}, {temperature} °C");
            let result = kettle
                .set_schedule(device, *mode, time.hour(), time.minute(), *temperature)
                .await;
            if result.is_err() && kettle.pending_schedule().await.is_some() {
                warn!("Schedule change interrupted after disabling, retrying");
                kettle
                    .resume_schedule(device)
                    .await
                    .with_context(|| "Failed to finish the schedule change")?;
            } else {
                result.with_context(|| format!("Failed to set schedule {mode}"))?;
            }
            println!("Schedule set to {mode}.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "Stagg EKG CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    let config = config::load(args.config_file.as_deref())?;
    trace!("Config: {config:?}");

    match &args.connection {
        commandline::CliConnection::Scan { all } => handle_scan(args.scan_timeout, *all).await,
        commandline::CliConnection::Ble {
            address,
            characteristic,
            command,
        } => {
            info!("Looking for kettle {address}...");
            let device = ble::find_by_address(address, args.scan_timeout)
                .await
                .with_context(|| format!("Cannot find kettle {address}"))?;
            let kettle = Kettle::with_options(
                ble::BleConnector::new(*characteristic),
                config.client.clone(),
            );
            let result = execute(&kettle, &device, command, &config).await;
            kettle.disconnect().await;
            result
        }
    }
}
