//! ARML bridge - serial driver for the ARML LED strip and IMU
//!
//! Usage:
//!   arml-bridge                     Keep the link alive until Ctrl-C
//!   arml-bridge color red           Queue a colour, wait for the ack, exit
//!   arml-bridge fade red blue 2     Host-side fade over two seconds
//!   arml-bridge imu --seconds 10    Print IMU orientation
//!   arml-bridge ports               List serial ports

use arml_bridge::cli::{Cli, Command};
use arml_bridge::codec::AnimationOverrides;
use arml_bridge::config::{self, Config};
use arml_bridge::controller::LedController;
use arml_bridge::error::{ArmlError, Result};
use arml_bridge::imu::Orientation;
use arml_bridge::logging;
use arml_bridge::session::Session;
use arml_bridge::transport::serial::is_arduino;
use arml_bridge::transport::SerialTransport;
use clap::Parser;
use serialport::SerialPortType;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let command = cli.command.clone().unwrap_or(Command::Run);
    if command == Command::Ports {
        print_ports();
        return Ok(());
    }

    let path = config::config_path(cli.config.as_deref());
    let mut config = config::load(&path)?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let rt = tokio::runtime::Runtime::new().map_err(|e| ArmlError::Runtime { source: e })?;
    rt.block_on(run_command(config, command))
}

async fn run_command(config: Config, command: Command) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_handler(shutdown.clone());

    let session = Session::new(config);
    match command {
        Command::Run => session.run(shutdown).await,
        Command::Imu {
            seconds,
            interval_ms,
        } => {
            session
                .watch_imu(
                    shutdown,
                    seconds.map(Duration::from_secs),
                    Duration::from_millis(interval_ms),
                    print_orientation,
                )
                .await
        }
        Command::Ports => {
            print_ports();
            Ok(())
        }
        one_shot => {
            let drained = session
                .run_once(shutdown, |controller| issue(controller, &one_shot))
                .await?;
            if !drained {
                warn!("Exited before the device acknowledged every command");
            }
            Ok(())
        }
    }
}

fn issue(controller: &LedController, command: &Command) {
    match command {
        Command::Color { color, force } => controller.set_color(*color, *force),
        Command::Brightness { level, force } => controller.set_brightness(*level, *force),
        Command::Ready => controller.set_ready(true, false),
        Command::Loading => controller.set_ready(false, false),
        Command::Default => controller.set_default(false),
        Command::Animate {
            background,
            foreground,
            rate,
            length,
            start,
            end,
        } => controller.set_animation(
            *background,
            *foreground,
            AnimationOverrides {
                rate: *rate,
                length: *length,
                start_index: *start,
                end_index: *end,
            },
        ),
        Command::Fade { from, to, secs } => controller.set_fade(*from, *to, *secs),
        Command::Run | Command::Imu { .. } | Command::Ports => {}
    }
}

fn print_orientation(orientation: &Orientation) {
    let q = orientation.remapped_rotation;
    let [x, y, z] = orientation.euler_angles;
    println!(
        "q=({:+.4}, {:+.4}, {:+.4}, {:+.4})  euler=({:6.1}, {:6.1}, {:6.1})",
        q.x, q.y, q.z, q.w, x, y, z
    );
}

fn print_ports() {
    let ports = SerialTransport::list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
        return;
    }
    for port in &ports {
        let marker = if is_arduino(port) { "*" } else { " " };
        match &port.port_type {
            SerialPortType::UsbPort(usb) => println!(
                "{} {:<20} {:04x}:{:04x} {}",
                marker,
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.as_deref().unwrap_or("")
            ),
            _ => println!("{} {}", marker, port.port_name),
        }
    }
}

// ============================================================================
// Signals
// ============================================================================

fn spawn_signal_handler(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutting down");
        shutdown.store(true, Ordering::SeqCst);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("SIGTERM handler unavailable: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {},
        _ = tokio::signal::ctrl_c() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
