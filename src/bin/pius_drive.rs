/**
 * PIUS Drive Console
 *
 * Brain-side bench tool:
 * 1. Opens the serial link to the actuator computer
 * 2. Runs the drive loop (arbitration + transmit) in the background
 * 3. Takes user / pilot inputs from the keyboard
 *
 * Usage: pius-drive [--config pius.toml] [--wire-format raw|framed] [device]
 * Default device: /dev/ttyTHS1
 */

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use clap::Parser;
use tracing::{error, info};

use pius_link::config::DEFAULT_TRANSMIT_DEVICE;
use pius_link::{logging, Config, ControlMode, DriveLoop, DriveMode, PilotControl, Transmitter, WireFormat};

const STEP: f64 = 0.1;

#[derive(Debug, Parser)]
#[command(author, version, about = "Drive the PIUS actuator link from the keyboard")]
struct Cli {
    /// Serial device (overrides the config file)
    device: Option<String>,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    wire_format: Option<WireFormat>,
}

fn print_help() {
    println!("\n[Commands]");
    println!("  w/s - throttle up/down");
    println!("  a/d - steer left/right");
    println!("  b   - toggle full brake");
    println!("  m <user|local_angle|local_pilot> - drive mode");
    println!("  p <angle> <throttle> <brake> - pilot values");
    println!("  space - stop all");
    println!("  ? - show state");
    println!("  x - exit\n");
}

fn step(value: f64, delta: f64) -> f64 {
    (((value + delta) * 10.0).round() / 10.0).clamp(-1.0, 1.0)
}

/// Keyboard loop; returns once the user exits or stdin closes
fn console(drive: &DriveLoop) -> io::Result<()> {
    println!("Enter commands (or 'x' to exit):");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 || !drive.is_running() {
            break;
        }

        // a bare space is the stop command
        let cmd = input.trim_end_matches(['\r', '\n']);
        let mut words = cmd.split_whitespace();
        let user = drive.inputs().user;

        match words.next() {
            Some("w") => drive.set_throttle(step(user.throttle, STEP)),
            Some("s") => drive.set_throttle(step(user.throttle, -STEP)),
            Some("a") => drive.set_angle(step(user.angle, -STEP)),
            Some("d") => drive.set_angle(step(user.angle, STEP)),
            Some("b") => drive.set_brake(if user.brake > 0.0 { 0.0 } else { 1.0 }),
            Some("m") => match words.next() {
                Some(label) => drive.set_mode(ControlMode::from_label(label)),
                None => println!("usage: m <mode>"),
            },
            Some("p") => {
                let values: Vec<f64> = words.filter_map(|w| w.parse().ok()).collect();
                match values[..] {
                    [angle, throttle, brake] => drive.set_pilot(PilotControl::new(angle, throttle, brake)),
                    _ => println!("usage: p <angle> <throttle> <brake>"),
                }
            }
            Some("?") => {}
            Some("x" | "exit" | "quit") => {
                println!("[SHUTDOWN]");
                break;
            }
            Some(other) => {
                println!("Unknown command: {}", other);
                continue;
            }
            None if cmd.contains(' ') => {
                drive.stop();
                println!("[STOP]");
            }
            None => continue,
        }

        let inputs = drive.inputs();
        let out = drive.effective_control();
        println!(
            "[{}] user=({:.1}, {:.1}, {:.1}) -> angle={:.2} throttle={:.2} brake={:.2}",
            inputs.mode.label(),
            inputs.user.angle,
            inputs.user.throttle,
            inputs.user.brake,
            out.angle,
            out.throttle,
            out.brake,
        );
    }

    drive.stop();
    drive.shutdown();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init(logging::DEFAULT_FILTER);
    let cli = Cli::parse();

    let config = Config::load_or_default(cli.config.as_deref())?;
    let device = cli
        .device
        .or(config.link.device.clone())
        .unwrap_or_else(|| DEFAULT_TRANSMIT_DEVICE.to_string());
    let format = cli.wire_format.unwrap_or(config.link.wire_format);

    println!("==============================================");
    println!("  PIUS Drive Console");
    println!("==============================================");
    println!("  Port: {}", device);
    println!("  Wire: {}", format);
    println!("  Rate: {} Hz", config.drive.loop_hz);
    println!("  Mode: {}", config.drive.mode.label());
    println!("==============================================\n");

    let transmitter = Transmitter::open(&device, format)?;
    let drive = Arc::new(DriveLoop::new(
        DriveMode::new(config.drive.ai_throttle_mult),
        config.drive.loop_hz,
    ));
    drive.set_mode(config.drive.mode);

    {
        let drive = drive.clone();
        ctrlc::set_handler(move || drive.shutdown())?;
    }

    let handle = drive.clone().start_background(transmitter);

    print_help();
    {
        let drive = drive.clone();
        // detached: a blocked stdin read must not hold up exit
        thread::spawn(move || {
            if let Err(e) = console(&drive) {
                error!("console failed: {}", e);
                drive.shutdown();
            }
        });
    }

    match handle.join() {
        Ok(Ok(ticks)) => info!(ticks, "drive loop finished"),
        Ok(Err(e)) => {
            error!("drive loop failed: {}", e);
            return Err(e.into());
        }
        Err(_) => error!("drive loop panicked"),
    }

    println!("Goodbye!");
    Ok(())
}
