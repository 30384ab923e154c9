/**
 * PIUS Actuator Receiver
 *
 * Actuator-side process:
 * 1. Opens the serial link from the brain computer
 * 2. Claims the steering / throttle / brake PWM pins and the direction relays
 * 3. Applies every received frame until SIGINT/SIGTERM, then goes neutral
 *
 * Usage: pius-receiver [--config pius.toml] [--wire-format raw|framed] [--simulate] [device]
 * Default device: /dev/serial0
 *
 * Driving real outputs needs a build with `--features rpi`; without it the
 * receiver refuses to start unless `--simulate` is given.
 */

use std::path::PathBuf;
use clap::Parser;
use tracing::info;

use pius_link::config::DEFAULT_RECEIVE_DEVICE;
use pius_link::actuator::hardware_backend;
use pius_link::{logging, ActuatorBackend, Config, Receiver, ReceiverOptions, ShutdownToken, SimulatedBackend, WireFormat};

#[derive(Debug, Parser)]
#[command(author, version, about = "Apply PIUS actuation frames to the car's outputs")]
struct Cli {
    /// Serial device (overrides the config file)
    device: Option<String>,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    wire_format: Option<WireFormat>,

    /// Drive an in-memory backend instead of the GPIO pins
    #[arg(long)]
    simulate: bool,
}

fn serve<B: ActuatorBackend>(
    device: &str,
    backend: B,
    options: ReceiverOptions,
    token: &ShutdownToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut receiver = Receiver::open(device, backend, options)?;
    receiver.run(token)?;
    info!(stats = ?receiver.stats(), "receiver exited");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init(logging::DEFAULT_FILTER);
    let cli = Cli::parse();

    let config = Config::load_or_default(cli.config.as_deref())?;
    let device = cli
        .device
        .or(config.link.device.clone())
        .unwrap_or_else(|| DEFAULT_RECEIVE_DEVICE.to_string());
    let options = ReceiverOptions {
        format: cli.wire_format.unwrap_or(config.link.wire_format),
        failsafe_after: config.receiver.failsafe_after,
    };

    let token = ShutdownToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || token.cancel())?;
    }

    info!(device = %device, format = %options.format, "starting receiver");

    if cli.simulate {
        serve(&device, SimulatedBackend::new(), options, &token)
    } else {
        let backend = hardware_backend(&config.pins)?;
        serve(&device, backend, options, &token)
    }
}
