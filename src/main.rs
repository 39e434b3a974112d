//! Command line interface: print an image or scan for BLE printers.

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use niimbot::{
    BleScanner, ConnectionKind, ConnectionSpec, DiscoveryFilter, PrintJob, PrintSession,
    PrinterModel, Rotation, raster,
};

#[derive(Parser)]
#[command(name = "niimbot", version, about = "Print labels on NIIMBOT thermal printers")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print an image
    Print {
        /// Printer model
        #[arg(short, long, default_value = "b21")]
        model: PrinterModel,

        /// Connection type (usb, bluetooth or ble)
        #[arg(short, long, default_value = "usb")]
        conn: ConnectionKind,

        /// Bluetooth/BLE address or serial device path
        #[arg(short, long)]
        addr: Option<String>,

        /// Print density (clamped to the model's maximum)
        #[arg(short, long, default_value_t = 5)]
        density: u8,

        /// Clockwise image rotation (0, 90, 180 or 270)
        #[arg(short, long, default_value = "0")]
        rotate: Rotation,

        /// Image path
        #[arg(short, long)]
        image: PathBuf,

        /// Row packets per transport write (1-50)
        #[arg(short, long, default_value_t = 10)]
        batch_size: usize,
    },
    /// Scan for BLE printers
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,

        /// List every advertising device, not just recognized printers
        #[arg(long)]
        show_all: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "niimbot=debug" } else { "niimbot=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if let Err(e) = run(cli.command) {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Print {
            model,
            conn,
            addr,
            density,
            rotate,
            image,
            batch_size,
        } => {
            let job = PrintJob::new(model)
                .density(density)
                .rotation(rotate)
                .batch_size(batch_size);

            let bitmap = image::open(&image)?.to_luma8();
            // Reject oversized images before touching any device.
            raster::validate_width(&bitmap, rotate, model)?;

            let spec = ConnectionSpec::new(conn, addr);
            let mut session = PrintSession::connect(&spec, job)?;
            if let Err(e) = session.print(&bitmap) {
                if let Some((phase, message)) = session.failure() {
                    tracing::error!(%phase, message, "print aborted");
                }
                return Err(e.into());
            }
            println!("printed {}", image.display());
            Ok(())
        }
        Command::Scan { timeout, show_all } => {
            let filter = if show_all {
                DiscoveryFilter::All
            } else {
                DiscoveryFilter::KnownPrinters
            };
            let session = BleScanner::new()?.scan(Duration::from_secs(timeout), filter)?;
            let mut count = 0usize;
            for device in session {
                let name = if device.name.is_empty() {
                    "<unnamed>"
                } else {
                    device.name.as_str()
                };
                match device.rssi {
                    Some(rssi) => println!("{}  {}  {} dBm", device.address, name, rssi),
                    None => println!("{}  {}", device.address, name),
                }
                count += 1;
            }
            println!("{count} device(s) found");
            Ok(())
        }
    }
}
