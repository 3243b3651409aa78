// fmradio test application -- CLI tool for exercising the radio handle
// against a V4L2 tuner or the built-in simulator.
//
// Usage:
//   fmradio-test-app --simulated info
//   fmradio-test-app --device /dev/radio0 tune 99900
//   fmradio-test-app --simulated --region japan scan
//   fmradio-test-app --config /etc/fmradio/radio.toml seek --direction down --count 3
//   fmradio-test-app --simulated play --freq 91900 --duration 10
//   fmradio-test-app regions

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::debug;

use fmradio::{Radio, RadioBuilder, RadioConfig, RadioMessage, Region, SeekDirection};
use fmradio_core::format_freq_mhz;
use fmradio_device::SimulatedDevice;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// fmradio test application -- drives an FM tuner from the command line.
#[derive(Parser)]
#[command(name = "fmradio-test-app", version, about)]
struct Cli {
    /// Use the in-memory simulated tuner instead of a device node.
    #[arg(long)]
    simulated: bool,

    /// Tuner device node. Overrides `device_path` from the config file.
    #[arg(long)]
    device: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Region: usa, europe, japan.
    #[arg(long)]
    region: Option<Region>,

    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the handle's state, region, and signal.
    Info,

    /// Tune to a frequency in kHz and report signal strength.
    Tune { freq_khz: u32 },

    /// Seek for the next station.
    Seek {
        /// up or down.
        #[arg(long, default_value = "up")]
        direction: SeekDirection,

        /// Number of consecutive seeks.
        #[arg(long, default_value_t = 1)]
        count: u32,
    },

    /// Scan the whole band and list the stations found.
    Scan {
        /// Give up (and stop the scan) after this many seconds.
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },

    /// Play a frequency, printing radio messages until the duration
    /// elapses or Ctrl-C.
    Play {
        /// Frequency in kHz. Defaults to the tuner's start frequency.
        #[arg(long)]
        freq: Option<u32>,

        /// Seconds to play; 0 plays until Ctrl-C.
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// List the supported regions and their band plans.
    Regions,
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_logging(verbose: bool) {
    let default = if verbose { "fmradio=debug,fmradio_device=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<RadioConfig> {
    let mut config = match &cli.config {
        Some(path) => RadioConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RadioConfig::default(),
    };
    if let Some(device) = &cli.device {
        config.device_path = device.clone();
    }
    if let Some(region) = cli.region {
        config.default_region = region;
    }
    Ok(config)
}

async fn create_radio(cli: &Cli) -> Result<Radio> {
    let config = load_config(cli)?;

    let builder = if cli.simulated {
        // The simulator has no antenna jack to probe.
        RadioBuilder::new(SimulatedDevice::new())
    } else {
        device_builder(&config)?
    };

    let radio = builder
        .config(config)
        .create()
        .await
        .context("creating radio handle")?;
    radio.realize().await.context("realizing radio")?;
    Ok(radio)
}

#[cfg(target_os = "linux")]
fn device_builder(config: &RadioConfig) -> Result<RadioBuilder> {
    use fmradio_device::{V4l2Config, V4l2Device};

    debug!(path = %config.device_path.display(), "using V4L2 tuner");
    Ok(RadioBuilder::new(V4l2Device::new(V4l2Config {
        device_path: config.device_path.clone(),
        sysfs_dir: config.sysfs_dir.clone(),
    })))
}

#[cfg(not(target_os = "linux"))]
fn device_builder(_config: &RadioConfig) -> Result<RadioBuilder> {
    bail!("hardware tuners are only supported on Linux; use --simulated")
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_info(radio: &Radio) -> Result<()> {
    let (min, max) = radio.get_region_frequency_range().await;

    println!("Radio");
    println!("  State:          {}", radio.get_state().await);
    println!("  Region:         {}", radio.get_region().await?);
    println!(
        "  Band:           {} - {}",
        format_freq_mhz(min),
        format_freq_mhz(max)
    );
    println!("  Spacing:        {} kHz", radio.get_channel_spacing().await);
    println!(
        "  Frequency:      {}",
        format_freq_mhz(radio.get_frequency().await?)
    );
    println!("  Volume:         {}", radio.get_volume().await);
    println!("  Muted:          {}", radio.get_mute().await);
    println!("  Antenna:        {}", radio.get_device_available().await?);
    Ok(())
}

async fn cmd_tune(radio: &Radio, freq_khz: u32) -> Result<()> {
    radio.set_frequency(freq_khz).await?;
    radio.start().await.context("starting playback")?;
    let signal = radio.get_signal_strength().await?;
    println!(
        "Tuned to {} ({signal} dBm)",
        format_freq_mhz(radio.get_frequency().await?)
    );
    radio.stop().await?;
    Ok(())
}

/// Wait for the next message matching `pred`, or `None` on timeout.
async fn next_message(
    rx: &mut broadcast::Receiver<RadioMessage>,
    timeout: Duration,
    pred: impl Fn(&RadioMessage) -> bool,
) -> Result<Option<RadioMessage>> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Ok(msg)) if pred(&msg) => return Ok(Some(msg)),
            Ok(Ok(_)) => {}
            Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                println!("[warning] missed {n} messages");
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => bail!("message channel closed"),
            Err(_) => return Ok(None),
        }
    }
}

async fn cmd_seek(radio: &Radio, direction: SeekDirection, count: u32) -> Result<()> {
    let mut rx = radio.subscribe();
    radio.start().await.context("starting playback")?;

    for i in 1..=count {
        radio.seek(direction).await?;
        let msg = next_message(&mut rx, Duration::from_secs(30), |m| {
            matches!(m, RadioMessage::SeekFinish { .. })
        })
        .await?;
        match msg {
            Some(RadioMessage::SeekFinish {
                frequency: Some(freq),
            }) => println!("[{i}/{count}] found {}", format_freq_mhz(freq)),
            Some(_) => println!("[{i}/{count}] no station"),
            None => {
                radio.seek_cancel().await?;
                println!("[{i}/{count}] timed out");
            }
        }
    }
    radio.stop().await?;
    Ok(())
}

async fn cmd_scan(radio: &Radio, timeout_secs: u64) -> Result<()> {
    let mut rx = radio.subscribe();
    radio.start_scan().await.context("starting scan")?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
    let mut stations = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Ok(RadioMessage::ScanInfo { frequency })) => {
                println!("  {}", format_freq_mhz(frequency));
                stations.push(frequency);
            }
            Ok(Ok(msg)) if msg.is_scan_terminal() => break,
            Ok(Ok(_)) => {}
            Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                println!("[warning] missed {n} messages");
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => bail!("message channel closed"),
            Err(_) => {
                println!("Scan timed out, stopping.");
                radio.stop_scan().await?;
                break;
            }
        }
    }
    println!("{} station(s) found.", stations.len());
    Ok(())
}

async fn cmd_play(radio: &Radio, freq: Option<u32>, duration_secs: u64) -> Result<()> {
    if let Some(freq) = freq {
        radio.set_frequency(freq).await?;
    }
    let mut rx = radio.subscribe();
    radio.start().await.context("starting playback")?;
    println!(
        "Playing {} (Ctrl-C to stop)...",
        format_freq_mhz(radio.get_frequency().await?)
    );

    let sleep = async {
        if duration_secs > 0 {
            tokio::time::sleep(Duration::from_secs(duration_secs)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => {
                println!("Play duration elapsed.");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted.");
                break;
            }
            msg = rx.recv() => match msg {
                Ok(msg) => println!("[message] {msg:?}"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    println!("[warning] missed {n} messages");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    radio.stop().await?;
    Ok(())
}

fn cmd_regions() -> Result<()> {
    println!("{:<8} {:<22} {:>8} {:>12}", "Region", "Band", "Spacing", "De-emphasis");
    for region in Region::all() {
        let s = region.setting();
        println!(
            "{:<8} {:<22} {:>5} kHz {:>12}",
            region.name(),
            format!(
                "{} - {}",
                format_freq_mhz(s.band_min_khz),
                format_freq_mhz(s.band_max_khz)
            ),
            s.channel_spacing_khz,
            s.deemphasis.to_string(),
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // `regions` needs no tuner.
    if matches!(cli.command, Command::Regions) {
        return cmd_regions();
    }

    let radio = create_radio(&cli).await?;

    let result = match &cli.command {
        Command::Info => cmd_info(&radio).await,
        Command::Tune { freq_khz } => cmd_tune(&radio, *freq_khz).await,
        Command::Seek { direction, count } => cmd_seek(&radio, *direction, *count).await,
        Command::Scan { timeout } => cmd_scan(&radio, *timeout).await,
        Command::Play { freq, duration } => cmd_play(&radio, *freq, *duration).await,
        Command::Regions => Ok(()),
    };

    if let Err(e) = radio.destroy().await {
        eprintln!("Warning: destroying radio handle failed: {e}");
    }
    result
}
