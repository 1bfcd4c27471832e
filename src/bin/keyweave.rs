// Keyweave CLI
// Grabs keyboards, runs the transform engine and writes to a virtual device

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context as _, Result};
use clap::Parser;

use keyweave_core::config::{default_config_path, Config};
use keyweave_core::context::{NoWindowContext, WaylandContextProvider};
use keyweave_core::event::EventLoop;
use keyweave_core::input::DeviceFilter;
use keyweave_core::output::VirtualDevice;
use keyweave_core::{Control, ContextProvider, InputEvent, Output, TransformEngine};

/// Longest the loop sleeps without checking the shutdown flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Keyboard remapper for Linux
#[derive(Parser, Debug)]
#[command(name = "keyweave")]
#[command(version)]
#[command(about = "Keyboard remapper: modmaps, tap/hold keys and per-application keymaps", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Devices to grab by name or path (can be used multiple times)
    #[arg(short, long, value_name = "DEVICE")]
    devices: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Validate config and exit
    #[arg(long)]
    check_config: bool,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Do not query the focused window; only unconditional rules apply
    #[arg(long)]
    no_window_context: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    if args.list_devices {
        list_devices(&DeviceFilter::new(args.devices.iter().cloned()));
        return Ok(());
    }

    let config = load_config(args.config.clone())?;
    if args.check_config {
        println!("Configuration is valid: {}", config.rules.summary());
        return Ok(());
    }

    run(&args, config)
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = match path.or_else(default_config_path) {
        Some(path) if path.exists() => path,
        Some(path) => bail!("config file {} does not exist", path.display()),
        None => bail!("no config file given and no config directory found"),
    };
    Config::from_toml_path(&path).with_context(|| format!("failed to load {}", path.display()))
}

fn list_devices(filter: &DeviceFilter) {
    let devices = EventLoop::list_devices(filter);
    if devices.is_empty() {
        println!("No input devices found (are you in the 'input' group?)");
        return;
    }
    println!("{:<20} {:<4} {:<40} {}", "Device", "Use", "Name", "Phys");
    for dev in devices {
        let mark = if dev.selected { "*" } else { "" };
        println!(
            "{:<20} {:<4} {:<40} {}",
            dev.path,
            mark,
            dev.name,
            dev.phys.unwrap_or_default()
        );
    }
}

/// Wayland first, then X11 when built in, otherwise no window context
fn select_context_provider(disabled: bool) -> Box<dyn ContextProvider> {
    if disabled {
        log::info!("Window context disabled");
        return Box::new(NoWindowContext);
    }

    let mut wayland = WaylandContextProvider::new();
    match wayland.connect() {
        Ok(()) => return Box::new(wayland),
        Err(e) => log::debug!("Wayland window context unavailable: {}", e),
    }

    #[cfg(feature = "x11-backend")]
    if std::env::var_os("DISPLAY").is_some() {
        return Box::new(keyweave_core::context::X11ContextProvider::new());
    }

    log::warn!("No window context available; conditional rules only see device and lock state");
    Box::new(NoWindowContext)
}

fn install_signal_handler(running: Arc<AtomicBool>) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    match Signals::new([SIGINT, SIGTERM]) {
        Ok(mut signals) => {
            std::thread::spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    log::info!("Received signal {}, shutting down", signal);
                    running.store(false, Ordering::SeqCst);
                }
            });
        }
        Err(e) => log::warn!("Could not install signal handler: {}", e),
    }
}

fn run(args: &Args, config: Config) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    install_signal_handler(Arc::clone(&running));

    // CLI --devices > config [devices].only > autodetect
    let filter = if args.devices.is_empty() {
        config.devices.clone()
    } else {
        DeviceFilter::new(args.devices.iter().cloned())
    };

    let output = VirtualDevice::with_delays(config.delays).context("failed to create output device")?;
    let provider = select_context_provider(args.no_window_context);
    let mut engine = TransformEngine::new(config.rules, Output::new(output), provider);

    let mut event_loop = EventLoop::open(&filter).context("failed to grab input devices")?;
    log::info!(
        "Keyweave is running on {} device(s): {}",
        event_loop.device_count(),
        event_loop.device_names().join(", ")
    );

    let result = main_loop(&mut event_loop, &mut engine, &config.control_keys, &running);

    event_loop.ungrab_all();
    let shutdown = engine.shutdown();
    result?;
    shutdown.context("failed to release keys on shutdown")?;
    log::info!("Keyweave stopped");
    Ok(())
}

fn main_loop(
    event_loop: &mut EventLoop,
    engine: &mut TransformEngine<VirtualDevice>,
    control_keys: &keyweave_core::ControlKeys,
    running: &AtomicBool,
) -> Result<()> {
    while running.load(Ordering::SeqCst) {
        let timeout = engine
            .time_to_deadline(Instant::now())
            .map_or(POLL_INTERVAL, |left| left.min(POLL_INTERVAL));

        for polled in event_loop.poll(Some(timeout))? {
            if let InputEvent::Key(ev) = &polled.event {
                if control_keys.is_control(ev.key) {
                    match control_keys.check(ev.key, ev.action) {
                        Some(Control::Eject) => {
                            log::warn!("Emergency eject key pressed, exiting");
                            running.store(false, Ordering::SeqCst);
                            return Ok(());
                        }
                        Some(Control::Diagnostics) => engine.dump_diagnostics(),
                        None => {}
                    }
                    continue;
                }
            }
            engine.on_event(&polled.event, &polled.source)?;
        }

        engine.tick(Instant::now())?;
    }
    Ok(())
}
