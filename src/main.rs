// src/main.rs
// Entry point for the waypoint mission controller: loads the waypoint document and
// settings, wires the control plane and motion stack, then runs the mission loop.

use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use waypoint_mission::control::{HttpControlChannel, RemoteControlChannel, Status, StatusEvent};
use waypoint_mission::core::{ConfigError, MissionSettings, PoseFeed, SystemClock, WaypointSet};
use waypoint_mission::navigation::{MissionController, SimulatedExecutor, SimulatedLocalization};
use waypoint_mission::MissionError;

const SIM_LOCALIZATION_PERIOD: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "waypoint-mission", version, about)]
struct Args {
    /// Waypoint document (YAML with `home` and `waypoints`)
    #[arg(long, default_value = "waypoints.yaml")]
    waypoints: PathBuf,

    /// Mission settings file; defaults are used when omitted
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Control-plane base URL, overrides the settings file
    #[arg(long)]
    server: Option<String>,

    /// Drive a simulated robot instead of Nav2
    #[arg(long)]
    simulate: bool,

    /// Poll ticks a simulated goal takes to complete
    #[arg(long, default_value_t = 20)]
    sim_goal_ticks: u32,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    info!("[BOOT] Starting waypoint mission controller...");

    match run(&args) {
        Err(MissionError::Config(e)) => {
            error!("[BOOT] configuration error: {}", e);
            std::process::exit(1);
        }
        other => Ok(other?),
    }
}

fn run(args: &Args) -> Result<(), MissionError> {
    let settings = match load_settings(args) {
        Ok(settings) => settings,
        Err(e) => {
            let fallback = with_overrides(args, MissionSettings::default());
            let mut channel =
                HttpControlChannel::new(&fallback.server_base, fallback.http_timeout())?;
            report_config_error(&mut channel, &e);
            return Err(e.into());
        }
    };

    let mut channel = HttpControlChannel::new(&settings.server_base, settings.http_timeout())?;
    info!("[BOOT] control plane at {}", channel.base());

    let waypoints = WaypointSet::load(&args.waypoints)
        .inspect_err(|e| report_config_error(&mut channel, e))?;
    info!(
        "[BOOT] {} waypoint(s) in frame '{}', home {}",
        waypoints.len(),
        waypoints.frame(),
        waypoints.home()
    );

    if args.simulate {
        run_simulated(args, channel, waypoints, settings)
    } else {
        run_ros(channel, waypoints, settings)
    }
}

fn load_settings(args: &Args) -> Result<MissionSettings, ConfigError> {
    let settings = match &args.settings {
        Some(path) => MissionSettings::load(path)?,
        None => MissionSettings::default(),
    };
    Ok(with_overrides(args, settings))
}

fn with_overrides(args: &Args, mut settings: MissionSettings) -> MissionSettings {
    if let Some(server) = &args.server {
        settings.server_base = server.clone();
    }
    settings
}

/// Tells the peer the configuration is unusable
fn report_config_error(channel: &mut impl RemoteControlChannel, e: &ConfigError) {
    channel.emit_status(&StatusEvent::new(Status::PoseFileError).with("message", e.to_string()));
}

/// Clears `running` on Ctrl+C so the controller cancels its goal and returns
fn stop_on_ctrl_c(running: Arc<AtomicBool>) -> Result<(), MissionError> {
    ctrlc::set_handler(move || {
        info!("[MAIN] Ctrl+C");
        running.store(false, Ordering::SeqCst);
    })?;
    Ok(())
}

fn run_simulated(
    args: &Args,
    channel: HttpControlChannel,
    waypoints: WaypointSet,
    settings: MissionSettings,
) -> Result<(), MissionError> {
    warn!("[BOOT] simulation mode: no robot will move");
    let feed = PoseFeed::new();
    let localization = SimulatedLocalization::new(waypoints.home().clone(), feed.clone());
    let executor =
        SimulatedExecutor::new(args.sim_goal_ticks).with_localization(localization.clone());

    let mut controller =
        MissionController::new(executor, channel, SystemClock, waypoints, settings, feed)
            .with_initial_pose_publisher(Box::new(localization.clone()));
    stop_on_ctrl_c(controller.shutdown_handle())?;
    let stream = localization.spawn(SIM_LOCALIZATION_PERIOD, controller.shutdown_handle());

    controller.run();
    if stream.join().is_err() {
        warn!("[MAIN] simulated localization thread panicked");
    }
    Ok(())
}

#[cfg(feature = "ros")]
fn run_ros(
    channel: HttpControlChannel,
    waypoints: WaypointSet,
    settings: MissionSettings,
) -> Result<(), MissionError> {
    use waypoint_mission::ros_interface::RosBridge;

    let feed = PoseFeed::new();
    let bridge = RosBridge::start("waypoint_mission", waypoints.frame(), feed.clone())?;
    let executor = bridge.executor()?;
    let seeder = bridge.initial_pose_output()?;

    let mut controller =
        MissionController::new(executor, channel, SystemClock, waypoints, settings, feed)
            .with_initial_pose_publisher(Box::new(seeder));
    stop_on_ctrl_c(controller.shutdown_handle())?;
    controller.run();
    Ok(())
}

#[cfg(not(feature = "ros"))]
fn run_ros(
    _channel: HttpControlChannel,
    _waypoints: WaypointSet,
    _settings: MissionSettings,
) -> Result<(), MissionError> {
    error!("[BOOT] built without the `ros` feature; rebuild with it or pass --simulate");
    Err(MissionError::Unsupported("ROS 2 motion stack"))
}
