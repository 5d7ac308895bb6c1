//! amr-fleet CLI: loads a warehouse map, POI registry and task batch, wires
//! them into an [`Orchestrator`] and runs the strategic/physics/obstacle
//! threads until the fleet drains its work or a duration elapses. Logging
//! setup uses the same `tracing_subscriber::registry()...init()` idiom as
//! the rest of this crate.

use std::error::Error;
use std::io::{BufRead, Write as _};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tracing::{info, span, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use amr_fleet::config::Config;
use amr_fleet::driving::PhysicsLoop;
use amr_fleet::errors::OrchestratorError;
use amr_fleet::ingest::{load_poi_file, load_task_file};
use amr_fleet::mapping::cost_matrix::CostMatrix;
use amr_fleet::mapping::grid::Grid;
use amr_fleet::mapping::navgraph::NavGraph;
use amr_fleet::mapping::poi::PoiRegistry;
use amr_fleet::orchestrator::{
    build_path_service, default_driver_config, FileTelemetrySink, Fleet, FleetMember,
    Orchestrator, TelemetrySink,
};
use amr_fleet::planning::{Alns, AlnsConfig, BatteryModel, Task, TaskId, VRPStrategy};

#[derive(Parser, Debug)]
#[command(name = "amr-fleet", version, about = "Warehouse AMR fleet orchestrator")]
struct Cli {
    /// Path to a warehouse bitmap (`.` free, `#` obstacle). A synthetic demo
    /// warehouse is generated when omitted.
    #[arg(long)]
    map: Option<String>,

    /// Path to a JSON config overriding tick rates, batch threshold, etc.
    #[arg(long)]
    config: Option<String>,

    /// Path to a POI JSON file.
    #[arg(long)]
    poi: Option<String>,

    /// Path to a task batch JSON file, seeded before the first strategic tick.
    #[arg(long)]
    tasks: Option<String>,

    /// Number of robots to spawn (overridden by config's numRobots if set).
    #[arg(long)]
    robots: Option<usize>,

    /// Wall-clock seconds to run before stopping. Runs until all tasks
    /// complete when omitted.
    #[arg(long)]
    duration: Option<f64>,

    /// Where to write one JSON telemetry line per physics tick.
    #[arg(long, default_value = "telemetry.jsonl")]
    telemetry: String,

    /// Enter an interactive REPL (`inject <n>`, `status`, `stats`, `quit`)
    /// instead of running unattended.
    #[arg(long)]
    cli: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_span_events(fmt::format::FmtSpan::CLOSE).compact())
        .init();

    let args = Cli::parse();
    match run(args) {
        Ok(()) => Ok(()),
        Err(err) => {
            eprintln!("{}", format!("fatal: {err}").red());
            std::process::exit(1);
        }
    }
}

fn run(args: Cli) -> Result<(), OrchestratorError> {
    let init_span = span!(Level::INFO, "init");
    let _guard = init_span.enter();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(robots) = args.robots {
        config.num_robots = robots;
    }
    if config.num_robots == 0 {
        config.num_robots = 3;
    }

    let grid = Arc::new(match &args.map {
        Some(path) => Grid::load_from_file(path, config.map_resolution, config.robot_radius_meters)?,
        None => Grid::load_from_str(&demo_warehouse_bitmap(), config.map_resolution, config.robot_radius_meters)?,
    });
    info!(width = grid.width(), height = grid.height(), "grid loaded");

    let nav = Arc::new(NavGraph::from_grid(&grid)?);
    info!(nodes = nav.node_count(), "navigation graph built");

    let mut poi_registry = PoiRegistry::new();
    if let Some(path) = &args.poi {
        poi_registry = load_poi_file(path)?;
        poi_registry.validate_and_map(&nav, &grid, None);
    }

    let all_nodes: Vec<usize> = (0..nav.node_count()).collect();
    let mut cost_matrix = CostMatrix::new();
    cost_matrix.precompute_for(&nav, &all_nodes);
    let cost_matrix = Arc::new(cost_matrix);
    info!(nodes = all_nodes.len(), "cost matrix precomputed");

    let path_service = build_path_service(grid.clone(), 2);
    let driver_config = default_driver_config(
        config.robot_radius_meters,
        config.robot_speed_mps,
        config.map_resolution.meters_per_pixel(),
    );

    let start_node = all_nodes.first().copied().unwrap_or(0);
    let members: Vec<FleetMember> = (0..config.num_robots)
        .map(|i| {
            let start_coords = nav
                .nodes
                .get(start_node)
                .map(|n| n.centroid)
                .unwrap_or_else(|| amr_fleet::geometry::Coordinates::new(0, 0));
            FleetMember::new(i as u64 + 1, start_coords, start_node, path_service.clone(), driver_config)
        })
        .collect();
    let fleet = Fleet::new(members);
    info!(robots = config.num_robots, "fleet spawned");

    let strategy: Arc<dyn VRPStrategy + Send + Sync> = Arc::new(Alns::new(AlnsConfig::default()));
    let battery_model = BatteryModel::default();

    let orchestrator = Arc::new(Orchestrator::new(
        nav,
        grid,
        cost_matrix,
        &poi_registry,
        fleet,
        config.clone(),
        battery_model,
        strategy,
    ));

    if let Some(path) = &args.tasks {
        let tasks = load_task_file(path, &poi_registry)?;
        info!(tasks = tasks.len(), "seeding tasks from file");
        orchestrator.seed_tasks(tasks);
    } else if args.poi.is_none() {
        orchestrator.seed_tasks(demo_tasks());
    }

    let telemetry: Arc<std::sync::Mutex<dyn TelemetrySink>> =
        Arc::new(std::sync::Mutex::new(FileTelemetrySink::create(&args.telemetry)?));

    if args.cli {
        run_interactive(orchestrator, telemetry, config)
    } else {
        run_unattended(orchestrator, telemetry, config, args.duration)
    }
    Ok(())
}

fn run_unattended(
    orchestrator: Arc<Orchestrator>,
    telemetry: Arc<std::sync::Mutex<dyn TelemetrySink>>,
    config: Config,
    duration: Option<f64>,
) {
    let handles = spawn_threads(orchestrator.clone(), telemetry, config);
    let start = std::time::Instant::now();
    loop {
        if let Some(limit) = duration {
            if start.elapsed().as_secs_f64() >= limit {
                break;
            }
        } else if orchestrator.is_all_tasks_complete() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    orchestrator.stop();
    for handle in handles {
        let _ = handle.join();
    }
    println!(
        "{}",
        format!("done: {} tasks completed", orchestrator.completed_tasks()).green()
    );
}

fn run_interactive(
    orchestrator: Arc<Orchestrator>,
    telemetry: Arc<std::sync::Mutex<dyn TelemetrySink>>,
    config: Config,
) {
    let handles = spawn_threads(orchestrator.clone(), telemetry, config);
    println!("amr-fleet interactive mode. Commands: inject <n>, status, stats, quit");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("quit") | Some("exit") => break,
            Some("status") => {
                println!(
                    "fleet_size={} completed_tasks={} all_complete={}",
                    orchestrator.fleet_size(),
                    orchestrator.completed_tasks(),
                    orchestrator.is_all_tasks_complete()
                );
            }
            Some("stats") => {
                println!("completed_tasks={}", orchestrator.completed_tasks());
            }
            Some("inject") => {
                let n: u64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1);
                let tasks = synthetic_tasks(n);
                println!("injecting {} tasks", tasks.len());
                orchestrator.inject_tasks(tasks);
            }
            Some("help") => {
                println!("commands: inject <n>, status, stats, quit");
            }
            _ => println!("unknown command, try: help"),
        }
        let _ = std::io::stdout().flush();
    }

    orchestrator.stop();
    for handle in handles {
        let _ = handle.join();
    }
}

fn spawn_threads(
    orchestrator: Arc<Orchestrator>,
    telemetry: Arc<std::sync::Mutex<dyn TelemetrySink>>,
    config: Config,
) -> Vec<std::thread::JoinHandle<()>> {
    let mut handles = Vec::new();

    let strategic_orch = orchestrator.clone();
    let strategic_interval = strategic_orch.warehouse_tick_duration();
    handles.push(std::thread::spawn(move || {
        while strategic_orch.is_running() {
            strategic_orch.strategic_tick();
            std::thread::sleep(strategic_interval);
        }
    }));

    let physics_orch = orchestrator.clone();
    let physics_interval = physics_orch.orca_tick_duration();
    let mut physics_loop = PhysicsLoop::new(physics_interval.as_secs_f64(), 40.0);
    let mut tick: u64 = 0;
    handles.push(std::thread::spawn(move || {
        while physics_orch.is_running() {
            physics_orch.physics_tick(&mut physics_loop);
            tick += 1;
            let snapshot = physics_orch.snapshot_telemetry(tick);
            if let Ok(mut sink) = telemetry.lock() {
                amr_fleet::orchestrator::telemetry::publish_lossy(&mut *sink, &snapshot);
            }
            std::thread::sleep(physics_interval);
        }
    }));

    let obstacle_orch = orchestrator.clone();
    let obstacle_interval = Duration::from_secs_f64(config.obstacle_tick_ms / 1000.0);
    handles.push(std::thread::spawn(move || {
        // Extension point: no dynamic obstacle source is wired up yet.
        while obstacle_orch.is_running() {
            std::thread::sleep(obstacle_interval);
        }
    }));

    handles
}

fn demo_warehouse_bitmap() -> String {
    let n = 40;
    let mut text = format!("{n} {n}\n");
    for y in 0..n {
        let mut row = String::with_capacity(n);
        for x in 0..n {
            let is_shelf_wall = x % 6 == 3 && y % 8 < 5;
            row.push(if is_shelf_wall { '#' } else { '.' });
        }
        text.push_str(&row);
        text.push('\n');
    }
    text
}

fn demo_tasks() -> Vec<Task> {
    synthetic_tasks(5)
}

fn synthetic_tasks(n: u64) -> Vec<Task> {
    (0..n)
        .map(|i| Task {
            id: TaskId(1000 + i),
            source_node: 0,
            dest_node: (i as usize + 1) % 4,
            source_id_str: None,
            dest_id_str: None,
        })
        .collect()
}
