use std::path::PathBuf;

use clap::Parser;
use interface::config::DemoConfig;
use interface::{DeferredExecutor, Execution, ExecutionPipeline, IdealController};
use kinematics::Robot;
use log::{debug, error, info};
use planner::VectorFieldPlanner;

#[derive(Parser)]
#[command(name = "motion-demo")]
#[command(about = "Plans and executes a straight-line end-effector motion", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON configuration; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Plan and execute on the blocking pool instead of inline
    #[arg(short, long)]
    defer: bool,

    /// Print the executed trajectory as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => DemoConfig::load(path)?,
        None => DemoConfig::default(),
    };
    if cli.defer {
        config.mode = interface::ExecutionMode::Deferred;
    }

    let robot = config.arm.build()?;
    info!("Initializing {} at {:?}", robot.name(), robot.configuration().as_slice());

    let pipeline = ExecutionPipeline::new(
        DeferredExecutor::current()?,
        IdealController::default(),
        config.execution.clone(),
    );

    let environment = config.environment();
    let direction = config.direction();
    let offset = config.offset.clone();
    let execution = pipeline.plan_and_execute(config.mode, robot, move |robot: &mut Robot| {
        VectorFieldPlanner::new().plan_to_end_effector_offset(robot, &environment, &direction, &offset)
    });

    if let Execution::Deferred(task) = &execution {
        info!("Motion deferred; finished = {}", task.is_finished());
    }
    let (robot, trajectory) = execution.resolve().await?;

    info!(
        "Motion complete: {} waypoints over {:.3}s, now at {:?}",
        trajectory.len(),
        trajectory.duration(),
        robot.configuration().as_slice()
    );
    for (dof, state) in robot.joint_states().iter().enumerate() {
        debug!("DOF {dof}: position {:.4}", state.position);
    }
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&trajectory)?);
    }
    Ok(())
}
