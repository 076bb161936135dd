//! Post-processing and execution stages, run inline or deferred.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kinematics::Robot;
use log::debug;
use planner::{PlanningError, Trajectory};
use serde::{Deserialize, Serialize};

use crate::controller::{TrajectoryController, wait_for_completion_blocking};
use crate::deferred::{DeferredExecutor, Execution, ExecutionMode};
use crate::error::ExecutionError;
use crate::pipeline::{PostProcessOptions, PostProcessPipeline};

/// Robot state travels through a chain by value, so only the running stage
/// can touch it.
pub type Stage = (Robot, Trajectory);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    pub post_process: PostProcessOptions,
    /// Seconds to wait for the controller; `None` waits until it is done.
    pub timeout: Option<f64>,
    /// Controller polling period in seconds.
    pub period: f64,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            post_process: PostProcessOptions::default(),
            timeout: None,
            period: 0.01,
        }
    }
}

impl ExecutionOptions {
    fn timeout(&self) -> Result<Option<Duration>, ExecutionError> {
        self.timeout
            .map(Duration::try_from_secs_f64)
            .transpose()
            .map_err(|e| ExecutionError::controller(format!("invalid timeout: {e}")))
    }

    fn period(&self) -> Result<Duration, ExecutionError> {
        Duration::try_from_secs_f64(self.period)
            .map_err(|e| ExecutionError::controller(format!("invalid polling period: {e}")))
    }
}

pub struct ExecutionPipeline<C> {
    executor: DeferredExecutor,
    controller: Arc<Mutex<C>>,
    options: ExecutionOptions,
}

impl<C> Clone for ExecutionPipeline<C> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            controller: Arc::clone(&self.controller),
            options: self.options.clone(),
        }
    }
}

impl<C: TrajectoryController + 'static> ExecutionPipeline<C> {
    pub fn new(executor: DeferredExecutor, controller: C, options: ExecutionOptions) -> Self {
        Self {
            executor,
            controller: Arc::new(Mutex::new(controller)),
            options,
        }
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Picks a post-processing pipeline from the path's tags and the
    /// configured overrides, and produces a timed trajectory.
    pub fn post_process_path(&self, mode: ExecutionMode, robot: Robot, path: Trajectory) -> Execution<Stage> {
        let stage = self.post_process_stage();
        self.executor.run(mode, move || stage((robot, path)))
    }

    /// Executes a timed trajectory and waits for the controller.
    pub fn execute_trajectory(&self, mode: ExecutionMode, robot: Robot, trajectory: Trajectory) -> Execution<Stage> {
        let stage = self.execute_stage();
        self.executor.run(mode, move || stage((robot, trajectory)))
    }

    /// Post-processes `path`, then executes the result.
    pub fn execute_path(&self, mode: ExecutionMode, robot: Robot, path: Trajectory) -> Execution<Stage> {
        self.post_process_path(mode, robot, path)
            .then(self.execute_stage())
    }

    /// Plans on a clone of `robot`, then post-processes and executes the
    /// plan. The robot reaches the executed configuration only through the
    /// controller.
    pub fn plan_and_execute<P>(&self, mode: ExecutionMode, robot: Robot, plan: P) -> Execution<Stage>
    where
        P: FnOnce(&mut Robot) -> planner::Result<Trajectory> + Send + 'static,
    {
        self.executor
            .run(mode, move || {
                let mut scratch = robot.clone();
                let path = plan(&mut scratch)?;
                debug!("planned {} waypoints for \"{}\"", path.len(), robot.name());
                Ok::<_, PlanningError>((robot, path))
            })
            .then(self.post_process_stage())
            .then(self.execute_stage())
    }

    fn post_process_stage(&self) -> impl FnOnce(Stage) -> Result<Stage, PlanningError> + Send + use<C> {
        let options = self.options.post_process.clone();
        move |(robot, path)| {
            let pipeline = PostProcessPipeline::select(&path, &options);
            let trajectory = pipeline.apply(&robot, &path, &options)?;
            Ok((robot, trajectory))
        }
    }

    fn execute_stage(&self) -> impl FnOnce(Stage) -> Result<Stage, ExecutionError> + Send + use<C> {
        let controller = Arc::clone(&self.controller);
        let options = self.options.clone();
        move |(mut robot, trajectory)| {
            let timeout = options.timeout()?;
            let period = options.period()?;
            let mut controller = controller
                .lock()
                .map_err(|_| ExecutionError::controller("controller lock poisoned"))?;

            controller.execute(&mut robot, &trajectory)?;
            wait_for_completion_blocking(&*controller, timeout, period)?;
            Ok((robot, trajectory))
        }
    }
}
