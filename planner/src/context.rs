use kinematics::{CollisionChecker, Configuration, Robot};
use nalgebra::Isometry3;

/// What velocity fields and termination predicates may observe.
///
/// For a velocity field, `configuration` is the candidate the solver is
/// probing and may differ from the robot's committed state. For a
/// termination predicate it is the sample that just passed every
/// constraint check and has been committed.
pub struct PlanningContext<'a> {
    time: f64,
    configuration: &'a Configuration,
    robot: &'a Robot,
    environment: &'a dyn CollisionChecker,
}

impl<'a> PlanningContext<'a> {
    pub fn new(
        time: f64,
        configuration: &'a Configuration,
        robot: &'a Robot,
        environment: &'a dyn CollisionChecker,
    ) -> Self {
        Self {
            time,
            configuration,
            robot,
            environment,
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn configuration(&self) -> &Configuration {
        self.configuration
    }

    pub fn robot(&self) -> &Robot {
        self.robot
    }

    pub fn environment(&self) -> &dyn CollisionChecker {
        self.environment
    }

    pub fn end_effector_transform(&self) -> Isometry3<f64> {
        self.robot.transform_at(self.configuration)
    }
}
