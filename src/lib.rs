pub mod advisor;
pub mod collaborator;
pub mod common;
pub mod config;
pub mod executor;
pub mod mission;
pub mod persistence;
pub mod step;
pub mod utils;

pub use crate::advisor::Advisor;
pub use crate::common::types::{
    ExecutionReport, MissionId, MissionSpec, MissionStatus, StepKind, StepSpec, StepStatus,
    Suggestion,
};
pub use crate::config::config::{ConfigManager, PipelineConfig, PlanConfig};
pub use crate::executor::Pipeline;
pub use crate::mission::mission::Mission;
pub use crate::mission::registry::{MissionRegistry, Subscription};
pub use crate::step::step::{Step, StepHooks};
pub use crate::utils::error::{Result, WakeError};

use crate::collaborator::{LoggingDroneCommander, SimulatedCoordinator};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// Loads a plan file and registers its missions with a pipeline backed by
/// the simulated collaborators.
pub async fn init<P: AsRef<Path>>(config_path: P) -> Result<Pipeline> {
    let plan = ConfigManager::load_config(config_path)?;

    let agents: BTreeSet<String> = plan
        .missions
        .iter()
        .flat_map(|mission| mission.agents.iter().cloned())
        .collect();

    let pipeline = Pipeline::new(
        MissionRegistry::new(),
        Arc::new(SimulatedCoordinator::new(agents.into_iter().collect())),
        Arc::new(LoggingDroneCommander),
        plan.pipeline,
    );

    for spec in plan.missions {
        pipeline.registry().create_mission(spec).await?;
    }

    Ok(pipeline)
}

/// Executes every registered mission in creation order.
pub async fn run(pipeline: &Pipeline) -> Vec<(MissionId, ExecutionReport)> {
    let mut reports = Vec::new();
    for mission in pipeline.registry().get_missions().await {
        let report = pipeline.execute_mission(&mission.id).await;
        reports.push((mission.id, report));
    }
    reports
}
