//! External services the pipeline calls but does not own.

use crate::utils::error::Result;
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationAction {
    pub agent: String,
    pub action: String,
}

#[async_trait]
pub trait CoordinationEngine: Send + Sync {
    async fn execute_coordination_cycle(&self) -> Result<Vec<CoordinationAction>>;
}

#[async_trait]
pub trait DroneCommander: Send + Sync {
    async fn send_command(&self, drone_id: &str, command: &str, params: Value) -> Result<()>;
}

/// Coordination engine that only records cycles in the log. Each cycle
/// asks every known agent to hold position.
pub struct SimulatedCoordinator {
    agents: Vec<String>,
    cycles: AtomicU64,
}

impl SimulatedCoordinator {
    pub fn new(agents: Vec<String>) -> Self {
        SimulatedCoordinator {
            agents,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoordinationEngine for SimulatedCoordinator {
    async fn execute_coordination_cycle(&self) -> Result<Vec<CoordinationAction>> {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Coordination cycle {} across {} agent(s)",
            cycle,
            self.agents.len()
        );
        Ok(self
            .agents
            .iter()
            .map(|agent| CoordinationAction {
                agent: agent.clone(),
                action: "hold_position".to_string(),
            })
            .collect())
    }
}

/// Drone command sink that only logs commands.
#[derive(Default)]
pub struct LoggingDroneCommander;

#[async_trait]
impl DroneCommander for LoggingDroneCommander {
    async fn send_command(&self, drone_id: &str, command: &str, params: Value) -> Result<()> {
        info!("Drone {} <- {} {}", drone_id, command, params);
        Ok(())
    }
}
