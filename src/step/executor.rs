use crate::collaborator::{CoordinationEngine, DroneCommander};
use crate::common::types::StepKind;
use crate::step::step::Step;
use crate::utils::error::Result;
use async_trait::async_trait;
use log::{debug, info};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Caller-supplied work for `custom` steps, selected by `params.handler`.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn handle(&self, step: &Step) -> Result<Value>;
}

/// Mission-level facts a step may need while running.
pub struct StepContext<'a> {
    pub mission_id: &'a str,
    pub agents: &'a [String],
}

/// Dispatches a step to the executor for its kind. Every executor returns
/// its result value or the error that makes the attempt count as failed.
pub struct StepExecutor {
    coordinator: Arc<dyn CoordinationEngine>,
    drones: Arc<dyn DroneCommander>,
    custom_handlers: HashMap<String, Arc<dyn StepHandler>>,
    default_wait: Duration,
}

impl StepExecutor {
    pub fn new(
        coordinator: Arc<dyn CoordinationEngine>,
        drones: Arc<dyn DroneCommander>,
        default_wait: Duration,
    ) -> Self {
        StepExecutor {
            coordinator,
            drones,
            custom_handlers: HashMap::new(),
            default_wait,
        }
    }

    pub fn register_handler(&mut self, name: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.custom_handlers.insert(name.into(), handler);
    }

    pub async fn execute(&self, ctx: &StepContext<'_>, step: &Step) -> Result<Value> {
        debug!(
            "Mission {}: dispatching {} step {}",
            ctx.mission_id, step.kind, step.id
        );
        match step.kind {
            StepKind::Scan => self.scan(ctx).await,
            StepKind::Collect => Ok(json!({ "collected": true, "step": step.id })),
            StepKind::Transmit => Ok(json!({ "transmitted": true, "step": step.id })),
            StepKind::Move => self.move_drone(step).await,
            StepKind::Wait => self.wait(step).await,
            StepKind::Coordinate => self.coordinate().await,
            StepKind::Custom => self.custom(step).await,
        }
    }

    async fn scan(&self, ctx: &StepContext<'_>) -> Result<Value> {
        if ctx.agents.is_empty() {
            return Ok(json!({ "scanned": true, "actions": 0 }));
        }
        let actions = self.coordinator.execute_coordination_cycle().await?;
        Ok(json!({ "scanned": true, "actions": actions.len() }))
    }

    /// Reads the drone from `droneId`, falling back to `drone_id`.
    async fn move_drone(&self, step: &Step) -> Result<Value> {
        let drone_id = step
            .param_str("droneId")
            .or_else(|| step.param_str("drone_id"));
        let target = step.params.get("target");
        match (drone_id, target) {
            (Some(drone_id), Some(target)) => {
                self.drones
                    .send_command(drone_id, "move", json!({ "target": target }))
                    .await?;
                info!("Step {}: drone {} moving", step.id, drone_id);
                Ok(json!({ "moved": true, "drone_id": drone_id }))
            }
            _ => Ok(json!({ "moved": false })),
        }
    }

    async fn wait(&self, step: &Step) -> Result<Value> {
        let duration = step
            .param_u64("duration")
            .map(Duration::from_millis)
            .unwrap_or(self.default_wait);
        tokio::time::sleep(duration).await;
        Ok(json!({ "waited_ms": duration.as_millis() as u64 }))
    }

    async fn coordinate(&self) -> Result<Value> {
        let actions = self.coordinator.execute_coordination_cycle().await?;
        Ok(json!({ "coordinated": true, "actions": actions }))
    }

    async fn custom(&self, step: &Step) -> Result<Value> {
        match step
            .param_str("handler")
            .and_then(|name| self.custom_handlers.get(name))
        {
            Some(handler) => handler.handle(step).await,
            None => Ok(json!({ "custom": true })),
        }
    }
}
