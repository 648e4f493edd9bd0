use crate::step::step::StepHooks;
use crate::utils::duration_ms;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

pub type MissionId = String;
pub type StepId = String;
pub type StepParams = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Planning,
    Active,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl MissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MissionStatus::Completed | MissionStatus::Failed | MissionStatus::Cancelled
        )
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissionStatus::Planning => write!(f, "planning"),
            MissionStatus::Active => write!(f, "active"),
            MissionStatus::Paused => write!(f, "paused"),
            MissionStatus::Completed => write!(f, "completed"),
            MissionStatus::Failed => write!(f, "failed"),
            MissionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// What a step does. Unknown kinds in plan files deserialize as `Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Scan,
    Collect,
    Transmit,
    Move,
    Wait,
    Coordinate,
    #[serde(other)]
    Custom,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::Scan => "scan",
            StepKind::Collect => "collect",
            StepKind::Transmit => "transmit",
            StepKind::Move => "move",
            StepKind::Wait => "wait",
            StepKind::Coordinate => "coordinate",
            StepKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: StepId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub params: StepParams,
    #[serde(default)]
    pub dependencies: Vec<StepId>,
    #[serde(default)]
    pub max_retries: u32,
    /// Minimum latency applied before the step runs.
    #[serde(default, with = "duration_ms::option")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub hooks: StepHooks,
}

impl StepSpec {
    pub fn new(id: impl Into<StepId>, name: impl Into<String>, kind: StepKind) -> Self {
        StepSpec {
            id: id.into(),
            name: name.into(),
            kind,
            description: String::new(),
            params: StepParams::new(),
            dependencies: Vec::new(),
            max_retries: 0,
            timeout: None,
            hooks: StepHooks::default(),
        }
    }

    pub fn depends_on(mut self, step_id: impl Into<StepId>) -> Self {
        self.dependencies.push(step_id.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_hooks(mut self, hooks: StepHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

/// A mission as submitted by a caller, before the registry initializes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionSpec {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<MissionId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub agents: Vec<String>,
}

impl MissionSpec {
    pub fn new(name: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        MissionSpec {
            id: None,
            name: name.into(),
            description: String::new(),
            steps,
            agents: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<MissionId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_agents(mut self, agents: Vec<String>) -> Self {
        self.agents = agents;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub step_id: StepId,
    pub recommendation: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one `execute_mission` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub completed_steps: Vec<StepId>,
    pub failed_steps: Vec<StepId>,
    pub skipped_steps: Vec<StepId>,
    pub message: String,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl ExecutionReport {
    pub fn rejected(message: impl Into<String>) -> Self {
        ExecutionReport {
            success: false,
            completed_steps: Vec::new(),
            failed_steps: Vec::new(),
            skipped_steps: Vec::new(),
            message: message.into(),
            duration: Duration::ZERO,
        }
    }
}
