use crate::common::types::{MissionId, MissionSpec, MissionStatus, StepId, StepStatus, Suggestion};
use crate::step::step::Step;
use crate::utils::error::{Result, WakeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub name: String,
    pub description: String,
    pub status: MissionStatus,
    /// Execution order. Never reordered after creation.
    pub steps: Vec<Step>,
    pub current_step_index: usize,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub agents: Vec<String>,
    pub ai_suggestions: Vec<Suggestion>,
}

impl Mission {
    pub fn new(spec: MissionSpec) -> Result<Self> {
        let id = spec.id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut seen = HashSet::new();
        for step in &spec.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(WakeError::Mission(format!(
                    "Mission {} has duplicate step id {}",
                    id, step.id
                )));
            }
        }

        Ok(Mission {
            id,
            name: spec.name,
            description: spec.description,
            status: MissionStatus::Planning,
            steps: spec.steps.into_iter().map(Step::new).collect(),
            current_step_index: 0,
            progress: 0,
            created_at: Utc::now(),
            start_time: None,
            end_time: None,
            agents: spec.agents,
            ai_suggestions: Vec::new(),
        })
    }

    /// Sets the status, stamping `start_time` on the first activation and
    /// `end_time` on the first terminal status. Stamps are never overwritten.
    pub fn set_status(&mut self, status: MissionStatus) {
        self.status = status;
        let now = Utc::now();
        if status == MissionStatus::Active && self.start_time.is_none() {
            self.start_time = Some(now);
        }
        if status.is_terminal() && self.end_time.is_none() {
            self.end_time = Some(now);
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|step| step.id == step_id)
    }

    /// Prepares the steps for a fresh run and returns the ids of steps
    /// already completed by an earlier run, which are kept as they are.
    pub fn prepare_run(&mut self) -> Vec<StepId> {
        let mut carried = Vec::new();
        for step in &mut self.steps {
            if step.status == StepStatus::Completed {
                carried.push(step.id.clone());
            } else {
                step.reset();
            }
        }
        self.current_step_index = 0;
        self.progress = 0;
        carried
    }

    /// Progress after the step at `index` was processed. Never moves backwards.
    pub fn record_progress(&mut self, index: usize) {
        let total = self.steps.len();
        if total == 0 {
            self.progress = 100;
            return;
        }
        let progress = ((100 * (index + 1)) as f64 / total as f64).round() as u8;
        self.progress = self.progress.max(progress.min(100));
    }

    /// A run succeeded when every step completed, apart from failures the
    /// step itself declared tolerable with `"critical": false`.
    pub fn run_succeeded(&self) -> bool {
        self.steps.iter().all(|step| match step.status {
            StepStatus::Completed => true,
            StepStatus::Failed => !step.is_critical(),
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{StepKind, StepSpec};
    use serde_json::json;

    fn create_test_spec() -> MissionSpec {
        MissionSpec::new(
            "Harbour survey",
            vec![
                StepSpec::new("a", "Scan", StepKind::Scan),
                StepSpec::new("b", "Collect", StepKind::Collect).depends_on("a"),
                StepSpec::new("c", "Transmit", StepKind::Transmit)
                    .with_param("critical", json!(false)),
            ],
        )
    }

    #[test]
    fn test_mission_creation() {
        let mission = Mission::new(create_test_spec()).unwrap();
        assert_eq!(mission.status, MissionStatus::Planning);
        assert_eq!(mission.progress, 0);
        assert_eq!(mission.steps.len(), 3);
        assert!(mission.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert!(Uuid::parse_str(&mission.id).is_ok());
    }

    #[test]
    fn test_duplicate_step_ids_rejected() {
        let spec = MissionSpec::new(
            "Twice",
            vec![
                StepSpec::new("a", "One", StepKind::Collect),
                StepSpec::new("a", "Two", StepKind::Collect),
            ],
        );
        assert!(Mission::new(spec).is_err());
    }

    #[test]
    fn test_timestamps_are_stamped_once() {
        let mut mission = Mission::new(create_test_spec()).unwrap();
        mission.set_status(MissionStatus::Active);
        let started = mission.start_time.unwrap();
        assert!(mission.end_time.is_none());

        mission.set_status(MissionStatus::Paused);
        mission.set_status(MissionStatus::Active);
        assert_eq!(mission.start_time, Some(started));

        mission.set_status(MissionStatus::Failed);
        let ended = mission.end_time.unwrap();
        mission.set_status(MissionStatus::Completed);
        assert_eq!(mission.end_time, Some(ended));
    }

    #[test]
    fn test_progress_rounds_and_never_decreases() {
        let mut mission = Mission::new(create_test_spec()).unwrap();
        mission.record_progress(0);
        assert_eq!(mission.progress, 33);
        mission.record_progress(1);
        assert_eq!(mission.progress, 67);
        mission.record_progress(0);
        assert_eq!(mission.progress, 67);
        mission.record_progress(2);
        assert_eq!(mission.progress, 100);
    }

    #[test]
    fn test_run_verdict() {
        let mut mission = Mission::new(create_test_spec()).unwrap();
        assert!(!mission.run_succeeded());

        mission.steps[0].status = StepStatus::Completed;
        mission.steps[1].status = StepStatus::Completed;
        mission.steps[2].status = StepStatus::Failed;
        assert!(mission.run_succeeded());

        mission.steps[1].status = StepStatus::Skipped;
        assert!(!mission.run_succeeded());
    }

    #[test]
    fn test_prepare_run_keeps_completed_steps() {
        let mut mission = Mission::new(create_test_spec()).unwrap();
        mission.steps[0].status = StepStatus::Completed;
        mission.steps[1].status = StepStatus::Failed;
        mission.steps[1].retry_count = 2;
        mission.progress = 67;

        let carried = mission.prepare_run();
        assert_eq!(carried, vec!["a".to_string()]);
        assert_eq!(mission.steps[1].status, StepStatus::Pending);
        assert_eq!(mission.steps[1].retry_count, 0);
        assert_eq!(mission.progress, 0);
    }
}
