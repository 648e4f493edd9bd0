use crate::collaborator::{CoordinationEngine, DroneCommander};
use crate::common::types::{ExecutionReport, MissionStatus, StepId, StepStatus};
use crate::config::config::PipelineConfig;
use crate::mission::mission::Mission;
use crate::mission::registry::MissionRegistry;
use crate::step::executor::{StepContext, StepExecutor, StepHandler};
use crate::step::step::Step;
use crate::utils::error::{Result, WakeError};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Why the step loop ended.
enum Stop {
    Finished,
    CriticalFailure(StepId),
    Interrupted(MissionStatus),
}

#[derive(Default)]
struct RunState {
    completed: Vec<StepId>,
    failed: Vec<StepId>,
    skipped: Vec<StepId>,
}

/// Drives missions held in a [`MissionRegistry`] through their steps, one
/// step at a time, applying the dependency gate and the retry policy.
pub struct Pipeline {
    registry: MissionRegistry,
    steps: StepExecutor,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        registry: MissionRegistry,
        coordinator: Arc<dyn CoordinationEngine>,
        drones: Arc<dyn DroneCommander>,
        config: PipelineConfig,
    ) -> Self {
        let steps = StepExecutor::new(coordinator, drones, config.default_wait);
        Pipeline {
            registry,
            steps,
            config,
        }
    }

    pub fn with_custom_handler(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn StepHandler>,
    ) -> Self {
        self.steps.register_handler(name, handler);
        self
    }

    pub fn registry(&self) -> &MissionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs a mission to a verdict. Never fails: every outcome, including
    /// an unknown or already running mission, is described by the report.
    pub async fn execute_mission(&self, mission_id: &str) -> ExecutionReport {
        let started = Instant::now();

        let carried = match self.registry.claim_for_run(mission_id).await {
            Ok(carried) => carried,
            Err(e) => {
                warn!("Mission {} not started: {}", mission_id, e);
                return ExecutionReport::rejected(e.to_string());
            }
        };
        info!("Mission {}: run started", mission_id);

        let mut run = RunState {
            completed: carried,
            ..RunState::default()
        };
        let outcome = self.run_steps(mission_id, &mut run).await;

        let (success, message) = self.finish(mission_id, outcome).await;
        self.registry.release_run(mission_id).await;
        ExecutionReport {
            success,
            completed_steps: run.completed,
            failed_steps: run.failed,
            skipped_steps: run.skipped,
            message,
            duration: started.elapsed(),
        }
    }

    async fn run_steps(&self, mission_id: &str, run: &mut RunState) -> Result<Stop> {
        let mut index = 0;
        loop {
            let mission = self.current(mission_id).await?;
            if mission.status != MissionStatus::Active {
                info!(
                    "Mission {}: {} externally, stopping before step {}",
                    mission_id, mission.status, index
                );
                return Ok(Stop::Interrupted(mission.status));
            }
            let Some(step) = mission.steps.get(index).cloned() else {
                return Ok(Stop::Finished);
            };

            if step.status == StepStatus::Completed && run.completed.contains(&step.id) {
                self.update_step(mission_id, index, true, |_| {}).await?;
                index += 1;
                continue;
            }

            if !step.dependencies_met(&run.completed) {
                info!(
                    "Mission {}: skipping step {}, dependencies {:?} not completed",
                    mission_id, step.id, step.dependencies
                );
                self.update_step(mission_id, index, true, |s| s.status = StepStatus::Skipped)
                    .await?;
                run.skipped.push(step.id);
                index += 1;
                continue;
            }

            self.update_step(mission_id, index, false, |s| s.status = StepStatus::Running)
                .await?;
            tokio::time::sleep(step.timeout.unwrap_or(self.config.default_step_delay)).await;

            let ctx = StepContext {
                mission_id,
                agents: &mission.agents,
            };
            match self.steps.execute(&ctx, &step).await {
                Ok(result) => {
                    self.update_step(mission_id, index, true, |s| {
                        s.status = StepStatus::Completed
                    })
                    .await?;
                    info!("Mission {}: step {} completed", mission_id, step.id);
                    run.completed.push(step.id.clone());
                    step.notify_success(&result);
                    index += 1;
                }
                Err(e) if step.can_retry() => {
                    self.handle_retry(mission_id, index, &step, &e).await?;
                }
                Err(e) => {
                    if let Some(stop) = self
                        .handle_step_failure(mission_id, index, &step, e, run)
                        .await?
                    {
                        return Ok(stop);
                    }
                    index += 1;
                }
            }
        }
    }

    async fn handle_retry(
        &self,
        mission_id: &str,
        index: usize,
        step: &Step,
        error: &WakeError,
    ) -> Result<()> {
        let attempt = self
            .update_step(mission_id, index, false, |s| {
                s.increment_retries();
                s.status = StepStatus::Failed;
                s.retry_count
            })
            .await?;
        warn!(
            "Mission {}: step {} failed ({}), retry {}/{}",
            mission_id, step.id, error, attempt, step.max_retries
        );
        tokio::time::sleep(self.config.retry_delay).await;
        Ok(())
    }

    /// Records a step that is out of retries. Returns a stop reason when
    /// the step is critical.
    async fn handle_step_failure(
        &self,
        mission_id: &str,
        index: usize,
        step: &Step,
        failure: WakeError,
        run: &mut RunState,
    ) -> Result<Option<Stop>> {
        let critical = step.is_critical();
        self.update_step(mission_id, index, !critical, |s| {
            s.status = StepStatus::Failed
        })
        .await?;
        run.failed.push(step.id.clone());
        step.notify_failure(&failure);

        if critical {
            error!(
                "Mission {}: critical step {} failed: {}",
                mission_id, step.id, failure
            );
            Ok(Some(Stop::CriticalFailure(step.id.clone())))
        } else {
            warn!(
                "Mission {}: non-critical step {} failed, continuing: {}",
                mission_id, step.id, failure
            );
            Ok(None)
        }
    }

    async fn finish(&self, mission_id: &str, outcome: Result<Stop>) -> (bool, String) {
        match outcome {
            Ok(Stop::Interrupted(status)) => {
                (false, format!("Mission {} before completion", status))
            }
            Ok(stop) => {
                let verdict = self
                    .registry
                    .mutate(mission_id, |mission| {
                        if mission.steps.is_empty() {
                            mission.record_progress(0);
                        }
                        let success = mission.run_succeeded();
                        mission.set_status(if success {
                            MissionStatus::Completed
                        } else {
                            MissionStatus::Failed
                        });
                        success
                    })
                    .await;
                let message = match (verdict, stop) {
                    (None, _) => format!("Mission {} was removed during execution", mission_id),
                    (Some(true), _) => "Mission completed".to_string(),
                    (Some(false), Stop::CriticalFailure(step_id)) => {
                        format!("Mission failed: critical step {} failed", step_id)
                    }
                    (Some(false), _) => "Mission failed: not every step completed".to_string(),
                };
                let success = verdict.unwrap_or(false);
                if success {
                    info!("Mission {}: {}", mission_id, message);
                } else {
                    warn!("Mission {}: {}", mission_id, message);
                }
                (success, message)
            }
            Err(e) => {
                error!("Mission {}: run aborted: {}", mission_id, e);
                self.registry
                    .mutate(mission_id, |mission| mission.set_status(MissionStatus::Failed))
                    .await;
                (false, e.to_string())
            }
        }
    }

    async fn current(&self, mission_id: &str) -> Result<Mission> {
        self.registry.get_mission(mission_id).await.ok_or_else(|| {
            WakeError::NotFound(format!("mission {} removed during execution", mission_id))
        })
    }

    /// Mutates the step at `index`, marks it current, and optionally
    /// records progress for it as processed.
    async fn update_step<R>(
        &self,
        mission_id: &str,
        index: usize,
        processed: bool,
        f: impl FnOnce(&mut Step) -> R,
    ) -> Result<R> {
        self.registry
            .mutate(mission_id, |mission| {
                mission.current_step_index = index;
                let result = mission.steps.get_mut(index).map(f);
                if processed {
                    mission.record_progress(index);
                }
                result
            })
            .await
            .flatten()
            .ok_or_else(|| {
                WakeError::NotFound(format!(
                    "step {} of mission {} removed during execution",
                    index, mission_id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::{CoordinationAction, LoggingDroneCommander, SimulatedCoordinator};
    use crate::common::types::{MissionSpec, StepKind, StepSpec};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            default_step_delay: Duration::from_millis(1),
            retry_delay: Duration::from_millis(1),
            default_wait: Duration::from_millis(1),
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(
            MissionRegistry::new(),
            Arc::new(SimulatedCoordinator::new(vec![])),
            Arc::new(LoggingDroneCommander),
            fast_config(),
        )
    }

    /// Fails its first `failures` calls, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Flaky {
                failures,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl StepHandler for Flaky {
        async fn handle(&self, step: &Step) -> Result<Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(WakeError::Step(format!("{} attempt {} failed", step.id, call)))
            } else {
                Ok(json!({ "attempts": call + 1 }))
            }
        }
    }

    #[async_trait]
    impl CoordinationEngine for Flaky {
        async fn execute_coordination_cycle(&self) -> Result<Vec<CoordinationAction>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(WakeError::Collaborator("coordination link down".to_string()))
            } else {
                Ok(vec![])
            }
        }
    }

    fn flaky_step(id: &str) -> StepSpec {
        StepSpec::new(id, id, StepKind::Custom).with_param("handler", json!("flaky"))
    }

    #[tokio::test]
    async fn test_unknown_mission_is_reported() {
        let pipeline = pipeline();
        let report = pipeline.execute_mission("missing").await;
        assert!(!report.success);
        assert!(report.message.contains("missing"));
    }

    #[tokio::test]
    async fn test_retry_then_success_keeps_index_and_counts_retries() {
        let flaky = Flaky::new(2);
        let pipeline = pipeline().with_custom_handler("flaky", flaky.clone());
        pipeline
            .registry()
            .create_mission(
                MissionSpec::new("Retry", vec![flaky_step("b").with_max_retries(2)]).with_id("m"),
            )
            .await
            .unwrap();

        let report = pipeline.execute_mission("m").await;
        assert!(report.success, "{}", report.message);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);

        let mission = pipeline.registry().get_mission("m").await.unwrap();
        assert_eq!(mission.steps[0].retry_count, 2);
        assert_eq!(mission.steps[0].status, StepStatus::Completed);
        assert_eq!(mission.progress, 100);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_step() {
        let pipeline = pipeline().with_custom_handler("flaky", Flaky::new(10));
        pipeline
            .registry()
            .create_mission(
                MissionSpec::new(
                    "Exhaust",
                    vec![
                        flaky_step("a").with_max_retries(3),
                        StepSpec::new("b", "After", StepKind::Collect),
                    ],
                )
                .with_id("m"),
            )
            .await
            .unwrap();

        let report = pipeline.execute_mission("m").await;
        assert!(!report.success);
        assert_eq!(report.failed_steps, vec!["a".to_string()]);
        assert!(report.message.contains("critical step a"));

        let mission = pipeline.registry().get_mission("m").await.unwrap();
        assert_eq!(mission.steps[0].status, StepStatus::Failed);
        assert_eq!(mission.steps[0].retry_count, 3);
        // Critical stop leaves the rest untouched.
        assert_eq!(mission.steps[1].status, StepStatus::Pending);
        assert_eq!(mission.progress, 0);
        assert_eq!(mission.current_step_index, 0);
    }

    #[tokio::test]
    async fn test_non_critical_failure_does_not_stop_or_fail_the_mission() {
        let pipeline = pipeline().with_custom_handler("flaky", Flaky::new(10));
        pipeline
            .registry()
            .create_mission(
                MissionSpec::new(
                    "Tolerant",
                    vec![
                        flaky_step("a").with_param("critical", json!(false)),
                        StepSpec::new("b", "After", StepKind::Transmit),
                    ],
                )
                .with_id("m"),
            )
            .await
            .unwrap();

        let report = pipeline.execute_mission("m").await;
        assert!(report.success, "{}", report.message);
        assert_eq!(report.failed_steps, vec!["a".to_string()]);
        assert_eq!(report.completed_steps, vec!["b".to_string()]);

        let mission = pipeline.registry().get_mission("m").await.unwrap();
        assert_eq!(mission.status, MissionStatus::Completed);
        assert_eq!(mission.progress, 100);
    }

    #[tokio::test]
    async fn test_coordinator_errors_feed_the_retry_path() {
        let coordinator = Flaky::new(1);
        let pipeline = Pipeline::new(
            MissionRegistry::new(),
            coordinator.clone(),
            Arc::new(LoggingDroneCommander),
            fast_config(),
        );
        pipeline
            .registry()
            .create_mission(
                MissionSpec::new(
                    "Convoy",
                    vec![StepSpec::new("c", "Coordinate", StepKind::Coordinate).with_max_retries(1)],
                )
                .with_id("m"),
            )
            .await
            .unwrap();

        let report = pipeline.execute_mission("m").await;
        assert!(report.success);
        assert_eq!(coordinator.calls.load(Ordering::SeqCst), 2);
    }

    /// Sleeps on every call so a run can be caught mid-step.
    struct Slow {
        calls: AtomicU32,
    }

    #[async_trait]
    impl StepHandler for Slow {
        async fn handle(&self, _step: &Step) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(json!({ "slow": true }))
        }
    }

    #[tokio::test]
    async fn test_paused_run_blocks_a_second_run_until_it_stops() {
        let slow = Arc::new(Slow {
            calls: AtomicU32::new(0),
        });
        let pipeline = pipeline().with_custom_handler("slow", slow.clone());
        let steps = ["s0", "s1", "s2"]
            .iter()
            .map(|id| StepSpec::new(*id, *id, StepKind::Custom).with_param("handler", json!("slow")))
            .collect();
        pipeline
            .registry()
            .create_mission(MissionSpec::new("Slow", steps).with_id("m"))
            .await
            .unwrap();

        let (first, second) = tokio::join!(pipeline.execute_mission("m"), async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            assert!(pipeline.registry().pause_mission("m").await);
            pipeline.execute_mission("m").await
        });

        assert!(!second.success);
        assert!(second.message.contains("already running"));
        assert!(!first.success);
        assert_eq!(first.message, "Mission paused before completion");
        assert_eq!(first.completed_steps, vec!["s0".to_string()]);
        assert_eq!(
            pipeline.registry().get_mission("m").await.unwrap().status,
            MissionStatus::Paused
        );

        // Once the first run has stopped, the mission can be resumed.
        let resumed = pipeline.execute_mission("m").await;
        assert!(resumed.success, "{}", resumed.message);
        assert_eq!(slow.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_mission_completes() {
        let pipeline = pipeline();
        pipeline
            .registry()
            .create_mission(MissionSpec::new("Idle", vec![]).with_id("m"))
            .await
            .unwrap();

        let report = pipeline.execute_mission("m").await;
        assert!(report.success);
        let mission = pipeline.registry().get_mission("m").await.unwrap();
        assert_eq!(mission.status, MissionStatus::Completed);
        assert_eq!(mission.progress, 100);
    }

    #[tokio::test]
    async fn test_rerun_keeps_completed_steps() {
        let flaky = Flaky::new(1);
        let pipeline = pipeline().with_custom_handler("flaky", flaky.clone());
        pipeline
            .registry()
            .create_mission(
                MissionSpec::new(
                    "Resume",
                    vec![
                        StepSpec::new("a", "Collect", StepKind::Collect),
                        flaky_step("b").depends_on("a"),
                    ],
                )
                .with_id("m"),
            )
            .await
            .unwrap();

        let first = pipeline.execute_mission("m").await;
        assert!(!first.success);

        let second = pipeline.execute_mission("m").await;
        assert!(second.success, "{}", second.message);
        assert_eq!(second.completed_steps, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }
}
