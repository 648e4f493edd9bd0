use crate::common::types::{MissionId, MissionSpec, MissionStatus, StepId, StepStatus};
use crate::mission::mission::Mission;
use crate::mission::topology;
use crate::utils::error::{Result, WakeError};
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::RwLock;

type Listener = Arc<dyn Fn(&[Mission]) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener)>>,
}

impl Listeners {
    fn entries(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            error!("Listener table poisoned; recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn add(&self, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push((id, listener));
        id
    }

    fn remove(&self, id: u64) {
        self.entries().retain(|(entry_id, _)| *entry_id != id);
    }

    fn snapshot(&self) -> Vec<Listener> {
        self.entries().iter().map(|(_, l)| Arc::clone(l)).collect()
    }
}

/// Handle returned by [`MissionRegistry::subscribe`].
pub struct Subscription {
    id: u64,
    listeners: Arc<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.listeners.remove(self.id);
    }
}

/// Missions plus the ids of missions with a run in flight. Both live
/// under one lock so a run claim sees a consistent view.
#[derive(Default)]
struct State {
    missions: HashMap<MissionId, Mission>,
    running: HashSet<MissionId>,
}

impl State {
    /// All missions, oldest first.
    fn sorted(&self) -> Vec<Mission> {
        let mut missions: Vec<Mission> = self.missions.values().cloned().collect();
        missions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        missions
    }
}

/// In-memory set of missions. Every mutation is broadcast to subscribers
/// with the full mission list as it stood right after that mutation.
#[derive(Clone, Default)]
pub struct MissionRegistry {
    state: Arc<RwLock<State>>,
    listeners: Arc<Listeners>,
}

impl MissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_mission(&self, spec: MissionSpec) -> Result<Mission> {
        for issue in topology::analyze(&spec.steps) {
            if !issue.is_fatal() {
                warn!("Mission {}: {}", spec.name, issue);
            }
        }

        let mission = Mission::new(spec)?;
        let snapshot = {
            let mut state = self.state.write().await;
            if state.missions.contains_key(&mission.id) {
                return Err(WakeError::AlreadyExists(format!("mission {}", mission.id)));
            }
            state.missions.insert(mission.id.clone(), mission.clone());
            self.snapshot(&state)
        };

        info!(
            "Mission {} ({}) created with {} step(s)",
            mission.name,
            mission.id,
            mission.steps.len()
        );
        self.notify(snapshot);
        Ok(mission)
    }

    pub async fn get_mission(&self, id: &str) -> Option<Mission> {
        self.state.read().await.missions.get(id).cloned()
    }

    /// All missions, oldest first.
    pub async fn get_missions(&self) -> Vec<Mission> {
        self.state.read().await.sorted()
    }

    pub async fn update_mission_status(&self, id: &str, status: MissionStatus) -> bool {
        let updated = self
            .mutate(id, |mission| {
                mission.set_status(status);
            })
            .await
            .is_some();
        if updated {
            info!("Mission {} -> {}", id, status);
        } else {
            warn!("Status update for unknown mission {}", id);
        }
        updated
    }

    pub async fn pause_mission(&self, id: &str) -> bool {
        self.update_mission_status(id, MissionStatus::Paused).await
    }

    pub async fn cancel_mission(&self, id: &str) -> bool {
        self.update_mission_status(id, MissionStatus::Cancelled).await
    }

    /// Puts one step back to `pending`. Does not start execution.
    pub async fn restart_step(&self, mission_id: &str, step_id: &str) -> bool {
        let restarted = self
            .mutate(mission_id, |mission| match mission.step_mut(step_id) {
                Some(step) => {
                    step.reset();
                    true
                }
                None => false,
            })
            .await
            .unwrap_or(false);
        if restarted {
            info!("Mission {}: step {} reset to pending", mission_id, step_id);
        }
        restarted
    }

    /// Removes a mission. A run in progress stops before its next step.
    pub async fn delete_mission(&self, id: &str) -> bool {
        let (removed, snapshot) = {
            let mut state = self.state.write().await;
            let removed = state.missions.remove(id);
            (removed, self.snapshot(&state))
        };
        match removed {
            Some(mission) => {
                if mission.status == MissionStatus::Active {
                    warn!("Mission {} deleted while active; cancelling its run", id);
                }
                info!("Mission {} deleted", id);
                self.notify(snapshot);
                true
            }
            None => false,
        }
    }

    pub async fn clear_all(&self) {
        let (count, snapshot) = {
            let mut state = self.state.write().await;
            let count = state.missions.len();
            state.missions.clear();
            (count, self.snapshot(&state))
        };
        info!("Cleared {} mission(s)", count);
        self.notify(snapshot);
    }

    /// Replaces the registry contents with previously saved missions.
    /// No run survives a restore, so `active` missions come back `paused`
    /// and their `running` steps come back `pending`.
    pub async fn restore(&self, saved: Vec<Mission>) {
        let snapshot = {
            let mut state = self.state.write().await;
            state.missions.clear();
            for mut mission in saved {
                if mission.status == MissionStatus::Active {
                    warn!("Mission {} was saved mid-run; restoring it as paused", mission.id);
                    mission.status = MissionStatus::Paused;
                    for step in &mut mission.steps {
                        if step.status == StepStatus::Running {
                            step.status = StepStatus::Pending;
                        }
                    }
                }
                state.missions.insert(mission.id.clone(), mission);
            }
            self.snapshot(&state)
        };
        self.notify(snapshot);
    }

    pub fn subscribe(&self, listener: impl Fn(&[Mission]) + Send + Sync + 'static) -> Subscription {
        let id = self.listeners.add(Arc::new(listener));
        Subscription {
            id,
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Claims a mission for a new run and moves it into `active`. The
    /// claim is refused while an earlier run of the same mission is still
    /// in flight, whatever the mission's status. Returns the ids of steps
    /// carried over as completed from an earlier run.
    pub(crate) async fn claim_for_run(&self, id: &str) -> Result<Vec<StepId>> {
        let (carried, snapshot) = {
            let mut state = self.state.write().await;
            if state.running.contains(id) {
                return Err(WakeError::Mission(format!(
                    "Mission {} is already running",
                    id
                )));
            }
            let mission = state
                .missions
                .get_mut(id)
                .ok_or_else(|| WakeError::NotFound(format!("mission {}", id)))?;
            let carried = mission.prepare_run();
            mission.set_status(MissionStatus::Active);
            state.running.insert(id.to_string());
            (carried, self.snapshot(&state))
        };
        self.notify(snapshot);
        Ok(carried)
    }

    /// Ends the run claimed by [`claim_for_run`](Self::claim_for_run).
    pub(crate) async fn release_run(&self, id: &str) {
        self.state.write().await.running.remove(id);
    }

    /// Applies `f` to the mission under the write lock, then notifies.
    /// Returns `None` when the mission does not exist.
    pub(crate) async fn mutate<R>(&self, id: &str, f: impl FnOnce(&mut Mission) -> R) -> Option<R> {
        let (result, snapshot) = {
            let mut state = self.state.write().await;
            let result = state.missions.get_mut(id).map(f)?;
            (result, self.snapshot(&state))
        };
        self.notify(snapshot);
        Some(result)
    }

    /// The mission list to broadcast, taken while the caller still holds
    /// the lock. `None` when nobody is listening.
    fn snapshot(&self, state: &State) -> Option<Vec<Mission>> {
        if self.listeners.entries().is_empty() {
            None
        } else {
            Some(state.sorted())
        }
    }

    fn notify(&self, snapshot: Option<Vec<Mission>>) {
        let Some(missions) = snapshot else {
            return;
        };
        for listener in self.listeners.snapshot() {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&missions))).is_err() {
                error!("Mission listener panicked; continuing with remaining listeners");
            }
        }
    }
}
