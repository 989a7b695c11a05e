//! Cache warming: synchronous triggered bundles fired on
//! login, generation creation, and team-access grants, plus a predictive
//! background loop over per-principal access history. Grounded on the
//! teacher's `scheduling/worker.rs` supervised start/stop loop shape,
//! retargeted from a Redis job queue to an in-process access-pattern
//! tracker (**[SUPPLEMENT]**, the predictive scoring itself follows
//! `original_source/caching/enhanced_cache_warming_strategies.py`).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::principal::{PrincipalId, TeamId};
use crate::domain::resource::{GenerationId, ProjectId, ResourceId};
use crate::error::CoreResult;
use crate::external::store::PersistentStore;

use super::key::KeyKind;

/// Longest per-principal access sequence retained for prediction
///.
const MAX_HISTORY: usize = 100;
/// A key already warmed within this window is not warmed again.
const REWARM_COOLDOWN: Duration = Duration::from_secs(30 * 60);
/// Minimum observed regularity for a candidate to be worth pre-warming.
const MIN_REGULARITY: f64 = 0.3;
/// How many predicted keys the background loop pre-warms per principal
/// per round.
const TOP_N_PREDICTIONS: usize = 5;

/// A single thing the planner has decided is worth pre-populating. The
/// `resource` field reuses [`ResourceId`]'s bit layout for project/team/
/// generation ids too (they are all bare `Uuid` wrappers) rather than
/// widening the cache key's resource-identifier type for warming alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WarmTarget {
    pub kind: KeyKind,
    pub resource: ResourceId,
}

impl WarmTarget {
    pub fn new(kind: KeyKind, resource: ResourceId) -> Self {
        Self { kind, resource }
    }
}

/// Events that trigger a synchronous warming bundle.
#[derive(Debug, Clone)]
pub enum WarmingTrigger {
    Login,
    GenerationCreated { generation: GenerationId, project: Option<ProjectId> },
    TeamAccessGranted { team: TeamId },
}

/// Populates the actual cache engines for a predicted or triggered target.
/// The planner decides *what* to warm; implementations of this trait know
/// *how* to fetch and store each kind of value, since that differs by
/// application type.
#[async_trait]
pub trait WarmPopulator: Send + Sync {
    async fn populate(&self, principal: PrincipalId, target: WarmTarget) -> CoreResult<()>;
}

#[derive(Default)]
struct Effectiveness {
    predictive_warms: AtomicU64,
    predictive_hits: AtomicU64,
}

impl Effectiveness {
    fn hit_rate(&self) -> f64 {
        let warms = self.predictive_warms.load(Ordering::Relaxed) as f64;
        if warms == 0.0 {
            return 0.0;
        }
        self.predictive_hits.load(Ordering::Relaxed) as f64 / warms
    }

    fn decay(&self) {
        let warms = self.predictive_warms.load(Ordering::Relaxed);
        let hits = self.predictive_hits.load(Ordering::Relaxed);
        self.predictive_warms
            .store((warms as f64 * 0.9) as u64, Ordering::Relaxed);
        self.predictive_hits
            .store((hits as f64 * 0.9) as u64, Ordering::Relaxed);
    }
}

/// Coordinates triggered warming bundles and the predictive background
/// loop. Holds no cache engine directly — warming targets
/// are handed to a [`WarmPopulator`] so the planner stays agnostic to the
/// concrete `V` of each cached shape.
pub struct WarmingPlanner {
    store: Arc<dyn PersistentStore>,
    populator: Arc<dyn WarmPopulator>,
    history: DashMap<PrincipalId, VecDeque<WarmTarget>>,
    last_warmed: DashMap<(PrincipalId, WarmTarget), Instant>,
    effectiveness: Arc<Effectiveness>,
    is_running: Arc<AtomicBool>,
}

impl WarmingPlanner {
    pub fn new(store: Arc<dyn PersistentStore>, populator: Arc<dyn WarmPopulator>) -> Self {
        Self {
            store,
            populator,
            history: DashMap::new(),
            last_warmed: DashMap::new(),
            effectiveness: Arc::new(Effectiveness::default()),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Records that `principal` just accessed `target`, for later
    /// prediction. Called by the orchestrator on every granted decision,
    /// not just cache misses — the predictor needs the full access shape.
    pub fn record_access(&self, principal: PrincipalId, target: WarmTarget) {
        let mut entry = self.history.entry(principal).or_default();
        if entry.len() == MAX_HISTORY {
            entry.pop_front();
        }
        entry.push_back(target);
    }

    /// Called when a lookup hits a key that was warmed predictively,
    /// feeding `spec.md` §4.5's `warming_hit_rate` accounting.
    pub fn record_predictive_hit(&self) {
        self.effectiveness
            .predictive_hits
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Predictive hits divided by predictive warms.
    pub fn warming_hit_rate(&self) -> f64 {
        self.effectiveness.hit_rate()
    }

    /// Runs the synchronous bundle for `trigger`, warming
    /// everything the bundle names plus, if history exists, the
    /// principal's top predicted targets.
    pub async fn on_trigger(&self, trigger: WarmingTrigger, principal: PrincipalId) -> CoreResult<usize> {
        let mut targets = match &trigger {
            WarmingTrigger::Login => self.login_bundle(principal).await?,
            WarmingTrigger::GenerationCreated { generation, project } => {
                self.generation_created_bundle(*generation, *project)
            }
            WarmingTrigger::TeamAccessGranted { team } => {
                self.team_access_bundle(principal, *team).await?
            }
        };
        targets.extend(self.predicted_targets(principal));

        let mut warmed = 0;
        for target in targets {
            if self.populator.populate(principal, target).await.is_ok() {
                warmed += 1;
            }
        }
        Ok(warmed)
    }

    async fn login_bundle(&self, principal: PrincipalId) -> CoreResult<Vec<WarmTarget>> {
        let mut targets = vec![
            WarmTarget::new(KeyKind::Profile, ResourceId(principal.0)),
            WarmTarget::new(KeyKind::Session, ResourceId(principal.0)),
        ];

        let recent = self
            .store
            .fetch_recent_generations(principal, 20, None)
            .await?;
        targets.extend(
            recent
                .items
                .into_iter()
                .map(|gen_id| WarmTarget::new(KeyKind::Generation, ResourceId(gen_id.0))),
        );

        let memberships = self.store.fetch_team_memberships(principal).await?;
        targets.extend(
            memberships
                .into_iter()
                .map(|(team, _)| WarmTarget::new(KeyKind::Team, ResourceId(team.0))),
        );

        Ok(targets)
    }

    fn generation_created_bundle(
        &self,
        generation: GenerationId,
        project: Option<ProjectId>,
    ) -> Vec<WarmTarget> {
        let mut targets = vec![WarmTarget::new(KeyKind::Generation, ResourceId(generation.0))];
        if let Some(project) = project {
            targets.push(WarmTarget::new(KeyKind::Project, ResourceId(project.0)));
        }
        targets
    }

    async fn team_access_bundle(&self, principal: PrincipalId, team: TeamId) -> CoreResult<Vec<WarmTarget>> {
        let _ = principal;
        Ok(vec![WarmTarget::new(KeyKind::Team, ResourceId(team.0))])
    }

    /// Top predicted targets for `principal`: those whose frequency in the
    /// retained access history meets the regularity threshold and were not
    /// warmed in the last 30 minutes, highest-frequency first, capped at
    /// [`TOP_N_PREDICTIONS`].
    fn predicted_targets(&self, principal: PrincipalId) -> Vec<WarmTarget> {
        let Some(history) = self.history.get(&principal) else {
            return Vec::new();
        };
        if history.is_empty() {
            return Vec::new();
        }

        let total = history.len() as f64;
        let mut counts: std::collections::HashMap<WarmTarget, u32> = std::collections::HashMap::new();
        for target in history.iter() {
            *counts.entry(*target).or_insert(0) += 1;
        }
        drop(history);

        let mut scored: Vec<(WarmTarget, f64)> = counts
            .into_iter()
            .map(|(target, count)| (target, count as f64 / total))
            .filter(|(_, regularity)| *regularity >= MIN_REGULARITY)
            .filter(|(target, _)| !self.recently_warmed(principal, *target))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(TOP_N_PREDICTIONS);

        for (target, _) in &scored {
            self.last_warmed.insert((principal, *target), Instant::now());
            self.effectiveness
                .predictive_warms
                .fetch_add(1, Ordering::Relaxed);
        }

        scored.into_iter().map(|(target, _)| target).collect()
    }

    fn recently_warmed(&self, principal: PrincipalId, target: WarmTarget) -> bool {
        self.last_warmed
            .get(&(principal, target))
            .map(|at| at.elapsed() < REWARM_COOLDOWN)
            .unwrap_or(false)
    }

    /// Starts the background decay loop: once an hour, ages the
    /// effectiveness counters down by 10% so stale
    /// history doesn't keep a long-dead pattern's hit rate looking good
    /// forever. Mirrors the teacher's worker start/stop idiom, minus the
    /// job queue this planner has no need for.
    pub fn start(self: &Arc<Self>) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let planner = Arc::clone(self);
        tokio::spawn(async move {
            while planner.is_running.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                if !planner.is_running.load(Ordering::SeqCst) {
                    break;
                }
                planner.effectiveness.decay();
            }
        });
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::store::{GenerationParent, Page, ProjectRecord, ResourceRecord, TeamLink};
    use crate::domain::role::Role;
    use crate::domain::visibility::ProjectVisibility;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    struct EmptyStore;

    #[async_trait]
    impl PersistentStore for EmptyStore {
        async fn fetch_resource(&self, _id: ResourceId) -> CoreResult<Option<ResourceRecord>> {
            Ok(None)
        }
        async fn fetch_project(&self, _id: ProjectId) -> CoreResult<Option<ProjectRecord>> {
            Ok(None)
        }
        async fn fetch_team_memberships(&self, _principal: PrincipalId) -> CoreResult<Vec<(TeamId, Role)>> {
            Ok(Vec::new())
        }
        async fn fetch_team_project_links(&self, _project: ProjectId) -> CoreResult<Vec<TeamLink>> {
            Ok(Vec::new())
        }
        async fn fetch_generation_parent(&self, _id: GenerationId) -> CoreResult<GenerationParent> {
            Ok(GenerationParent { parent_id: None })
        }
        async fn fetch_recent_generations(
            &self,
            _principal: PrincipalId,
            _limit: usize,
            _cursor: Option<String>,
        ) -> CoreResult<Page<GenerationId>> {
            Ok(Page { items: Vec::new(), next_cursor: None })
        }
    }

    struct RecordingPopulator {
        calls: StdMutex<Vec<WarmTarget>>,
    }

    #[async_trait]
    impl WarmPopulator for RecordingPopulator {
        async fn populate(&self, _principal: PrincipalId, target: WarmTarget) -> CoreResult<()> {
            self.calls.lock().unwrap().push(target);
            Ok(())
        }
    }

    fn planner() -> (WarmingPlanner, Arc<RecordingPopulator>) {
        let populator = Arc::new(RecordingPopulator { calls: StdMutex::new(Vec::new()) });
        let planner = WarmingPlanner::new(Arc::new(EmptyStore), populator.clone());
        (planner, populator)
    }

    #[tokio::test]
    async fn login_bundle_warms_profile_and_session() {
        let (planner, populator) = planner();
        let principal = PrincipalId(Uuid::new_v4());
        let warmed = planner.on_trigger(WarmingTrigger::Login, principal).await.unwrap();
        assert_eq!(warmed, 2);
        let calls = populator.calls.lock().unwrap();
        assert!(calls.iter().any(|t| t.kind == KeyKind::Profile));
        assert!(calls.iter().any(|t| t.kind == KeyKind::Session));
    }

    #[tokio::test]
    async fn frequent_access_is_predicted_and_cooldown_respected() {
        let (planner, _populator) = planner();
        let principal = PrincipalId(Uuid::new_v4());
        let target = WarmTarget::new(KeyKind::Generation, ResourceId(Uuid::new_v4()));

        for _ in 0..5 {
            planner.record_access(principal, target);
        }
        let predicted = planner.predicted_targets(principal);
        assert_eq!(predicted, vec![target]);

        let predicted_again = planner.predicted_targets(principal);
        assert!(predicted_again.is_empty());
    }

    #[tokio::test]
    async fn infrequent_access_is_not_predicted() {
        let (planner, _populator) = planner();
        let principal = PrincipalId(Uuid::new_v4());
        for i in 0..10 {
            let target = WarmTarget::new(KeyKind::Generation, ResourceId(Uuid::new_v4()));
            planner.record_access(principal, target);
            let _ = i;
        }
        assert!(planner.predicted_targets(principal).is_empty());
    }

    #[test]
    fn warming_hit_rate_is_hits_over_warms() {
        let (planner, _populator) = planner();
        planner.effectiveness.predictive_warms.store(10, Ordering::SeqCst);
        planner.effectiveness.predictive_hits.store(3, Ordering::SeqCst);
        assert_eq!(planner.warming_hit_rate(), 0.3);
    }
}
