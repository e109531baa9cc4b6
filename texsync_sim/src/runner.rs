//! Scenario runner - executes replication fault scenarios.

use crate::exporter::{AuthorityFrame, FollowerFrame, SimEvent, SimExport, SimFrame};
use crate::network::LinkFaults;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld, WorldTick, SIM_DIMENSIONS};

use serde::Serialize;
use texsync_core::{ApplyOutcome, Command, CpuTexture, Dimensions, DriverConfig, NodeBehavior};
use texsync_env::{LinkController, NodeContext};
use tracing::{debug, info, warn};

/// Upper bound on the ticks spent draining in-flight copies at the end of a run.
const MAX_QUIESCE_TICKS: u64 = 64;

/// Failure messages kept per run; later ones are only counted.
const MAX_REPORTED_FAILURES: usize = 5;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,
    
    /// Seed used
    pub seed: u64,
    
    /// Whether scenario passed all assertions
    pub passed: bool,
    
    /// Total ticks executed, quiescence included
    pub total_ticks: u64,
    
    /// Final simulation time in seconds
    pub final_time_secs: f64,
    
    /// Authority version at the end of the run
    pub final_version: u64,
    
    /// Failure message if any
    pub failure_reason: Option<String>,
    
    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Snapshots published by the authority
    pub snapshots_sent: u64,
    
    /// Per-link copies lost to loss or partition
    pub snapshots_dropped: u64,
    
    /// Extra copies from duplication
    pub snapshots_duplicated: u64,
    
    /// Copies written into follower slots
    pub snapshots_delivered: u64,
    
    /// Texture uploads across all followers
    pub follower_applications: u64,
    
    /// Follower ticks that found nothing new
    pub unchanged_ticks: u64,
    
    /// Follower ticks whose version went backwards
    pub backwards_steps: u64,
    
    /// Generator runs on the authority, initial texture included
    pub regenerations: u64,
}

/// A run together with its trace and a follower texture.
pub struct RecordedRun {
    pub result: ScenarioResult,
    pub export: SimExport,
    pub texture: CpuTexture,
}

/// Runs fault scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,
    
    /// Number of followers
    num_followers: usize,
    
    /// Tick rate in Hz
    tick_rate_hz: u32,
    
    /// Duration before quiescence, in seconds
    max_duration_secs: f64,
    
    /// Texture dimensions
    dims: Dimensions,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_followers: usize) -> Self {
        Self {
            seed,
            num_followers,
            tick_rate_hz: 60,
            max_duration_secs: 10.0,
            dims: SIM_DIMENSIONS,
        }
    }
    
    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }
    
    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }
    
    /// Sets the texture dimensions.
    pub fn with_dimensions(mut self, dims: Dimensions) -> Self {
        self.dims = dims;
        self
    }
    
    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, false).result
    }
    
    /// Runs a scenario, keeping one frame per tick and the final texture of
    /// follower 0 (the authority's own when there are no followers).
    pub fn run_recorded(&self, scenario: ScenarioId) -> RecordedRun {
        self.execute(scenario, true)
    }
    
    fn target_ticks(&self) -> u64 {
        ((self.max_duration_secs * self.tick_rate_hz as f64) as u64).max(1)
    }
    
    fn execute(&self, scenario: ScenarioId, record: bool) -> RecordedRun {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());
        
        let config = SimConfig {
            seed: self.seed,
            num_followers: self.num_followers,
            tick_rate_hz: self.tick_rate_hz,
            dims: self.dims,
            driver: DriverConfig::default(),
        };
        let mut trial = Trial::new(scenario, config, record);
        let ticks = self.target_ticks();
        
        match scenario {
            ScenarioId::Steady => self.run_steady(&mut trial, ticks),
            ScenarioId::Lossy => self.run_lossy(&mut trial, ticks),
            ScenarioId::Duplicates => self.run_duplicates(&mut trial, ticks),
            ScenarioId::Reorder => self.run_reorder(&mut trial, ticks),
            ScenarioId::Partition => self.run_partition(&mut trial, ticks),
            ScenarioId::ResetMidRun => self.run_reset_midrun(&mut trial, ticks),
            ScenarioId::ForcedRegen => self.run_forced_regen(&mut trial, ticks),
        }
        
        trial.quiesce();
        let run = trial.finish(self.seed);
        
        if run.result.passed {
            info!(
                "✓ {} complete: version {} after {} ticks, {} uploads",
                scenario.name(),
                run.result.final_version,
                run.result.total_ticks,
                run.result.metrics.follower_applications
            );
        } else {
            warn!(
                "✗ {} failed: {}",
                scenario.name(),
                run.result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
        run
    }
    
    /// TSX-001: clean links, every follower uploads on every tick.
    fn run_steady(&self, trial: &mut Trial, ticks: u64) {
        for _ in 0..ticks {
            let tick = trial.step();
            
            for (i, summary) in tick.followers.iter().enumerate() {
                if summary.outcome != ApplyOutcome::Applied {
                    trial.fail(format!(
                        "follower {} did not apply version {} on a clean link",
                        i, tick.authority.version
                    ));
                }
            }
            if !trial.world.converged() {
                trial.fail(format!("followers diverged at tick {}", tick.tick));
            }
        }
    }
    
    /// TSX-002: heavy loss on every link.
    fn run_lossy(&self, trial: &mut Trial, ticks: u64) {
        let controller = trial.world.controller();
        for id in trial.world.follower_ids() {
            controller.set_link_loss(id, 0.4);
        }
        trial.event("40% loss on all links");
        
        trial.run(ticks);
        
        if !trial.world.followers().is_empty() && trial.world.network().stats().dropped == 0 {
            trial.fail("loss configured but nothing was dropped".to_string());
        }
    }
    
    /// TSX-003: duplicates plus some loss, so repeats become visible.
    fn run_duplicates(&self, trial: &mut Trial, ticks: u64) {
        let controller = trial.world.controller();
        for id in trial.world.follower_ids() {
            controller.set_link_duplication(id, 0.5);
            controller.set_link_loss(id, 0.2);
        }
        trial.event("50% duplication + 20% loss on all links");
        
        trial.run(ticks);
        
        if !trial.world.followers().is_empty() && trial.world.network().stats().duplicated == 0 {
            trial.fail("duplication configured but nothing was duplicated".to_string());
        }
    }
    
    /// TSX-004: latency with jitter, snapshots overtake each other.
    fn run_reorder(&self, trial: &mut Trial, ticks: u64) {
        let controller = trial.world.controller();
        let faults = LinkFaults {
            latency_ticks: 2,
            jitter_ticks: 4,
            ..LinkFaults::default()
        };
        for id in trial.world.follower_ids() {
            controller.set_link_faults(id, faults);
        }
        trial.event("2 tick latency + 0..4 jitter on all links");
        
        trial.run(ticks);
        
        debug!("  backwards steps observed: {}", trial.metrics.backwards_steps);
    }
    
    /// TSX-005: follower 0 is cut off for the middle third.
    fn run_partition(&self, trial: &mut Trial, ticks: u64) {
        let Some(&isolated) = trial.world.follower_ids().first() else {
            trial.run(ticks);
            return;
        };
        let controller = trial.world.controller();
        let start = ticks / 3;
        let heal = 2 * ticks / 3;
        
        trial.run(start);
        
        controller.partition(isolated);
        trial.event(format!("partitioned follower 0 ({})", isolated));
        let frozen = trial.world.followers()[0].state().version;
        
        for _ in start..heal {
            let tick = trial.step();
            if tick.followers[0].outcome == ApplyOutcome::Applied {
                trial.fail(format!("partitioned follower applied at tick {}", tick.tick));
            }
            if tick.followers[0].version != frozen {
                trial.fail(format!(
                    "partitioned follower moved from {} to {}",
                    frozen, tick.followers[0].version
                ));
            }
        }
        
        controller.heal_all();
        trial.event("healed all partitions");
        
        if heal < ticks {
            let tick = trial.step();
            if tick.followers[0].outcome != ApplyOutcome::Applied {
                trial.fail("follower 0 did not catch up right after heal".to_string());
            }
            trial.run(ticks - heal - 1);
        }
    }
    
    /// TSX-006: reset the authority halfway through.
    fn run_reset_midrun(&self, trial: &mut Trial, ticks: u64) {
        let midpoint = ticks / 2;
        trial.run(midpoint);
        
        trial.command(Command::Reset);
        let tick = trial.step();
        let time = trial.world.authority().state().time;
        if tick.authority.version != 1 || time > 1.5 * trial.world.dt() {
            trial.fail(format!(
                "reset did not restart the sequence (version {}, time {})",
                tick.authority.version, time
            ));
        }
        
        trial.run(ticks.saturating_sub(midpoint + 1));
    }
    
    /// TSX-007: forced regenerations every 7 ticks.
    fn run_forced_regen(&self, trial: &mut Trial, ticks: u64) {
        let mut forced = 0u64;
        for t in 0..ticks {
            let commanded = t % 7 == 3;
            if commanded {
                trial.command(Command::Regenerate);
                forced += 1;
            }
            let tick = trial.step();
            if commanded && !trial.world.authority().state().update_flag {
                trial.fail(format!(
                    "forced regeneration not flagged in published version {}",
                    tick.authority.version
                ));
            }
        }
        
        let expected = 1 + trial.cadence_regenerations + forced;
        let actual = trial.world.authority().regenerations();
        if actual != expected {
            trial.fail(format!(
                "expected {} regenerations (1 initial + {} cadence + {} forced), got {}",
                expected, trial.cadence_regenerations, forced, actual
            ));
        }
    }
}

/// Per-follower bookkeeping of what the follower was shown.
#[derive(Debug, Default)]
struct FollowerTrace {
    last_seen: Option<u64>,
    transitions: u64,
}

/// One scenario execution in progress.
struct Trial {
    scenario: ScenarioId,
    world: SimWorld,
    traces: Vec<FollowerTrace>,
    metrics: ScenarioMetrics,
    failures: Vec<String>,
    failure_count: usize,
    cadence_regenerations: u64,
    last_version: u64,
    reset_pending: bool,
    export: Option<SimExport>,
    pending_events: Vec<SimEvent>,
}

impl Trial {
    fn new(scenario: ScenarioId, config: SimConfig, record: bool) -> Self {
        let seed = config.seed;
        let world = SimWorld::new(config);
        let traces = world.followers().iter().map(|_| FollowerTrace::default()).collect();
        
        Self {
            scenario,
            world,
            traces,
            metrics: ScenarioMetrics::default(),
            failures: Vec::new(),
            failure_count: 0,
            cadence_regenerations: 0,
            last_version: 0,
            reset_pending: false,
            export: record.then(|| SimExport::new(scenario.name(), seed)),
            pending_events: Vec::new(),
        }
    }
    
    fn fail(&mut self, message: String) {
        self.failure_count += 1;
        if self.failures.len() < MAX_REPORTED_FAILURES {
            warn!("  {}", message);
            self.failures.push(message);
        }
    }
    
    fn event(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("  t={:.2}s | {}", self.world.context.now().as_secs_f64(), message);
        if self.export.is_some() {
            self.pending_events.push(SimEvent::info(message));
        }
    }
    
    fn command(&mut self, command: Command) {
        if command == Command::Reset {
            self.reset_pending = true;
        }
        self.world.command(command);
        self.event(format!("command {:?}", command));
    }
    
    fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }
    
    /// Ticks the world once and checks the per-tick properties.
    fn step(&mut self) -> WorldTick {
        let tick = self.world.tick();
        
        let expected = if self.reset_pending { 1 } else { self.last_version + 1 };
        if tick.authority.version != expected {
            self.fail(format!(
                "authority version {} at tick {}, expected {}",
                tick.authority.version, tick.tick, expected
            ));
        }
        self.reset_pending = false;
        self.last_version = tick.authority.version;
        
        let due = self
            .world
            .authority()
            .driver()
            .is_regeneration_version(tick.authority.version);
        if tick.authority.regenerated != due {
            self.fail(format!(
                "cadence broken at version {}: regenerated={}",
                tick.authority.version, tick.authority.regenerated
            ));
        }
        if tick.authority.regenerated {
            self.cadence_regenerations += 1;
        }
        
        for (i, summary) in tick.followers.iter().enumerate() {
            let trace = &mut self.traces[i];
            if trace.last_seen != Some(summary.version) {
                if trace.last_seen.is_some_and(|last| summary.version < last) {
                    self.metrics.backwards_steps += 1;
                }
                trace.last_seen = Some(summary.version);
                trace.transitions += 1;
            }
            if summary.outcome == ApplyOutcome::Unchanged {
                self.metrics.unchanged_ticks += 1;
            }
        }
        
        let mut violations = Vec::new();
        for (i, follower) in self.world.followers().iter().enumerate() {
            let applied = follower.applier().applied_count();
            if applied > self.traces[i].transitions {
                violations.push(format!(
                    "follower {} applied {} times for {} distinct versions seen",
                    i, applied, self.traces[i].transitions
                ));
            }
        }
        for violation in violations {
            self.fail(violation);
        }
        
        self.record(&tick);
        
        if tick.tick % 60 == 0 {
            debug!(
                "  t={:.1}s | version={} | delivered={}",
                self.world.context.now().as_secs_f64(),
                tick.authority.version,
                tick.delivered
            );
        }
        tick
    }
    
    fn record(&mut self, tick: &WorldTick) {
        let Some(export) = self.export.as_mut() else {
            return;
        };
        let state = self.world.authority().state();
        
        export.add_frame(SimFrame {
            tick: tick.tick,
            time_sec: self.world.context.now().as_secs_f64(),
            authority: AuthorityFrame {
                version: state.version,
                time: state.time,
                angle: state.angle,
                regenerated: tick.authority.regenerated,
            },
            followers: self
                .world
                .followers()
                .iter()
                .zip(&tick.followers)
                .enumerate()
                .map(|(index, (follower, summary))| FollowerFrame {
                    index,
                    version: summary.version,
                    last_applied: follower.applier().last_applied(),
                    applied: summary.outcome == ApplyOutcome::Applied,
                })
                .collect(),
            events: std::mem::take(&mut self.pending_events),
        });
    }
    
    /// Clears every fault and ticks until nothing is in flight, then checks
    /// that every follower shows the authority's pixels.
    fn quiesce(&mut self) {
        if self.scenario.has_link_faults() {
            self.world.controller().clear();
            self.event("faults cleared");
        }
        
        for _ in 0..MAX_QUIESCE_TICKS {
            self.step();
            if self.world.network().in_flight() == 0 && self.world.converged() {
                return;
            }
        }
        self.fail(format!(
            "followers did not converge within {} ticks of quiescence",
            MAX_QUIESCE_TICKS
        ));
    }
    
    fn finish(self, seed: u64) -> RecordedRun {
        let mut metrics = self.metrics;
        let stats = self.world.network().stats();
        metrics.snapshots_sent = stats.sent;
        metrics.snapshots_dropped = stats.dropped;
        metrics.snapshots_duplicated = stats.duplicated;
        metrics.snapshots_delivered = stats.delivered;
        metrics.follower_applications = self
            .world
            .followers()
            .iter()
            .map(|f| f.applier().applied_count())
            .sum();
        metrics.regenerations = self.world.authority().regenerations();
        
        let passed = self.failure_count == 0;
        let failure_reason = if passed {
            None
        } else {
            let mut reason = self.failures.join("; ");
            if self.failure_count > self.failures.len() {
                reason.push_str(&format!(
                    " (+{} more)",
                    self.failure_count - self.failures.len()
                ));
            }
            Some(reason)
        };
        
        let result = ScenarioResult {
            scenario: self.scenario,
            seed,
            passed,
            total_ticks: self.world.tick_count(),
            final_time_secs: self.world.context.now().as_secs_f64(),
            final_version: self.world.authority().state().version,
            failure_reason: failure_reason.clone(),
            metrics,
        };
        
        let mut export = self
            .export
            .unwrap_or_else(|| SimExport::new(self.scenario.name(), seed));
        export.finalize(passed, failure_reason);
        
        let texture = match self.world.followers().first() {
            Some(follower) => follower.target().clone(),
            None => self.world.authority().target().clone(),
        };
        
        RecordedRun {
            result,
            export,
            texture,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use texsync_core::RenderTarget;
    
    fn runner(seed: u64) -> ScenarioRunner {
        ScenarioRunner::new(seed, 3)
            .with_duration(3.0)
            .with_dimensions(Dimensions::new(16, 16).unwrap())
    }
    
    #[test]
    fn test_steady_passes() {
        let result = runner(42).run(ScenarioId::Steady);
        
        assert!(result.passed, "failure: {:?}", result.failure_reason);
        assert_eq!(result.metrics.snapshots_dropped, 0);
        assert_eq!(result.metrics.follower_applications, 3 * result.total_ticks);
        assert_eq!(result.final_version, result.total_ticks);
    }
    
    #[test]
    fn test_every_scenario_passes() {
        for scenario in ScenarioId::all() {
            let result = runner(7).run(scenario);
            assert!(
                result.passed,
                "{} failed: {:?}",
                scenario,
                result.failure_reason
            );
        }
    }
    
    #[test]
    fn test_lossy_applies_fewer_than_ticks() {
        let result = runner(42).run(ScenarioId::Lossy);
        
        assert!(result.passed, "failure: {:?}", result.failure_reason);
        assert!(result.metrics.snapshots_dropped > 0);
        assert!(result.metrics.follower_applications < 3 * result.total_ticks);
    }
    
    #[test]
    fn test_reorder_goes_backwards() {
        let result = runner(42).run(ScenarioId::Reorder);
        
        assert!(result.passed, "failure: {:?}", result.failure_reason);
        assert!(result.metrics.backwards_steps > 0);
    }
    
    #[test]
    fn test_forced_regen_counts() {
        let result = runner(3).run(ScenarioId::ForcedRegen);
        
        assert!(result.passed, "failure: {:?}", result.failure_reason);
        // 180 ticks: 6 cadence hits + 26 forced + the initial texture, plus quiescence
        assert!(result.metrics.regenerations >= 33);
    }
    
    #[test]
    fn test_same_seed_same_result() {
        let a = runner(99).run(ScenarioId::Duplicates);
        let b = runner(99).run(ScenarioId::Duplicates);
        
        assert_eq!(a.total_ticks, b.total_ticks);
        assert_eq!(a.metrics.snapshots_dropped, b.metrics.snapshots_dropped);
        assert_eq!(a.metrics.snapshots_duplicated, b.metrics.snapshots_duplicated);
        assert_eq!(a.metrics.follower_applications, b.metrics.follower_applications);
    }
    
    #[test]
    fn test_recorded_run_has_frames_and_events() {
        let run = runner(5).run_recorded(ScenarioId::Partition);
        
        assert!(run.result.passed, "failure: {:?}", run.result.failure_reason);
        assert_eq!(run.export.frames.len() as u64, run.result.total_ticks);
        assert!(run
            .export
            .frames
            .iter()
            .any(|f| f.events.iter().any(|e| e.message.contains("partitioned"))));
        assert_eq!(run.texture.dimensions(), Dimensions::new(16, 16).unwrap());
    }
    
    #[test]
    fn test_zero_followers_still_runs() {
        let result = ScenarioRunner::new(1, 0)
            .with_duration(1.0)
            .with_dimensions(Dimensions::new(4, 4).unwrap())
            .run(ScenarioId::Partition);
        
        assert!(result.passed, "failure: {:?}", result.failure_reason);
        assert_eq!(result.metrics.follower_applications, 0);
    }
    
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]
        
        #[test]
        fn prop_faulty_links_still_converge(seed in any::<u64>(), followers in 1usize..4) {
            for scenario in [ScenarioId::Duplicates, ScenarioId::Reorder] {
                let result = ScenarioRunner::new(seed, followers)
                    .with_duration(1.0)
                    .with_dimensions(Dimensions::new(4, 4).unwrap())
                    .run(scenario);
                prop_assert!(result.passed, "{} seed={}: {:?}", scenario, seed, result.failure_reason);
            }
        }
    }
}
