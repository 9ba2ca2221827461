use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    error::{DrawError, DrawResult},
    prize::PrizeCategory,
    rng::ProvablyFairRng,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalMode {
    Sequential,
    #[serde(alias = "random")]
    RandomNoRepeat,
    /// `k` winners drawn as `k` chained single-winner animations.
    #[serde(alias = "chained")]
    ChainedSingleDraw,
}

impl std::str::FromStr for TraversalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(TraversalMode::Sequential),
            "random" | "random_no_repeat" => Ok(TraversalMode::RandomNoRepeat),
            "chained" | "chained_single_draw" => Ok(TraversalMode::ChainedSingleDraw),
            other => Err(format!("unknown traversal mode `{other}`")),
        }
    }
}

/// What the host renders after each tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Candidate indices into the category's candidate list.
    pub highlighted: Vec<usize>,
    pub done: bool,
    /// How long to show this highlight before the next tick.
    pub delay: Duration,
}

/// One spin-to-commit cycle over a snapshot of the eligible pool.
#[derive(Debug, Clone)]
pub struct DrawSession {
    category_id: String,
    eligible: Vec<usize>,
    pick_count: usize,
    schedule: Vec<u32>,
    tick_index: usize,
    last_highlighted: Vec<usize>,
    last_excluded: Vec<usize>,
    mode: TraversalMode,
    sequential_cursor: usize,
}

impl DrawSession {
    pub fn start(
        category: &PrizeCategory,
        pick_count: usize,
        mode: TraversalMode,
        schedule: Vec<u32>,
        rng: &mut ProvablyFairRng,
    ) -> DrawResult<Self> {
        let eligible = category.eligible_indices();
        if eligible.is_empty() {
            return Err(DrawError::InvalidDrawState(format!(
                "category `{}` has no eligible candidates",
                category.id
            )));
        }
        let pick_count = match mode {
            TraversalMode::ChainedSingleDraw => 1,
            _ => pick_count.clamp(1, eligible.len()),
        };
        let schedule = if schedule.is_empty() { vec![1] } else { schedule };
        let sequential_cursor = match mode {
            TraversalMode::Sequential => rng.below(eligible.len()),
            _ => 0,
        };
        info!(
            category = %category.id,
            eligible = eligible.len(),
            pick_count,
            ticks = schedule.len(),
            ?mode,
            "draw session started"
        );
        Ok(Self {
            category_id: category.id.clone(),
            eligible,
            pick_count,
            schedule,
            tick_index: 0,
            last_highlighted: Vec::new(),
            last_excluded: Vec::new(),
            mode,
            sequential_cursor,
        })
    }

    pub fn category_id(&self) -> &str {
        &self.category_id
    }

    pub fn eligible(&self) -> &[usize] {
        &self.eligible
    }

    pub fn pick_count(&self) -> usize {
        self.pick_count
    }

    pub fn schedule(&self) -> &[u32] {
        &self.schedule
    }

    pub fn tick_index(&self) -> usize {
        self.tick_index
    }

    pub fn mode(&self) -> TraversalMode {
        self.mode
    }

    pub fn is_done(&self) -> bool {
        self.tick_index >= self.schedule.len()
    }

    /// The set that wins if committed now: the last highlight shown.
    pub fn frozen(&self) -> &[usize] {
        &self.last_highlighted
    }

    pub fn tick(&mut self, rng: &mut ProvablyFairRng) -> Tick {
        if self.is_done() {
            return Tick {
                highlighted: self.last_highlighted.clone(),
                done: true,
                delay: Duration::ZERO,
            };
        }
        let highlighted = match self.mode {
            TraversalMode::Sequential => self.sequential_window(),
            TraversalMode::RandomNoRepeat | TraversalMode::ChainedSingleDraw => {
                self.random_pick(rng)
            }
        };
        self.last_excluded = self
            .eligible
            .iter()
            .copied()
            .filter(|i| !highlighted.contains(i))
            .collect();
        self.last_highlighted = highlighted.clone();

        let delay = Duration::from_millis(self.schedule[self.tick_index] as u64);
        debug!(tick = self.tick_index, ?highlighted, delay_ms = delay.as_millis() as u64, "tick");
        self.tick_index += 1;
        Tick {
            highlighted,
            done: false,
            delay,
        }
    }

    fn sequential_window(&mut self) -> Vec<usize> {
        let len = self.eligible.len();
        let window = (0..self.pick_count)
            .map(|i| self.eligible[(self.sequential_cursor + i) % len])
            .collect();
        self.sequential_cursor = (self.sequential_cursor + self.pick_count) % len;
        window
    }

    fn random_pick(&mut self, rng: &mut ProvablyFairRng) -> Vec<usize> {
        let pick = self.pick_count;
        let non_pick = self.eligible.len() - pick;
        if pick < non_pick {
            let pool = pool_without(&self.eligible, &self.last_highlighted, pick);
            rng.sample(&pool, pick)
        } else if pick > non_pick {
            // Most of the pool lights up; vary who is left dark instead.
            let pool = pool_without(&self.eligible, &self.last_excluded, non_pick);
            let excluded = rng.sample(&pool, non_pick);
            self.eligible
                .iter()
                .copied()
                .filter(|i| !excluded.contains(i))
                .collect()
        } else {
            rng.sample(&self.eligible, pick)
        }
    }
}

/// `eligible` minus `avoid`, unless that leaves fewer than `needed` items.
fn pool_without(eligible: &[usize], avoid: &[usize], needed: usize) -> Vec<usize> {
    let pool: Vec<usize> = eligible.iter().copied().filter(|i| !avoid.contains(i)).collect();
    if pool.len() >= needed && !pool.is_empty() {
        pool
    } else {
        eligible.to_vec()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPolicy {
    /// Overruns are reported; the caller may override.
    #[default]
    Advisory,
    /// Overruns are refused even with an override.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRequest {
    /// Winners per commit, or chained rounds for `ChainedSingleDraw`.
    pub pick_count: usize,
    pub mode: TraversalMode,
    pub schedule: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub category_id: String,
    pub winners: Vec<String>,
    /// A chained draw started its next round; keep ticking.
    pub next_round: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawPhase {
    Idle,
    Spinning,
    Committing,
}

#[derive(Debug, Clone)]
enum EngineState {
    Idle,
    Spinning(DrawSession),
    Committing(DrawSession),
}

#[derive(Debug, Clone)]
struct Chain {
    schedule: Vec<u32>,
    rounds_left: usize,
}

/// `Idle --start--> Spinning --tick*--> Committing --commit--> Idle`.
///
/// Owns the draw randomness so a whole ceremony replays from its seeds.
#[derive(Debug, Clone)]
pub struct DrawEngine {
    rng: ProvablyFairRng,
    quota_policy: QuotaPolicy,
    state: EngineState,
    chain: Option<Chain>,
}

impl DrawEngine {
    pub fn new(rng: ProvablyFairRng, quota_policy: QuotaPolicy) -> Self {
        Self {
            rng,
            quota_policy,
            state: EngineState::Idle,
            chain: None,
        }
    }

    pub fn phase(&self) -> DrawPhase {
        match self.state {
            EngineState::Idle => DrawPhase::Idle,
            EngineState::Spinning(_) => DrawPhase::Spinning,
            EngineState::Committing(_) => DrawPhase::Committing,
        }
    }

    pub fn session(&self) -> Option<&DrawSession> {
        match &self.state {
            EngineState::Idle => None,
            EngineState::Spinning(s) | EngineState::Committing(s) => Some(s),
        }
    }

    pub fn rng(&self) -> &ProvablyFairRng {
        &self.rng
    }

    pub fn rng_mut(&mut self) -> &mut ProvablyFairRng {
        &mut self.rng
    }

    pub fn quota_policy(&self) -> QuotaPolicy {
        self.quota_policy
    }

    /// Chained rounds still to run after the current one.
    pub fn rounds_left(&self) -> usize {
        self.chain.as_ref().map_or(0, |c| c.rounds_left)
    }

    pub fn start(
        &mut self,
        category: &PrizeCategory,
        request: DrawRequest,
    ) -> DrawResult<&DrawSession> {
        if self.phase() != DrawPhase::Idle {
            return Err(DrawError::wrong_phase("start", self.phase()));
        }
        let DrawRequest {
            pick_count,
            mode,
            schedule,
        } = request;
        if mode == TraversalMode::ChainedSingleDraw {
            self.chain = Some(Chain {
                schedule: schedule.clone(),
                rounds_left: pick_count.max(1) - 1,
            });
        }
        match DrawSession::start(category, pick_count, mode, schedule, &mut self.rng) {
            Ok(session) => {
                self.state = EngineState::Spinning(session);
                self.session()
                    .ok_or_else(|| DrawError::InvalidDrawState("session lost after start".into()))
            }
            Err(err) => {
                self.chain = None;
                Err(err)
            }
        }
    }

    pub fn tick(&mut self) -> DrawResult<Tick> {
        let phase = self.phase();
        let EngineState::Spinning(session) = &mut self.state else {
            return Err(DrawError::wrong_phase("tick", phase));
        };
        let tick = session.tick(&mut self.rng);
        if tick.done {
            let state = std::mem::replace(&mut self.state, EngineState::Idle);
            if let EngineState::Spinning(session) = state {
                self.state = EngineState::Committing(session);
            }
        }
        Ok(tick)
    }

    /// Whether committing the frozen set would exceed the category quota.
    pub fn pending_exceeds_quota(&self, category: &PrizeCategory) -> bool {
        match &self.state {
            EngineState::Committing(s) => category.would_exceed_quota(s.frozen().len()),
            _ => false,
        }
    }

    pub fn commit(
        &mut self,
        category: &mut PrizeCategory,
        override_quota: bool,
    ) -> DrawResult<CommitOutcome> {
        let phase = self.phase();
        let EngineState::Committing(session) = &self.state else {
            return Err(DrawError::wrong_phase("commit", phase));
        };
        if session.category_id() != category.id {
            return Err(DrawError::InvalidDrawState(format!(
                "session belongs to `{}`, not `{}`",
                session.category_id(),
                category.id
            )));
        }
        let pending = session.frozen().len();
        if category.would_exceed_quota(pending) {
            let err = DrawError::QuotaExceeded {
                category: category.id.clone(),
                current: category.winners().len(),
                pending,
                quota: category.quota,
            };
            if !override_quota || self.quota_policy == QuotaPolicy::Strict {
                return Err(err);
            }
            warn!(error = %err, "quota overridden");
        }

        let names: Vec<String> = session
            .frozen()
            .iter()
            .filter_map(|&i| category.candidate(i).map(str::to_string))
            .collect();
        let winners = category.record_winners(&names);
        info!(category = %category.id, ?winners, "winners committed");

        self.state = EngineState::Idle;
        let next_round = self.start_next_round(category)?;
        Ok(CommitOutcome {
            category_id: category.id.clone(),
            winners,
            next_round,
        })
    }

    /// Drops a finished draw without committing it, ending any chain.
    /// Only allowed once the animation is over.
    pub fn discard(&mut self) -> DrawResult<()> {
        if self.phase() != DrawPhase::Committing {
            return Err(DrawError::wrong_phase("discard", self.phase()));
        }
        self.state = EngineState::Idle;
        self.chain = None;
        Ok(())
    }

    fn start_next_round(&mut self, category: &PrizeCategory) -> DrawResult<bool> {
        let Some(chain) = self.chain.as_mut() else {
            return Ok(false);
        };
        if chain.rounds_left == 0 || category.eligible_count() == 0 {
            self.chain = None;
            return Ok(false);
        }
        chain.rounds_left -= 1;
        let schedule = chain.schedule.clone();
        let session = DrawSession::start(
            category,
            1,
            TraversalMode::ChainedSingleDraw,
            schedule,
            &mut self.rng,
        )?;
        self.state = EngineState::Spinning(session);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prize::BandFormat;

    fn category(n: usize, quota: usize) -> PrizeCategory {
        let names = (0..n).map(|i| format!("P{i}")).collect();
        PrizeCategory::structured("C1", "C1", "Category 1", quota, BandFormat::default(), names)
    }

    const RANDOM: TraversalMode = TraversalMode::RandomNoRepeat;
    const SEQUENTIAL: TraversalMode = TraversalMode::Sequential;

    fn rng(nonce: u64) -> ProvablyFairRng {
        ProvablyFairRng::new("server", "client", nonce)
    }

    #[test]
    fn test_start_rejects_exhausted_pool() {
        let mut cat = category(2, 2);
        cat.record_winners(["P0", "P1"]);
        let err = DrawSession::start(&cat, 1, RANDOM, vec![10], &mut rng(1)).unwrap_err();
        assert!(matches!(err, DrawError::InvalidDrawState(_)));
    }

    #[test]
    fn test_pick_count_clamped() {
        let cat = category(3, 10);
        let s = DrawSession::start(&cat, 9, RANDOM, vec![10], &mut rng(1)).unwrap();
        assert_eq!(s.pick_count(), 3);
        let s = DrawSession::start(&cat, 0, SEQUENTIAL, vec![], &mut rng(1)).unwrap();
        assert_eq!(s.pick_count(), 1);
        assert_eq!(s.schedule(), &[1]);
    }

    #[test]
    fn test_sequential_covers_pool() {
        let cat = category(7, 7);
        let mut r = rng(4);
        let mut s = DrawSession::start(&cat, 3, SEQUENTIAL, vec![5; 20], &mut r).unwrap();
        let mut seen = Vec::new();
        for _ in 0..3 {
            let tick = s.tick(&mut r);
            assert_eq!(tick.highlighted.len(), 3);
            seen.extend(tick.highlighted);
        }
        // 9 slots over 7 candidates: first 7 distinct, then the wrap repeats the start.
        let mut first_cycle = seen[..7].to_vec();
        first_cycle.sort_unstable();
        assert_eq!(first_cycle, (0..7).collect::<Vec<_>>());
        assert_eq!(seen[7], seen[0]);
    }

    #[test]
    fn test_random_avoids_full_repeat() {
        let cat = category(10, 10);
        for nonce in 0..20 {
            let mut r = rng(nonce);
            let mut s = DrawSession::start(&cat, 3, RANDOM, vec![5; 30], &mut r).unwrap();
            let mut prev: Option<Vec<usize>> = None;
            while !s.is_done() {
                let mut tick = s.tick(&mut r).highlighted;
                tick.sort_unstable();
                if let Some(p) = &prev {
                    assert!(tick.iter().all(|i| !p.contains(i)), "repeat at nonce {nonce}");
                }
                prev = Some(tick);
            }
        }
    }

    #[test]
    fn test_random_varies_excluded_side() {
        let cat = category(10, 10);
        let mut r = rng(2);
        let mut s = DrawSession::start(&cat, 8, RANDOM, vec![5; 30], &mut r).unwrap();
        let mut prev_dark: Option<Vec<usize>> = None;
        while !s.is_done() {
            let tick = s.tick(&mut r);
            assert_eq!(tick.highlighted.len(), 8);
            let dark: Vec<usize> = (0..10).filter(|i| !tick.highlighted.contains(i)).collect();
            if let Some(p) = &prev_dark {
                assert!(dark.iter().all(|i| !p.contains(i)));
            }
            prev_dark = Some(dark);
        }
    }

    #[test]
    fn test_random_tie_samples_without_bias() {
        // pick == non_pick: plain uniform sample, overlap with the last tick allowed.
        let cat = category(4, 4);
        let mut overlaps = 0;
        for nonce in 0..5 {
            let mut r = rng(nonce);
            let mut s = DrawSession::start(&cat, 2, RANDOM, vec![5; 40], &mut r).unwrap();
            let mut prev: Option<Vec<usize>> = None;
            while !s.is_done() {
                let tick = s.tick(&mut r);
                if tick.done {
                    break;
                }
                let mut lit = tick.highlighted;
                assert_eq!(lit.len(), 2);
                lit.sort_unstable();
                lit.dedup();
                assert_eq!(lit.len(), 2);
                assert!(lit.iter().all(|&i| i < 4));
                if prev.as_ref().is_some_and(|p| lit.iter().any(|i| p.contains(i))) {
                    overlaps += 1;
                }
                prev = Some(lit);
            }
        }
        assert!(overlaps > 0);
    }

    #[test]
    fn test_terminal_tick_returns_frozen() {
        let cat = category(5, 5);
        let mut r = rng(8);
        let mut s = DrawSession::start(&cat, 2, RANDOM, vec![3, 4, 5], &mut r).unwrap();
        let mut last = Vec::new();
        for expected in [3u64, 4, 5] {
            let tick = s.tick(&mut r);
            assert!(!tick.done);
            assert_eq!(tick.delay, Duration::from_millis(expected));
            last = tick.highlighted;
        }
        let terminal = s.tick(&mut r);
        assert!(terminal.done);
        assert_eq!(terminal.highlighted, last);
        assert_eq!(s.frozen(), &last[..]);
    }

    #[test]
    fn test_engine_phases() {
        let mut cat = category(4, 4);
        let mut engine = DrawEngine::new(rng(1), QuotaPolicy::Advisory);
        assert!(engine.tick().is_err());
        assert!(engine.commit(&mut cat, false).is_err());
        let request = DrawRequest {
            pick_count: 1,
            mode: TraversalMode::Sequential,
            schedule: vec![1, 1],
        };
        engine.start(&cat, request.clone()).unwrap();
        assert_eq!(engine.phase(), DrawPhase::Spinning);
        assert!(engine.start(&cat, request).is_err());
        assert!(engine.commit(&mut cat, false).is_err());
        while !engine.tick().unwrap().done {}
        assert_eq!(engine.phase(), DrawPhase::Committing);
        let out = engine.commit(&mut cat, false).unwrap();
        assert_eq!(out.winners.len(), 1);
        assert!(!out.next_round);
        assert_eq!(engine.phase(), DrawPhase::Idle);
    }

    #[test]
    fn test_strict_quota_refuses_override() {
        let mut cat = category(4, 1);
        let mut engine = DrawEngine::new(rng(1), QuotaPolicy::Strict);
        let request = DrawRequest {
            pick_count: 2,
            mode: TraversalMode::RandomNoRepeat,
            schedule: vec![1],
        };
        engine.start(&cat, request).unwrap();
        while !engine.tick().unwrap().done {}
        assert!(engine.pending_exceeds_quota(&cat));
        assert!(matches!(engine.commit(&mut cat, true), Err(DrawError::QuotaExceeded { .. })));
        assert_eq!(engine.phase(), DrawPhase::Committing);
        assert!(cat.winners().is_empty());
        engine.discard().unwrap();
        assert_eq!(engine.phase(), DrawPhase::Idle);
    }
}
