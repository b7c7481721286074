use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use typing_engine::{
    ChallengeError, ChallengeState, CompletionReport, Encounter, EngineConfig, LoopSummary,
    PlayerActor, RewardHook, Scene, SceneCommand, TargetId, TypingEvent, TypingInput, Vec2,
};

use super::content::{DefContentProvider, TargetDef};
use super::player::SimPlayer;
use super::typist::ScriptedTypist;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArenaSettings {
    pub typist_chars_per_second: f64,
    pub typist_mistype_every: Option<u32>,
    pub player_speed: f32,
    pub attack_seconds: f32,
    /// Failed focus sessions tolerated before the run gives up.
    pub max_failed_sessions: u32,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        Self {
            typist_chars_per_second: 9.0,
            typist_mistype_every: Some(11),
            player_speed: 400.0,
            attack_seconds: 0.2,
            max_failed_sessions: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArenaOutcome {
    Cleared,
    Exhausted,
    TickLimit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub target_id: TargetId,
    pub wpm: Option<f64>,
}

/// Pays out each target's seed reward once its attack lands.
#[derive(Debug, Default)]
pub struct RewardLedger {
    seeds_by_target: HashMap<TargetId, u32>,
    seeds: u32,
    resolved: Vec<ResolvedTarget>,
}

impl RewardLedger {
    pub fn register(&mut self, target_id: TargetId, seeds: u32) {
        self.seeds_by_target.insert(target_id, seeds);
    }

    pub fn seeds(&self) -> u32 {
        self.seeds
    }

    pub fn resolved(&self) -> &[ResolvedTarget] {
        &self.resolved
    }
}

impl RewardHook for RewardLedger {
    fn target_resolved(&mut self, target_id: TargetId, report: Option<&CompletionReport>) {
        let seeds = self.seeds_by_target.remove(&target_id).unwrap_or(0);
        self.seeds = self.seeds.saturating_add(seeds);
        info!(target_id = target_id.0, seeds, total_seeds = self.seeds, "seeds_awarded");
        self.resolved.push(ResolvedTarget {
            target_id,
            wpm: report.map(|report| report.wpm),
        });
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ArenaStats {
    sessions_started: u32,
    sessions_won: u32,
    sessions_lost: u32,
    rearms: u32,
    characters_typed: u32,
    mistypes: u32,
    challenges_completed: u32,
    wpm_sum: f64,
    keystroke_accuracy_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArenaSummary {
    pub outcome: ArenaOutcome,
    pub ticks: u64,
    pub sim_seconds: f64,
    pub targets_total: usize,
    pub targets_resolved: usize,
    pub resolved_order: Vec<u64>,
    pub sessions_started: u32,
    pub sessions_won: u32,
    pub sessions_lost: u32,
    pub rearms: u32,
    pub characters_typed: u32,
    pub mistypes: u32,
    pub average_wpm: f64,
    pub average_keystroke_accuracy: f64,
    pub best_wpm: f64,
    pub attacks: u32,
    pub seeds: u32,
}

/// Headless arena: a scripted typist clears every target through focus
/// sessions, walking toward whatever is still out of reach.
pub struct ArenaScene {
    encounter: Encounter<SimPlayer, RewardLedger>,
    provider: DefContentProvider,
    typist: ScriptedTypist,
    settings: ArenaSettings,
    targets_total: usize,
    stats: ArenaStats,
    outcome: Option<ArenaOutcome>,
}

impl ArenaScene {
    pub fn new(
        config: EngineConfig,
        defs: &[TargetDef],
        settings: ArenaSettings,
    ) -> Result<Self, ChallengeError> {
        let player = SimPlayer::new(Vec2::default(), settings.player_speed, settings.attack_seconds);
        let mut encounter = Encounter::new(config, player, RewardLedger::default());
        let mut provider = DefContentProvider::default();
        for def in defs {
            let target_id = encounter.targets_mut().spawn_with_challenge(
                def.position,
                def.label.clone(),
                def.challenge_content(),
            )?;
            encounter.rewards_mut().register(target_id, def.reward_seeds);
            provider.assign(target_id, def.clone());
        }

        Ok(Self {
            encounter,
            provider,
            typist: ScriptedTypist::new(
                settings.typist_chars_per_second,
                settings.typist_mistype_every,
            ),
            settings,
            targets_total: defs.len(),
            stats: ArenaStats::default(),
            outcome: None,
        })
    }

    pub fn encounter(&self) -> &Encounter<SimPlayer, RewardLedger> {
        &self.encounter
    }

    pub fn summary(&self, loop_summary: &LoopSummary) -> ArenaSummary {
        let completed = self.stats.challenges_completed;
        let average = |sum: f64| {
            if completed == 0 {
                0.0
            } else {
                sum / completed as f64
            }
        };
        let resolved = self.encounter.rewards().resolved();
        ArenaSummary {
            outcome: self.outcome.unwrap_or(ArenaOutcome::TickLimit),
            ticks: loop_summary.ticks,
            sim_seconds: loop_summary.sim_time.as_secs_f64(),
            targets_total: self.targets_total,
            targets_resolved: resolved.len(),
            resolved_order: resolved.iter().map(|entry| entry.target_id.0).collect(),
            sessions_started: self.stats.sessions_started,
            sessions_won: self.stats.sessions_won,
            sessions_lost: self.stats.sessions_lost,
            rearms: self.stats.rearms,
            characters_typed: self.stats.characters_typed,
            mistypes: self.stats.mistypes,
            average_wpm: average(self.stats.wpm_sum),
            average_keystroke_accuracy: average(self.stats.keystroke_accuracy_sum),
            best_wpm: resolved
                .iter()
                .filter_map(|entry| entry.wpm)
                .fold(0.0, f64::max),
            attacks: self.encounter.player().attacks(),
            seeds: self.encounter.rewards().seeds(),
        }
    }

    fn gather_input(&mut self, fixed_dt: Duration) -> TypingInput {
        let remaining = self.active_remaining();
        let typed = self.typist.keystrokes(fixed_dt.as_secs_f64(), &remaining);
        let focus = self.encounter.focus();
        let activate = !focus.is_active() && focus.has_eligible_targets();
        typed
            .into_iter()
            .fold(TypingInput::empty().with_activate_focus(activate), |input, ch| {
                input.with_char(ch)
            })
    }

    fn active_remaining(&self) -> Vec<char> {
        let Some(target_id) = self.encounter.router().active_target() else {
            return Vec::new();
        };
        self.encounter
            .targets()
            .find(target_id)
            .and_then(|target| target.challenge.as_ref())
            .filter(|challenge| challenge.state() == ChallengeState::Running)
            .map(|challenge| challenge.text().chars().skip(challenge.cursor()).collect())
            .unwrap_or_default()
    }

    fn record_events(&mut self) {
        for event in self.encounter.events().iter_emitted_so_far() {
            match event {
                TypingEvent::CharacterTyped { .. } => {
                    self.stats.characters_typed = self.stats.characters_typed.saturating_add(1);
                }
                TypingEvent::Mistyped { .. } => {
                    self.stats.mistypes = self.stats.mistypes.saturating_add(1);
                }
                TypingEvent::ChallengeCompleted(report) => {
                    self.stats.challenges_completed =
                        self.stats.challenges_completed.saturating_add(1);
                    self.stats.wpm_sum += report.wpm;
                    self.stats.keystroke_accuracy_sum += report.keystroke_accuracy;
                }
                TypingEvent::FocusSessionStarted { .. } => {
                    self.stats.sessions_started = self.stats.sessions_started.saturating_add(1);
                }
                TypingEvent::FocusSessionEnded { success: true } => {
                    self.stats.sessions_won = self.stats.sessions_won.saturating_add(1);
                }
                TypingEvent::FocusSessionEnded { success: false } => {
                    self.stats.sessions_lost = self.stats.sessions_lost.saturating_add(1);
                }
                _ => {}
            }
        }
    }

    fn between_sessions(&mut self) {
        if self.stats.sessions_lost >= self.settings.max_failed_sessions {
            warn!(sessions_lost = self.stats.sessions_lost, "arena_attempts_exhausted");
            self.outcome = Some(ArenaOutcome::Exhausted);
            return;
        }

        let rearmed = self.encounter.rearm_failed(&mut self.provider);
        self.stats.rearms = self.stats.rearms.saturating_add(rearmed.len() as u32);

        if self.encounter.targets().target_count() == 0 {
            info!(
                seeds = self.encounter.rewards().seeds(),
                sessions = self.stats.sessions_started,
                "arena_cleared"
            );
            self.outcome = Some(ArenaOutcome::Cleared);
            return;
        }

        if !self.encounter.focus().has_eligible_targets() {
            if let Some(destination) = self.nearest_target_position() {
                let stop_distance = self.encounter.config().focus.trigger_radius * 0.5;
                self.encounter
                    .player_mut()
                    .walk_toward(destination, stop_distance);
            }
        }
    }

    fn nearest_target_position(&self) -> Option<Vec2> {
        let origin = self.encounter.player().position();
        self.encounter
            .targets()
            .targets()
            .iter()
            .map(|target| target.position)
            .min_by(|a, b| origin.distance(*a).total_cmp(&origin.distance(*b)))
    }
}

impl Scene for ArenaScene {
    fn load(&mut self) {
        info!(targets = self.targets_total, "arena_loaded");
    }

    fn update(&mut self, fixed_dt: Duration) -> SceneCommand {
        if self.outcome.is_some() {
            return SceneCommand::Quit;
        }

        let input = self.gather_input(fixed_dt);
        self.encounter.update(fixed_dt, &input);
        self.record_events();
        if !self.encounter.focus().is_active() {
            self.between_sessions();
        }

        if self.outcome.is_some() {
            SceneCommand::Quit
        } else {
            SceneCommand::None
        }
    }

    fn unload(&mut self) {
        info!(
            outcome = ?self.outcome,
            remaining_targets = self.encounter.targets().target_count(),
            "arena_unloaded"
        );
    }

    fn debug_title(&self) -> Option<String> {
        Some(format!(
            "focus_arena | targets {} | phase {:?} | player {:?}",
            self.encounter.targets().target_count(),
            self.encounter.focus().phase(),
            self.encounter.player().state()
        ))
    }
}
