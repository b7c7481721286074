use std::fmt;

use tracing::{debug, warn};

use crate::app::Vec2;
use crate::challenge::{Challenge, ChallengeError, ChallengeIdAllocator, ChallengeState};
use crate::config::TypingTuning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct TargetIdAllocator {
    next: u64,
}

impl TargetIdAllocator {
    pub fn allocate(&mut self) -> TargetId {
        let id = TargetId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// Text and time limit for one challenge.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeContent {
    pub text: String,
    pub time_limit_seconds: f64,
}

/// Supplies challenge content for targets as they are instantiated or rearmed.
pub trait TargetContentProvider {
    fn content_for(&mut self, target_id: TargetId) -> Option<ChallengeContent>;
}

impl<F> TargetContentProvider for F
where
    F: FnMut(TargetId) -> Option<ChallengeContent>,
{
    fn content_for(&mut self, target_id: TargetId) -> Option<ChallengeContent> {
        self(target_id)
    }
}

/// Gives the router access to the challenges it activates and feeds.
pub trait ChallengeHost {
    fn has_target(&self, target_id: TargetId) -> bool;
    fn challenge(&self, target_id: TargetId) -> Option<&Challenge>;
    fn challenge_mut(&mut self, target_id: TargetId) -> Option<&mut Challenge>;
}

#[derive(Debug)]
pub struct Target {
    pub id: TargetId,
    pub position: Vec2,
    pub label: String,
    pub challenge: Option<Challenge>,
}

#[derive(Debug, Default)]
pub struct TargetWorld {
    target_ids: TargetIdAllocator,
    challenge_ids: ChallengeIdAllocator,
    tuning: TypingTuning,
    targets: Vec<Target>,
    pending_despawns: Vec<TargetId>,
}

impl TargetWorld {
    pub fn new(tuning: TypingTuning) -> Self {
        Self {
            tuning,
            ..Self::default()
        }
    }

    /// Spawns a target with no challenge attached.
    pub fn spawn(&mut self, position: Vec2, label: impl Into<String>) -> TargetId {
        let id = self.target_ids.allocate();
        self.targets.push(Target {
            id,
            position,
            label: label.into(),
            challenge: None,
        });
        id
    }

    /// Spawns a target carrying a freshly prepared challenge.
    pub fn spawn_with_challenge(
        &mut self,
        position: Vec2,
        label: impl Into<String>,
        content: ChallengeContent,
    ) -> Result<TargetId, ChallengeError> {
        let challenge = Challenge::prepare(
            self.challenge_ids.allocate(),
            content.text,
            content.time_limit_seconds,
            self.tuning,
        )?;
        let id = self.spawn(position, label);
        if let Some(target) = self.find_mut(id) {
            target.challenge = Some(challenge);
        }
        Ok(id)
    }

    pub fn spawn_from_provider(
        &mut self,
        position: Vec2,
        label: impl Into<String>,
        provider: &mut dyn TargetContentProvider,
    ) -> Result<TargetId, ChallengeError> {
        let id = self.spawn(position, label);
        self.attach_challenge(id, provider)?;
        Ok(id)
    }

    /// Re-prepares every failed challenge with new content under a new id.
    /// Returns the targets that were rearmed.
    pub fn rearm_failed(&mut self, provider: &mut dyn TargetContentProvider) -> Vec<TargetId> {
        let failed: Vec<TargetId> = self
            .targets
            .iter()
            .filter(|target| {
                !self.pending_despawns.contains(&target.id)
                    && target
                        .challenge
                        .as_ref()
                        .is_some_and(|challenge| challenge.state() == ChallengeState::Failed)
            })
            .map(|target| target.id)
            .collect();

        let mut rearmed = Vec::with_capacity(failed.len());
        for target_id in failed {
            match self.attach_challenge(target_id, provider) {
                Ok(true) => rearmed.push(target_id),
                Ok(false) => {}
                Err(error) => {
                    warn!(target_id = target_id.0, error = %error, "target_rearm_failed")
                }
            }
        }
        rearmed
    }

    fn attach_challenge(
        &mut self,
        target_id: TargetId,
        provider: &mut dyn TargetContentProvider,
    ) -> Result<bool, ChallengeError> {
        let Some(content) = provider.content_for(target_id) else {
            debug!(target_id = target_id.0, "target_content_unavailable");
            return Ok(false);
        };
        let challenge_id = self.challenge_ids.allocate();
        let tuning = self.tuning;
        let Some(target) = self.find_mut(target_id) else {
            return Ok(false);
        };
        match target.challenge.as_mut() {
            Some(challenge) => {
                challenge.re_prepare(challenge_id, content.text, content.time_limit_seconds)?
            }
            None => {
                target.challenge = Some(Challenge::prepare(
                    challenge_id,
                    content.text,
                    content.time_limit_seconds,
                    tuning,
                )?);
            }
        }
        Ok(true)
    }

    /// Schedules removal at the next `apply_pending`.
    pub fn despawn(&mut self, id: TargetId) -> bool {
        if self.find(id).is_none() {
            return false;
        }
        if !self.pending_despawns.contains(&id) {
            self.pending_despawns.push(id);
        }
        true
    }

    pub fn pending_despawns(&self) -> &[TargetId] {
        &self.pending_despawns
    }

    /// Removes scheduled targets and returns their ids in scheduling order.
    pub fn apply_pending(&mut self) -> Vec<TargetId> {
        if self.pending_despawns.is_empty() {
            return Vec::new();
        }
        let removed = std::mem::take(&mut self.pending_despawns);
        self.targets.retain(|target| !removed.contains(&target.id));
        removed
    }

    pub fn find(&self, id: TargetId) -> Option<&Target> {
        self.targets.iter().find(|target| target.id == id)
    }

    pub fn find_mut(&mut self, id: TargetId) -> Option<&mut Target> {
        self.targets.iter_mut().find(|target| target.id == id)
    }

    pub fn position(&self, id: TargetId) -> Option<Vec2> {
        self.find(id).map(|target| target.position)
    }

    pub fn set_position(&mut self, id: TargetId, position: Vec2) -> bool {
        match self.find_mut(id) {
            Some(target) => {
                target.position = position;
                true
            }
            None => false,
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn challenge_state(&self, id: TargetId) -> Option<ChallengeState> {
        self.challenge(id).map(Challenge::state)
    }

    pub fn tuning(&self) -> TypingTuning {
        self.tuning
    }
}

impl ChallengeHost for TargetWorld {
    fn has_target(&self, target_id: TargetId) -> bool {
        self.find(target_id).is_some()
    }

    fn challenge(&self, target_id: TargetId) -> Option<&Challenge> {
        self.find(target_id)
            .and_then(|target| target.challenge.as_ref())
    }

    fn challenge_mut(&mut self, target_id: TargetId) -> Option<&mut Challenge> {
        self.find_mut(target_id)
            .and_then(|target| target.challenge.as_mut())
    }
}
