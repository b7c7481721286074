use std::collections::BTreeSet;

use tracing::debug;

use crate::app::Vec2;
use crate::challenge::ChallengeState;
use crate::events::{TypingEvent, TypingEventBus};
use crate::targets::{Target, TargetId, TargetWorld};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionChanges {
    pub entered: Vec<TargetId>,
    pub exited: Vec<TargetId>,
}

impl RegionChanges {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }
}

/// Circular eligibility area around the player. A target counts as inside
/// while it is within the radius and its challenge can still be typed.
#[derive(Debug, Clone)]
pub struct TriggerRegion {
    radius: f32,
    inside: BTreeSet<TargetId>,
}

impl TriggerRegion {
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            inside: BTreeSet::new(),
        }
    }

    pub fn is_eligible(&self, center: Vec2, target: &Target) -> bool {
        let typeable = target.challenge.as_ref().is_some_and(|challenge| {
            matches!(
                challenge.state(),
                ChallengeState::Prepared | ChallengeState::Running
            )
        });
        typeable && center.distance(target.position) <= self.radius
    }

    /// Recomputes membership, announcing entries, exits and readiness changes.
    pub fn refresh(
        &mut self,
        center: Vec2,
        targets: &TargetWorld,
        events: &mut TypingEventBus,
    ) -> RegionChanges {
        let now_inside: BTreeSet<TargetId> = targets
            .targets()
            .iter()
            .filter(|target| self.is_eligible(center, target))
            .map(|target| target.id)
            .collect();

        let changes = RegionChanges {
            entered: now_inside.difference(&self.inside).copied().collect(),
            exited: self.inside.difference(&now_inside).copied().collect(),
        };
        if changes.is_empty() {
            return changes;
        }

        for target_id in &changes.exited {
            events.emit(TypingEvent::TargetExitedRegion {
                target_id: *target_id,
            });
        }
        for target_id in &changes.entered {
            events.emit(TypingEvent::TargetEnteredRegion {
                target_id: *target_id,
            });
        }
        events.emit(TypingEvent::ActivationReady {
            has_targets: !now_inside.is_empty(),
        });
        debug!(
            entered = changes.entered.len(),
            exited = changes.exited.len(),
            inside = now_inside.len(),
            "trigger_region_changed"
        );
        self.inside = now_inside;
        changes
    }

    pub fn contains(&self, target_id: TargetId) -> bool {
        self.inside.contains(&target_id)
    }

    pub fn members(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.inside.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.inside.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inside.is_empty()
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TypingTuning;
    use crate::events::TypingEventKind;
    use crate::targets::ChallengeContent;

    fn spawn(world: &mut TargetWorld, x: f32) -> TargetId {
        world
            .spawn_with_challenge(
                Vec2::new(x, 0.0),
                "t",
                ChallengeContent {
                    text: "cat".to_string(),
                    time_limit_seconds: 3.0,
                },
            )
            .expect("spawn")
    }

    #[test]
    fn refresh_reports_entries_and_exits() {
        let mut world = TargetWorld::new(TypingTuning::default());
        let near = spawn(&mut world, 50.0);
        let far = spawn(&mut world, 500.0);
        let mut events = TypingEventBus::default();
        let mut region = TriggerRegion::new(100.0);

        let changes = region.refresh(Vec2::default(), &world, &mut events);
        assert_eq!(changes.entered, vec![near]);
        assert!(changes.exited.is_empty());
        assert!(events.iter_emitted_so_far().any(|event| *event
            == TypingEvent::ActivationReady { has_targets: true }));

        world.set_position(far, Vec2::new(10.0, 0.0));
        world.set_position(near, Vec2::new(300.0, 0.0));
        let changes = region.refresh(Vec2::default(), &world, &mut events);
        assert_eq!(changes.entered, vec![far]);
        assert_eq!(changes.exited, vec![near]);
        assert!(region.contains(far));
        assert!(!region.contains(near));
    }

    #[test]
    fn unchanged_membership_is_silent() {
        let mut world = TargetWorld::new(TypingTuning::default());
        spawn(&mut world, 10.0);
        let mut events = TypingEventBus::default();
        let mut region = TriggerRegion::new(100.0);
        region.refresh(Vec2::default(), &world, &mut events);
        events.finish_tick_rollover();

        let changes = region.refresh(Vec2::default(), &world, &mut events);
        assert!(changes.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn finished_challenges_leave_the_region() {
        let mut world = TargetWorld::new(TypingTuning::default());
        let id = spawn(&mut world, 10.0);
        let mut events = TypingEventBus::default();
        let mut region = TriggerRegion::new(100.0);
        region.refresh(Vec2::default(), &world, &mut events);

        world
            .find_mut(id)
            .and_then(|target| target.challenge.as_mut())
            .expect("challenge")
            .cancel(&mut events);
        let changes = region.refresh(Vec2::default(), &world, &mut events);
        assert_eq!(changes.exited, vec![id]);
        assert!(region.is_empty());
        assert_eq!(
            events
                .iter_emitted_so_far()
                .filter(|event| event.kind() == TypingEventKind::ActivationReady)
                .count(),
            2
        );
    }
}
