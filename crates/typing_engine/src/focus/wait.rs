use tracing::debug;

use crate::actor::ActorSignal;
use crate::challenge::ChallengeId;
use crate::targets::TargetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaitToken(pub u64);

#[derive(Debug, Default)]
pub struct WaitTokenAllocator {
    next: u64,
}

impl WaitTokenAllocator {
    pub fn allocate(&mut self) -> WaitToken {
        let id = WaitToken(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// The single outstanding subscription of a focus session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneShotWait {
    Arrival {
        target_id: TargetId,
        token: WaitToken,
    },
    Resolution {
        target_id: TargetId,
        challenge_id: ChallengeId,
    },
    AttackFinished {
        target_id: TargetId,
        token: WaitToken,
    },
}

impl OneShotWait {
    pub fn target_id(&self) -> TargetId {
        match self {
            Self::Arrival { target_id, .. }
            | Self::Resolution { target_id, .. }
            | Self::AttackFinished { target_id, .. } => *target_id,
        }
    }

    fn matches_signal(&self, signal: ActorSignal) -> bool {
        match (self, signal) {
            (Self::Arrival { token, .. }, ActorSignal::Arrived(signalled)) => *token == signalled,
            (Self::AttackFinished { token, .. }, ActorSignal::AttackFinished(signalled)) => {
                *token == signalled
            }
            _ => false,
        }
    }

    fn matches_resolution(&self, resolved: ChallengeId) -> bool {
        matches!(self, Self::Resolution { challenge_id, .. } if *challenge_id == resolved)
    }
}

/// Holds at most one wait; a matching notification consumes it.
#[derive(Debug, Default)]
pub struct WaitSlot {
    wait: Option<OneShotWait>,
}

impl WaitSlot {
    pub fn arm(&mut self, wait: OneShotWait) {
        if let Some(replaced) = self.wait.replace(wait) {
            debug!(wait = ?replaced, "wait_replaced");
        }
    }

    pub fn take_for_signal(&mut self, signal: ActorSignal) -> Option<OneShotWait> {
        match self.wait {
            Some(wait) if wait.matches_signal(signal) => self.wait.take(),
            _ => None,
        }
    }

    pub fn take_for_resolution(&mut self, challenge_id: ChallengeId) -> Option<OneShotWait> {
        match self.wait {
            Some(wait) if wait.matches_resolution(challenge_id) => self.wait.take(),
            _ => None,
        }
    }

    pub fn tear_down(&mut self) -> Option<OneShotWait> {
        let torn_down = self.wait.take();
        if let Some(wait) = torn_down {
            debug!(wait = ?wait, "wait_torn_down");
        }
        torn_down
    }

    pub fn current(&self) -> Option<OneShotWait> {
        self.wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_consumes_matching_wait_once() {
        let mut slot = WaitSlot::default();
        let token = WaitToken(4);
        slot.arm(OneShotWait::Arrival {
            target_id: TargetId(1),
            token,
        });
        assert!(slot.take_for_signal(ActorSignal::Arrived(WaitToken(3))).is_none());
        assert!(slot.take_for_signal(ActorSignal::AttackFinished(token)).is_none());
        assert!(slot.take_for_signal(ActorSignal::Arrived(token)).is_some());
        assert!(slot.take_for_signal(ActorSignal::Arrived(token)).is_none());
    }

    #[test]
    fn resolution_matches_by_challenge_id() {
        let mut slot = WaitSlot::default();
        slot.arm(OneShotWait::Resolution {
            target_id: TargetId(1),
            challenge_id: ChallengeId(9),
        });
        assert!(slot.take_for_resolution(ChallengeId(8)).is_none());
        assert_eq!(
            slot.take_for_resolution(ChallengeId(9)).map(|wait| wait.target_id()),
            Some(TargetId(1))
        );
        assert_eq!(slot.current(), None);
    }

    #[test]
    fn tear_down_drops_pending_wait() {
        let mut slot = WaitSlot::default();
        let token = WaitToken(1);
        slot.arm(OneShotWait::AttackFinished {
            target_id: TargetId(2),
            token,
        });
        assert!(slot.tear_down().is_some());
        assert!(slot.take_for_signal(ActorSignal::AttackFinished(token)).is_none());
        assert!(slot.tear_down().is_none());
    }
}
