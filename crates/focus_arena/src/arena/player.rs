use tracing::debug;
use typing_engine::{ActorSignal, PlayerActor, Vec2, WaitToken};

const ARRIVAL_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerState {
    Idle,
    Approaching {
        destination: Vec2,
        stop_distance: f32,
        token: WaitToken,
    },
    Holding,
    Attacking {
        remaining_seconds: f32,
        token: WaitToken,
    },
    Walking {
        destination: Vec2,
        stop_distance: f32,
    },
}

/// Headless stand-in for the player character: moves at a fixed speed and
/// plays a timed attack, both on world time.
#[derive(Debug, Clone)]
pub struct SimPlayer {
    position: Vec2,
    speed: f32,
    attack_seconds: f32,
    state: PlayerState,
    attacks: u32,
}

impl SimPlayer {
    pub fn new(position: Vec2, speed: f32, attack_seconds: f32) -> Self {
        Self {
            position,
            speed,
            attack_seconds,
            state: PlayerState::Idle,
            attacks: 0,
        }
    }

    /// Free movement outside a focus session. Ignored while choreographed.
    pub fn walk_toward(&mut self, destination: Vec2, stop_distance: f32) {
        if matches!(self.state, PlayerState::Idle | PlayerState::Walking { .. }) {
            self.state = PlayerState::Walking {
                destination,
                stop_distance,
            };
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn attacks(&self) -> u32 {
        self.attacks
    }

    fn step(&mut self, destination: Vec2, stop_distance: f32, world_dt_seconds: f32) -> bool {
        let distance = self.position.distance(destination);
        if distance <= stop_distance + ARRIVAL_EPSILON {
            return true;
        }
        let max_step = (self.speed * world_dt_seconds).min(distance - stop_distance);
        self.position = self.position.step_toward(destination, max_step);
        self.position.distance(destination) <= stop_distance + ARRIVAL_EPSILON
    }
}

impl PlayerActor for SimPlayer {
    fn position(&self) -> Vec2 {
        self.position
    }

    fn approach(&mut self, destination: Vec2, stop_distance: f32, token: WaitToken) {
        self.state = PlayerState::Approaching {
            destination,
            stop_distance,
            token,
        };
    }

    fn hold_pre_attack_pose(&mut self) {
        self.state = PlayerState::Holding;
    }

    fn resume_attack(&mut self, token: WaitToken) {
        self.state = PlayerState::Attacking {
            remaining_seconds: self.attack_seconds,
            token,
        };
    }

    fn resume_normal_state(&mut self) {
        self.state = PlayerState::Idle;
    }

    fn update(&mut self, world_dt_seconds: f32, signals: &mut Vec<ActorSignal>) {
        match self.state {
            PlayerState::Idle | PlayerState::Holding => {}
            PlayerState::Approaching {
                destination,
                stop_distance,
                token,
            } => {
                if self.step(destination, stop_distance, world_dt_seconds) {
                    self.state = PlayerState::Idle;
                    debug!(x = self.position.x, y = self.position.y, "player_arrived");
                    signals.push(ActorSignal::Arrived(token));
                }
            }
            PlayerState::Attacking {
                remaining_seconds,
                token,
            } => {
                let remaining_seconds = remaining_seconds - world_dt_seconds;
                if remaining_seconds <= 0.0 {
                    self.state = PlayerState::Idle;
                    self.attacks = self.attacks.saturating_add(1);
                    signals.push(ActorSignal::AttackFinished(token));
                } else {
                    self.state = PlayerState::Attacking {
                        remaining_seconds,
                        token,
                    };
                }
            }
            PlayerState::Walking {
                destination,
                stop_distance,
            } => {
                if self.step(destination, stop_distance, world_dt_seconds) {
                    self.state = PlayerState::Idle;
                }
            }
        }
    }
}
