//! Ground truth ball physics for the simulated server.
//!
//! Each chamber is a box one unit wide and `chamber_height` units tall with
//! balls bouncing under gravity. The oracle produces the same data a real
//! server publishes: opaque per-chamber state bytes plus ball positions.

use chamberview_env::{BallPosition, ChamberTable, SimulationStep};
use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

/// Size of one chamber's state blob.
///
/// Layout: `[r, g, b, a]`, step number (u64 LE), ball count (u32 LE).
pub const STATE_LEN: usize = 16;

const GRAVITY: f64 = -2.0;
const RESTITUTION: f64 = 0.9;
const BALL_RADIUS: f64 = 0.025;

/// A ball inside one chamber.
#[derive(Debug, Clone, PartialEq)]
pub struct SimBall {
    pub position: Vector2<f64>,
    pub velocity: Vector2<f64>,
    pub radius: f64,
}

#[derive(Debug, Clone)]
struct ChamberWorld {
    balls: Vec<SimBall>,
}

/// The oracle: owns every chamber's balls and the global step counter.
pub struct Oracle {
    physics_seed: u64,
    rng: ChaCha8Rng,
    chambers: Vec<ChamberWorld>,
    chamber_height: f64,
    num_balls: usize,
    steps_taken: u64,
}

impl Oracle {
    /// Creates an oracle and spawns `num_balls` balls in every chamber.
    pub fn new(physics_seed: u64, num_chambers: usize, num_balls: usize, chamber_height: f64) -> Self {
        let mut oracle = Self {
            physics_seed,
            rng: ChaCha8Rng::seed_from_u64(physics_seed),
            chambers: vec![ChamberWorld { balls: Vec::new() }; num_chambers],
            chamber_height,
            num_balls,
            steps_taken: 0,
        };
        oracle.respawn();
        oracle
    }
    
    pub fn physics_seed(&self) -> u64 {
        self.physics_seed
    }
    
    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }
    
    pub fn num_balls(&self) -> usize {
        self.num_balls
    }
    
    pub fn balls(&self, chamber: usize) -> &[SimBall] {
        self.chambers
            .get(chamber)
            .map(|c| c.balls.as_slice())
            .unwrap_or(&[])
    }
    
    /// Changes the ball count; every chamber starts over with fresh balls.
    pub fn set_num_balls(&mut self, num_balls: usize) {
        self.num_balls = num_balls;
        self.respawn();
    }
    
    /// Restarts every chamber. The step counter keeps counting.
    pub fn reset(&mut self) {
        self.respawn();
    }
    
    fn respawn(&mut self) {
        let height = self.chamber_height;
        for chamber in 0..self.chambers.len() {
            let balls = (0..self.num_balls)
                .map(|_| {
                    let x = self.rng.gen_range(BALL_RADIUS..1.0 - BALL_RADIUS);
                    let y = self.rng.gen_range(height * 0.5..(height - BALL_RADIUS).max(height * 0.5 + 1e-3));
                    let vx: f64 = self.rng.sample(StandardNormal);
                    let vy: f64 = self.rng.sample(StandardNormal);
                    SimBall {
                        position: Vector2::new(x, y),
                        velocity: Vector2::new(vx, vy) * 0.3,
                        radius: BALL_RADIUS,
                    }
                })
                .collect();
            self.chambers[chamber].balls = balls;
        }
    }
    
    /// Advances every chamber by `dt` seconds and bumps the step counter.
    pub fn step(&mut self, dt: f64) {
        let height = self.chamber_height;
        for chamber in &mut self.chambers {
            for ball in &mut chamber.balls {
                ball.velocity.y += GRAVITY * dt;
                ball.position += ball.velocity * dt;
                bounce(&mut ball.position.x, &mut ball.velocity.x, ball.radius, 1.0 - ball.radius);
                bounce(&mut ball.position.y, &mut ball.velocity.y, ball.radius, height - ball.radius);
            }
        }
        self.steps_taken += 1;
    }
    
    /// State blob the chamber sandbox loads for the current step.
    pub fn chamber_state(&self, chamber: usize) -> Vec<u8> {
        let step = self.steps_taken;
        let mut state = Vec::with_capacity(STATE_LEN);
        state.push(((step + chamber as u64 * 40) % 256) as u8);
        state.push((64 + chamber * 50 % 128) as u8);
        state.push(200);
        state.push(255);
        state.extend_from_slice(&step.to_le_bytes());
        state.extend_from_slice(&(self.balls(chamber).len() as u32).to_le_bytes());
        state
    }
    
    /// The step as the server would publish it.
    pub fn snapshot(&self) -> SimulationStep {
        let mut chamber_states = ChamberTable::new();
        let mut chamber_balls = ChamberTable::new();
        for (idx, chamber) in self.chambers.iter().enumerate() {
            chamber_states.insert(idx, self.chamber_state(idx));
            chamber_balls.insert(
                idx,
                chamber
                    .balls
                    .iter()
                    .map(|b| BallPosition {
                        x: b.position.x,
                        y: b.position.y,
                        r: Some(b.radius),
                    })
                    .collect(),
            );
        }
        SimulationStep {
            num_steps_taken: self.steps_taken,
            chamber_states,
            chamber_balls,
        }
    }
}

/// Reflects a coordinate back into `[lo, hi]`, losing some speed.
fn bounce(pos: &mut f64, vel: &mut f64, lo: f64, hi: f64) {
    if *pos < lo {
        *pos = lo + (lo - *pos).min(hi - lo);
        *vel = vel.abs() * RESTITUTION;
    } else if *pos > hi {
        *pos = hi - (*pos - hi).min(hi - lo);
        *vel = -vel.abs() * RESTITUTION;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    
    #[test]
    fn test_oracle_spawns_balls_per_chamber() {
        let oracle = Oracle::new(42, 3, 5, 0.5);
        for chamber in 0..3 {
            assert_eq!(oracle.balls(chamber).len(), 5);
        }
        assert!(oracle.balls(3).is_empty());
    }
    
    #[test]
    fn test_balls_stay_inside_chamber() {
        let mut oracle = Oracle::new(7, 2, 10, 0.5);
        for _ in 0..2000 {
            oracle.step(1.0 / 60.0);
        }
        for chamber in 0..2 {
            for ball in oracle.balls(chamber) {
                assert!(ball.position.x >= ball.radius - 1e-9);
                assert!(ball.position.x <= 1.0 - ball.radius + 1e-9);
                assert!(ball.position.y >= ball.radius - 1e-9);
                assert!(ball.position.y <= 0.5 - ball.radius + 1e-9);
            }
        }
    }
    
    #[test]
    fn test_same_seed_same_world() {
        let mut a = Oracle::new(42, 2, 3, 0.5);
        let mut b = Oracle::new(42, 2, 3, 0.5);
        for _ in 0..100 {
            a.step(0.016);
            b.step(0.016);
        }
        assert_eq!(a.snapshot(), b.snapshot());
    }
    
    #[test]
    fn test_state_layout() {
        let mut oracle = Oracle::new(1, 2, 4, 0.5);
        oracle.step(0.016);
        let state = oracle.chamber_state(1);
        
        assert_eq!(state.len(), STATE_LEN);
        assert_eq!(state[3], 255);
        assert_eq!(u64::from_le_bytes(state[4..12].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(state[12..16].try_into().unwrap()), 4);
    }
    
    #[test]
    fn test_set_num_balls_and_reset_keep_counting() {
        let mut oracle = Oracle::new(1, 1, 2, 0.5);
        oracle.step(0.016);
        oracle.set_num_balls(6);
        oracle.reset();
        oracle.step(0.016);
        
        assert_eq!(oracle.balls(0).len(), 6);
        assert_eq!(oracle.steps_taken(), 2);
        assert_eq!(oracle.snapshot().chamber_balls.get(0).map(Vec::len), Some(6));
    }
    
    proptest! {
        #[test]
        fn prop_balls_never_leave_their_chamber(
            seed in any::<u64>(),
            height in 0.2f64..2.0,
            dt in 0.001f64..0.05,
            steps in 1usize..400,
        ) {
            let mut oracle = Oracle::new(seed, 2, 4, height);
            for _ in 0..steps {
                oracle.step(dt);
            }
            for chamber in 0..2 {
                for ball in oracle.balls(chamber) {
                    prop_assert!(ball.position.x >= ball.radius - 1e-9);
                    prop_assert!(ball.position.x <= 1.0 - ball.radius + 1e-9);
                    prop_assert!(ball.position.y >= ball.radius - 1e-9);
                    prop_assert!(ball.position.y <= height - ball.radius + 1e-9);
                }
            }
        }
    }
}
