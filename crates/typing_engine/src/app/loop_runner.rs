use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::metrics::MetricsAccumulator;
use super::{LoopMetricsSnapshot, Scene, SceneCommand};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    /// Stop after this many ticks even if the scene never quits.
    pub max_ticks: Option<u64>,
    /// Pace ticks against the wall clock instead of running them back to back.
    pub realtime: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            max_ticks: Some(60 * 120),
            realtime: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    SceneQuit,
    TickLimit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSummary {
    pub exit: LoopExit,
    pub ticks: u64,
    pub sim_time: Duration,
    pub metrics: LoopMetricsSnapshot,
}

/// Drives `scene` at a fixed tick rate until it quits or the tick limit is
/// reached. Headless runs tick back to back; realtime runs sleep between
/// frames and clamp any backlog.
pub fn run_scene(config: &LoopConfig, scene: &mut dyn Scene) -> LoopSummary {
    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        max_ticks = ?config.max_ticks,
        realtime = config.realtime,
        "loop_config"
    );

    scene.load();
    info!(title = ?scene.debug_title(), "scene_loaded");

    let mut metrics = MetricsAccumulator::new(metrics_log_interval, Instant::now());
    let mut ticks = 0u64;
    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();

    let exit = 'frames: loop {
        let ticks_to_run = if config.realtime {
            let now = Instant::now();
            let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
            last_frame_instant = now;
            accumulator = accumulator.saturating_add(clamp_frame_delta(raw_frame_dt, max_frame_delta));

            let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
            accumulator = step_plan.remaining_accumulator;
            if step_plan.dropped_backlog > Duration::ZERO {
                metrics.record_dropped_backlog(step_plan.dropped_backlog);
                warn!(
                    dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                    max_ticks_per_frame, "sim_clamp_triggered"
                );
            }
            step_plan.ticks_to_run
        } else {
            1
        };

        for _ in 0..ticks_to_run {
            if config.max_ticks.is_some_and(|limit| ticks >= limit) {
                break 'frames LoopExit::TickLimit;
            }
            let update_start = Instant::now();
            let command = scene.update(fixed_dt);
            ticks = ticks.saturating_add(1);
            metrics.record_tick(fixed_dt, update_start.elapsed());
            if command == SceneCommand::Quit {
                break 'frames LoopExit::SceneQuit;
            }
        }

        if let Some(snapshot) = metrics.maybe_snapshot(Instant::now()) {
            info!(
                tps = snapshot.tps,
                sim_speed = snapshot.sim_speed,
                total_ticks = snapshot.total_ticks,
                slowest_update_us = snapshot.slowest_update_us,
                "loop_metrics"
            );
        }

        if config.realtime {
            let elapsed = Instant::now().saturating_duration_since(last_frame_instant);
            let sleep = compute_tick_sleep(elapsed, fixed_dt);
            if sleep > Duration::ZERO {
                thread::sleep(sleep);
            }
        }
    };

    let final_metrics = metrics.take_snapshot(Instant::now());
    scene.unload();
    info!(exit = ?exit, ticks, "shutdown");

    LoopSummary {
        exit,
        ticks,
        sim_time: fixed_dt.saturating_mul(ticks.min(u32::MAX as u64) as u32),
        metrics: final_metrics,
    }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn compute_tick_sleep(elapsed: Duration, fixed_dt: Duration) -> Duration {
    fixed_dt.saturating_sub(elapsed)
}
