//! rig.rs
//! Recording actuator/relay drivers and a scripted engine monitor.

use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use crate::control::actuators::{ActuatorDriver, EngineMonitor, RelayDriver};

/// Last command seen on every output of the rig.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RigSnapshot {
    pub throttle_pct: f64,
    pub brake_duty_pct: f64,
    pub engine_kill: bool,
    pub ebrake: bool,
    pub indicator: bool,
    pub throttle_commands: usize,
    pub brake_commands: usize,
    /// Throttle commands issued before the e-brake was first released.
    pub ebrake_released_after: Option<usize>,
}

/// Shared view of the rig outputs; clones observe the same rig.
#[derive(Debug, Clone, Default)]
pub struct RigProbe {
    inner: Arc<Mutex<RigSnapshot>>,
}

impl RigProbe {
    pub fn snapshot(&self) -> RigSnapshot {
        self.inner.lock().clone()
    }

    pub fn brake_duty(&self) -> f64 {
        self.inner.lock().brake_duty_pct
    }
}

pub struct SimActuators {
    probe: RigProbe,
}

pub struct SimRelays {
    probe: RigProbe,
}

pub fn sim_rig() -> (SimActuators, SimRelays, RigProbe) {
    let probe = RigProbe::default();
    (
        SimActuators { probe: probe.clone() },
        SimRelays { probe: probe.clone() },
        probe,
    )
}

fn clamp_pct(percent: f64) -> f64 {
    if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) }
}

impl ActuatorDriver for SimActuators {
    fn set_throttle(&mut self, percent: f64) {
        let mut rig = self.probe.inner.lock();
        rig.throttle_pct = clamp_pct(percent);
        rig.throttle_commands += 1;
    }

    fn set_brake_duty(&mut self, percent: f64) {
        let mut rig = self.probe.inner.lock();
        rig.brake_duty_pct = clamp_pct(percent);
        rig.brake_commands += 1;
    }
}

impl RelayDriver for SimRelays {
    fn set_engine_kill(&mut self, active: bool) {
        trace!("[SimRig] engine kill {}", active);
        self.probe.inner.lock().engine_kill = active;
    }

    fn set_ebrake(&mut self, engaged: bool) {
        let mut rig = self.probe.inner.lock();
        if !engaged && rig.ebrake_released_after.is_none() {
            rig.ebrake_released_after = Some(rig.throttle_commands);
        }
        rig.ebrake = engaged;
    }

    fn set_indicator(&mut self, on: bool) {
        self.probe.inner.lock().indicator = on;
    }
}

/// Reports the engine running after a fixed number of polls, or never.
#[derive(Debug, Clone)]
pub struct SimEngine {
    confirm_after: Option<usize>,
    polls: usize,
}

impl SimEngine {
    pub fn confirms_after(polls: usize) -> Self {
        Self {
            confirm_after: Some(polls),
            polls: 0,
        }
    }

    pub fn never() -> Self {
        Self {
            confirm_after: None,
            polls: 0,
        }
    }
}

impl EngineMonitor for SimEngine {
    fn engine_running(&mut self) -> bool {
        self.polls += 1;
        self.confirm_after.is_some_and(|n| self.polls > n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actuators_clamp_and_record() {
        let (mut act, mut relays, probe) = sim_rig();
        act.set_throttle(150.0);
        act.set_brake_duty(-3.0);
        relays.set_ebrake(true);
        relays.set_ebrake(false);

        let snap = probe.snapshot();
        assert_eq!(snap.throttle_pct, 100.0);
        assert_eq!(snap.brake_duty_pct, 0.0);
        assert_eq!(snap.throttle_commands, 1);
        assert_eq!(snap.ebrake_released_after, Some(1));
        assert!(!snap.ebrake);
    }

    #[test]
    fn engine_confirms_after_polls() {
        let mut engine = SimEngine::confirms_after(2);
        assert!(!engine.engine_running());
        assert!(!engine.engine_running());
        assert!(engine.engine_running());
        assert!(!SimEngine::never().engine_running());
    }
}
