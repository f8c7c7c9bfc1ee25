//! actuators.rs
//! Collaborator interfaces the control loop commands: PWM actuators,
//! discrete relays and the engine-running confirmation.
//!
//! Drivers clamp/saturate their own inputs; the loop hands them raw
//! percentages.

use log::debug;

use crate::{acquisition::adc::Adc, error::Result};

/// Throttle servo and brake-current PWM.
pub trait ActuatorDriver: Send {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }
    /// 0–100 %
    fn set_throttle(&mut self, percent: f64);
    /// 0–100 %
    fn set_brake_duty(&mut self, percent: f64);
}

/// Engine kill relay, e-brake release solenoid, cadence indicator.
pub trait RelayDriver: Send {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }
    /// `true` keeps the engine killed.
    fn set_engine_kill(&mut self, active: bool);
    /// `true` holds the vehicle back.
    fn set_ebrake(&mut self, engaged: bool);
    fn set_indicator(&mut self, on: bool);
}

/// Source of the "engine confirmed running" signal.
pub trait EngineMonitor: Send {
    fn engine_running(&mut self) -> bool;
}

/// Every external collaborator the control loop drives, except storage.
pub struct Peripherals {
    pub adc: Box<dyn Adc>,
    pub actuators: Box<dyn ActuatorDriver>,
    pub relays: Box<dyn RelayDriver>,
    pub engine: Box<dyn EngineMonitor>,
}

impl Peripherals {
    /// Throttle closed, brake released, engine killed, hold-back engaged, indicator off.
    pub fn apply_safe_state(&mut self) {
        self.actuators.set_throttle(0.0);
        self.actuators.set_brake_duty(0.0);
        self.relays.set_engine_kill(true);
        self.relays.set_ebrake(true);
        self.relays.set_indicator(false);
        debug!("[Peripherals] safe state applied");
    }
}
