//! Simulated dynamometer rig: ADC front end, actuator and relay drivers,
//! engine monitor and shaft edge generators, plus the wiring that runs a
//! whole session against them. Used by the binary and the scenario tests.

pub mod adc;
pub mod rig;
pub mod session;
pub mod shaft;

pub use adc::SimAdc;
pub use rig::{RigProbe, RigSnapshot, SimActuators, SimEngine, SimRelays, sim_rig};
pub use session::{SimOutcome, SimSession};
pub use shaft::{ShaftSim, spawn_shaft};
