//! # Dynamometer data acquisition and control
//!
//! Fixed-rate closed-loop control of a dynamometer session with
//! non-blocking sample logging.
//!
//! ## Flow
//! - **Tick source:** periodic timer thread, overwrite-publishes one pending tick.
//! - **Edge capture:** one per shaft, publishes the latest speed into a single slot.
//! - **Control loop:** max-priority thread; setpoints, ADC, PID on brake
//!   current, actuators, latched faults, then one `Sample` per tick.
//! - **Logging:** double buffer drained to storage by short-lived threads
//!   that never make the control loop wait.

pub mod acquisition;
pub mod config;
pub mod control;
pub mod error;
pub mod logging;
pub mod sim;
pub mod utils;

pub use config::DaqConfig;
pub use control::control_loop::{
    ControlLoop, HaltHandle, LoggingSwitch, LoopState, SessionOutcome, SessionReport,
};
pub use error::{DaqError, Result};
