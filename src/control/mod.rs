// Control side: the per-tick state machine and the pieces it drives.

pub mod actuators;
pub mod control_loop;
pub mod fault;
pub mod pid;
pub mod setpoint;
