// Acquisition side: everything that produces data for the control loop.
// Tick and edge producers run in "interrupt" context and only publish into
// single-word slots; the ADC is an external collaborator.

pub mod adc;
pub mod edge_capture;
pub mod slot;
pub mod tick;
