//! control_loop.rs
//! The session state machine that runs once per tick:
//! setpoints → acquisition → PID → actuators → faults → log.
//!
//! `Init → ArmedWaitingConfirm → Running → (Faulted | Completed | Halted)
//!  → ShuttingDown → Stopped`
//!
//! The loop owns all session state. Other threads only see it through the
//! tick slot, the rate slots, the halt and logging switches, the display
//! slot and the shared counters.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use serde::Serialize;
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::{
    acquisition::{
        adc::{AdcChannel, Converter},
        slot::{RateReader, SampleReader, SampleSlot},
        tick::TickReceiver,
    },
    config::DaqConfig,
    control::{
        actuators::Peripherals,
        fault::{FaultInputs, FaultRecord, FaultState, FaultThresholds},
        pid::PidController,
        setpoint::{Profile, TerminationPolicy},
    },
    error::{DaqError, Result},
    logging::{
        double_buffer::SampleLogger,
        record::{Sample, rpm_field},
        storage::Storage,
    },
    utils::metrics::{CounterSnapshot, DaqCounters, SharedCounters},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    Init,
    ArmedWaitingConfirm,
    Running,
    Faulted,
    Completed,
    Halted,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOutcome {
    Completed,
    Faulted,
    Halted,
}

impl SessionOutcome {
    fn state(self) -> LoopState {
        match self {
            SessionOutcome::Completed => LoopState::Completed,
            SessionOutcome::Faulted => LoopState::Faulted,
            SessionOutcome::Halted => LoopState::Halted,
        }
    }
}

/// Per-session state, rebuilt from zero on every `init`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlState {
    pub engine_armed: bool,
    pub engine_running: bool,
    pub run: bool,
    pub profile_id: String,
    pub index: usize,
    pub brake_current_amps: f64,
    pub brake_duty_pct: f64,
    pub max_temperature_c: f64,
    pub holdback_released: bool,
    pub logging_enabled: bool,
    /// Logging was switched off with samples still in the active buffer.
    pub unflushed: bool,
    /// Failed ADC reads since the last good one.
    pub adc_error_streak: u32,
    /// Completed iterations, including those before a `Loop` wrap.
    pub iterations: u64,
}

/// Cooperative stop request, checked once per tick.
#[derive(Debug, Clone, Default)]
pub struct HaltHandle(Arc<AtomicBool>);

impl HaltHandle {
    pub fn halt(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Runtime logging on/off, checked once per tick. Switching off hands the
/// buffered samples to storage; the indicator follows the switch.
#[derive(Debug, Clone, Default)]
pub struct LoggingSwitch(Arc<AtomicBool>);

impl LoggingSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Current speed readers for both shafts.
#[derive(Debug, Clone)]
pub struct Speeds {
    pub primary: RateReader,
    pub secondary: RateReader,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub profile_id: String,
    pub outcome: SessionOutcome,
    pub final_state: LoopState,
    pub iterations: u64,
    pub faults: Vec<FaultRecord>,
    pub counters: CounterSnapshot,
    pub elapsed: Duration,
}

pub struct ControlLoop<S: Storage> {
    config: DaqConfig,
    profile: Profile,
    peripherals: Peripherals,
    logger: SampleLogger<S>,
    logging: LoggingSwitch,
    display: Arc<SampleSlot>,
    speeds: Speeds,
    converter: Converter,
    pid: PidController,
    faults: FaultState,
    state: ControlState,
    loop_state: LoopState,
    outcome: Option<SessionOutcome>,
    halt: HaltHandle,
    counters: SharedCounters,
    started: Option<Instant>,
}

impl<S: Storage> ControlLoop<S> {
    pub fn new(
        config: &DaqConfig,
        profile: Profile,
        peripherals: Peripherals,
        storage: S,
        speeds: Speeds,
        counters: SharedCounters,
    ) -> Result<Self> {
        config.validate()?;
        let logger = SampleLogger::new(config.logging.buffer_capacity, storage, counters.clone())?;

        Ok(Self {
            config: config.clone(),
            converter: config.adc.converter(),
            pid: PidController::from_config(&config.pid),
            faults: FaultState::new(FaultThresholds::from(&config.faults)),
            profile,
            peripherals,
            logger,
            logging: LoggingSwitch::new(config.logging.enabled),
            display: SampleSlot::new(),
            speeds,
            state: ControlState::default(),
            loop_state: LoopState::Init,
            outcome: None,
            halt: HaltHandle::default(),
            counters,
            started: None,
        })
    }

    pub fn halt_handle(&self) -> HaltHandle {
        self.halt.clone()
    }

    pub fn loop_state(&self) -> LoopState {
        self.loop_state
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn faults(&self) -> &FaultState {
        &self.faults
    }

    pub fn logging_switch(&self) -> LoggingSwitch {
        self.logging.clone()
    }

    /// Reader for the sample of the most recent tick.
    pub fn display(&self) -> SampleReader {
        SampleReader::new(self.display.clone())
    }

    /// Abort before `Running`: outputs to safe state, session stopped.
    fn fatal(&mut self, err: DaqError) -> DaqError {
        error!("[ControlLoop] fatal during {:?}: {err}", self.loop_state);
        self.peripherals.apply_safe_state();
        self.state.run = false;
        self.loop_state = LoopState::Stopped;
        err
    }

    /// Zero session state, clear faults, command safe outputs, configure the
    /// ADC and mount storage.
    pub fn init(&mut self) -> Result<()> {
        if self.loop_state != LoopState::Init {
            return Err(DaqError::Init(format!(
                "init called in state {:?}",
                self.loop_state
            )));
        }
        self.state = ControlState {
            profile_id: self.profile.id.clone(),
            logging_enabled: self.logging.is_enabled(),
            ..ControlState::default()
        };
        self.faults.clear();
        self.pid.reset();
        self.outcome = None;

        if let Err(e) = self.init_peripherals() {
            return Err(self.fatal(e));
        }

        info!(
            "[ControlLoop] initialised profile '{}' ({} steps, {:?}), logging {}",
            self.profile.id,
            self.profile.sequence.len(),
            self.profile.policy,
            if self.state.logging_enabled { "on" } else { "off" }
        );
        Ok(())
    }

    fn init_peripherals(&mut self) -> Result<()> {
        self.peripherals.actuators.init()?;
        self.peripherals.relays.init()?;
        self.peripherals.apply_safe_state();
        self.peripherals.adc.configure(self.config.adc.selection)?;
        self.logger.mount()?;
        Ok(())
    }

    /// Release the engine kill and wait for the engine to confirm running.
    pub fn await_confirm(&mut self) -> Result<()> {
        if self.loop_state != LoopState::Init {
            return Err(DaqError::Init(format!(
                "arming requested in state {:?}",
                self.loop_state
            )));
        }
        self.loop_state = LoopState::ArmedWaitingConfirm;
        self.peripherals.relays.set_engine_kill(false);
        self.state.engine_armed = true;

        let timeout = self.config.session.engine_confirm_timeout();
        let deadline = Instant::now() + timeout;
        info!("[ControlLoop] armed, waiting up to {:?} for engine confirm", timeout);

        loop {
            if self.halt.is_halted() {
                self.finish(SessionOutcome::Halted);
                return Ok(());
            }
            if self.peripherals.engine.engine_running() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(self.fatal(DaqError::EngineConfirmTimeout(timeout)));
            }
            thread::sleep(Duration::from_millis(1));
        }

        self.state.engine_running = true;
        self.state.run = true;
        self.peripherals.relays.set_indicator(true);
        self.loop_state = LoopState::Running;
        self.started = Some(Instant::now());
        info!("[ControlLoop] engine confirmed, running");
        Ok(())
    }

    fn finish(&mut self, outcome: SessionOutcome) -> LoopState {
        self.outcome = Some(outcome);
        self.state.run = false;
        self.loop_state = outcome.state();
        match outcome {
            SessionOutcome::Faulted => {
                error!("[ControlLoop] faulted at index {}", self.state.index);
                self.faults.report();
            }
            _ => info!(
                "[ControlLoop] {:?} after {} iterations",
                outcome, self.state.iterations
            ),
        }
        self.loop_state
    }

    /// One tick of the running session. Returns the state afterwards; any
    /// state other than `Running` ignores the tick.
    pub fn step(&mut self) -> LoopState {
        if self.loop_state != LoopState::Running {
            return self.loop_state;
        }

        if self.halt.is_halted() {
            return self.finish(SessionOutcome::Halted);
        }
        if self.faults.trip() {
            return self.finish(SessionOutcome::Faulted);
        }
        if self.state.index >= self.profile.sequence.len() {
            match self.profile.policy {
                TerminationPolicy::Stop => return self.finish(SessionOutcome::Completed),
                TerminationPolicy::Loop => {
                    debug!("[ControlLoop] sequence wrapped");
                    self.state.index = 0;
                }
            }
        }

        let index = self.state.index;
        let setpoint = self.profile.sequence.fetch(index);
        self.sync_logging();

        let raw = match self.peripherals.adc.read(self.config.adc.selection) {
            Ok(raw) => raw,
            Err(e) => return self.adc_read_failed(index, e),
        };
        self.state.adc_error_streak = 0;

        if !self.state.holdback_released
            && setpoint.throttle >= self.config.session.launch_threshold_pct
        {
            self.peripherals.relays.set_ebrake(false);
            self.state.holdback_released = true;
            info!(
                "[ControlLoop] hold-back released at index {} (throttle {:.1}%)",
                index, setpoint.throttle
            );
        }

        let readings = self.converter.convert(&raw);
        let primary = self.speeds.primary.latest();
        let secondary = self.speeds.secondary.latest();

        self.state.brake_current_amps = readings.brake_current_amps;
        self.state.max_temperature_c = readings.max_temperature_c();

        let measured_pct =
            readings.brake_current_amps / self.config.adc.brake_current_full_scale_amps * 100.0;
        let duty = self.pid.update(setpoint.brake, measured_pct);
        self.state.brake_duty_pct = duty;

        self.peripherals.actuators.set_throttle(setpoint.throttle);
        self.peripherals.actuators.set_brake_duty(duty);

        let sample = Sample {
            primary_rpm: rpm_field(primary),
            secondary_rpm: rpm_field(secondary),
            torque: raw.get(AdcChannel::Torque),
            temp1: raw.get(AdcChannel::Temp1),
            temp2: raw.get(AdcChannel::Temp2),
            temp3: raw.get(AdcChannel::Temp3),
            belt_temp: raw.get(AdcChannel::BeltTemp),
            brake_current: raw.get(AdcChannel::BrakeCurrent),
            load_cell: raw.get(AdcChannel::LoadCell),
            throttle_position: raw.get(AdcChannel::ThrottlePosition),
            brake_setpoint: setpoint.brake as f32,
            throttle_setpoint: setpoint.throttle as f32,
        };
        self.display.publish(sample);

        let inputs = FaultInputs {
            brake_current_amps: readings.brake_current_amps,
            max_temperature_c: readings.max_temperature_c(),
            max_input_volts: readings.max_input_volts,
        };
        if self.faults.evaluate(&inputs, index) {
            // the tripping tick is not logged
            return self.finish(SessionOutcome::Faulted);
        }

        if self.state.logging_enabled {
            self.logger.push(sample);
        }
        self.state.index += 1;
        self.state.iterations += 1;
        self.loop_state
    }

    /// Follow the logging switch. Switching off hands the partial buffer to
    /// storage, retried on later ticks while the other buffer is busy.
    fn sync_logging(&mut self) {
        let wanted = self.logging.is_enabled();
        if wanted != self.state.logging_enabled {
            self.state.logging_enabled = wanted;
            self.state.unflushed = !wanted;
            self.peripherals.relays.set_indicator(wanted);
            info!(
                "[ControlLoop] logging {} at index {}",
                if wanted { "enabled" } else { "disabled" },
                self.state.index
            );
        }
        if self.state.unflushed && self.logger.hand_off() {
            self.state.unflushed = false;
        }
    }

    /// Skip this tick; too many failures in a row latch a fault.
    fn adc_read_failed(&mut self, index: usize, err: DaqError) -> LoopState {
        DaqCounters::incr(&self.counters.adc_errors);
        self.state.adc_error_streak += 1;
        let streak = self.state.adc_error_streak;
        if self.faults.evaluate_adc_errors(streak, index) {
            error!("[ControlLoop] {streak} ADC reads failed in a row, last: {err}");
            return self.finish(SessionOutcome::Faulted);
        }
        warn!("[ControlLoop] ADC read failed at index {index}, tick skipped: {err}");
        self.loop_state
    }

    /// Safe-state the outputs, flush the logger and wait for every drain.
    /// Idempotent; a no-op once `Stopped`.
    pub fn shutdown(&mut self) {
        if self.loop_state == LoopState::Stopped {
            return;
        }
        if self.outcome.is_none() {
            // shutdown requested before the session ended on its own
            self.outcome = Some(SessionOutcome::Halted);
        }
        self.loop_state = LoopState::ShuttingDown;
        self.state.run = false;
        self.peripherals.apply_safe_state();
        self.pid.reset();
        self.logger.flush();
        self.logger.wait_idle();
        self.loop_state = LoopState::Stopped;
        info!("[ControlLoop] stopped");
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            profile_id: self.profile.id.clone(),
            outcome: self.outcome.unwrap_or(SessionOutcome::Halted),
            final_state: self.loop_state,
            iterations: self.state.iterations,
            faults: self.faults.active(),
            counters: self.counters.snapshot(),
            elapsed: self.started.map(|t| t.elapsed()).unwrap_or_default(),
        }
    }

    /// Run a whole session on the current thread, one `step` per tick.
    pub fn run(mut self, ticks: &TickReceiver) -> Result<SessionReport> {
        self.init()?;
        self.await_confirm()?;

        // no tick for this long means the timer is gone
        let stall = self.config.tick.period() * 100;
        while self.loop_state == LoopState::Running {
            match ticks.wait_timeout(stall) {
                Some(_) => {
                    self.step();
                }
                None if self.halt.is_halted() => {
                    self.finish(SessionOutcome::Halted);
                }
                None => warn!("[ControlLoop] no tick within {:?}", stall),
            }
        }

        self.shutdown();
        Ok(self.report())
    }

    /// Run the session on a dedicated max-priority thread, optionally
    /// pinned to `config.session.control_core`.
    pub fn spawn(self, ticks: TickReceiver) -> io::Result<JoinHandle<Result<SessionReport>>> {
        let core = self.config.session.control_core;
        thread::Builder::new()
            .name("control_loop".into())
            .spawn_with_priority(ThreadPriority::Max, move |priority| {
                if let Err(e) = priority {
                    warn!("[ControlLoop] running at default priority: {e:?}");
                }
                if let Some(core) = core {
                    pin_to_core(core);
                }
                self.run(&ticks)
            })
    }
}

fn pin_to_core(core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(id) if core_affinity::set_for_current(*id) => {
            info!("[ControlLoop] pinned to core {core}");
        }
        Some(_) => error!("[ControlLoop] failed to pin to core {core}"),
        None => error!("[ControlLoop] core {core} not available"),
    }
}
