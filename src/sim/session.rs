//! session.rs
//! Wires one complete simulated session: periodic tick source, two shaft
//! generators, the simulated rig and the control loop on its own thread.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use log::{error, info};

use crate::{
    acquisition::{edge_capture::edge_capture, tick::tick_channel},
    config::DaqConfig,
    control::{
        actuators::Peripherals,
        control_loop::{ControlLoop, SessionReport, Speeds},
        setpoint::Profile,
    },
    error::{DaqError, Result},
    logging::{record::Sample, storage::Storage},
    sim::{
        adc::SimAdc,
        rig::{RigProbe, RigSnapshot, SimActuators, SimEngine, SimRelays, sim_rig},
        shaft::{ShaftSim, spawn_shaft},
    },
    utils::metrics::{DaqCounters, TickTiming},
};

/// Everything outside the control loop for one run. Fields can be swapped
/// before `run`, e.g. an ADC with an injected fault.
pub struct SimSession {
    pub adc: SimAdc,
    pub engine: SimEngine,
    pub primary: ShaftSim,
    pub secondary: ShaftSim,
    actuators: SimActuators,
    relays: SimRelays,
    probe: RigProbe,
}

pub struct SimOutcome {
    pub report: SessionReport,
    pub timing: TickTiming,
    pub rig: RigSnapshot,
    /// What the display slot held when the session stopped.
    pub last_sample: Sample,
}

impl SimSession {
    /// Engine confirms on the third poll; brake current follows the duty
    /// with a couple of millivolts of noise on every channel.
    pub fn new(config: &DaqConfig) -> Self {
        let (actuators, relays, probe) = sim_rig();
        let adc = SimAdc::nominal(&config.adc)
            .with_noise(0.002, 7)
            .with_brake_plant(probe.clone(), config.adc.brake_current_full_scale_amps);
        Self {
            adc,
            engine: SimEngine::confirms_after(2),
            primary: ShaftSim {
                jitter_frac: 0.01,
                bounce_prob: 0.01,
                seed: 1,
                ..ShaftSim::steady(3_000.0)
            },
            secondary: ShaftSim {
                jitter_frac: 0.01,
                bounce_prob: 0.01,
                seed: 2,
                ..ShaftSim::steady(1_200.0)
            },
            actuators,
            relays,
            probe,
        }
    }

    /// A probe onto this session's rig outputs.
    pub fn probe(&self) -> RigProbe {
        self.probe.clone()
    }

    /// Run to the end of the session. With `max_duration` set, a halt is
    /// requested once it elapses.
    pub fn run<S: Storage>(
        self,
        config: &DaqConfig,
        profile: Profile,
        storage: S,
        max_duration: Option<Duration>,
    ) -> Result<SimOutcome> {
        let counters = DaqCounters::shared();
        let running = Arc::new(AtomicBool::new(true));

        let (primary_capture, primary) =
            edge_capture("primary", config.edges.primary_max_rpm, counters.clone());
        let (secondary_capture, secondary) =
            edge_capture("secondary", config.edges.secondary_max_rpm, counters.clone());

        let control = ControlLoop::new(
            config,
            profile,
            Peripherals {
                adc: Box::new(self.adc),
                actuators: Box::new(self.actuators),
                relays: Box::new(self.relays),
                engine: Box::new(self.engine),
            },
            storage,
            Speeds { primary, secondary },
            counters.clone(),
        )?;
        let halt = control.halt_handle();
        let display = control.display();

        let stop = |running: &AtomicBool| running.store(false, Ordering::Release);
        let shafts = [
            spawn_shaft(primary_capture, self.primary, running.clone()),
            spawn_shaft(secondary_capture, self.secondary, running.clone()),
        ];

        let (source, ticks) = tick_channel(counters);
        let timer = source.spawn_periodic(&config.tick, running.clone());
        let control = match &timer {
            Ok(_) => control.spawn(ticks).map_err(DaqError::from),
            Err(e) => Err(DaqError::Init(format!("tick source: {e}"))),
        };

        let result = match control {
            Ok(handle) => {
                let started = Instant::now();
                while !handle.is_finished() {
                    if max_duration.is_some_and(|d| started.elapsed() >= d) && !halt.is_halted() {
                        info!("[Session] duration elapsed, halting");
                        halt.halt();
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                handle
                    .join()
                    .unwrap_or_else(|_| Err(DaqError::Init("control thread panicked".into())))
            }
            Err(e) => Err(e),
        };

        stop(&running);
        let timing = match timer {
            Ok(handle) => handle.join().unwrap_or_default(),
            Err(_) => TickTiming::default(),
        };
        for shaft in shafts {
            match shaft {
                Ok(handle) => {
                    let _ = handle.join();
                }
                Err(e) => error!("[Session] shaft generator failed to start: {e}"),
            }
        }

        Ok(SimOutcome {
            report: result?,
            timing,
            rig: self.probe.snapshot(),
            last_sample: display.latest(),
        })
    }
}
