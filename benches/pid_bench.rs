use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use dyno_daq::{
    acquisition::adc::{AdcChannel, RawChannels},
    config::DaqConfig,
    control::{
        fault::{FaultInputs, FaultState, FaultThresholds},
        pid::PidController,
    },
};

fn pid_update_bench(c: &mut Criterion) {
    let config = DaqConfig::default();
    let mut pid = PidController::from_config(&config.pid);
    let mut measured = 0.0;

    c.bench_function("pid_update", |b| {
        b.iter(|| {
            let out = pid.update(black_box(40.0), black_box(measured));
            measured = (measured + out * 0.01).clamp(0.0, 100.0);
            out
        })
    });
}

/// Per-tick arithmetic between ADC read and actuator commands.
fn tick_compute_bench(c: &mut Criterion) {
    let config = DaqConfig::default();
    let converter = config.adc.converter();
    let mut pid = PidController::from_config(&config.pid);
    let mut faults = FaultState::new(FaultThresholds::from(&config.faults));

    let mut raw = RawChannels::default();
    for ch in AdcChannel::ALL {
        raw.set(ch, 1_000);
    }

    c.bench_function("tick_convert_pid_faults", |b| {
        b.iter(|| {
            let phys = converter.convert(black_box(&raw));
            let measured = phys.brake_current_amps / config.adc.brake_current_full_scale_amps * 100.0;
            let duty = pid.update(40.0, measured);
            let inputs = FaultInputs {
                brake_current_amps: phys.brake_current_amps,
                max_temperature_c: phys.max_temperature_c(),
                max_input_volts: phys.max_input_volts,
            };
            black_box(faults.evaluate(&inputs, 0));
            duty
        })
    });
}

criterion_group!(benches, pid_update_bench, tick_compute_bench);
criterion_main!(benches);
