use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use dyno_daq::{
    Result,
    logging::{double_buffer::SampleLogger, record::Sample, storage::Storage},
    utils::metrics::DaqCounters,
};

/// Accepts and discards every batch.
struct Discard;

impl Storage for Discard {
    fn mount(&mut self) -> Result<()> {
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        black_box(bytes);
        Ok(())
    }
}

fn sample() -> Sample {
    Sample {
        primary_rpm: 3_000,
        secondary_rpm: 1_200,
        torque: 1_228,
        temp1: 491,
        temp2: 491,
        temp3: 491,
        belt_temp: 491,
        brake_current: 819,
        load_cell: 819,
        throttle_position: 1_638,
        brake_setpoint: 40.0,
        throttle_setpoint: 80.0,
    }
}

fn record_format_bench(c: &mut Criterion) {
    let s = sample();
    let mut line = String::with_capacity(128);
    c.bench_function("record_write", |b| {
        b.iter(|| {
            line.clear();
            black_box(&s).write_record(&mut line);
        })
    });
}

/// Push cost on the control path, including the swaps and drain spawns it
/// triggers every `capacity` samples.
fn logger_push_bench(c: &mut Criterion) {
    let counters = DaqCounters::shared();
    let mut logger = match SampleLogger::new(1_000, Discard, counters) {
        Ok(logger) => logger,
        Err(e) => panic!("logger: {e}"),
    };
    let s = sample();

    c.bench_function("logger_push", |b| {
        b.iter(|| logger.push(black_box(s)))
    });
    logger.flush();
    logger.wait_idle();
}

criterion_group!(benches, record_format_bench, logger_push_bench);
criterion_main!(benches);
