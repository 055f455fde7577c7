// Benchmark for batch pump cancellation and command parsing
// Run with: cargo bench

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use enose_control::config::{Config, StepperConfig};
use enose_control::gcode::GCodeCommand;
use enose_control::motion::AxisId;
use enose_control::printer::Printer;
use enose_control::scheduler::ManualClock;
use enose_control::stop::StopTargets;

const PUMPS: usize = 32;
const MOVES_PER_PUMP: usize = 64;

fn busy_printer() -> Printer {
    let mut config = Config::default();
    config.enose_control.pump_names = (0..PUMPS).map(|i| format!("pump_{i}")).collect();
    config.steppers = config
        .enose_control
        .pump_names
        .iter()
        .map(|name| (name.clone(), StepperConfig::default()))
        .collect();
    let clock = ManualClock::new(0.0);
    let mut printer = Printer::new(config, Box::new(clock.clone())).unwrap();
    for i in 0..PUMPS {
        let name = format!("pump_{i}");
        printer.enable_stepper(&name, true).unwrap();
        printer.register_axis(&name, AxisId(i as u8)).unwrap();
        for _ in 0..MOVES_PER_PUMP {
            printer.queue_move(&name, 1.0, 50.0).unwrap();
        }
    }
    printer.flush_lookahead().unwrap();
    clock.advance(0.2);
    printer.generate_steps().unwrap();
    printer
}

fn bench_cancel_all(c: &mut Criterion) {
    c.bench_function("cancel 32 pumps x 64 segments", |b| {
        b.iter_batched(
            busy_printer,
            |mut printer| {
                let report = printer.cancel(StopTargets::Configured).unwrap();
                assert_eq!(report.stopped.len(), PUMPS);
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_command_parse(c: &mut Criterion) {
    let line = "CANCEL_PUMPS PUMPS=pump_2,pump_3,pump_4,pump_5 ; stop the array";
    c.bench_function("parse CANCEL_PUMPS", |b| {
        b.iter(|| GCodeCommand::parse(line).unwrap());
    });
}

criterion_group!(benches, bench_cancel_all, bench_command_parse);
criterion_main!(benches);
