//! Configuration file loading.

use std::io::Write;

use enose_control::config::{ConfigError, load_config};
use enose_control::motion::AxisId;
use enose_control::printer::Printer;
use enose_control::scheduler::ManualClock;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
        [enose_control]
        pump_names = ["inlet", "outlet"]
        zero_position_on_stop = false

        [mcu]
        serial = "/dev/ttyACM0"
        print_time_offset = 0.25

        [motion]
        safety_margin = 0.05
        step_gen_window = 0.5

        [web]
        bind = "127.0.0.1:8080"

        [steppers.inlet]
        axis = 2

        [steppers.outlet]
        has_trapq = false
        "#,
    );
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.enose_control.pump_names, vec!["inlet", "outlet"]);
    assert!(!config.enose_control.zero_position_on_stop);
    assert_eq!(config.mcu.print_time_offset, 0.25);
    assert_eq!(config.motion.safety_margin, 0.05);
    assert_eq!(config.web.bind, "127.0.0.1:8080");

    let printer = Printer::new(config, Box::new(ManualClock::new(0.0))).unwrap();
    assert_eq!(printer.registry().axis_of("inlet"), Some(AxisId(2)));
    assert!(printer.stepper("outlet").unwrap().trapq().is_none());
    assert_eq!(printer.watermark().safety_margin(), 0.05);
}

#[test]
fn test_empty_file_is_valid() {
    let file = write_config("");
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.enose_control.pump_names.len(), 4);
    assert_eq!(config.steppers.len(), 4);
}

#[test]
fn test_invalid_values_rejected() {
    let file = write_config("[motion]\nstep_gen_window = 0.0\n");
    assert!(matches!(load_config(file.path()), Err(ConfigError::Invalid(_))));

    let file = write_config("[motion\nsafety_margin = 1");
    assert!(matches!(load_config(file.path()), Err(ConfigError::Toml(_))));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_config(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}
