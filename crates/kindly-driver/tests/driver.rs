//! Process driver behavior, using `sh` as a stand-in engine.
#![cfg(unix)]

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use kindly_driver::{
    Completion, DriverConfig, DriverError, EngineArgs, ExitClass, ProcessDriver, ProgramInput,
    SessionStatus,
};
use semver::Version;

const START_N: &str = r#"[{"objectType":"analysisStart","top":"N"}"#;

/// A driver whose engine is `sh -c <script>`; engine arguments start at `$1`.
fn engine(script: &str) -> ProcessDriver {
    ProcessDriver::new(DriverConfig {
        binary: "sh".into(),
        base_args: vec!["-c".into(), script.into(), "kind2".into()],
        poll_interval: Duration::from_millis(10),
        ..DriverConfig::default()
    })
}

fn fixture() -> ProgramInput {
    ProgramInput::File(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/compositional.json"),
    )
}

#[test]
fn whitelisted_exit_codes_complete() {
    for (code, class) in [
        (0, ExitClass::SomeUnknown),
        (10, ExitClass::SomeFalsified),
        (20, ExitClass::AllValid),
    ] {
        let mut driver = engine(&format!("cat \"$1\"; exit {code}"));
        let mut completions = Vec::new();
        let session = driver
            .execute(&[], fixture(), |c| completions.push(c.clone()))
            .expect("session completes");

        assert_eq!(session.status, SessionStatus::Completed(class));
        assert_eq!(completions, vec![Completion::Finished { exit_code: code }]);
        assert_eq!(session.model.final_verdicts().len(), 5);
        assert_eq!(session.transcript.records, 23);
        assert!(session.into_final().is_some());
    }
}

#[test]
fn unexpected_exit_code_is_abnormal() {
    let mut driver = engine("echo 'solver crashed' >&2; exit 3");
    let mut completions = Vec::new();
    let err = driver
        .execute(&[], ProgramInput::Stdin(String::new()), |c| {
            completions.push(c.clone())
        })
        .expect_err("exit code 3 is not accepted");

    match &err {
        DriverError::AbnormalTermination { code, output, .. } => {
            assert_eq!(*code, Some(3));
            assert_eq!(output.stderr.trim(), "solver crashed");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(completions.len(), 1);
    assert!(matches!(completions[0], Completion::Failed { .. }));
}

#[test]
fn externally_killed_engine_is_abnormal() {
    let script = format!("printf '%s' '{START_N}'; kill -9 $$");
    let mut driver = engine(&script);
    let mut calls = 0;
    let err = driver
        .execute(&[], ProgramInput::Stdin(String::new()), |_| calls += 1)
        .expect_err("a killed engine is an error");

    let DriverError::AbnormalTermination { code, partial, .. } = &err else {
        panic!("unexpected error {err:?}");
    };
    assert_eq!(*code, None);
    assert!(partial.component_id("N").is_some());
    assert_eq!(calls, 1);
}

#[test]
fn cancellation_sends_termination_marker() {
    let script = format!(
        "printf '%s' '{START_N}'; while read line; do [ \"$line\" = stop ] && exit 0; done; exit 1"
    );
    let mut driver = engine(&script);
    let mut config = driver.config().clone();
    config.termination_marker = Some("stop\n".into());
    config.grace_period = Duration::from_secs(10);
    driver = ProcessDriver::new(config);

    let handle = driver.cancellation_handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        handle.cancel();
    });

    let started = Instant::now();
    let mut completions = Vec::new();
    let session = driver
        .execute(&[], ProgramInput::File("program.lus".into()), |c| {
            completions.push(c.clone())
        })
        .expect("cancellation is not an error");
    canceller.join().expect("canceller thread");

    assert_eq!(session.status, SessionStatus::Cancelled);
    assert!(!session.is_final());
    assert!(started.elapsed() < Duration::from_secs(10), "engine was not stopped gracefully");
    assert_eq!(completions, vec![Completion::Cancelled]);
    // Records decoded before cancellation remain inspectable.
    assert!(session.model.component_id("N").is_some());
    assert!(session.into_final().is_none());
}

#[test]
fn unresponsive_engine_is_killed_after_grace_period() {
    let mut driver = engine("exec sleep 30");
    let mut config = driver.config().clone();
    config.grace_period = Duration::from_millis(200);
    driver = ProcessDriver::new(config);

    let handle = driver.cancellation_handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        handle.cancel();
    });

    let started = Instant::now();
    let session = driver
        .execute(&[], ProgramInput::Stdin(String::new()), |c| {
            assert_eq!(*c, Completion::Cancelled)
        })
        .expect("cancellation is not an error");
    canceller.join().expect("canceller thread");

    assert_eq!(session.status, SessionStatus::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(20));
    // The flag is cleared for the next session.
    assert!(!driver.cancellation_handle().is_cancelled());
}

/// Cancel `driver`'s session from another thread after `delay`.
fn cancel_after(driver: &ProcessDriver, delay: Duration) -> thread::JoinHandle<()> {
    let handle = driver.cancellation_handle();
    thread::spawn(move || {
        thread::sleep(delay);
        handle.cancel();
    })
}

fn with_grace(script: &str, grace: Duration) -> ProcessDriver {
    let mut config = engine(script).config().clone();
    config.grace_period = grace;
    ProcessDriver::new(config)
}

#[test]
fn cancellation_does_not_wait_for_engine_descendants() {
    // Without `exec`, `sleep` outlives the killed shell and keeps stdout open.
    let mut driver = with_grace("sleep 6; true", Duration::from_millis(200));
    let canceller = cancel_after(&driver, Duration::from_millis(100));

    let started = Instant::now();
    let session = driver
        .execute(&[], ProgramInput::File("program.lus".into()), |c| {
            assert_eq!(*c, Completion::Cancelled)
        })
        .expect("cancellation is not an error");
    canceller.join().expect("canceller thread");

    assert_eq!(session.status, SessionStatus::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn cancellation_is_not_blocked_by_a_large_stdin_program() {
    let mut driver = with_grace("exec sleep 30", Duration::from_millis(200));
    let canceller = cancel_after(&driver, Duration::from_millis(100));

    let program = "node N () returns (); tel\n".repeat(64 * 1024);
    let started = Instant::now();
    let session = driver
        .execute(&[], ProgramInput::Stdin(program), |_| {})
        .expect("cancellation is not an error");
    canceller.join().expect("canceller thread");

    assert_eq!(session.status, SessionStatus::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn decode_failure_stops_a_running_engine() {
    let script = format!("printf '%s' '{START_N},{{\"objectType\":\"bogus\"}}'; sleep 6; exit 20");
    let mut driver = with_grace(&script, Duration::from_millis(200));
    let mut calls = 0;

    let started = Instant::now();
    let err = driver
        .execute(&[], ProgramInput::Stdin(String::new()), |_| calls += 1)
        .expect_err("unknown record kind");

    assert!(started.elapsed() < Duration::from_secs(4), "engine ran to completion");
    let DriverError::Parse { partial, .. } = &err else {
        panic!("unexpected error {err:?}");
    };
    assert!(partial.component_id("N").is_some());
    assert_eq!(calls, 1);
}

#[test]
fn decode_failure_keeps_partial_model() {
    let script = format!("printf '%s' '{START_N},{{\"objectType\":\"bogus\"}}]'; exit 20");
    let mut driver = engine(&script);
    let mut calls = 0;
    let err = driver
        .execute(&[], ProgramInput::Stdin(String::new()), |_| calls += 1)
        .expect_err("unknown record kind");

    let DriverError::Parse { partial, output, .. } = &err else {
        panic!("unexpected error {err:?}");
    };
    assert!(partial.component_id("N").is_some());
    assert!(output.stdout.contains("bogus"));
    assert_eq!(calls, 1);
}

#[test]
fn program_text_is_written_to_a_file_argument() {
    let mut driver = engine("grep -q 'node Top' \"$1\" && exit 20; exit 3");
    let session = driver
        .execute(
            &[],
            ProgramInput::Text("node Top (x: int) returns (y: int); let y = x; tel".into()),
            |_| {},
        )
        .expect("engine found the program");
    assert_eq!(session.status, SessionStatus::Completed(ExitClass::AllValid));
}

#[test]
fn program_text_can_use_the_input_channel() {
    let mut driver = engine(
        "read name; printf '[{\"objectType\":\"analysisStart\",\"top\":\"%s\"}]' \"$name\"; exit 0",
    );
    let session = driver
        .execute(&[], ProgramInput::Stdin("Main\n".into()), |_| {})
        .expect("session completes");
    assert!(session.model.component_id("Main").is_some());
}

#[test]
fn engine_arguments_are_passed_verbatim() {
    let mut driver = engine("[ \"$1\" = -json ] && [ \"$2\" = --timeout ] && [ \"$3\" = 5 ] && exit 20; exit 3");
    let args = EngineArgs::new().timeout(Duration::from_secs(5)).to_args();
    let session = driver
        .execute(&args, ProgramInput::Stdin(String::new()), |_| {})
        .expect("arguments accepted");
    assert_eq!(session.status, SessionStatus::Completed(ExitClass::AllValid));
}

fn probe(script: &str, minimum: Option<Version>) -> ProcessDriver {
    ProcessDriver::new(DriverConfig {
        binary: "sh".into(),
        base_args: vec!["-c".into(), script.into()],
        version_args: Vec::new(),
        minimum_version: minimum,
        ..DriverConfig::default()
    })
}

#[test]
fn availability_probe_reports_version() {
    let info = probe("echo 'Kind 2 v2.2.0'", Some(Version::new(2, 0, 0)))
        .check_availability()
        .expect("engine available");
    assert_eq!(info.banner, "Kind 2 v2.2.0");
    assert_eq!(info.version, Some(Version::new(2, 2, 0)));
}

#[test]
fn availability_probe_failures_are_configuration_errors() {
    let failing = probe("echo 'no license' >&2; exit 1", None).check_availability();
    assert!(matches!(failing, Err(DriverError::Configuration { .. })));

    let too_old = probe("echo 'Kind 2 v1.1.0'", Some(Version::new(2, 0, 0))).check_availability();
    match too_old {
        Err(DriverError::Configuration { message }) => assert!(message.contains("1.1.0")),
        other => panic!("unexpected probe result {other:?}"),
    }

    let missing = ProcessDriver::new(DriverConfig::with_binary("/nonexistent/kind2"));
    assert!(matches!(
        missing.check_availability(),
        Err(DriverError::Configuration { .. })
    ));
}
