use std::io::{BufRead, BufReader, Cursor, Read};
use std::process::{Command, Stdio};

use qkd_telemetry::parse_stream;

fn bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_qkd-telemetry"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_bounded_run_prints_records() {
    let output = bin()
        .args(["--seed", "5", "--sessions", "3"])
        .output()
        .expect("run qkd-telemetry");
    assert!(output.status.success());

    let records = parse_stream(Cursor::new(output.stdout)).unwrap();
    assert_eq!(records.len(), 3);
    for (n, record) in records.iter().enumerate() {
        assert_eq!(record.session.number, n as u64);
        assert!(record.is_well_formed());
    }
}

#[test]
fn test_seeded_runs_repeat() {
    let run = || {
        bin()
            .args(["--seed", "42", "--sessions", "4"])
            .output()
            .unwrap()
            .stdout
    };
    assert_eq!(run(), run());
}

#[test]
fn test_output_file_and_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("build").join("output.txt");
    let cfg = dir.path().join("emitter.toml");
    std::fs::write(
        &cfg,
        format!(
            "[emitter]\nseed = 8\nsessions = 2\noutput = {:?}\n",
            out.display().to_string()
        ),
    )
    .unwrap();

    let status = bin().arg("--config").arg(&cfg).status().unwrap();
    assert!(status.success());

    let text = std::fs::read_to_string(&out).unwrap();
    let records = parse_stream(Cursor::new(text)).unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn test_invalid_config_fails() {
    let output = bin().args(["--sessions", "0"]).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("sessions must be greater than zero"));
}

#[test]
fn test_lines_visible_while_emitter_sleeps() {
    let mut child = bin()
        .args(["--seed", "1", "--sessions", "2", "--pause-ms", "1500"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let mut reader = BufReader::new(child.stdout.take().unwrap());

    // Read the whole first record; it must arrive before the pause ends.
    let mut first = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        if line == "\n" {
            break;
        }
        first.push(line);
    }
    assert_eq!(first[0], "SESSION_NUMBER:0\n");
    assert!(first.last().unwrap().starts_with("KEY_BITS:"));
    assert!(child.try_wait().unwrap().is_none(), "emitter should still be pausing");

    let mut rest = String::new();
    reader.read_to_string(&mut rest).unwrap();
    assert!(rest.starts_with("SESSION_NUMBER:1\n"));
    assert!(child.wait().unwrap().success());
}

#[test]
fn test_closed_consumer_stops_quietly() {
    let mut child = bin()
        .args(["--seed", "2"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    {
        let mut reader = BufReader::new(child.stdout.take().unwrap());
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "SESSION_NUMBER:0\n");
    }
    assert!(child.wait().unwrap().success());
}
