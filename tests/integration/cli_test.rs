use std::process::Command;

fn ttcluster() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ttcluster"))
}

#[test]
fn test_run_prints_decision() {
    let output = ttcluster()
        .args([
            "run",
            "--ranks",
            "2",
            "-j",
            "1",
            "--time-ms",
            "100",
            "--max-depth",
            "6",
            "--seed",
            "1",
        ])
        .output()
        .expect("Failed to execute ttcluster");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "Command failed with status: {:?}\nstderr: {}\nstdout: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr),
        stdout
    );
    assert!(stdout.contains("Ranks: 2"));
    assert!(stdout.contains("bestmove "));
    assert!(stdout.contains("Nodes searched:"));
}

#[test]
fn test_invalid_flush_threshold_fails() {
    let output = ttcluster()
        .args([
            "run",
            "--ranks",
            "1",
            "--cache-capacity",
            "8",
            "--flush-threshold",
            "16",
        ])
        .output()
        .expect("Failed to execute ttcluster");

    assert_eq!(output.status.code(), Some(1));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("bestmove"));
}
