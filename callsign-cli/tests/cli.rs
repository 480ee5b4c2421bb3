use assert_cmd::Command;
use tempfile::TempDir;

fn callsign(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("callsign").expect("binary builds");
    // keep ambient GITHUB_* configuration out of the test
    cmd.env_clear();
    cmd.env(
        "CALLSIGN_LEDGER_FILE",
        dir.path().join("codes.json").as_os_str(),
    );
    cmd
}

#[test]
fn allocate_initializes_and_prints_the_first_code() {
    let dir = tempfile::tempdir().unwrap();

    callsign(&dir)
        .args([
            "allocate",
            "--prefix",
            "OPS-",
            "--start",
            "700",
            "--requester",
            "u-1",
            "--label",
            "Bakr",
        ])
        .assert()
        .success()
        .stdout("OPS-700\n");

    // the next call continues the sequence
    callsign(&dir)
        .args([
            "allocate",
            "--prefix",
            "OPS-",
            "--start",
            "700",
            "--requester",
            "u-2",
            "--label",
            "Rakan",
        ])
        .assert()
        .success()
        .stdout("OPS-701\n");
}

#[test]
fn status_reports_the_next_code() {
    let dir = tempfile::tempdir().unwrap();

    callsign(&dir)
        .args(["init", "--prefix", "OPS-", "--start", "700"])
        .assert()
        .success()
        .stdout("created\n");

    callsign(&dir)
        .args(["status"])
        .assert()
        .success()
        .stdout("next code: OPS-700\nissued:    0\n");
}

#[test]
fn init_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();

    callsign(&dir)
        .args(["init", "--prefix", "OPS-", "--start", "700"])
        .assert()
        .success();

    callsign(&dir)
        .args(["init", "--prefix", "ZZZ-", "--start", "1"])
        .assert()
        .success()
        .stdout("ledger already exists\n");
}

#[test]
fn history_lists_newest_first() {
    let dir = tempfile::tempdir().unwrap();

    for (requester, label) in [("u-1", "Bakr"), ("u-2", "Rakan")] {
        callsign(&dir)
            .args([
                "allocate",
                "--prefix",
                "OPS-",
                "--start",
                "700",
                "--requester",
                requester,
                "--label",
                label,
            ])
            .assert()
            .success();
    }

    let output = callsign(&dir).args(["history"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("OPS-701\tRakan\tu-2\t"));
    assert!(lines[1].starts_with("OPS-700\tBakr\tu-1\t"));
}

#[test]
fn github_backend_requires_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("callsign").expect("binary builds");
    cmd.env_clear();
    let _ = dir; // no ledger file configured on purpose

    cmd.args(["status"]).assert().failure();
}
