//! Command-line behavior of the `gss-server` binary.

use std::process::Command;

fn gss_server(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_gss-server"))
        .args(args)
        .env_remove("GSSLAYER_PORT")
        .output()
        .expect("failed to run gss-server")
}

#[test]
fn test_unknown_argument_prints_usage() {
    let cases: [&[&str]; 4] = [&["--bogus"], &["extra"], &["--service"], &["--port", "1", "--nope"]];
    for args in cases {
        let output = gss_server(args);
        assert!(output.status.success(), "{args:?}");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(
            stdout.trim(),
            "usage: gss-server --port 44444 --service <TestService>",
            "{args:?}"
        );
    }
}

#[test]
fn test_usage_reports_service_given_before_bad_argument() {
    let output = gss_server(&["--service", "Foo", "--bogus"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "usage: gss-server --port 44444 --service <Foo>"
    );
}

#[test]
fn test_help_and_version_exit_zero() {
    let help = gss_server(&["--help"]);
    assert!(help.status.success());
    assert!(String::from_utf8_lossy(&help.stdout).contains("--keytab"));

    let version = gss_server(&["--version"]);
    assert!(version.status.success());
    assert!(String::from_utf8_lossy(&version.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_keytab_fails_before_listening() {
    let dir = tempfile::tempdir().unwrap();
    let keytab = dir.path().join("absent.keytab");
    let output = gss_server(&[
        "--port",
        "0",
        "--keytab",
        keytab.to_str().unwrap(),
        "--once",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("key material unavailable"));
}
