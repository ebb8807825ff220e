use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::io::Write;

fn oktawave() -> assert_cmd::Command {
    cargo_bin_cmd!("oktawave").into()
}

#[test]
fn help_works() {
    oktawave()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Manage Oktawave Cloud Instances"));
}

#[test]
fn missing_explicit_config_shows_error() {
    oktawave()
        .args(["--config", "/nonexistent/oktawave.toml", "oci", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn missing_credentials_fail_validation() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("oktawave.toml");
    std::fs::File::create(&config_path).unwrap();

    // Empty config, no env, no flags: credential validation must trip
    // before any network access.
    oktawave()
        .args(["--config", config_path.to_str().unwrap(), "oci", "list"])
        .env_remove("OKTAWAVE_LOGIN")
        .env_remove("OKTAWAVE_PASSWORD")
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing credentials"));
}

#[test]
fn flags_satisfy_credential_validation() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("oktawave.toml");
    let mut f = std::fs::File::create(&config_path).unwrap();
    write!(f, "api_url = \"http://127.0.0.1:9\"\n").unwrap();

    // Credentials present, so validation passes and the command reaches
    // the (unreachable) API instead. Port 9 is the discard service.
    oktawave()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "--login",
            "user",
            "--password",
            "pw",
            "oci",
            "list",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing credentials").not());
}

#[test]
fn debug_flag_logs_soap_bodies() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("oktawave.toml");
    let mut f = std::fs::File::create(&config_path).unwrap();
    write!(
        f,
        "login = \"user\"\npassword = \"pw\"\napi_url = \"http://127.0.0.1:9\"\n"
    )
    .unwrap();

    // The request body is logged before the (failing) HTTP send, so the
    // envelope must show up on stderr even against a dead endpoint.
    oktawave()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "--debug",
            "oci",
            "list",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SOAP request body"))
        .stderr(predicate::str::contains("LogonUser"));
}

#[test]
fn create_without_template_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("oktawave.toml");
    let mut f = std::fs::File::create(&config_path).unwrap();
    write!(f, "login = \"user\"\npassword = \"pw\"\n").unwrap();

    oktawave()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "oci",
            "create",
            "--node-name",
            "web-1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("template is required"));
}
