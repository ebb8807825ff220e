//! Bootstrap handoff for freshly created (or explicitly named) instances.
//!
//! The core creation workflow ends with a resolved OCI id; this module
//! waits for the instance to become reachable and hands the connection
//! parameters to an external configuration-management command. The
//! command itself is opaque — parameters travel via environment
//! variables.

use std::time::Duration;

use indicatif::ProgressBar;

use crate::client::{ApiClient, oci_ip};
use crate::config::BootstrapConfig;
use crate::error::OktawaveError;
use crate::render;
use crate::value::dive_str;

/// Seconds to let a freshly created instance settle before probing sshd.
const SETTLE_SECS: u64 = 24;
const SSH_PORT: u16 = 22;
const SSH_TRIES: u32 = 8;
const SSH_TIMEOUT_SECS: u64 = 16;

/// Everything the external bootstrap command receives.
#[derive(Debug, Clone)]
pub struct Handoff {
    pub oci_id: i64,
    pub ip: String,
    pub node_name: String,
    pub ssh_user: String,
    pub ssh_password: Option<String>,
    pub run_list: Vec<String>,
    pub attributes: Option<String>,
    pub version: Option<String>,
}

/// Wait for the instance and run the configured bootstrap command.
///
/// `freshly_created` selects the settle wait — an instance that existed
/// before this invocation is probed immediately.
pub async fn run(
    client: &mut ApiClient,
    oci_id: i64,
    node_name: Option<&str>,
    config: &BootstrapConfig,
    freshly_created: bool,
) -> Result<(), OktawaveError> {
    if config.skip {
        println!("skip_bootstrap set, skipping bootstrap.");
        return Ok(());
    }

    let oci = client.get_oci(oci_id).await?;
    let ip = oci_ip(&oci)?;
    let name = node_name
        .map(str::to_string)
        .or_else(|| dive_str(&oci, &["virtual_machine_name"]).map(str::to_string))
        .unwrap_or_else(|| ip.clone());

    println!("\nBootstrapping Oktawave Cloud Instance {name} ({ip}):");
    println!(
        "(if this fails, retry with \"oktawave oci create --bootstrap-oci {oci_id}\")"
    );
    render::print_oci_summary(&oci);

    if freshly_created {
        wait_with_spinner("Waiting for the OCI to settle...", SETTLE_SECS).await;
    }

    let ssh_password = match &config.ssh_password {
        Some(p) => Some(p.clone()),
        None => client.oci_password(oci_id).await?,
    };

    if !wait_for_ssh(&ip, SSH_PORT, SSH_TRIES, Duration::from_secs(SSH_TIMEOUT_SECS)).await {
        return Err(OktawaveError::Bootstrap {
            message: format!("failed to establish an SSH connection to {ip}:{SSH_PORT}"),
        });
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    let handoff = Handoff {
        oci_id,
        ip,
        node_name: name,
        ssh_user: config.ssh_user.clone(),
        ssh_password,
        run_list: config.run_list.clone(),
        attributes: config.attributes.clone(),
        version: config.version.clone(),
    };
    match &config.command {
        Some(command) => exec_bootstrap_command(command, &handoff).await,
        None => {
            println!("\nNo bootstrap command configured; handoff parameters:");
            for (key, value) in handoff_env(&handoff) {
                if key.ends_with("SSH_PASSWORD") {
                    println!("  {key}={}", if value.is_empty() { "" } else { "********" });
                } else {
                    println!("  {key}={value}");
                }
            }
            Ok(())
        }
    }
}

fn handoff_env(handoff: &Handoff) -> Vec<(String, String)> {
    vec![
        ("OKTAWAVE_BOOTSTRAP_OCI_ID".into(), handoff.oci_id.to_string()),
        ("OKTAWAVE_BOOTSTRAP_IP".into(), handoff.ip.clone()),
        ("OKTAWAVE_BOOTSTRAP_NODE_NAME".into(), handoff.node_name.clone()),
        ("OKTAWAVE_BOOTSTRAP_SSH_USER".into(), handoff.ssh_user.clone()),
        (
            "OKTAWAVE_BOOTSTRAP_SSH_PASSWORD".into(),
            handoff.ssh_password.clone().unwrap_or_default(),
        ),
        ("OKTAWAVE_BOOTSTRAP_RUN_LIST".into(), handoff.run_list.join(",")),
        (
            "OKTAWAVE_BOOTSTRAP_ATTRIBUTES".into(),
            handoff.attributes.clone().unwrap_or_default(),
        ),
        (
            "OKTAWAVE_BOOTSTRAP_VERSION".into(),
            handoff.version.clone().unwrap_or_default(),
        ),
    ]
}

async fn exec_bootstrap_command(command: &str, handoff: &Handoff) -> Result<(), OktawaveError> {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(OktawaveError::Bootstrap {
            message: "bootstrap command is empty".into(),
        });
    };
    println!("\nRunning bootstrap command: {command}");
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(parts);
    for (key, value) in handoff_env(handoff) {
        cmd.env(key, value);
    }
    let status = cmd.status().await.map_err(|e| OktawaveError::Io {
        context: format!("running bootstrap command '{program}'"),
        source: e,
    })?;
    if !status.success() {
        return Err(OktawaveError::Bootstrap {
            message: format!("bootstrap command exited with {status}"),
        });
    }
    Ok(())
}

/// Probe sshd: up to `tries` connection attempts, each bounded by
/// `timeout`, with a timeout-long pause after a refused connection.
async fn wait_for_ssh(host: &str, port: u16, tries: u32, timeout: Duration) -> bool {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Waiting for sshd on {host}:{port}..."));
    spinner.enable_steady_tick(Duration::from_millis(120));

    for attempt in 1..=tries {
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => {
                spinner.finish_with_message(format!("sshd is accepting connections on {host}"));
                return true;
            }
            Ok(Err(e)) => {
                tracing::debug!(attempt, error = %e, "ssh probe refused");
                tokio::time::sleep(timeout).await;
            }
            Err(_) => {
                tracing::debug!(attempt, "ssh probe timed out");
            }
        }
        spinner.tick();
    }
    spinner.finish_and_clear();
    false
}

async fn wait_with_spinner(message: &str, secs: u64) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    tokio::time::sleep(Duration::from_secs(secs)).await;
    spinner.finish_and_clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handoff_env_covers_all_parameters() {
        let handoff = Handoff {
            oci_id: 7,
            ip: "10.0.0.5".into(),
            node_name: "web-1".into(),
            ssh_user: "root".into(),
            ssh_password: Some("pw".into()),
            run_list: vec!["role[base]".into(), "recipe[app]".into()],
            attributes: None,
            version: Some("18.0".into()),
        };
        let env = handoff_env(&handoff);
        let get = |k: &str| {
            env.iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };
        assert_eq!(get("OKTAWAVE_BOOTSTRAP_OCI_ID"), "7");
        assert_eq!(get("OKTAWAVE_BOOTSTRAP_IP"), "10.0.0.5");
        assert_eq!(get("OKTAWAVE_BOOTSTRAP_RUN_LIST"), "role[base],recipe[app]");
        assert_eq!(get("OKTAWAVE_BOOTSTRAP_ATTRIBUTES"), "");
        assert_eq!(get("OKTAWAVE_BOOTSTRAP_VERSION"), "18.0");
    }

    #[tokio::test]
    async fn wait_for_ssh_gives_up_on_unreachable_host() {
        // Reserved TEST-NET-1 address — nothing listens there.
        let reached = wait_for_ssh("192.0.2.1", 22, 1, Duration::from_millis(50)).await;
        assert!(!reached);
    }
}
