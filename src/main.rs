use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use oktawave::bootstrap;
use oktawave::cli::{Cli, Command, CreateArgs, OciCommand, TemplateCommand};
use oktawave::client::{ApiClient, CreateRequest};
use oktawave::config::{BootstrapConfig, Config};
use oktawave::create::{self, CreateOutcome, PollConfig, PollEvent};
use oktawave::error::OktawaveError;
use oktawave::render::{self, TemplateTablePrinter};
use oktawave::templates;
use oktawave::value::dive_str;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Wire bodies are logged at trace level, so --debug must enable trace.
    let filter = if cli.debug {
        EnvFilter::new("oktawave=trace")
    } else {
        EnvFilter::from_default_env()
            .add_directive("oktawave=warn".parse().expect("valid log directive"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // A missing file is only fatal when --config named it explicitly.
    let (config_path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from("oktawave.toml"), false),
    };
    let config = Config::load(&config_path, required)?
        .with_overrides(
            std::env::var("OKTAWAVE_LOGIN").ok(),
            std::env::var("OKTAWAVE_PASSWORD").ok(),
        )
        .with_overrides(cli.login, cli.password);
    config.validate()?;

    let mut client = ApiClient::new(&config.api_url, &config.login, &config.password)?;

    match cli.command {
        Command::Oci(OciCommand::List) => {
            let instances = client.oci_list().await?;
            render::print_oci_list(&instances);
        }
        Command::Oci(OciCommand::Show { id }) => {
            let oci = client.get_oci(id).await?;
            render::print_oci_detail(&oci);
        }
        Command::Oci(OciCommand::Create(args)) => {
            run_create(&mut client, args, &config.bootstrap).await?;
        }
        Command::Oci(OciCommand::Delete { ids, yes }) => {
            for id in ids {
                let oci = client.get_oci(id).await?;
                render::print_oci_summary(&oci);
                if !yes && !confirm("Do you really want to delete this OCI instance?")? {
                    println!("Skipping OCI {id}.");
                    continue;
                }
                client.oci_delete(id).await?;
                println!("Deleted OCI instance #{id} ({})", instance_name(&oci));
            }
        }
        Command::Oci(OciCommand::PowerOn { id }) => {
            let oci = client.get_oci(id).await?;
            client.oci_power_on(id).await?;
            println!("Instance #{id} ({}) powered on.", instance_name(&oci));
        }
        Command::Oci(OciCommand::PowerOff { id }) => {
            let oci = client.get_oci(id).await?;
            client.oci_power_off(id).await?;
            println!("Instance #{id} ({}) powered off.", instance_name(&oci));
        }
        Command::Oci(OciCommand::Restart { id }) => {
            let oci = client.get_oci(id).await?;
            client.oci_restart(id).await?;
            println!("Instance #{id} ({}) restarted.", instance_name(&oci));
        }
        Command::Template(TemplateCommand::List) => {
            let mut printer = TemplateTablePrinter::new();
            let mut sink = |event: templates::TemplateEvent<'_>| printer.handle(event);
            templates::walk(&mut client, &mut sink).await?;
        }
    }

    Ok(())
}

/// `oci create`: either a handoff-only run against an existing instance
/// (--bootstrap-oci) or the full create-poll-bootstrap workflow.
async fn run_create(
    client: &mut ApiClient,
    args: CreateArgs,
    base: &BootstrapConfig,
) -> Result<(), OktawaveError> {
    let bootstrap_config = merge_bootstrap(base.clone(), &args);

    if let Some(id) = args.bootstrap_oci {
        return bootstrap::run(client, id, args.node_name.as_deref(), &bootstrap_config, false)
            .await;
    }

    let Some(template_id) = args.template else {
        return Err(OktawaveError::Validation {
            message: "an OCI template is required (--oci-template, see \"oktawave template list\")"
                .into(),
        });
    };
    let Some(name) = args.name.clone().or_else(|| args.node_name.clone()) else {
        return Err(OktawaveError::Validation {
            message: "an instance name is required (--oci-name or --node-name)".into(),
        });
    };

    let class_id = match &args.class {
        Some(class) => Some(client.oci_class_id(class).await?),
        None => None,
    };
    let request = CreateRequest {
        name: name.clone(),
        template_id,
        class_id,
        autoscaler: args.autoscaler,
    };

    println!("Creating OCI \"{name}\" from template {template_id}...");
    let mut report = |event: PollEvent| match event {
        PollEvent::Resolved { oci_id } => println!("OCI created with ID {oci_id}"),
        PollEvent::Progress { label, percent } => println!("{label}: {percent}%"),
    };
    let outcome = create::run(client, &request, &PollConfig::default(), &mut report).await?;

    match outcome {
        CreateOutcome::Resolved { oci_id } => {
            bootstrap::run(client, oci_id, args.node_name.as_deref(), &bootstrap_config, true)
                .await
        }
        CreateOutcome::TimedOut { oci_id } => Err(OktawaveError::CreationTimeout {
            oci_id: Some(oci_id),
        }),
        CreateOutcome::Unresolved => Err(OktawaveError::CreationUnresolved),
    }
}

/// CLI flags win over the config file's `[bootstrap]` section.
fn merge_bootstrap(mut config: BootstrapConfig, args: &CreateArgs) -> BootstrapConfig {
    if args.skip_bootstrap {
        config.skip = true;
    }
    if !args.run_list.is_empty() {
        config.run_list = args.run_list.clone();
    }
    if args.json_attributes.is_some() {
        config.attributes = args.json_attributes.clone();
    }
    if args.bootstrap_version.is_some() {
        config.version = args.bootstrap_version.clone();
    }
    config
}

fn instance_name(oci: &serde_json::Value) -> String {
    dive_str(oci, &["virtual_machine_name"])
        .unwrap_or("?")
        .to_string()
}

fn confirm(prompt: &str) -> Result<bool, OktawaveError> {
    print!("\n{prompt} [y/N] ");
    std::io::stdout().flush().map_err(|e| OktawaveError::Io {
        context: "flushing stdout".into(),
        source: e,
    })?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .map_err(|e| OktawaveError::Io {
            context: "reading confirmation".into(),
            source: e,
        })?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
