use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::client::Autoscaler;

#[derive(Parser, Debug)]
#[command(name = "oktawave", about = "Manage Oktawave Cloud Instances (OCI)")]
pub struct Cli {
    /// Path to config file (default: oktawave.toml in the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Oktawave account login (overrides config and OKTAWAVE_LOGIN)
    #[arg(long, global = true)]
    pub login: Option<String>,

    /// Oktawave account password (overrides config and OKTAWAVE_PASSWORD)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Log SOAP request and response bodies
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Instance operations
    #[command(subcommand)]
    Oci(OciCommand),

    /// Template operations
    #[command(subcommand)]
    Template(TemplateCommand),
}

#[derive(Subcommand, Debug)]
pub enum OciCommand {
    /// List instances on the account
    List,

    /// Show one instance in detail
    Show {
        /// Instance id
        id: i64,
    },

    /// Create an instance, then bootstrap it over SSH
    Create(CreateArgs),

    /// Delete instances (asks for confirmation unless --yes)
    Delete {
        /// Instance ids
        #[arg(required = true)]
        ids: Vec<i64>,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Power an instance on
    PowerOn {
        /// Instance id
        id: i64,
    },

    /// Power an instance off
    PowerOff {
        /// Instance id
        id: i64,
    },

    /// Restart an instance
    Restart {
        /// Instance id
        id: i64,
    },
}

#[derive(clap::Args, Debug)]
pub struct CreateArgs {
    /// Node name used for the bootstrap handoff (defaults to the OCI name)
    #[arg(long)]
    pub node_name: Option<String>,

    /// Template id to create from (see `oktawave template list`)
    #[arg(short = 'T', long = "oci-template", alias = "template")]
    pub template: Option<i64>,

    /// Name of the new instance
    #[arg(long = "oci-name")]
    pub name: Option<String>,

    /// Instance class, e.g. "Large" (defaults to the template's minimum)
    #[arg(short = 'C', long = "oci-class")]
    pub class: Option<String>,

    /// Autoscaler mode for the new instance
    #[arg(short = 'a', long = "oci-autoscaler", value_enum, default_value = "on")]
    pub autoscaler: Autoscaler,

    /// Only create the OCI, do not bootstrap it
    #[arg(long)]
    pub skip_bootstrap: bool,

    /// Bootstrap an existing instance instead of creating one
    #[arg(short = 'B', long = "bootstrap-oci")]
    pub bootstrap_oci: Option<i64>,

    /// Comma-separated run list for the first configuration run
    #[arg(short = 'r', long = "run-list", value_delimiter = ',')]
    pub run_list: Vec<String>,

    /// JSON attribute blob for the first configuration run
    #[arg(short = 'j', long = "json-attributes")]
    pub json_attributes: Option<String>,

    /// Configuration-management version to install
    #[arg(long = "bootstrap-version")]
    pub bootstrap_version: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum TemplateCommand {
    /// List all templates, grouped by category
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_flags_parse() {
        let cli = Cli::try_parse_from([
            "oktawave",
            "oci",
            "create",
            "--node-name",
            "web-1",
            "-T",
            "452",
            "--oci-class",
            "Large",
            "-a",
            "off",
            "-r",
            "role[base],recipe[app]",
        ])
        .unwrap();
        let Command::Oci(OciCommand::Create(args)) = cli.command else {
            panic!("expected oci create");
        };
        assert_eq!(args.node_name.as_deref(), Some("web-1"));
        assert_eq!(args.template, Some(452));
        assert_eq!(args.class.as_deref(), Some("Large"));
        assert_eq!(args.autoscaler, Autoscaler::Off);
        assert_eq!(args.run_list, vec!["role[base]", "recipe[app]"]);
        assert!(!args.skip_bootstrap);
    }

    #[test]
    fn delete_requires_at_least_one_id() {
        assert!(Cli::try_parse_from(["oktawave", "oci", "delete"]).is_err());
        let cli = Cli::try_parse_from(["oktawave", "oci", "delete", "1", "2", "--yes"]).unwrap();
        let Command::Oci(OciCommand::Delete { ids, yes }) = cli.command else {
            panic!("expected oci delete");
        };
        assert_eq!(ids, vec![1, 2]);
        assert!(yes);
    }

    #[test]
    fn global_flags_accepted_after_subcommand() {
        let cli =
            Cli::try_parse_from(["oktawave", "oci", "list", "--login", "u", "--debug"]).unwrap();
        assert_eq!(cli.login.as_deref(), Some("u"));
        assert!(cli.debug);
    }
}
