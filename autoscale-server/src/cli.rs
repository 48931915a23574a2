use clap::{Parser, Subcommand};
use std::net::SocketAddr;

/// Autoscale add-on - event-driven autoscaling for applications on Kubernetes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Base URL of the add-on API
    #[arg(long, global = true, env = "AUTOSCALE_TARGET", default_value = "http://localhost:8081")]
    pub target: String,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value = "60")]
    pub timeout: u64,

    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Run the HTTP API server
    Api {
        /// Address to listen on (overrides AUTOSCALE_BIND_ADDRESS)
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Provision a new autoscaling instance
    Create {
        /// Instance name
        name: String,

        /// Workload to scale (default: the instance name)
        #[arg(long)]
        app: Option<String>,

        /// Minimum replica count
        #[arg(long)]
        min: Option<i32>,

        /// Maximum replica count
        #[arg(long)]
        max: Option<i32>,
    },

    /// Remove an instance and its ScaledObject
    Delete {
        /// Instance name
        name: String,
    },

    /// Show the status of an instance
    Status {
        /// Instance name
        name: String,
    },

    /// Manage the triggers of an instance
    Triggers {
        #[command(subcommand)]
        command: TriggerCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum TriggerCommand {
    /// List the triggers of an instance
    List {
        /// Instance name
        #[arg(short, long)]
        instance: String,

        /// Print the triggers as JSON
        #[arg(short, long)]
        raw_output: bool,
    },

    /// Add a trigger, or replace the one with the same name
    Add {
        /// Instance name
        #[arg(short, long)]
        instance: String,

        /// Trigger name
        #[arg(short, long)]
        name: String,

        /// Scaler type (e.g. cron, prometheus)
        #[arg(short = 't', long = "type")]
        kind: String,

        /// Scaler metadata as a JSON object
        #[arg(short, long, alias = "metadata")]
        config: String,
    },

    /// Delete a trigger
    Delete {
        /// Instance name
        #[arg(short, long)]
        instance: String,

        /// Trigger name
        #[arg(short, long)]
        name: String,
    },

    /// Show a single trigger
    Get {
        /// Instance name
        #[arg(short, long)]
        instance: String,

        /// Trigger name
        #[arg(short, long)]
        name: String,
    },
}
