//! DynamoDB infrastructure management commands.

mod client;
mod config;
mod deploy;
mod error;
mod planning;

pub use error::{DynamodbError, Result};

use crate::prelude::*;
use dialoguer::Confirm;

/// DynamoDB infrastructure management commands.
#[derive(Debug, clap::Parser)]
pub struct DynamodbCommand {
    #[command(subcommand)]
    pub action: DynamodbAction,
}

/// Available DynamoDB actions.
#[derive(Debug, clap::Subcommand)]
pub enum DynamodbAction {
    /// Deploy or destroy DynamoDB table infrastructure.
    Deploy(DeployCommand),
}

/// Deploy or update DynamoDB infrastructure.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Deploy or destroy DynamoDB table infrastructure.

By default, this command creates or updates the probstore DynamoDB table
with its key schema, the GSI1 and GSI2 indexes, and TTL on the `ttl`
attribute used to expire usage logs.

The command shows a plan of changes before applying and asks for confirmation.

Environment variables:
  AWS_ENDPOINT_URL    - Use local DynamoDB (e.g., http://localhost:8000)
  AWS_REGION          - AWS region (defaults to us-east-1)
  AWS_PROFILE         - AWS profile to use for credentials")]
pub struct DeployCommand {
    /// Skip confirmation prompts.
    #[arg(long)]
    pub force: bool,

    /// Destroy the table instead of creating/updating.
    #[arg(long)]
    pub destroy: bool,

    /// Table name to use.
    #[arg(long, default_value = "probstore", env = "DYNAMODB_TABLE_NAME")]
    pub table_name: String,
}

/// Main entry point for dynamodb command.
pub async fn run(command: DynamodbCommand, global: crate::Global) -> Result<()> {
    match command.action {
        DynamodbAction::Deploy(deploy_cmd) => run_deploy(deploy_cmd, &global).await,
    }
}

/// Asks before a destructive or mutating step unless `--force` was given.
fn confirm(force: bool, prompt: &str, default: bool) -> Result<()> {
    if force {
        return Ok(());
    }
    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .map_err(DynamodbError::sdk)?;

    confirmed.then_some(()).ok_or(DynamodbError::UserCancelled)
}

/// Prints unless `--silent` was given.
struct Out {
    silent: bool,
}

impl Out {
    fn line(&self, text: impl std::fmt::Display) {
        if !self.silent {
            aprintln!("{}", text);
        }
    }

    fn section(&self, title: &str, lines: &[String], paint: fn(&str) -> String) {
        self.line(title);
        for line in lines {
            self.line(format!("  {}", paint(line)));
        }
        self.line("");
    }
}

async fn run_deploy(cmd: DeployCommand, global: &crate::Global) -> Result<()> {
    let out = Out {
        silent: global.is_silent(),
    };
    let aws_config = client::AwsConfig::default();
    out.line(format!("{} {}\n", p_b("Target:"), aws_config.target_display()));

    let dynamo_client = client::create_client(&aws_config).await;
    let current_state = client::get_table_state(&dynamo_client, &cmd.table_name).await?;

    if cmd.destroy {
        let plan = planning::calculate_destroy_plan(current_state.as_ref(), &cmd.table_name);
        out.section(
            &p_y("Destroy Plan:"),
            &planning::format_destroy_plan(&plan),
            p_r,
        );

        if let planning::DestroyPlan::AlreadyGone { .. } = plan {
            out.line(p_g("Nothing to destroy."));
            return Ok(());
        }

        confirm(
            cmd.force,
            "Are you sure you want to delete this table? ALL DATA WILL BE LOST",
            false,
        )?;
        out.line(p_b("Deleting table..."));
        deploy::execute_destroy_plan(&dynamo_client, &plan).await?;
        out.line(p_g("Table destroyed successfully."));
        return Ok(());
    }

    let table_config = config::probstore_table_config().with_table_name(&cmd.table_name);
    let plan = planning::calculate_deploy_plan(current_state.as_ref(), &table_config);
    out.section(
        &p_c("Deploy Plan:"),
        &planning::format_deploy_plan(&plan),
        p_plan,
    );

    if let planning::DeployPlan::NoChanges { .. } = plan {
        out.line(p_g("Infrastructure is up to date."));
        return Ok(());
    }

    confirm(cmd.force, "Apply these changes?", true)?;
    out.line(p_b("Applying changes..."));
    deploy::execute_deploy_plan(&dynamo_client, &plan).await?;
    out.line(p_g("Infrastructure deployed successfully."));

    Ok(())
}
