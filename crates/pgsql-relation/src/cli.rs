use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};
use tracing::info;

use crate::config::ProviderConfig;
use crate::credentials::GeneratedCredentials;
use crate::dispatch::Dispatcher;
use crate::evaluate::{HookKind, RelationEvent};
use crate::file_store::JsonFileStore;
use crate::flags::RequestFlag;
use crate::provider::PgsqlProvides;
use crate::store::ConversationStore;

#[derive(Parser, Debug)]
#[command(name = "pgsql-relation")]
#[command(about = "Provides side of the pgsql relation negotiation")]
pub struct PgsqlRelationCli {
    /// State file; overrides PGSQL_STATE_PATH
    #[arg(long, global = true)]
    pub state_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run one relation hook against the persisted state
    Hook(HookArgs),
    /// Print the negotiation state of every service as JSON
    Status,
}

#[derive(clap::Args, Debug)]
pub struct HookArgs {
    /// Hook kind: joined, changed, departed or broken
    pub kind: HookKind,

    /// Remote unit that triggered the hook, e.g. wordpress/0
    #[arg(long)]
    pub unit: String,

    /// Peer setting carried by the hook as key=value; an empty value unsets it
    #[arg(long = "set", value_parser = parse_setting)]
    pub settings: Vec<(String, String)>,
}

fn parse_setting(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

pub fn run() -> Result<()> {
    let cli = PgsqlRelationCli::parse();
    let config = ProviderConfig::from_env().context("load provider config")?;
    let mut stdout = std::io::stdout().lock();
    execute(cli, config, &mut stdout)
}

pub fn execute(cli: PgsqlRelationCli, mut config: ProviderConfig, out: &mut impl Write) -> Result<()> {
    if let Some(state_path) = cli.state_path {
        config.state_path = state_path;
    }
    let store = JsonFileStore::load(config.state_path.clone())
        .with_context(|| format!("load relation state {}", config.state_path.display()))?;
    let mut provides = PgsqlProvides::with_relation_name(config.relation_name.clone(), store);

    let summary = match cli.command {
        Commands::Hook(args) => run_hook(&mut provides, &config, args)?,
        Commands::Status => status(&provides),
    };

    let encoded = serde_json::to_string_pretty(&summary).context("encode output")?;
    writeln!(out, "{encoded}").context("write output")?;
    Ok(())
}

fn run_hook(
    provides: &mut PgsqlProvides<JsonFileStore>,
    config: &ProviderConfig,
    args: HookArgs,
) -> Result<Value> {
    let event = RelationEvent::new(args.kind, args.unit);
    info!(hook = %event.kind, unit = %event.remote_unit, "relation hook");

    if event.kind.is_negotiation() && !args.settings.is_empty() {
        let settings = args.settings.into_iter().map(|(key, value)| {
            let value = if value.is_empty() {
                Value::Null
            } else {
                Value::String(value)
            };
            (key, value)
        });
        provides
            .store_mut()
            .conversation(event.service())?
            .receive_remote(settings);
    }

    let handler = GeneratedCredentials::new(
        config.host.clone(),
        config.port,
        config.service_state.clone(),
    );
    let mut dispatcher = Dispatcher::new(handler);
    let report = dispatcher
        .handle(provides, &event)
        .with_context(|| format!("{} hook for {}", event.kind, event.remote_unit))?;
    provides.store_mut().flush()?;

    Ok(json!({
        "service": report.service,
        "raised": report.raised.iter().map(|flag| flag.as_str()).collect::<Vec<_>>(),
        "provided": report.provided,
        "acknowledged": report.acknowledged,
        "removed": report.removed,
    }))
}

fn status<S: ConversationStore>(provides: &PgsqlProvides<S>) -> Value {
    let services = provides
        .store()
        .conversations()
        .map(|conversation| {
            let service = conversation.scope();
            let pending = RequestFlag::ALL
                .into_iter()
                .filter(|flag| provides.is_requested(service, *flag))
                .map(RequestFlag::as_str)
                .collect::<Vec<_>>();
            json!({
                "service": service,
                "requested_database": provides.requested_database(service),
                "previous_database": provides.previous_database(service),
                "requested_roles": provides.requested_roles(service),
                "previous_roles": provides.previous_roles(service),
                "pending": pending,
            })
        })
        .collect::<Vec<_>>();
    json!({
        "relation": provides.relation_name(),
        "services": services,
    })
}
