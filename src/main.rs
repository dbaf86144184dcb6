use clap::Parser;
use fleetpolicy::cli::{commands, Cli, Commands, ConfigAction, OutputAction, StateAction};
use fleetpolicy::config::{validate_config_object, Config};
use fleetpolicy::fleet::FleetClient;
use fleetpolicy::lifecycle::PolicyResource;
use fleetpolicy::logging;
use fleetpolicy::secrets::{PrivateState, SqliteState};
use tracing::info;

fn open_resource(config: &Config) -> anyhow::Result<PolicyResource<FleetClient, SqliteState>> {
    validate_config_object(config)?;
    let client = FleetClient::new(&config.fleet)?;
    let state = SqliteState::open(&config.state_path())?;
    Ok(PolicyResource::new(client, state).with_unresolved_policy(config.reconcile.unresolved_secrets))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    logging::init(&config.logging);

    match cli.command {
        Commands::Apply(opts) => {
            let resource = open_resource(&config)?;
            commands::apply(&resource, &opts.resource, &opts.plan, &opts.state).await?;
        }
        Commands::Refresh(opts) => {
            let resource = open_resource(&config)?;
            commands::refresh(&resource, &opts.resource, &opts.state).await?;
        }
        Commands::Destroy(opts) => {
            let resource = open_resource(&config)?;
            commands::destroy(&resource, &opts.resource, &opts.state).await?;
            info!(resource = %opts.resource, "destroyed");
        }
        Commands::Batch(opts) => {
            let resource = open_resource(&config)?;
            let failed = commands::batch(
                &resource,
                &opts.dir,
                opts.state_dir.as_deref(),
                config.reconcile.max_parallel,
            )
            .await?;
            if failed > 0 {
                anyhow::bail!("{failed} resource(s) failed");
            }
        }
        Commands::State(opts) => {
            let state = SqliteState::open(&config.state_path())?;
            match opts.action {
                StateAction::Show { resource } => {
                    info!(resource = %resource, keys = ?state.keys(&resource)?, "private state");
                    for line in commands::state_lines(&state, &resource)? {
                        println!("{line}");
                    }
                }
                StateAction::Clear { resource } => {
                    state.clear(&resource)?;
                    info!(resource = %resource, "private state cleared");
                }
            }
        }
        Commands::Output(opts) => {
            validate_config_object(&config)?;
            let client = FleetClient::new(&config.fleet)?;
            match opts.action {
                OutputAction::Show { id } => match client.get_output(&id).await? {
                    Some(output) => println!("{}", serde_json::to_string_pretty(&output)?),
                    None => anyhow::bail!("Output '{id}' not found"),
                },
            }
        }
        Commands::Config(opts) => match opts.action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Validate => {
                validate_config_object(&config)?;
                info!("Configuration is valid");
            }
            ConfigAction::Init { path } => {
                Config::write_default(&path)?;
                info!("Configuration file created at {}", path.display());
            }
        },
        Commands::Version => {
            println!("fleetpolicy {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
