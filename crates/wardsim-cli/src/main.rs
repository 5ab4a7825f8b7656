use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use eyre::Result;
use tracing_subscriber::EnvFilter;

use wardsim_ai::bedrock::BedrockService;
use wardsim_cli::config::{self, CredentialSource, WardsimConfig};
use wardsim_cli::{aws, driver};
use wardsim_core::models::case::{Department, Difficulty};
use wardsim_core::models::osce::OsceStation;
use wardsim_engine::cache::LocalCaseCache;
use wardsim_engine::controller::{
    CaseSelection, CaseSession, FreshReason, ResumeOutcome, SessionDeps, UserIdentity,
};
use wardsim_engine::persistence::BatchPersistenceQueue;
use wardsim_storage::remote::S3CaseStore;

#[derive(Parser)]
#[command(name = "wardsim", version, about = "Simulated clinical cases in the terminal")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the config file
    Init {
        #[arg(long)]
        region: String,
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        model_id: Option<String>,
        /// Use a named AWS profile instead of the default credential chain
        #[arg(long)]
        profile: Option<String>,
    },
    /// Show the active configuration
    Config,
    /// Start a case in a hospital department
    Simulate {
        #[arg(long)]
        department: String,
        #[arg(long)]
        subspecialty: Option<String>,
        #[arg(long, value_enum, default_value_t = DifficultyArg::Standard)]
        difficulty: DifficultyArg,
    },
    /// Practise a specific condition
    Practice {
        #[arg(long)]
        condition: Option<String>,
        /// Free-text description of the case to generate
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_enum, default_value_t = DifficultyArg::Standard)]
        difficulty: DifficultyArg,
    },
    /// Run a timed OSCE station
    Osce {
        #[arg(long)]
        station: String,
        #[arg(long, default_value = "")]
        instructions: String,
        /// Station length; defaults to the configured OSCE duration
        #[arg(long)]
        duration_secs: Option<u32>,
        #[arg(long, value_enum, default_value_t = DifficultyArg::Standard)]
        difficulty: DifficultyArg,
    },
    /// Resume a cached case
    Resume { case_id: String },
    /// List your saved cases
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DifficultyArg {
    Foundation,
    Standard,
    Advanced,
}

impl From<DifficultyArg> for Difficulty {
    fn from(arg: DifficultyArg) -> Self {
        match arg {
            DifficultyArg::Foundation => Difficulty::Foundation,
            DifficultyArg::Standard => Difficulty::Standard,
            DifficultyArg::Advanced => Difficulty::Advanced,
        }
    }
}

/// Everything a command needs once the config is loaded.
struct App {
    config: WardsimConfig,
    deps: SessionDeps,
    store: Arc<S3CaseStore>,
}

impl App {
    async fn connect() -> Result<Self> {
        let mut config = config::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        let sdk_config = aws::build_aws_config(&config.region, &config.credentials).await;
        let store = Arc::new(S3CaseStore::new(
            wardsim_storage::client::build_client(&sdk_config),
            config.bucket.clone(),
        ));
        let persistence = Arc::new(BatchPersistenceQueue::new());
        tokio::spawn(driver::report_saves(persistence.subscribe()));

        let deps = SessionDeps {
            ai: Arc::new(BedrockService::new(&sdk_config, config.model_id.clone())),
            store: store.clone(),
            cache: Arc::new(LocalCaseCache::new(config.resolved_cache_dir()?)),
            persistence,
            settings: config.engine.clone(),
            user: UserIdentity {
                email: config.user_email.clone(),
                country: config.user_country.clone(),
            },
        };
        tracing::info!(region = %config.region, bucket = %config.bucket, model = %config.model_id, "connected");
        Ok(Self { config, deps, store })
    }

    async fn start(self, selection: CaseSelection) -> Result<()> {
        let cache = self.deps.cache.clone();
        let mut session = CaseSession::new(self.deps);
        println!("Generating your case...");
        if let Err(e) = session.generate(selection).await {
            if let Some((code, reason)) = e.quota() {
                tracing::warn!(code, "case generation rejected by quota");
                return Err(eyre::eyre!("{reason}"));
            }
            let message = e.user_message();
            return Err(eyre::Report::new(e).wrap_err(message));
        }
        driver::run(session, cache).await
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Init {
            region,
            bucket,
            email,
            country,
            model_id,
            profile,
        } => {
            let credentials = match profile {
                Some(profile_name) => CredentialSource::Profile { profile_name },
                None => CredentialSource::DefaultChain,
            };
            let mut config = WardsimConfig::new(region, bucket, email, credentials);
            config.user_country = country;
            if let Some(model_id) = model_id {
                config.model_id = model_id;
            }
            config.validate()?;
            config::save_config(&config)?;
            println!("Config written to {}", config::config_path()?.display());
        }
        Commands::Config => {
            let mut config = config::load_config()?;
            config.apply_env_overrides();
            let info = config::config_info(&config);
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Simulate {
            department,
            subspecialty,
            difficulty,
        } => {
            let selection = CaseSelection::Simulation {
                department: Department {
                    name: department,
                    subspecialty,
                },
                difficulty: difficulty.into(),
            };
            App::connect().await?.start(selection).await?;
        }
        Commands::Practice {
            condition,
            description,
            difficulty,
        } => {
            let selection = CaseSelection::Practice {
                condition,
                custom_description: description,
                difficulty: difficulty.into(),
            };
            App::connect().await?.start(selection).await?;
        }
        Commands::Osce {
            station,
            instructions,
            duration_secs,
            difficulty,
        } => {
            let app = App::connect().await?;
            let default_secs = u32::try_from(app.config.engine.osce_duration_secs).unwrap_or(u32::MAX);
            let selection = CaseSelection::Osce {
                station: OsceStation {
                    title: station,
                    instructions,
                    duration_secs: duration_secs.unwrap_or(default_secs),
                },
                difficulty: difficulty.into(),
            };
            app.start(selection).await?;
        }
        Commands::Resume { case_id } => {
            let app = App::connect().await?;
            let cache = app.deps.cache.clone();
            match CaseSession::resume(app.deps, &case_id).await {
                ResumeOutcome::Resumed(session) => driver::run(*session, cache).await?,
                ResumeOutcome::Fresh(FreshReason::NotCached) => {
                    println!("Case {case_id} is not cached on this device. Start a new case.");
                }
                ResumeOutcome::Fresh(FreshReason::SessionInvalid) => {
                    println!("The session for case {case_id} has expired. Start a new case.");
                }
            }
        }
        Commands::History => {
            let app = App::connect().await?;
            let case_ids = app.store.list_case_ids(&app.config.user_email).await?;
            if case_ids.is_empty() {
                println!("No saved cases.");
            }
            for case_id in case_ids {
                println!("{case_id}");
            }
        }
    }

    Ok(())
}
