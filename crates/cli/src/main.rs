use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use intake_core::config::{category_config_dir_from_env_value, profile_data_dir_from_env_value};
use intake_core::registry::Slot;
use intake_core::versioning::verify_lineage;
use intake_core::{
    CommitAuthor, ConfigStore, CoreConfig, Draft, EmailAddress, FieldErrors, FileConfigStore,
    FileProfileStore, NonEmptyText, PatientId, ProfileOrchestrator, ProfileRecord, ProfileStore,
    StaticIdentity, Step, StepValidator, SubmitOutcome, TermId, UserCategory, UserIdentity,
    VersionChoice,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CLINIC: &str = "University Health Services";
const DEFAULT_AUTHOR_NAME: &str = "Intake CLI";
const DEFAULT_AUTHOR_EMAIL: &str = "intake-cli@localhost.localdomain";

#[derive(Parser)]
#[command(name = "intake")]
#[command(about = "Versioned health profile intake")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Storage settings. Each flag falls back to its `INTAKE_*` environment variable.
#[derive(Args, Debug, Default)]
struct StoreArgs {
    /// Profile data directory [env: INTAKE_DATA_DIR]
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Category configuration directory [env: INTAKE_CONFIG_DIR]
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    /// Clinic name recorded on commits [env: INTAKE_CLINIC]
    #[arg(long, global = true)]
    clinic: Option<String>,
    /// Commit author name [env: INTAKE_AUTHOR_NAME]
    #[arg(long, global = true)]
    author_name: Option<String>,
    /// Commit author email [env: INTAKE_AUTHOR_EMAIL]
    #[arg(long, global = true)]
    author_email: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a draft file step by step
    Validate {
        /// Draft YAML file
        draft: PathBuf,
        /// Only validate this step (1-4)
        #[arg(long)]
        step: Option<u8>,
        /// A new photo has been attached to the draft
        #[arg(long)]
        photo_attached: bool,
    },
    /// Open a session and write the starting draft
    Open {
        /// Patient identifier
        patient: String,
        /// Term; defaults to the active term
        #[arg(long)]
        term: Option<String>,
        /// User category (e.g. College, Employee)
        #[arg(long)]
        category: Option<String>,
        #[command(flatten)]
        user: UserArgs,
        /// Write the draft here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Submit a draft file
    Save {
        /// Draft YAML file
        draft: PathBuf,
        /// update, fork or ask
        #[arg(long, default_value = "ask")]
        choice: String,
        /// A new photo has been attached to the draft
        #[arg(long)]
        photo_attached: bool,
    },
    /// List the versions of a patient's profile for a term
    History {
        patient: String,
        term: String,
    },
    /// Show the remembered custom values of a patient's profile
    Registry {
        patient: String,
        term: String,
    },
}

/// The signed-in user, used to seed a first-ever draft.
#[derive(Args, Debug, Default)]
struct UserArgs {
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    middle_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    email: Option<String>,
}

impl From<UserArgs> for StaticIdentity {
    fn from(args: UserArgs) -> Self {
        Self(UserIdentity {
            first_name: args.first_name.unwrap_or_default(),
            middle_name: args.middle_name.unwrap_or_default(),
            last_name: args.last_name.unwrap_or_default(),
            email: args.email.unwrap_or_default(),
        })
    }
}

fn env_or(flag: Option<String>, key: &str) -> Option<String> {
    flag.or_else(|| std::env::var(key).ok())
        .filter(|v| !v.trim().is_empty())
}

/// Resolve configuration once: flags first, then environment, then defaults.
fn resolve_config(args: StoreArgs) -> anyhow::Result<Arc<CoreConfig>> {
    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => profile_data_dir_from_env_value(std::env::var("INTAKE_DATA_DIR").ok()),
    };
    let config_dir = match args.config_dir {
        Some(dir) => dir,
        None => category_config_dir_from_env_value(std::env::var("INTAKE_CONFIG_DIR").ok()),
    };
    let clinic =
        env_or(args.clinic, "INTAKE_CLINIC").unwrap_or_else(|| DEFAULT_CLINIC.to_owned());
    let author = CommitAuthor {
        name: NonEmptyText::new(
            env_or(args.author_name, "INTAKE_AUTHOR_NAME")
                .unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_owned()),
        )
        .context("invalid commit author name")?,
        email: EmailAddress::parse(
            env_or(args.author_email, "INTAKE_AUTHOR_EMAIL")
                .unwrap_or_else(|| DEFAULT_AUTHOR_EMAIL.to_owned()),
        )
        .context("invalid commit author email")?,
    };

    Ok(Arc::new(CoreConfig::new(
        data_dir, config_dir, &clinic, author,
    )?))
}

fn read_draft(path: &Path) -> anyhow::Result<ProfileRecord> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read draft {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("failed to parse draft {}", path.display()))
}

fn orchestrator(cfg: &Arc<CoreConfig>, identity: StaticIdentity) -> ProfileOrchestrator {
    ProfileOrchestrator::new(
        Arc::new(FileProfileStore::new(cfg.clone())),
        Arc::new(FileConfigStore::new(cfg.category_config_dir())),
        Arc::new(identity),
    )
}

fn print_errors(step: Step, errors: &FieldErrors) {
    println!("{step}:");
    for (field, message) in errors.iter() {
        println!("  {field}: {message}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("intake=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = resolve_config(cli.store)?;

    match cli.command {
        Commands::Validate {
            draft,
            step,
            photo_attached,
        } => {
            let record = read_draft(&draft)?;
            let draft = Draft {
                record,
                photo_attached,
            };
            let config = match draft.fields().user_category {
                Some(category) => {
                    FileConfigStore::new(cfg.category_config_dir())
                        .category_config(category)
                        .await
                        .unwrap_or_else(|err| {
                            tracing::warn!(error = %err, "category config unavailable; using defaults");
                            None
                        })
                }
                None => None,
            };

            let steps = match step {
                Some(number) => match Step::from_number(number) {
                    Some(step) => vec![step],
                    None => bail!("step must be between 1 and 4"),
                },
                None => Step::ALL.to_vec(),
            };

            let validator = StepValidator::default();
            let mut failed = false;
            for step in steps {
                let errors = validator.validate(step, &draft, config.as_ref());
                if !errors.is_empty() {
                    failed = true;
                    print_errors(step, &errors);
                }
            }
            if failed {
                bail!("draft has validation errors");
            }
            println!("Draft is valid.");
        }
        Commands::Open {
            patient,
            term,
            category,
            user,
            out,
        } => {
            let patient = PatientId::parse(&patient)?;
            let term = term.map(TermId::new).transpose()?;
            let category = category.as_deref().map(UserCategory::parse).transpose()?;

            let orchestrator = orchestrator(&cfg, user.into());
            let Some(session) = orchestrator.open(&patient, term, category).await? else {
                bail!("load was superseded");
            };

            if let Some(source) = session.provenance_term() {
                eprintln!("Pre-filled from term {source}.");
            }
            if session.live().is_some() {
                eprintln!("Editing the existing record for {}.", session.term());
            }
            let yaml = serde_yaml::to_string(&session.draft().record)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, yaml)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Wrote draft to {}", path.display());
                }
                None => print!("{yaml}"),
            }
        }
        Commands::Save {
            draft,
            choice,
            photo_attached,
        } => {
            let record = read_draft(&draft)?;
            let choice: VersionChoice = choice.parse()?;

            let orchestrator = orchestrator(&cfg, StaticIdentity(UserIdentity::default()));
            let Some(mut session) = orchestrator
                .open(
                    &record.patient_id,
                    Some(record.term_id.clone()),
                    record.fields.user_category,
                )
                .await?
            else {
                bail!("load was superseded");
            };

            let working = session.draft_mut();
            working.record.fields = record.fields;
            working.record.custom_registry = record.custom_registry;
            working.photo_attached = photo_attached;

            match orchestrator.submit(&mut session, choice).await? {
                SubmitOutcome::Saved { record, mode } => {
                    let id = record.id.map(|id| id.to_string()).unwrap_or_default();
                    println!(
                        "Saved {} (version {}, {})",
                        id,
                        record.version.unwrap_or(1),
                        mode.as_str()
                    );
                }
                SubmitOutcome::NeedsChoice => {
                    bail!("a record already exists for this term; rerun with --choice update or --choice fork");
                }
                SubmitOutcome::Invalid { step, errors } => {
                    print_errors(step, &errors);
                    bail!("draft has validation errors");
                }
                SubmitOutcome::Conflict { message } => {
                    bail!("{message}; reload the draft and try again");
                }
            }
        }
        Commands::History { patient, term } => {
            let patient = PatientId::parse(&patient)?;
            let term = TermId::new(&term)?;
            let store = FileProfileStore::new(cfg.clone());

            let lineage = store.history(&patient, &term).await?;
            if lineage.is_empty() {
                println!("No records found.");
                return Ok(());
            }
            for record in &lineage {
                println!(
                    "v{}  {}  saved {}  previous {}",
                    record.version.unwrap_or(0),
                    record.id.map(|id| id.to_string()).unwrap_or_default(),
                    record
                        .saved_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".into()),
                    record
                        .previous_version_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".into()),
                );
            }
            match verify_lineage(&lineage) {
                Ok(()) => println!("Version chain OK."),
                Err(err) => println!("Version chain problem: {err}"),
            }
        }
        Commands::Registry { patient, term } => {
            let patient = PatientId::parse(&patient)?;
            let term = TermId::new(&term)?;
            let store = FileProfileStore::new(cfg.clone());

            let Some(record) = store.fetch(&patient, &term).await? else {
                println!("No records found.");
                return Ok(());
            };
            let registry = &record.custom_registry;
            let mut slots = vec![
                Slot::DrugNames,
                Slot::Nationalities,
                Slot::OtherCondition,
                Slot::MenstrualSymptoms,
            ];
            slots.extend(registry.specification_keys().map(Slot::specifications));
            for slot in slots {
                let values = registry.values(&slot);
                if !values.is_empty() {
                    println!("{slot}: {}", values.join(", "));
                }
            }
        }
    }

    Ok(())
}
