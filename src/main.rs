use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use casework_content::FsContentStore;
use casework_engine::InMemoryEngine;
use casework_model::{Entity, Principal, Role, User};
use casework_service::{
  Collaborators, InstancePatch, ProcessInstanceService, ServiceConfig, Submitted,
};
use casework_store::{FsProcessRepository, SqliteStore};
use casework_validation::{HtmlSanitizer, InMemoryDirectory, RawSubmission};

/// Casework - process instances, submissions and lifecycle commands
#[derive(Parser)]
#[command(name = "casework")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.casework)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Act as this user. Anonymous when omitted.
  #[arg(long, global = true)]
  user: Option<String>,

  /// Act as the system
  #[arg(long, global = true, conflicts_with = "user")]
  system: bool,

  /// Grant a role on a process, as `process:role`. Repeatable.
  #[arg(long = "grant", global = true)]
  grants: Vec<String>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// List the processes the caller holds a role on
  Processes,

  /// Validate a JSON submission from stdin without storing anything
  Validate {
    process: String,
    #[arg(long)]
    instance: Option<String>,
  },

  /// Create an instance from a JSON submission on stdin
  Create { process: String },

  /// Show one instance
  Show {
    process: String,
    instance: String,
    /// Include attachment metadata
    #[arg(long)]
    full: bool,
  },

  /// Search instances with `name=value` filters
  Search { filters: Vec<String> },

  /// Export every instance of one process matching `name=value` filters
  Export { filters: Vec<String> },

  Activate {
    process: String,
    instance: String,
  },

  Suspend {
    process: String,
    instance: String,
    #[arg(long)]
    reason: Option<String>,
  },

  Cancel {
    process: String,
    instance: String,
    #[arg(long)]
    reason: Option<String>,
  },

  /// Apply a partial instance read as JSON from stdin
  Update { process: String, instance: String },

  /// Assign a task, or unassign it when no assignee is given
  Assign {
    process: String,
    instance: String,
    task: String,
    #[arg(long)]
    assignee: Option<String>,
  },

  /// Attach comments and files from a JSON submission on stdin
  Attach { process: String, instance: String },

  Detach {
    process: String,
    instance: String,
    attachment: String,
  },

  /// Print the values of one field
  Values {
    process: String,
    instance: String,
    field: String,
  },

  /// Replace one field from a JSON submission on stdin
  SetField {
    process: String,
    instance: String,
    field: String,
  },

  /// Remove one file value from a field
  RemoveValue {
    process: String,
    instance: String,
    field: String,
    value: String,
  },

  /// Find the instance holding a task
  FindTask { process: String, task: String },

  /// Mark an instance complete (system only)
  Complete { instance: String },
}

fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();

  let data_dir = match cli.data_dir.clone() {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".casework"),
  };

  let Some(command) = cli.command.as_ref() else {
    println!("casework - use --help to see available commands");
    return Ok(());
  };

  let principal = principal(&cli)?;
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run(command, &principal, &data_dir).await })
}

fn init_tracing() {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_writer(io::stderr)
    .init();
}

fn principal(cli: &Cli) -> Result<Principal> {
  let mut entity = match (&cli.user, cli.system) {
    (_, true) => Entity::system("system"),
    (Some(user), false) => Entity::user(user),
    (None, false) => {
      if !cli.grants.is_empty() {
        bail!("--grant needs --user or --system");
      }
      return Ok(Principal::Anonymous);
    }
  };

  for grant in &cli.grants {
    let (process, role) = grant
      .split_once(':')
      .with_context(|| format!("grant '{}' is not process:role", grant))?;
    let role: Role = serde_json::from_value(serde_json::Value::String(role.to_lowercase()))
      .with_context(|| format!("unknown role '{}'", role))?;
    entity = entity.with_role(process, role);
  }

  Ok(Principal::from(entity))
}

async fn service(data_dir: &Path) -> Result<ProcessInstanceService> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let config_path = data_dir.join("casework.json");
  let config: ServiceConfig = match tokio::fs::read_to_string(&config_path).await {
    Ok(content) => serde_json::from_str(&content)
      .with_context(|| format!("failed to parse config: {}", config_path.display()))?,
    Err(e) if e.kind() == io::ErrorKind::NotFound => ServiceConfig::default(),
    Err(e) => return Err(e).context("failed to read config"),
  };

  let users_path = data_dir.join("users.json");
  let users: Vec<User> = match tokio::fs::read_to_string(&users_path).await {
    Ok(content) => serde_json::from_str(&content)
      .with_context(|| format!("failed to parse users: {}", users_path.display()))?,
    Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
    Err(e) => return Err(e).context("failed to read users"),
  };

  let db_url = format!("sqlite://{}", data_dir.join("casework.db").display());
  let store = SqliteStore::connect(&db_url)
    .await
    .context("failed to open instance store")?;

  tracing::debug!(data_dir = %data_dir.display(), "service_ready");

  Ok(ProcessInstanceService::new(
    config,
    Collaborators {
      processes: Arc::new(FsProcessRepository::new(data_dir.join("processes"))),
      store: Arc::new(store),
      facade: Arc::new(InMemoryEngine::adopting()),
      identity: Arc::new(InMemoryDirectory::new(users)),
      content: Arc::new(FsContentStore::new(data_dir.join("content"))),
      sanitizer: Arc::new(HtmlSanitizer),
    },
  ))
}

async fn run(command: &Commands, principal: &Principal, data_dir: &Path) -> Result<()> {
  let service = service(data_dir).await?;

  match command {
    Commands::Processes => {
      let processes = service.read_processes(principal).await?;
      for process in processes {
        println!(
          "{}\t{}",
          process.process_definition_key, process.process_definition_label
        );
      }
    }
    Commands::Validate { process, instance } => {
      let raw = read_submission()?;
      let validation = service
        .validate(principal, process, instance.as_deref(), raw)
        .await?;
      print_json(&validation)?;
    }
    Commands::Create { process } => {
      let submitted = service.create(principal, process, read_submission()?).await?;
      print_submitted(submitted)?;
    }
    Commands::Show {
      process,
      instance,
      full,
    } => print_json(&service.read(principal, process, instance, *full).await?)?,
    Commands::Search { filters } => {
      let page = service.search(principal, &parse_filters(filters)?).await?;
      print_json(&page)?;
    }
    Commands::Export { filters } => {
      let instances = service.export(principal, &parse_filters(filters)?).await?;
      print_json(&instances)?;
    }
    Commands::Activate { process, instance } => {
      print_json(&service.activate(principal, process, instance).await?)?
    }
    Commands::Suspend {
      process,
      instance,
      reason,
    } => print_json(
      &service
        .suspend(principal, process, instance, reason.as_deref())
        .await?,
    )?,
    Commands::Cancel {
      process,
      instance,
      reason,
    } => print_json(
      &service
        .cancel(principal, process, instance, reason.as_deref())
        .await?,
    )?,
    Commands::Update { process, instance } => {
      let patch: InstancePatch =
        serde_json::from_str(&read_stdin()?).context("failed to parse instance patch")?;
      print_json(&service.update(principal, process, instance, patch).await?)?;
    }
    Commands::Assign {
      process,
      instance,
      task,
      assignee,
    } => print_json(
      &service
        .assign(principal, process, instance, task, assignee.as_deref())
        .await?,
    )?,
    Commands::Attach { process, instance } => {
      let submitted = service
        .attach(principal, process, instance, read_submission()?)
        .await?;
      print_submitted(submitted)?;
    }
    Commands::Detach {
      process,
      instance,
      attachment,
    } => print_json(&service.detach(principal, process, instance, attachment).await?)?,
    Commands::Values {
      process,
      instance,
      field,
    } => print_json(&service.read_values(principal, process, instance, field).await?)?,
    Commands::SetField {
      process,
      instance,
      field,
    } => {
      let submitted = service
        .update_field(principal, process, instance, field, read_submission()?)
        .await?;
      match submitted {
        Submitted::Accepted(update) => {
          if let Some(location) = &update.location {
            eprintln!("Stored file at: {}", location);
          }
          print_json(&update.instance)?;
        }
        Submitted::Rejected(validation) => {
          print_json(&validation)?;
          bail!("submission failed validation");
        }
      }
    }
    Commands::RemoveValue {
      process,
      instance,
      field,
      value,
    } => print_json(
      &service
        .remove_value(principal, process, instance, field, value)
        .await?,
    )?,
    Commands::FindTask { process, task } => {
      print_json(&service.find_by_task_id(principal, process, task).await?)?
    }
    Commands::Complete { instance } => print_json(&service.complete(principal, instance).await?)?,
  }

  Ok(())
}

fn parse_filters(filters: &[String]) -> Result<Vec<(String, String)>> {
  filters
    .iter()
    .map(|f| {
      f.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| anyhow!("filter '{}' is not name=value", f))
    })
    .collect()
}

fn read_submission() -> Result<RawSubmission> {
  let json = serde_json::from_str(&read_stdin()?).context("failed to parse submission JSON")?;
  Ok(RawSubmission::Structured(json))
}

fn read_stdin() -> Result<String> {
  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read stdin")?;
  Ok(input)
}

fn print_submitted<T: Serialize>(submitted: Submitted<T>) -> Result<()> {
  match submitted {
    Submitted::Accepted(value) => print_json(&value),
    Submitted::Rejected(validation) => {
      print_json(&validation)?;
      bail!("submission failed validation")
    }
  }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
