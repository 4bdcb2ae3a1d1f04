//! `taskdeck` command-line client.
//!
//! Each invocation is one short-lived session: task commands sign in with
//! the given email/password, pass the task-view guard, run, and exit. The
//! credential only ever lives in this process's memory.


use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use taskdeck::config::{ClientConfig, ConfigError};
use taskdeck::net::types::{CreateTaskRequest, RegisterRequest, Task, TaskId, UpdateTaskRequest};
use taskdeck::net::{ApiError, Dispatcher, auth};
use taskdeck::session::{GuardDecision, Navigator, Route, SessionManager};
use taskdeck::state::tasks::TaskListState;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("missing credentials; pass --email/--password or set TASKDECK_EMAIL/TASKDECK_PASSWORD")]
    MissingCredentials,
    #[error("not signed in")]
    NotSignedIn,
    #[error("nothing to change; pass --title, --description, or --due")]
    NothingToEdit,
    #[error("{0}")]
    LoadFailed(String),
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "taskdeck", about = "Task list client")]
struct Cli {
    /// Backend base address; overrides TASKDECK_API_URL.
    #[arg(long)]
    api_url: Option<String>,

    /// Print raw JSON instead of a table.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Credentials {
    #[arg(long, env = "TASKDECK_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "TASKDECK_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show the signed-in account.
    Whoami(Credentials),
    /// List tasks.
    List(Credentials),
    /// Show one task.
    Show {
        id: TaskId,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Create a task.
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Change a task's title, description, or due date.
    Edit {
        id: TaskId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Flip a task between done and not done.
    Toggle {
        id: TaskId,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Delete a task.
    Rm {
        id: TaskId,
        #[command(flatten)]
        credentials: Credentials,
    },
}

/// Router stand-in: a CLI has nowhere to navigate, so tell the user instead.
struct CliNavigator;

impl Navigator for CliNavigator {
    fn navigate(&self, route: Route) {
        tracing::debug!(path = route.path(), "navigate");
        if route == Route::Login {
            eprintln!("Signed out. Log in again to continue.");
        }
    }
}

struct Client {
    dispatcher: Dispatcher,
    session: SessionManager,
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).with_max_level(tracing::Level::WARN).init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.api_url.as_deref() {
        config.api_url = ClientConfig::new(url)?.api_url;
    }
    tracing::debug!(api_url = %config.api_url, "using backend");

    let dispatcher = Dispatcher::new(&config)?;
    let session = SessionManager::new(Arc::new(CliNavigator));
    session.mount(&dispatcher);
    let client = Client { dispatcher, session, json: cli.json };

    match cli.command {
        Command::Register { email, password, name } => {
            run_register(&client, RegisterRequest { email, password, name }).await
        }
        Command::Whoami(credentials) => run_whoami(&client, &credentials).await,
        Command::List(credentials) => run_list(&client, &credentials).await,
        Command::Show { id, credentials } => {
            sign_in(&client, &credentials).await?;
            let task = client.dispatcher.get_task(id).await?;
            print_task(&client, &task)
        }
        Command::Add { title, description, due, credentials } => {
            sign_in(&client, &credentials).await?;
            let request = CreateTaskRequest { title, description, due_date: due };
            let task = client.dispatcher.create_task(&request).await?;
            print_task(&client, &task)
        }
        Command::Edit { id, title, description, due, credentials } => {
            let request = edit_request(title, description, due)?;
            sign_in(&client, &credentials).await?;
            let task = client.dispatcher.update_task(id, &request).await?;
            print_task(&client, &task)
        }
        Command::Toggle { id, credentials } => {
            sign_in(&client, &credentials).await?;
            let task = client.dispatcher.toggle_task(id).await?;
            print_task(&client, &task)
        }
        Command::Rm { id, credentials } => {
            sign_in(&client, &credentials).await?;
            client.dispatcher.delete_task(id).await?;
            println!("deleted {id}");
            Ok(())
        }
    }
}

/// Build a partial update, refusing one that would change nothing.
fn edit_request(
    title: Option<String>,
    description: Option<String>,
    due_date: Option<String>,
) -> Result<UpdateTaskRequest, CliError> {
    let request = UpdateTaskRequest { title, description, due_date };
    if request.is_empty() {
        return Err(CliError::NothingToEdit);
    }
    Ok(request)
}

/// Sign in and pass the task-view guard.
async fn sign_in(client: &Client, credentials: &Credentials) -> Result<(), CliError> {
    let (Some(email), Some(password)) = (credentials.email.as_deref(), credentials.password.as_deref()) else {
        return Err(CliError::MissingCredentials);
    };
    let claims = auth::sign_in(&client.dispatcher, &client.session, email, password).await?;
    tracing::debug!(user_id = claims.user_id, "signed in");

    match client.session.visit(Route::Tasks) {
        GuardDecision::Render => Ok(()),
        GuardDecision::Pending | GuardDecision::Redirect(_) => Err(CliError::NotSignedIn),
    }
}

async fn run_register(client: &Client, request: RegisterRequest) -> Result<(), CliError> {
    let user = client.dispatcher.register(&request).await?;
    if client.json {
        return print_json(&user);
    }
    println!("registered {} (id {})", user.email, user.id);
    Ok(())
}

async fn run_whoami(client: &Client, credentials: &Credentials) -> Result<(), CliError> {
    sign_in(client, credentials).await?;
    let user = client.dispatcher.current_user().await?;
    if client.json {
        return print_json(&user);
    }
    let name = user.name.as_deref().unwrap_or("-");
    println!("{} <{}> id {}", name, user.email, user.id);
    if let Some(expires_at) = client.session.claims().and_then(|c| c.expires_at) {
        println!("session expires at {expires_at} (unix seconds)");
    }
    Ok(())
}

async fn run_list(client: &Client, credentials: &Credentials) -> Result<(), CliError> {
    sign_in(client, credentials).await?;
    let mut list = TaskListState::default();
    list.begin_load();
    list.apply_loaded(client.dispatcher.list_tasks().await);

    if let Some(error) = list.error {
        return Err(CliError::LoadFailed(error));
    }
    if client.json {
        return print_json(&list.tasks);
    }
    if list.is_empty_view() {
        println!("No tasks yet. Create one with `taskdeck add <title>`.");
        return Ok(());
    }
    for task in &list.tasks {
        println!("{}", format_task_line(task));
    }
    println!("{} pending, {} done", list.pending_count(), list.completed_count());
    Ok(())
}

fn print_task(client: &Client, task: &Task) -> Result<(), CliError> {
    if client.json {
        return print_json(task);
    }
    println!("{}", format_task_line(task));
    if let Some(description) = task.description.as_deref() {
        println!("    {description}");
    }
    println!("    created {}  updated {}", task.created_at, task.updated_at);
    Ok(())
}

fn format_task_line(task: &Task) -> String {
    let mark = if task.completed { "x" } else { " " };
    let due = task.due_date.as_deref().map(|d| format!("  (due {d})")).unwrap_or_default();
    format!("[{mark}] {:>4}  {}{due}", task.id, task.title)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
