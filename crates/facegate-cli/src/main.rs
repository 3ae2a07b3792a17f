use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::{Descriptor, DEFAULT_THRESHOLD};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.facegate.Auth1",
    default_service = "org.facegate.Auth1",
    default_path = "/org/facegate/Auth1"
)]
trait Auth {
    fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        descriptor: &str,
    ) -> zbus::Result<String>;
    fn login(&self, request: &str) -> zbus::Result<String>;
    fn profile(&self, token: &str) -> zbus::Result<String>;
    fn remove_account(&self, token: &str) -> zbus::Result<bool>;
    fn enroll_face(&self, token: &str, descriptor: &str) -> zbus::Result<bool>;
    fn forget_face(&self, token: &str) -> zbus::Result<bool>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facegate", about = "Facegate face/password authentication CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two descriptor files locally, without the daemon
    Compare {
        a: PathBuf,
        b: PathBuf,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f32,
    },
    #[command(flatten)]
    Daemon(DaemonCommand),
}

/// Commands served by facegated.
#[derive(Subcommand)]
enum DaemonCommand {
    /// Register a new account with a face descriptor
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
        /// JSON file holding the descriptor array
        #[arg(long)]
        descriptor: PathBuf,
    },
    /// Log in and print a session token
    Login {
        /// Account email (password login; password read from stdin unless given)
        #[arg(long, conflicts_with = "face")]
        email: Option<String>,
        #[arg(long, requires = "email")]
        password: Option<String>,
        /// JSON descriptor file (face login)
        #[arg(long)]
        face: Option<PathBuf>,
    },
    /// Show the account a session token belongs to
    Whoami { token: String },
    /// Delete the account a session token belongs to
    Remove { token: String },
    /// Replace the face descriptor of a session token's account
    Enroll {
        token: String,
        /// JSON descriptor file
        descriptor: PathBuf,
    },
    /// Clear the face descriptor of a session token's account
    ForgetFace { token: String },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Compare { a, b, threshold } => {
            let report = compare(&load_descriptor(&a)?, &load_descriptor(&b)?, threshold)?;
            println!("{report}");
            return Ok(());
        }
        Commands::Daemon(command) => command,
    };

    tracing::debug!(system_bus = cli.system, "connecting to facegated");
    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("failed to connect to D-Bus")?;
    let proxy = AuthProxy::new(&conn)
        .await
        .context("facegated is not reachable")?;

    match command {
        DaemonCommand::Register {
            name,
            email,
            password,
            descriptor,
        } => {
            let descriptor = read_descriptor_json(&descriptor)?;
            let password = match password {
                Some(p) => p,
                None => prompt_password()?,
            };
            let id = proxy.register(&name, &email, &password, &descriptor).await?;
            println!("Registered account {id}");
        }
        DaemonCommand::Login {
            email,
            password,
            face,
        } => {
            let password = match (&email, password) {
                (Some(_), None) => Some(prompt_password()?),
                (_, password) => password,
            };
            let request = login_request(email, password, face.as_deref())?;
            let token = proxy.login(&request.to_string()).await?;
            println!("{token}");
        }
        DaemonCommand::Whoami { token } => {
            println!("{}", pretty(&proxy.profile(&token).await?)?);
        }
        DaemonCommand::Remove { token } => {
            if proxy.remove_account(&token).await? {
                println!("Account removed");
            } else {
                bail!("the account for this session no longer exists");
            }
        }
        DaemonCommand::Enroll { token, descriptor } => {
            let descriptor = read_descriptor_json(&descriptor)?;
            if proxy.enroll_face(&token, &descriptor).await? {
                println!("Face enrolled");
            } else {
                bail!("the account for this session no longer exists");
            }
        }
        DaemonCommand::ForgetFace { token } => {
            if proxy.forget_face(&token).await? {
                println!("Face descriptor cleared");
            } else {
                println!("No face enrolled");
            }
        }
        DaemonCommand::Status => {
            println!("{}", pretty(&proxy.status().await?)?);
        }
    }

    Ok(())
}

/// Build the JSON login request for the daemon.
fn login_request(
    email: Option<String>,
    password: Option<String>,
    face: Option<&Path>,
) -> Result<serde_json::Value> {
    match (email, password, face) {
        (Some(email), Some(password), None) => Ok(serde_json::json!({
            "method": "password",
            "email": email,
            "password": password,
        })),
        (None, None, Some(path)) => Ok(serde_json::json!({
            "method": "face",
            "descriptor": load_descriptor(path)?.values,
        })),
        _ => bail!("use either --email/--password or --face"),
    }
}

/// Prompt on stderr and read one line from stdin, so the password never
/// appears in the process arguments.
fn prompt_password() -> Result<String> {
    eprint!("Password: ");
    std::io::stderr().flush()?;
    read_password(std::io::stdin().lock())
}

fn read_password(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line).context("failed to read password")?;
    let password = line.trim_end_matches(['\n', '\r']);
    if password.is_empty() {
        bail!("no password given");
    }
    Ok(password.to_string())
}

fn read_descriptor_json(path: &Path) -> Result<String> {
    // Round-trip through the parser so malformed files fail here, not in the daemon.
    Ok(serde_json::to_string(&load_descriptor(path)?.values)?)
}

/// Load a descriptor from a JSON array of numbers.
fn load_descriptor(path: &Path) -> Result<Descriptor> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let values: Vec<f32> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of numbers", path.display()))?;
    if values.is_empty() {
        bail!("{} holds an empty descriptor", path.display());
    }
    Ok(Descriptor::new(values))
}

fn compare(a: &Descriptor, b: &Descriptor, threshold: f32) -> Result<String> {
    let sim = facegate_core::similarity(a, b)?;
    let verdict = if sim > threshold { "match" } else { "no match" };
    Ok(format!(
        "distance={:.4} similarity={sim:.4} threshold={threshold} -> {verdict}",
        a.euclidean_distance(b)
    ))
}

fn pretty(json: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    Ok(serde_json::to_string_pretty(&value)?)
}
