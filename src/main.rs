//! locker - command-line front end for the student document locker

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use locker_client::{
    accounting::Severity,
    admin::UserFilter,
    otp::{OtpPhase, ProfileData},
    types::FileUpload,
    ClientArgs, LockerClient, LockerError,
};

#[derive(Debug, Parser)]
#[command(name = "locker", version, about = "Student document locker client")]
struct Cli {
    #[command(flatten)]
    client: ClientArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Log in as a student
    Login {
        /// Student ID or email
        #[arg(short, long)]
        identifier: String,
        #[arg(short, long, env = "LOCKER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log in as an administrator
    AdminLogin {
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "LOCKER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Register a new student account (OTP is read from stdin)
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        department: String,
        #[arg(long, env = "LOCKER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Clear the stored session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// List documents
    List,

    /// Search documents by file name
    Search { query: String },

    /// Upload a PDF or image
    Upload { path: PathBuf },

    /// Download a document into a directory
    Download {
        id: String,
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Save a document to the temp directory for viewing
    View { id: String },

    /// Delete a document
    Delete { id: String },

    /// Toggle a document's favorite flag
    Favorite { id: String },

    /// Show storage usage
    Storage,

    /// List users (admin)
    Users {
        /// Match name, student ID, email or phone
        #[arg(short, long, default_value = "")]
        query: String,
        #[arg(short, long, default_value = "")]
        department: String,
    },

    /// Delete a user account (admin)
    DeleteUser { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = cli.client.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("locker_client={},locker={},info", log_level, log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.client.client_config();
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let client = LockerClient::open(config)?;
    if let Err(e) = run(&client, cli.command).await {
        error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(client: &LockerClient, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Login { identifier, password } => {
            let session = client.auth().login(&identifier, &password).await?;
            println!("Logged in as {}", session.user.name);
        }
        Commands::AdminLogin { email, password } => {
            let session = client.auth().admin_login(&email, &password).await?;
            if !session.user.is_admin() {
                warn!("Account {} does not carry the admin role", session.user.id);
            }
            println!("Logged in as admin {}", session.user.name);
        }
        Commands::Register {
            name,
            email,
            phone,
            student_id,
            department,
            password,
        } => {
            let profile = ProfileData {
                name,
                email,
                phone,
                student_id,
                password,
                department,
            };
            register(client, profile).await?;
        }
        Commands::Logout => {
            client.auth().logout()?;
            println!("Logged out");
        }
        Commands::Whoami => match client.session().user() {
            Some(user) => println!("{}", serde_json::to_string_pretty(&user)?),
            None => println!("Not logged in"),
        },
        Commands::List => {
            let account = client.documents().load().await?;
            for doc in client.documents().documents().await {
                println!(
                    "{}  {}{}  {} bytes  {}",
                    doc.id,
                    if doc.is_favorite { "* " } else { "" },
                    doc.file_name,
                    doc.file_size,
                    doc.upload_date.format("%Y-%m-%d %H:%M")
                );
            }
            print_storage(&account);
        }
        Commands::Search { query } => {
            for doc in client.documents().search(&query).await? {
                println!("{}  {}", doc.id, doc.file_name);
            }
        }
        Commands::Upload { path } => {
            let upload = FileUpload::from_path(&path).await?;
            let outcome = client.documents().upload(upload).await?;
            if let Some(doc) = outcome.document {
                println!("Uploaded {} ({})", doc.file_name, doc.id);
            }
            print_storage(&outcome.account);
        }
        Commands::Download { id, out_dir } => {
            let blob = client.documents().download(&id).await?;
            let target = out_dir.join(&blob.file_name);
            tokio::fs::write(&target, &blob.bytes).await?;
            println!("Saved {}", target.display());
        }
        Commands::View { id } => {
            let blob = client.documents().view(&id).await?;
            let target = std::env::temp_dir().join(&blob.file_name);
            tokio::fs::write(&target, &blob.bytes).await?;
            println!("{} ({}) written to {}", blob.file_name, blob.content_type, target.display());
        }
        Commands::Delete { id } => {
            let account = client.documents().delete(&id).await?;
            println!("Deleted {}", id);
            print_storage(&account);
        }
        Commands::Favorite { id } => {
            client.documents().toggle_favorite(&id).await?;
            println!("Toggled favorite on {}", id);
        }
        Commands::Storage => {
            let account = client.documents().load().await?;
            print_storage(&account);
        }
        Commands::Users { query, department } => {
            let admin = client.admin();
            admin.refresh().await?;
            let filter = UserFilter { query, department };
            for user in admin.filtered(&filter).await {
                println!(
                    "{}  {}  {}  {}  {} bytes",
                    user.id,
                    user.name,
                    user.student_id.as_deref().unwrap_or("-"),
                    user.department.as_deref().unwrap_or("-"),
                    user.storage_used.unwrap_or(0)
                );
            }
            let total = admin.total_storage().await;
            println!(
                "Pool: {} GB of {} GB ({:.1}%)",
                total.used_gb_rounded(),
                total.quota_bytes / (1024 * 1024 * 1024),
                total.percentage()
            );
        }
        Commands::DeleteUser { id } => {
            client.admin().delete_user(&id).await?;
            println!("Deleted user {}", id);
        }
    }
    Ok(())
}

async fn register(client: &LockerClient, profile: ProfileData) -> anyhow::Result<()> {
    let flow = client.registration();
    flow.submit_profile(profile).await?;
    println!("An OTP has been sent. Enter it below (empty line resends).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while flow.phase().await == OtpPhase::AwaitingOtp {
        let Some(line) = lines.next_line().await? else {
            anyhow::bail!("stdin closed before the OTP was entered");
        };
        if line.trim().is_empty() {
            flow.resend().await?;
            println!("OTP re-sent.");
            continue;
        }
        match flow.submit_otp(&line).await {
            Ok(session) => {
                info!(user_id = %session.user.id, "Registered");
                println!("Welcome, {}", session.user.name);
            }
            Err(e @ LockerError::Validation { .. }) => println!("{}", e),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn print_storage(account: &locker_client::accounting::StorageAccount) {
    let marker = match account.severity() {
        Severity::Normal => "",
        Severity::Warning => " (warning)",
        Severity::Critical => " (critical)",
    };
    println!(
        "Storage: {} MB used, {:.1}% of quota{}",
        account.used_mb(),
        account.percentage(),
        marker
    );
}
