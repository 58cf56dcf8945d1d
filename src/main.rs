use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use proctor::chat::{MessageWriter, SendError};
use proctor::config::Config;
use proctor::crypto::EncryptionCodec;
use proctor::db::models::MessageKind;
use proctor::db::sqlite::SqliteDatabase;
use proctor::db::traits::Database;
use proctor::moderation::gate::{Decision, ModerationGate};
use proctor::moderation::lexicon::Lexicon;

/// Proctor: content integrity and secure messaging for the campus platform.
///
/// Gates every free-text submission through the toxicity classifier,
/// stores chat bodies encrypted at rest, and fans @mentions out into
/// notifications — atomically.
#[derive(Parser)]
#[command(name = "proctor", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and configuration
    Init,

    /// Generate a fresh base64 encryption key for .env
    Keygen,

    /// Create a platform user
    AddUser {
        /// The username (letters, digits, . _ -)
        username: String,
    },

    /// Add a user to a chat room
    JoinRoom {
        /// The room id
        room: i64,
        /// The username to add
        username: String,
    },

    /// Score a piece of text without persisting anything
    Moderate {
        /// The text to score
        text: String,

        /// Emit the verdict as JSON (for scripting)
        #[arg(long)]
        json: bool,
    },

    /// Send a chat message through the full pipeline
    Send {
        /// The room id
        room: i64,
        /// The sender's username
        sender: String,
        /// The message body
        text: String,
        /// Optional attachment reference (marks the message as a file)
        #[arg(long)]
        attachment: Option<String>,
    },

    /// Fetch a room's messages in display order
    Fetch {
        /// The room id
        room: i64,

        /// How many messages to read (default: 50)
        #[arg(long, default_value = "50")]
        limit: u32,

        /// How many newest messages to skip (default: 0)
        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// List a user's notifications
    Notifications {
        /// The recipient's username
        username: String,
    },

    /// Mark a notification as read
    MarkRead {
        /// The notification id
        id: i64,
    },

    /// Delete notifications older than the retention window
    Sweep {
        /// Retention window in days (default: 90)
        #[arg(long, default_value = "90")]
        days: i64,
    },

    /// Show system status (DB stats, unread totals)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("proctor=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Init => {
            info!("Initializing Proctor database...");
            let conn = proctor::db::initialize(&config.db_path)?;
            let db = SqliteDatabase::new(conn);
            let table_count = db.table_count().await?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nNext step: run `proctor keygen` and put the key in your .env");
        }

        Commands::Keygen => {
            println!("PROCTOR_ENCRYPTION_KEY={}", EncryptionCodec::generate_key_base64());
        }

        Commands::AddUser { username } => {
            let db = open_database(&config)?;
            let id = db.create_user(&username).await?;
            println!("Created user {} (id {id})", username.bold());
        }

        Commands::JoinRoom { room, username } => {
            let db = open_database(&config)?;
            let user = require_user(db.as_ref(), &username).await?;
            db.add_room_member(room, user.id).await?;
            println!("{} joined room {room}", user.username.bold());
        }

        Commands::Moderate { text, json } => {
            let gate = build_gate(&config);
            let verdict = gate.verdict(&text);

            if json {
                let payload = serde_json::json!({
                    "decision": verdict.decision.as_str(),
                    "score": verdict.score,
                    "sentiment": verdict.sentiment.as_str(),
                    "flagged_terms": verdict.flagged_terms,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                let label = match verdict.decision {
                    Decision::Pass => "PASS".green().bold(),
                    Decision::Block => "BLOCK".red().bold(),
                };
                println!("{label}  score {:.2}  sentiment {}", verdict.score, verdict.sentiment);
                for term in &verdict.flagged_terms {
                    println!("  flagged: {} ({})", term.term.yellow(), term.severity);
                }
            }
        }

        Commands::Send {
            room,
            sender,
            text,
            attachment,
        } => {
            let db = open_database(&config)?;
            let user = require_user(db.as_ref(), &sender).await?;
            let writer = build_writer(&config, db)?;

            let kind = if attachment.is_some() {
                MessageKind::File
            } else {
                MessageKind::Text
            };

            match writer.send(room, user.id, &text, kind, attachment).await {
                Ok(message) => {
                    println!(
                        "Message {} sent to room {room} at {}",
                        message.id,
                        message.created_at.dimmed()
                    );
                }
                Err(SendError::Blocked(blocked)) => {
                    println!(
                        "{} score {:.2} is over the threshold",
                        "Message rejected:".red().bold(),
                        blocked.score
                    );
                    for term in &blocked.flagged_terms {
                        println!("  flagged: {} ({})", term.term.yellow(), term.severity);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        Commands::Fetch { room, limit, offset } => {
            let db = open_database(&config)?;
            let writer = build_writer(&config, db)?;
            let messages = writer.fetch(room, limit, offset).await?;

            if messages.is_empty() {
                println!("No messages in room {room}.");
            }
            for message in messages {
                println!(
                    "[{}] user#{} ({}): {}",
                    message.created_at.dimmed(),
                    message.sender_id,
                    message.kind,
                    message.content
                );
            }
        }

        Commands::Notifications { username } => {
            let db = open_database(&config)?;
            let user = require_user(db.as_ref(), &username).await?;
            let unread = db.unread_count(user.id).await?;
            let notifications = db.list_notifications(user.id, 50).await?;

            println!("{} notifications, {unread} unread\n", notifications.len());
            for n in notifications {
                let marker = if n.read { " " } else { "*" };
                println!("{marker} [{}] {} — {} ({})", n.id, n.title.bold(), n.body, n.kind.dimmed());
            }
        }

        Commands::MarkRead { id } => {
            let db = open_database(&config)?;
            if db.mark_read(id).await? {
                println!("Notification {id} marked read.");
            } else {
                println!("No notification with id {id}.");
            }
        }

        Commands::Sweep { days } => {
            let db = open_database(&config)?;
            let removed = db.sweep_notifications(days).await?;
            println!("Removed {removed} notifications older than {days} days.");
        }

        Commands::Status => {
            let db = open_database(&config)?;
            let tables = db.table_count().await?;
            let messages = db.message_count().await?;
            let (total, unread) = db.notification_counts().await?;

            println!("Database: {}", config.db_path);
            println!("  tables: {tables}");
            println!("  messages: {messages}");
            println!("  notifications: {total} ({unread} unread)");
            println!(
                "  encryption key: {}",
                if config.encryption_key.is_empty() {
                    "not set".red().to_string()
                } else {
                    "configured".green().to_string()
                }
            );
            println!("  block threshold: {:.2}", config.block_threshold);
        }
    }

    Ok(())
}

fn open_database(config: &Config) -> Result<Arc<dyn Database>> {
    let conn = proctor::db::open(&config.db_path)?;
    Ok(Arc::new(SqliteDatabase::new(conn)))
}

fn build_gate(config: &Config) -> ModerationGate {
    let lexicon = Arc::new(Lexicon::builtin().with_block_threshold(config.block_threshold));
    ModerationGate::new(lexicon)
}

fn build_writer(config: &Config, db: Arc<dyn Database>) -> Result<MessageWriter> {
    config.require_encryption_key()?;
    let codec = EncryptionCodec::from_base64(&config.encryption_key)?;
    Ok(MessageWriter::new(db, build_gate(config), codec))
}

async fn require_user(db: &dyn Database, username: &str) -> Result<proctor::db::models::User> {
    db.get_user_by_username(username).await?.ok_or_else(|| {
        anyhow::anyhow!("No such user: {username}. Run `proctor add-user {username}` first.")
    })
}
