use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use feedport::config::Config;
use feedport::feed::{export_to_file, FolderNode, FolderTree};
use feedport::import::{OpmlExporter, OpmlImporter, ReaderImporter, TracingReporter};
use feedport::reader::ReaderClient;
use feedport::storage::{Database, DatabaseError, OAuthCredential, User};

/// Largest OPML upload accepted from disk.
const MAX_OPML_SIZE: u64 = 10 * 1024 * 1024;

/// Get the config directory path (~/.config/feedport/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("feedport");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(name = "feedport", about = "Import and export feed subscriptions")]
struct Args {
    /// Config file (default: ~/.config/feedport/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user
    AddUser {
        username: String,
        /// Paid tier: imported subscriptions start active
        #[arg(long)]
        premium: bool,
    },
    /// Store the reader-service token for a user (read from FEEDPORT_ACCESS_TOKEN
    /// and FEEDPORT_TOKEN_SECRET)
    StoreCredential {
        username: String,
        /// Seconds until the token expires
        #[arg(long, value_name = "SECS")]
        expires_in: Option<i64>,
    },
    /// Export a user's subscriptions as OPML
    Export {
        username: String,
        /// Write to this file instead of stdout
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Replace a user's subscriptions and folders with an OPML file
    ImportOpml { username: String, file: PathBuf },
    /// Import subscriptions from the reader service
    ImportReader {
        username: String,
        /// Use a saved subscription list instead of fetching it
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
        /// Activate subscriptions even for non-premium users
        #[arg(long)]
        auto_active: bool,
    },
    /// Import starred items from the reader service
    ImportStarred {
        username: String,
        /// Number of items to request (default from config)
        #[arg(long)]
        count: Option<u32>,
    },
    /// Print a user's folder tree
    ShowFolders { username: String },
}

/// Read a user-supplied file, refusing non-regular and oversized files.
fn read_input_file(path: &Path) -> Result<String> {
    // SEC-008: Canonicalize to resolve symlinks and prevent path traversal
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve input file: {}", path.display()))?;

    let metadata = std::fs::metadata(&canonical)?;
    if !metadata.is_file() {
        anyhow::bail!("Input path must be a regular file");
    }
    if metadata.len() > MAX_OPML_SIZE {
        anyhow::bail!(
            "Input file is {} bytes (max {} bytes)",
            metadata.len(),
            MAX_OPML_SIZE
        );
    }

    std::fs::read_to_string(&canonical)
        .with_context(|| format!("Failed to read input file: {}", canonical.display()))
}

async fn find_user(db: &Database, username: &str) -> Result<User> {
    db.get_user_by_name(username)
        .await
        .context("Failed to look up user")?
        .ok_or_else(|| anyhow::anyhow!("No such user: {}", username))
}

fn print_tree(tree: &FolderTree, titles: &HashMap<i64, String>, depth: usize) {
    let indent = "  ".repeat(depth);
    for node in tree {
        match node {
            FolderNode::Feed(feed_id) => match titles.get(feed_id) {
                Some(title) => println!("{}- {} [{}]", indent, title, feed_id),
                None => println!("{}- (not subscribed) [{}]", indent, feed_id),
            },
            FolderNode::Folder { name, children } => {
                println!("{}{}/", indent, name);
                print_tree(children, titles, depth + 1);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    // SEC-007: Set directory permissions on Unix (user-only access)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = config.database_path_in(&config_dir);
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: The database is locked by another feedport process. Please try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    match args.command {
        Command::AddUser { username, premium } => {
            let user_id = db
                .create_user(&username, premium)
                .await
                .with_context(|| format!("Failed to create user {}", username))?;
            println!("Created user {} (id {})", username, user_id);
        }

        Command::StoreCredential {
            username,
            expires_in,
        } => {
            let user = find_user(&db, &username).await?;
            let access_token = std::env::var("FEEDPORT_ACCESS_TOKEN")
                .context("FEEDPORT_ACCESS_TOKEN environment variable not set")?;
            let token_secret = std::env::var("FEEDPORT_TOKEN_SECRET").unwrap_or_default();
            let credential = OAuthCredential {
                access_token: SecretString::from(access_token),
                token_secret: SecretString::from(token_secret),
                expires_at: expires_in.map(|secs| chrono::Utc::now().timestamp() + secs),
            };
            db.store_credential(user.id, &credential)
                .await
                .context("Failed to store credential")?;
            println!("Stored reader credential for {}", username);
        }

        Command::Export { username, output } => {
            let user = find_user(&db, &username).await?;
            let exporter = OpmlExporter::new(db.clone(), user.id);
            match output {
                Some(path) => {
                    let document = exporter.document().await.context("Failed to export")?;
                    export_to_file(&document, &path)?;
                    println!("Exported {} outlines to {}", document.outlines.len(), path.display());
                }
                None => {
                    let opml = exporter.process().await.context("Failed to export")?;
                    println!("{}", opml);
                }
            }
        }

        Command::ImportOpml { username, file } => {
            let user = find_user(&db, &username).await?;
            let opml = read_input_file(&file)?;

            let upload_id = db
                .save_uploaded_opml(user.id, &opml)
                .await
                .context("Failed to archive uploaded OPML")?;
            tracing::debug!(user_id = user.id, upload_id, "Archived uploaded OPML");

            let importer = OpmlImporter::new(db.clone(), user.id)
                .with_config(&config)
                .with_reporter(Arc::new(TracingReporter));
            let expected = importer
                .count_feeds_in_opml(&opml)
                .await
                .context("Failed to read OPML")?;
            println!("Importing about {} entries...", expected);

            let folders = importer
                .try_processing(&opml)
                .await
                .context("OPML import failed")?;
            println!(
                "Imported {} feeds in {} folders",
                folders.feed_ids().len(),
                folders.folder_count()
            );
        }

        Command::ImportReader {
            username,
            file,
            auto_active,
        } => {
            let user = find_user(&db, &username).await?;
            let xml = file.as_deref().map(read_input_file).transpose()?;

            let client =
                ReaderClient::new(db.clone(), &config.reader_base_url, config.request_timeout())?;
            let importer = ReaderImporter::new(db.clone(), client, user.id).with_config(&config);
            match importer
                .import_feeds(xml.as_deref(), auto_active)
                .await
                .context("Reader import failed")?
            {
                Some(folders) => println!(
                    "Imported {} feeds in {} folders",
                    folders.feed_ids().len(),
                    folders.folder_count()
                ),
                None => println!("No subscription list available"),
            }
        }

        Command::ImportStarred { username, count } => {
            let user = find_user(&db, &username).await?;
            let client =
                ReaderClient::new(db.clone(), &config.reader_base_url, config.request_timeout())?;
            let importer = ReaderImporter::new(db.clone(), client, user.id).with_config(&config);
            let starred = importer
                .import_starred_items(count)
                .await
                .context("Starred import failed")?;
            println!("Starred {} stories", starred);
        }

        Command::ShowFolders { username } => {
            let user = find_user(&db, &username).await?;
            let titles: HashMap<i64, String> = db
                .subscribed_feeds(user.id)
                .await?
                .into_iter()
                .map(|feed| (feed.feed_id, feed.display_title().to_string()))
                .collect();
            match db.get_folders(user.id).await? {
                Some(folders) => print_tree(&folders.folders, &titles, 0),
                None => println!("{} has no folders", username),
            }
        }
    }

    Ok(())
}
