use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use onedrive_core::{ConflictBehavior, CopyOutcome, DriveItem, OneDriveClient, sha1_file};

use crate::auth;
use crate::config::Config;
use crate::sync::{BackupOptions, BackupOutcome, backup_file, download_to_path, upload_from_path};

#[derive(Debug, Parser)]
#[command(name = "onedrive-sync", version, about = "Path based OneDrive file operations")]
pub struct Cli {
    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in through the browser and cache the token
    Login,
    /// Remove the cached token
    Logout,
    /// Print item metadata as JSON
    Stat { path: String },
    /// Print whether an item exists
    Exists { path: String },
    /// Print the SHA-1 of a remote file
    Sha1 { path: String },
    /// Create a folder
    Mkdir {
        /// Create missing parent folders as well
        #[arg(short, long)]
        parents: bool,
        path: String,
    },
    /// Delete a file or folder
    Rm { path: String },
    /// Copy on the server; an identical destination is left alone
    Cp {
        src: String,
        dst: String,
        /// Wait for the copy job to finish
        #[arg(long)]
        wait: bool,
    },
    /// Move an item into another folder
    Mv { src: String, dst_dir: String },
    /// Rename an item in place
    Rename { src: String, name: String },
    /// Upload a local file
    Put {
        local: PathBuf,
        remote: String,
        #[arg(long, default_value_t = ConflictBehavior::Replace)]
        conflict: ConflictBehavior,
    },
    /// Download a remote file
    Get { remote: String, local: PathBuf },
    /// Print the SHA-1 of a local file
    Hash { local: PathBuf },
    /// Update REMOTE_DST from LOCAL, copying REMOTE_SRC server-side when it matches
    Backup {
        local: PathBuf,
        remote_src: String,
        remote_dst: String,
        #[arg(long, default_value_t = ConflictBehavior::Replace)]
        conflict: ConflictBehavior,
    },
}

pub async fn execute(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Login => {
            auth::interactive_login(config).await?;
            println!("Signed in. Token saved to {}", config.token_file.display());
        }
        Command::Logout => auth::logout(config)?,
        Command::Hash { local } => {
            let sha1 = hash_local(local.clone())
                .await
                .with_context(|| format!("failed to hash {}", local.display()))?;
            println!("{sha1}");
        }
        Command::Stat { path } => {
            let item = connect(config).await?.get_metadata(&path).await?;
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
        Command::Exists { path } => {
            println!("{}", connect(config).await?.exists(&path).await?);
        }
        Command::Sha1 { path } => {
            let sha1 = connect(config)
                .await?
                .get_sha1(&path)
                .await?
                .with_context(|| format!("{path} has no SHA-1 hash"))?;
            println!("{sha1}");
        }
        Command::Mkdir { parents, path } => {
            let item = connect(config).await?.mkdir(&path, parents).await?;
            print_item(&item);
        }
        Command::Rm { path } => {
            connect(config).await?.delete(&path).await?;
        }
        Command::Cp { src, dst, wait } => {
            match connect(config).await?.copy(&src, &dst).await? {
                CopyOutcome::UpToDate(item) => {
                    println!("{dst} is already up to date");
                    print_item(&item);
                }
                CopyOutcome::Started(operation) if wait => {
                    let done = operation
                        .with_poll_interval(config.poll_interval)
                        .with_timeout(config.copy_timeout)
                        .wait()
                        .await?;
                    match done.resource_location {
                        Some(location) => println!("copied: {location}"),
                        None => println!("copied"),
                    }
                }
                CopyOutcome::Started(operation) => {
                    println!("copy started: {}", operation.location());
                }
            }
        }
        Command::Mv { src, dst_dir } => {
            let item = connect(config).await?.move_item(&src, &dst_dir).await?;
            print_item(&item);
        }
        Command::Rename { src, name } => {
            let item = connect(config).await?.rename(&src, &name).await?;
            print_item(&item);
        }
        Command::Put {
            local,
            remote,
            conflict,
        } => {
            let client = connect(config).await?;
            let uploaded = upload_from_path(&client, &local, &remote, conflict).await?;
            let verb = if uploaded.replaced { "replaced" } else { "created" };
            println!("{verb}");
            print_item(&uploaded.item);
        }
        Command::Get { remote, local } => {
            let client = connect(config).await?;
            let expected = client.get_sha1(&remote).await?;
            let sha1 = download_to_path(&client, &remote, &local, expected.as_deref()).await?;
            println!("{sha1}  {}", local.display());
        }
        Command::Backup {
            local,
            remote_src,
            remote_dst,
            conflict,
        } => {
            let client = connect(config).await?;
            let options = BackupOptions {
                conflict,
                poll_interval: config.poll_interval,
                copy_timeout: Some(config.copy_timeout),
            };
            match backup_file(&client, &local, &remote_src, &remote_dst, &options).await? {
                BackupOutcome::UpToDate(_) => println!("{remote_dst} is already up to date"),
                BackupOutcome::Copied(_) => println!("copied {remote_src} to {remote_dst}"),
                BackupOutcome::Uploaded(uploaded) => {
                    println!("uploaded {}", local.display());
                    print_item(&uploaded.item);
                }
            }
        }
    }
    Ok(())
}

async fn connect(config: &Config) -> anyhow::Result<OneDriveClient> {
    auth::connect(config).await
}

async fn hash_local(local: PathBuf) -> anyhow::Result<String> {
    Ok(tokio::task::spawn_blocking(move || sha1_file(&local)).await??)
}

fn print_item(item: &DriveItem) {
    match item.sha1() {
        Some(sha1) => println!("{}\t{}\t{sha1}", item.id, item.name),
        None => println!("{}\t{}", item.id, item.name),
    }
}
