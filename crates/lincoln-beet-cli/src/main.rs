// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lincoln_beet::{
    Client, Error, FileStore, ImportSummary, LocalFileStore, MemoryUploader, Progress, Settings,
    TeamID, Uploader, WorkspaceID, convert_and_upload, count_files, default_buffer_dir,
    download_dataset,
};
use log::info;
use std::path::{Path, PathBuf};
use tokio::{sync::mpsc, task::JoinHandle};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Platform server address
    #[clap(long, env = "SERVER_ADDRESS")]
    server: Option<String>,

    /// Platform API token
    #[clap(long, env = "API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Team whose files hold the staged archives
    #[clap(long, env = "TEAM_ID")]
    team_id: Option<String>,

    /// Workspace the project is created in
    #[clap(long, env = "WORKSPACE_ID")]
    workspace_id: Option<String>,

    /// TOML file overriding the built-in dataset settings
    #[clap(long, env = "LINCOLN_BEET_CONFIG")]
    config: Option<PathBuf>,

    /// Convert without uploading: platform calls are recorded in memory and
    /// image files are only checked for existence.
    #[clap(long, global = true)]
    dry_run: bool,

    /// Converter Command
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Download and unpack the original archives into the buffer directory.
    Download {
        /// Local buffer directory, defaults to the user data directory
        #[clap(long)]
        buffer: Option<PathBuf>,

        /// Read the staged archives from a local directory instead of the
        /// team files
        #[clap(long)]
        staging: Option<PathBuf>,
    },
    /// Convert an already unpacked dataset and upload it.
    Convert {
        /// Dataset root, the directory the archives were unpacked in
        dataset_root: PathBuf,

        /// Project name, defaults to the configured project name
        #[clap(long)]
        project_name: Option<String>,
    },
    /// Download, unpack, convert and upload.
    Run {
        /// Local buffer directory, defaults to the user data directory
        #[clap(long)]
        buffer: Option<PathBuf>,

        /// Read the staged archives from a local directory instead of the
        /// team files
        #[clap(long)]
        staging: Option<PathBuf>,

        /// Project name, defaults to the configured project name
        #[clap(long)]
        project_name: Option<String>,
    },
    /// Print the dataset catalog record as JSON.
    Settings,
}

impl Args {
    fn client(&self) -> Result<Client, Error> {
        let server = self.server.as_deref().ok_or_else(|| {
            Error::InvalidParameters("--server or SERVER_ADDRESS is required".to_owned())
        })?;
        let token = self.token.as_deref().ok_or(Error::EmptyToken)?;
        let client = Client::new(server)?.with_token(token)?;

        match &self.team_id {
            Some(team_id) => Ok(client.with_team(team_id.parse::<TeamID>()?)),
            None => Ok(client),
        }
    }

    fn workspace_id(&self) -> Result<WorkspaceID, Error> {
        match &self.workspace_id {
            Some(workspace_id) => workspace_id.parse(),
            None if self.dry_run => Ok(WorkspaceID::from(0)),
            None => Err(Error::InvalidParameters(
                "--workspace-id or WORKSPACE_ID is required".to_owned(),
            )),
        }
    }
}

fn progress_bar(template: &str) -> (mpsc::Sender<Progress>, JoinHandle<()>) {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▇▆▅▄▃▂▁  "),
    );

    let (tx, mut rx) = mpsc::channel::<Progress>(1);
    let handle = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            if progress.total > 0 {
                bar.set_length(progress.total as u64);
                bar.set_position(progress.current as u64);
            }
        }
        bar.finish_and_clear();
    });
    (tx, handle)
}

async fn handle_download<S: FileStore>(
    store: &S,
    settings: &Settings,
    buffer: &Path,
) -> Result<PathBuf, Error> {
    let source = settings.download_original_url.as_ref().ok_or_else(|| {
        Error::InvalidSettings("download_original_url is not set".to_owned())
    })?;

    let (tx, bar) = progress_bar(
        "[{elapsed_precise}] [{wide_bar:.yellow}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    );
    let root = download_dataset(store, source, &settings.staging_dir, buffer, Some(tx)).await;
    let _ = bar.await;
    let root = root?;

    info!(
        "Dataset root {} holds {} images",
        root.display(),
        count_files(&root, ".png") + count_files(&root, ".jpg")
    );
    Ok(root)
}

async fn handle_convert<U: Uploader>(
    uploader: &U,
    settings: &Settings,
    dataset_root: &Path,
    workspace_id: WorkspaceID,
    project_name: &str,
) -> Result<ImportSummary, Error> {
    let (tx, bar) = progress_bar(
        "[{elapsed_precise} ETA: {eta}] {wide_bar:.yellow} {human_pos}/{human_len}",
    );
    let summary = convert_and_upload(
        uploader,
        settings,
        dataset_root,
        workspace_id,
        project_name,
        Some(tx),
    )
    .await;
    let _ = bar.await;
    let summary = summary?;

    println!("Project: {} ({})", summary.project.name(), summary.project.id());
    for split in &summary.splits {
        println!(
            "{}: {} images, {} boxes, {} batches (dataset {})",
            split.split,
            split.images,
            split.annotations,
            split.batches,
            split.dataset.id()
        );
    }
    Ok(summary)
}

async fn download(
    args: &Args,
    settings: &Settings,
    buffer: Option<PathBuf>,
    staging: Option<PathBuf>,
) -> Result<PathBuf, Error> {
    let buffer = match buffer {
        Some(buffer) => buffer,
        None => default_buffer_dir()?,
    };

    match staging {
        Some(staging) => handle_download(&LocalFileStore::new(staging), settings, &buffer).await,
        None => handle_download(&args.client()?, settings, &buffer).await,
    }
}

async fn convert(
    args: &Args,
    settings: &Settings,
    dataset_root: &Path,
    project_name: Option<String>,
) -> Result<(), Error> {
    settings.check_names()?;
    let project_name = project_name.unwrap_or_else(|| settings.project_name.clone());
    let workspace_id = args.workspace_id()?;

    if args.dry_run {
        let uploader = MemoryUploader::new();
        handle_convert(&uploader, settings, dataset_root, workspace_id, &project_name).await?;
        info!("Dry run: {} platform calls recorded", uploader.calls().len());
    } else {
        let client = args.client()?;
        handle_convert(&client, settings, dataset_root, workspace_id, &project_name).await?;
    }
    Ok(())
}

fn handle_settings(settings: &Settings) -> Result<(), Error> {
    let catalog = settings.catalog()?;
    println!("{}", serde_json::to_string_pretty(&catalog)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;

    match args.cmd.clone() {
        Command::Download { buffer, staging } => {
            download(&args, &settings, buffer, staging).await?;
            Ok(())
        }
        Command::Convert {
            dataset_root,
            project_name,
        } => convert(&args, &settings, &dataset_root, project_name).await,
        Command::Run {
            buffer,
            staging,
            project_name,
        } => {
            settings.check_names()?;
            let root = download(&args, &settings, buffer, staging).await?;
            convert(&args, &settings, &root, project_name).await
        }
        Command::Settings => handle_settings(&settings),
    }
}
