use std::{path::PathBuf, process::ExitCode, sync::Arc};

use b2fs::{
    adapters::{b2::B2Client, s3::S3Client},
    util::{
        logger,
        object::{parse_bucket_from_uri, parse_provider_from_uri, Provider},
    },
    B2Config, Filesystem, FsError, ObjectClient, ObjectFs, TemporaryUrlOptions, WriteConfig,
};
use clap::{Parser, Subcommand};
use time::{Duration, OffsetDateTime};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, span, Instrument, Level};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "b2fs", version, about = "Filesystem operations on a B2 bucket")]
struct Cli {
    /// Bucket to operate on: b2://NAME (native API) or s3://NAME (S3-compatible API)
    bucket: String,

    #[command(flatten)]
    config: B2Config,

    /// Debug logging for this crate
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List objects under a prefix
    Ls {
        #[arg(default_value = "")]
        prefix: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Print an object to stdout
    Cat { path: String },
    /// Upload a local file, or stdin when FILE is "-"
    Put {
        path: String,
        file: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Write an empty directory marker
    Mkdir { dir: String },
    /// Delete an object
    Rm { path: String },
    /// Delete a directory marker
    Rmdir { dir: String },
    /// Print object metadata
    Stat { path: String },
    /// Print whether an object exists
    Exists { path: String },
    /// Print the public download URL
    Url { path: String },
    /// Print a download URL with a time-limited authorization token
    Presign {
        path: String,
        #[arg(long, default_value_t = 3600)]
        expires_in: i64,
        #[arg(long)]
        content_disposition: Option<String>,
    },
}

async fn connect(bucket_uri: &str, config: &B2Config) -> b2fs::Result<ObjectFs> {
    let provider = parse_provider_from_uri(bucket_uri)?;
    let bucket = parse_bucket_from_uri(bucket_uri);
    if bucket.is_empty() {
        return Err(FsError::Config(format!("no bucket name in: {}", bucket_uri)));
    }
    info!(bucket, provider = ?provider, "connecting");

    let client: Arc<dyn ObjectClient> = match provider {
        Provider::B2 => {
            config.validate()?;
            let client = B2Client::authorize(config).await.map_err(|err| FsError::Sdk {
                context: "error authorizing account",
                source: err,
            })?;
            Arc::new(client)
        }
        Provider::S3 => Arc::new(S3Client::from_env(config.require_download_url()?).await),
    };

    ObjectFs::new(client, bucket).await
}

async fn run(cli: Cli) -> CliResult<()> {
    let fs = connect(&cli.bucket, &cli.config).await?;
    let mut stdout = tokio::io::stdout();

    match cli.command {
        Command::Ls { prefix, recursive } => {
            for meta in fs.list_contents(&prefix, recursive).await? {
                stdout
                    .write_all(format!("{}\n", serde_json::to_string(&meta)?).as_bytes())
                    .await?;
            }
        }
        Command::Cat { path } => {
            stdout.write_all(&fs.read(&path).await?).await?;
        }
        Command::Put {
            path,
            file,
            content_type,
        } => {
            let config = WriteConfig { content_type };
            let meta = if file.as_os_str() == "-" {
                fs.write_stream(&path, &mut tokio::io::stdin(), &config)
                    .await?
            } else {
                let mut reader = tokio::fs::File::open(&file).await?;
                fs.write_stream(&path, &mut reader, &config).await?
            };
            stdout
                .write_all(format!("{}\n", serde_json::to_string_pretty(&meta)?).as_bytes())
                .await?;
        }
        Command::Mkdir { dir } => {
            fs.create_dir(&dir, &WriteConfig::default()).await?;
        }
        Command::Rm { path } => {
            fs.delete(&path).await?;
        }
        Command::Rmdir { dir } => {
            fs.delete_dir(&dir).await?;
        }
        Command::Stat { path } => {
            let meta = fs.get_metadata(&path).await?;
            stdout
                .write_all(format!("{}\n", serde_json::to_string_pretty(&meta)?).as_bytes())
                .await?;
        }
        Command::Exists { path } => {
            stdout
                .write_all(format!("{}\n", fs.has(&path).await?).as_bytes())
                .await?;
        }
        Command::Url { path } => {
            stdout
                .write_all(format!("{}\n", fs.get_url(&path)).as_bytes())
                .await?;
        }
        Command::Presign {
            path,
            expires_in,
            content_disposition,
        } => {
            let expiration = OffsetDateTime::now_utc() + Duration::seconds(expires_in);
            let options = TemporaryUrlOptions {
                content_disposition,
            };
            let url = fs.get_temporary_url(&path, expiration, &options).await?;
            stdout.write_all(format!("{}\n", url).as_bytes()).await?;
        }
    }

    stdout.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init_logger(cli.verbose, cli.json_logs);

    let span = span!(Level::INFO, "main", context = "main");
    match run(cli).instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<FsError>() {
                Some(fs_err) => {
                    error!(error_message=%fs_err, error_kind=%fs_err.kind(), error_code=?fs_err.code())
                }
                None => error!(error_message=%err),
            }
            eprintln!("b2fs: {}", err);
            ExitCode::FAILURE
        }
    }
}
