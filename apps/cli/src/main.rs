use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dp_client_core::{
    settings::{load_settings, Settings},
    InputArtifact, JobSession, SubmissionOutcome,
};
use dp_shared::domain::{column_tokens, Mode, MlField, NoiseField};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "dp-submit",
    about = "Submit a CSV file for differential-privacy noise addition or accuracy comparison"
)]
struct Cli {
    /// Processing service endpoint (overrides dp_client.toml and env).
    #[arg(long, global = true)]
    endpoint: Option<String>,
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    /// Directory processed files are saved into.
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add calibrated noise to selected columns and download the result.
    Noise {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "")]
        private: String,
        #[arg(long, default_value = "")]
        binary: String,
        #[arg(long, default_value = "")]
        categorical: String,
        #[arg(long, default_value = "")]
        numerical: String,
        /// Epsilon, delta, sensitivity (comma-separated).
        #[arg(long, default_value = "")]
        epsilon: String,
    },
    /// Compare model accuracy on raw versus noise-protected data.
    Ml {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "")]
        input_columns: String,
        #[arg(long, default_value = "")]
        output_column: String,
        /// 1/classification, 2/regression or 3/clustering.
        #[arg(long, default_value = "1")]
        algorithm: String,
        #[arg(long, default_value = "")]
        train_test: String,
        /// Epsilon, L2 norm bound, clusters (comma-separated).
        #[arg(long, default_value = "")]
        ml_params: String,
    },
    /// Interactive session reading commands from stdin.
    Session,
}

fn apply_overrides(mut settings: Settings, cli: &Cli) -> Settings {
    if let Some(endpoint) = &cli.endpoint {
        settings.endpoint_url = endpoint.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        settings.request_timeout_secs = secs;
    }
    if let Some(dir) = &cli.out_dir {
        settings.download_dir = dir.clone();
    }
    settings
}

async fn select_file(session: &JobSession, path: &Path) -> Result<()> {
    let artifact = InputArtifact::from_path(path).await?;
    if !session.select_files(vec![artifact]).await {
        bail!("'{}' was not accepted: select a single .csv file", path.display());
    }
    Ok(())
}

fn print_outcome(outcome: &SubmissionOutcome) {
    match outcome {
        SubmissionOutcome::Downloaded { file_name, path } => {
            println!("saved {file_name} to {}", path.display());
        }
        SubmissionOutcome::Scored(results) => {
            let (non_private, private) = results.percentages();
            println!("non-private accuracy: {non_private}");
            println!("private accuracy:     {private}");
        }
    }
}

async fn submit_once(session: &JobSession) -> Result<()> {
    match session.submit().await {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(err) if err.is_precondition() => bail!("{}", err.user_message()),
        Err(err) => bail!("{} (cause logged above)", err.user_message()),
    }
}

async fn show(session: &JobSession) {
    let mode = session.mode().await;
    println!("mode: {mode}");
    println!(
        "file: {}",
        session
            .current_file_name()
            .await
            .unwrap_or_else(|| "(none)".to_string())
    );
    match mode {
        Mode::Noise => {
            let config = session.noise_snapshot().await;
            for field in NoiseField::ALL {
                let raw = config.get(*field);
                println!("  {field} = {raw:?} -> {:?}", column_tokens(raw));
            }
        }
        Mode::Ml => {
            for (key, value) in session.ml_snapshot().await.form_fields() {
                println!("  {key} = {value:?}");
            }
        }
    }
    if let Some(results) = session.results().await {
        let (non_private, private) = results.percentages();
        println!("last results: non-private {non_private}, private {private}");
    }
    if let Some(message) = session.last_error().await {
        println!("last error: {message}");
    }
}

const SESSION_HELP: &str = "commands:
  file <path>          select the input csv
  mode noise|ml        switch workflow (field values are kept per mode)
  set <key> <value>    set a field of the active mode by its form key
  show                 print the current session
  submit               send the job
  quit";

async fn run_session(session: &JobSession) -> Result<()> {
    println!("{SESSION_HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let result = match command {
            "" => Ok(()),
            "file" => select_file(session, Path::new(rest)).await,
            "mode" => match rest.parse::<Mode>() {
                Ok(mode) => {
                    session.set_mode(mode).await;
                    Ok(())
                }
                Err(err) => Err(err.into()),
            },
            "set" => {
                let (key, value) = rest.split_once(' ').unwrap_or((rest, ""));
                session
                    .set_field(key, value.trim())
                    .await
                    .map_err(anyhow::Error::from)
            }
            "show" => {
                show(session).await;
                Ok(())
            }
            "submit" => submit_once(session).await,
            "help" => {
                println!("{SESSION_HELP}");
                Ok(())
            }
            "quit" | "exit" => break,
            other => Err(anyhow::anyhow!("unknown command '{other}' (try 'help')")),
        };
        if let Err(err) = result {
            println!("error: {err:#}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let settings = apply_overrides(load_settings(), &cli);
    let session = JobSession::from_settings(&settings)?;
    info!(
        endpoint = %settings.endpoint_url,
        download_dir = %settings.download_dir.display(),
        "session ready"
    );

    match cli.command {
        Command::Noise {
            file,
            private,
            binary,
            categorical,
            numerical,
            epsilon,
        } => {
            select_file(&session, &file).await?;
            for (field, value) in [
                (NoiseField::Private, private),
                (NoiseField::Binary, binary),
                (NoiseField::Categorical, categorical),
                (NoiseField::Numerical, numerical),
                (NoiseField::Epsilon, epsilon),
            ] {
                session.set_noise_field(field, value).await;
            }
            submit_once(&session).await?;
        }
        Command::Ml {
            file,
            input_columns,
            output_column,
            algorithm,
            train_test,
            ml_params,
        } => {
            select_file(&session, &file).await?;
            session.set_mode(Mode::Ml).await;
            for (field, value) in [
                (MlField::InputColumns, input_columns),
                (MlField::OutputColumn, output_column),
                (MlField::Algorithm, algorithm),
                (MlField::TrainTest, train_test),
                (MlField::MlParams, ml_params),
            ] {
                session
                    .set_ml_field(field, value)
                    .await
                    .with_context(|| format!("invalid {field} value"))?;
            }
            submit_once(&session).await?;
        }
        Command::Session => run_session(&session).await?,
    }

    Ok(())
}
