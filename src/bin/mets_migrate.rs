use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use mets_migrate::app::{App, ImportOptions};
use mets_migrate::config::{ConfigLoader, ConfigOverrides};
use mets_migrate::error::MigrateError;
use mets_migrate::http::{ImageClient, MetsHttpClient, RecordFetcher};
use mets_migrate::output::{ConsoleOutput, JsonOutput, OutputMode};
use mets_migrate::ruleset::Ruleset;
use mets_migrate::store::{ProcessInit, Store};
use mets_migrate::tui::Tui;

#[derive(Parser)]
#[command(name = "mets-migrate")]
#[command(about = "Migrate METS/MODS records into a local structural document")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch a record and replace the process document with it")]
    Import(ImportArgs),
    #[command(about = "Create a process directory with a skeleton document")]
    Init(InitArgs),
    #[command(about = "Show the structure of the process document")]
    Show(ShowArgs),
}

#[derive(Args)]
struct ImportArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    process_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    identifier: Option<String>,

    #[arg(long)]
    anchor_identifier: Option<String>,

    #[arg(long)]
    download_url: Option<String>,

    #[arg(long)]
    skip_images: bool,
}

#[derive(Args)]
struct InitArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    process_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    title: String,

    #[arg(long = "type")]
    top_type: String,

    #[arg(long)]
    anchor_type: Option<String>,

    #[arg(long)]
    catalog_id: String,

    #[arg(long)]
    anchor_catalog_id: Option<String>,
}

#[derive(Args)]
struct ShowArgs {
    #[arg(long)]
    process_dir: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<MigrateError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &MigrateError) -> u8 {
    match error {
        MigrateError::MissingConfig
        | MigrateError::MissingIdentifier
        | MigrateError::MissingDownloadUrl
        | MigrateError::MissingRuleset
        | MigrateError::RecordNotFound(_)
        | MigrateError::DocumentNotFound(_) => 2,
        MigrateError::RecordHttp(_)
        | MigrateError::RecordStatus { .. }
        | MigrateError::ImageHttp(_)
        | MigrateError::ImageStatus { .. }
        | MigrateError::EmptyImage(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Import(args) => {
            let store = open_store(args.process_dir.clone())?;
            let client = MetsHttpClient::new()?;
            let app = App::new(store, client.clone(), client);
            run_import(args, app, output_mode)
        }
        Commands::Init(args) => {
            let store = open_store(args.process_dir.clone())?;
            let app = App::new(store, NopClient, NopClient);
            run_init(args, app, output_mode)
        }
        Commands::Show(args) => {
            let store = open_store(args.process_dir)?;
            let app = App::new(store, NopClient, NopClient);
            run_show(app, output_mode)
        }
    }
}

fn open_store(process_dir: Option<Utf8PathBuf>) -> Result<Store, MigrateError> {
    match process_dir {
        Some(dir) => Ok(Store::new(dir)),
        None => Store::current(),
    }
}

fn run_import<F: RecordFetcher + 'static, I: ImageClient + 'static>(
    args: ImportArgs,
    app: App<F, I>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let overrides = ConfigOverrides {
        download_url: args.download_url,
        identifier: args.identifier,
        anchor_identifier: args.anchor_identifier,
    };
    let properties = app.store().load_properties()?;
    let config = ConfigLoader::resolve(args.config.as_deref(), &overrides, &properties)?;
    let ruleset = Ruleset::load(&config.ruleset)?;
    let options = ImportOptions {
        skip_images: args.skip_images,
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.import(&config, &ruleset, options, &JsonOutput)?;
            JsonOutput::print_import(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(app.store().process_root().as_str());
            let result = tui.run(move |sink| app.import(&config, &ruleset, options, sink))?;
            ConsoleOutput::print_import(&result);
        }
    }
    Ok(())
}

fn run_init<F: RecordFetcher, I: ImageClient>(
    args: InitArgs,
    app: App<F, I>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let config = ConfigLoader::load(args.config.as_deref())?;
    let ruleset_path = config.ruleset.ok_or(MigrateError::MissingRuleset)?;
    let ruleset = Ruleset::load(&ruleset_path)?;
    let init = ProcessInit {
        title: args.title,
        top_type: args.top_type,
        anchor_type: args.anchor_type,
        catalog_id: args.catalog_id,
        anchor_catalog_id: args.anchor_catalog_id,
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.init(&init, &ruleset, &JsonOutput)?;
            JsonOutput::print_init(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.init(&init, &ruleset, &ConsoleOutput)?;
            ConsoleOutput::print_init(&result);
        }
    }
    Ok(())
}

fn run_show<F: RecordFetcher, I: ImageClient>(
    app: App<F, I>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.show(&JsonOutput)?;
            JsonOutput::print_show(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.show(&ConsoleOutput)?;
            ConsoleOutput::print_show(&result);
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
struct NopClient;

impl RecordFetcher for NopClient {
    fn fetch_xml(&self, _url: &str) -> Result<String, MigrateError> {
        Err(MigrateError::RecordHttp(
            "record client not configured".to_string(),
        ))
    }
}

impl ImageClient for NopClient {
    fn download(&self, _url: &str, _destination: &std::path::Path) -> Result<(), MigrateError> {
        Err(MigrateError::ImageHttp(
            "image client not configured".to_string(),
        ))
    }
}
