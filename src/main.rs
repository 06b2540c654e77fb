use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use costquery::config::QuerySettings;
use costquery::kubernetes::ClientFactory;
use costquery::report;
use costquery_api::CostQuery;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Query cost allocations through the Kubernetes API server proxy
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Kubeconfig file (defaults to $KUBECONFIG, then ~/.kube/config)
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Proxy path of the cost service on the API server
    #[arg(long)]
    proxy_path: Option<String>,

    /// Cost window, e.g. 1h, 24h, 7d
    #[arg(short, long)]
    window: Option<String>,

    /// Allocation filter expression
    #[arg(short, long)]
    filter: Option<String>,

    /// Settings file (defaults to <config dir>/costquery/config.json)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write the effective settings to the settings file before querying
    #[arg(long)]
    save_settings: bool,

    /// Print the response body as pretty JSON instead of a report
    #[arg(long)]
    raw: bool,
}

impl Args {
    fn settings_path(&self) -> Result<PathBuf, costquery::config::SettingsError> {
        match &self.settings {
            Some(path) => Ok(path.clone()),
            None => QuerySettings::settings_path(),
        }
    }

    /// File settings with command line flags applied on top
    fn apply(&self, mut settings: QuerySettings) -> QuerySettings {
        if let Some(path) = &self.kubeconfig {
            settings.kubeconfig = Some(path.clone());
        }
        if let Some(proxy_path) = &self.proxy_path {
            settings.proxy_path = proxy_path.clone();
        }
        if let Some(window) = &self.window {
            settings.window = window.clone();
        }
        if let Some(filter) = &self.filter {
            settings.filter = filter.clone();
        }
        settings
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let settings_path = args.settings_path()?;
    let settings = args.apply(QuerySettings::load_from(&settings_path)?);
    if args.save_settings {
        settings.save_to(&settings_path)?;
    }

    let factory = ClientFactory::new();
    let client = factory.cost_client(settings.kubeconfig.as_deref(), &settings.proxy_path)?;
    println!("Server URL: {}", client.base_url());

    let query = CostQuery::new(settings.window.clone(), settings.filter.clone());

    if args.raw {
        let body = client.query_raw(&query).await?;
        let mut stdout = io::stdout().lock();
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => writeln!(stdout, "{}", serde_json::to_string_pretty(&value)?)?,
            Err(_) => writeln!(stdout, "{}", body)?,
        }
    } else {
        let response = client.query(&query).await?;
        report::write_report(&mut io::stdout().lock(), &response)?;
    }

    factory.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::debug!("Starting costquery v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Query failed: {}", error_chain(e.as_ref()));
            ExitCode::FAILURE
        }
    }
}

/// Render an error followed by each of its causes
fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        // thiserror messages often embed their source already
        if !rendered.ends_with(&cause_text) {
            rendered.push_str(": caused by: ");
            rendered.push_str(&cause_text);
        }
        source = cause.source();
    }
    rendered
}
