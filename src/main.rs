use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use remote_docstore::cli::Cli;
use remote_docstore::http_server::{self, AppState};
use remote_docstore::store::{self, StoreLocation};
use remote_docstore::{
    ConnectError, DocumentStore, MatcherCompiler, ReadTranslator, StorageGateway, WriteTranslator,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = match open_store(&cli) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("init error: {}", e);
            return ExitCode::from(2);
        }
    };

    tracing::info!(
        store = store.name(),
        database = %cli.database,
        collection = %cli.collection,
        missing_label = ?cli.missing_label,
        "connected to store"
    );

    let gateway = StorageGateway::new(store, cli.deadlines());
    let state = AppState {
        writer: WriteTranslator::new(gateway.clone()),
        reader: ReadTranslator::new(gateway, MatcherCompiler::new(cli.missing_label)),
    };
    let app = http_server::router(state, cli.max_body_bytes);

    if let Err(e) = http_server::serve(&cli.address, app).await {
        tracing::error!("listen error on {}: {}", cli.address, e);
        return ExitCode::from(3);
    }

    ExitCode::SUCCESS
}

fn open_store(
    cli: &Cli,
) -> Result<std::sync::Arc<dyn DocumentStore>, ConnectError> {
    let location: StoreLocation = cli.store_url.parse()?;
    store::connect(&location, &cli.database, &cli.collection)
}
