use clap::Parser;
use tower_lsp::{LspService, Server};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt, reload};

use fusion_lsp::Backend;

/// Language server for Neos Fusion, AFX and EEL.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Log filter (`error`, `warn`, `info`, `debug`, `trace` or an
    /// `EnvFilter` directive).  `RUST_LOG` takes precedence when set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);
    // stdout carries the protocol.
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .init();

    let (service, socket) = LspService::new(move |client| Backend::new(client).with_log_handle(handle));
    Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
        .serve(service)
        .await;
}
