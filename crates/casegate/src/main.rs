// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::error;

use casegate::{AuthClient, ClientConfig, Credential, OutgoingRequest, PipelineError, Session};

/// Send one request through the authenticated pipeline.
#[derive(Debug, Parser)]
#[command(name = "casegate", version, about)]
struct Cli {
    #[command(flatten)]
    client: ClientConfig,

    /// Seed the primary credential store with this bearer token.
    #[arg(long, env = "CASEGATE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// JSON request body.
    #[arg(long)]
    data: Option<String>,

    /// Log format (text or json).
    #[arg(long, env = "CASEGATE_LOG_FORMAT", default_value = "text")]
    log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CASEGATE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// HTTP method (GET, POST, PUT, DELETE, ...).
    method: String,

    /// Path relative to the base URL, or an absolute URL.
    path: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match cli.log_format.as_str() {
        "json" => {
            fmt::fmt().with_writer(std::io::stderr).with_env_filter(filter).json().init();
        }
        _ => {
            fmt::fmt().with_writer(std::io::stderr).with_env_filter(filter).init();
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let session = Session::standard(&cli.client);
    if let Some(token) = cli.token.as_deref().and_then(Credential::new) {
        session.store.set(&token);
    }
    let client = AuthClient::new(cli.client.clone(), &session)?;
    spawn_reauth_prompt(session.clone());

    let method = reqwest::Method::from_bytes(cli.method.to_uppercase().as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid method {:?}: {e}", cli.method))?;
    let mut req = OutgoingRequest::new(method, cli.path);
    if let Some(data) = cli.data {
        let body: serde_json::Value = serde_json::from_str(&data)?;
        req = req.json(&body)?;
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let result = client.request_with_cancel(req, &cancel).await;
    session.shutdown();
    match result {
        Ok(resp) => {
            println!("{}", resp.text());
            Ok(())
        }
        Err(e) => {
            if let Some(resp) = e.response() {
                eprintln!("{}", resp.text());
            }
            Err(report(e))
        }
    }
}

fn report(e: PipelineError) -> anyhow::Error {
    anyhow::anyhow!("{} ({})", e, e.kind())
}

/// Answer re-auth signals on the terminal: a pasted token resumes queued
/// requests, an empty line abandons them.
fn spawn_reauth_prompt(session: Session) {
    let mut rx = session.bridge.subscribe();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match rx.recv().await {
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
            eprint!("Session expired. Paste a new token (empty line to cancel): ");
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => String::new(),
            };
            match Credential::new(&line) {
                Some(credential) => {
                    session.store.set(&credential);
                    session.flush().await;
                }
                None => {
                    session.abandon("re-authentication cancelled");
                }
            }
        }
    });
}
