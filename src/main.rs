use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use reqwest::Client;
use tokio::net::TcpListener;

use inkflow::client::{HttpTransport, LocalTransport, StageTransport};
use inkflow::config::{self, Cli, Command, KeysCommand, ServeArgs, WriteArgs};
use inkflow::controller::{DraftInput, ModelSelection, PipelineController, PipelineEvent};
use inkflow::credentials::{self, CredentialStore, FileCredentialStore};
use inkflow::dispatch::Dispatcher;
use inkflow::fetch::SourceFetcher;
use inkflow::server::{self, AppState};
use inkflow::service::WritingService;
use inkflow::{logging, ProviderTag};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let store = FileCredentialStore::new(cli.credentials_path());

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Write(args) => write(args, &store).await,
        Command::Keys(cmd) => keys(cmd, &store),
    }
}

fn local_service(http: Client, base_urls: &[(ProviderTag, String)]) -> Arc<WritingService> {
    let endpoints = config::endpoints(base_urls);
    Arc::new(WritingService::new(Dispatcher::with_endpoints(http, &endpoints)))
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let http = Client::new();
    let state = AppState::new(
        local_service(http.clone(), &args.base_urls),
        SourceFetcher::new(http),
    );

    let listener = TcpListener::bind(args.listen)
        .await
        .context("bind server listener failed")?;
    eprintln!("inkflow listening on http://{}", args.listen);
    server::serve(listener, state)
        .await
        .context("server terminated with error")
}

async fn write(args: WriteArgs, store: &dyn CredentialStore) -> anyhow::Result<()> {
    let api_key = credentials::resolve(store, args.provider, args.api_key.as_deref())?;
    let selection = ModelSelection::new(args.provider, args.model_id(), api_key);
    let http = Client::new();

    match args.server.clone() {
        Some(base_url) => {
            let transport = HttpTransport::new(http, base_url);
            let source = match &args.url {
                Some(url) => transport.fetch_source(url).await?,
                None => read_source(args.source.as_deref())?,
            };
            run_pipeline(transport, selection, &args, source).await
        }
        None => {
            let source = match &args.url {
                Some(url) => SourceFetcher::new(http.clone()).fetch(url).await?,
                None => read_source(args.source.as_deref())?,
            };
            let transport = LocalTransport::new(local_service(http, &args.base_urls));
            run_pipeline(transport, selection, &args, source).await
        }
    }
}

fn read_source(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) if path.as_os_str() == "-" => {
            std::io::read_to_string(std::io::stdin()).context("failed to read stdin")
        }
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => anyhow::bail!("either --source or --url is required"),
    }
}

/// Stage progress on stderr; the draft is echoed as it arrives.
fn progress() -> impl FnMut(PipelineEvent<'_>) {
    let mut shown = 0usize;
    move |event| match event {
        PipelineEvent::StageStarted(stage) => {
            shown = 0;
            eprintln!("==> {}", stage);
        }
        PipelineEvent::ArticleUpdated { stage, article } if stage.appends() => {
            eprint!("{}", article.get(shown..).unwrap_or_default());
            shown = article.len();
        }
        PipelineEvent::StageCompleted(stage) => eprintln!("\n<== {} done", stage),
        PipelineEvent::Failed { stage, message } => eprintln!("\n!! {} failed: {}", stage, message),
        PipelineEvent::Normalized | PipelineEvent::ArticleUpdated { .. } => {}
    }
}

async fn run_pipeline<T: StageTransport>(
    transport: T,
    selection: ModelSelection,
    args: &WriteArgs,
    source: String,
) -> anyhow::Result<()> {
    let mut controller =
        PipelineController::new(transport, selection).with_auto_review(!args.no_review);

    let input = DraftInput::new(source).with_config(args.article_config());
    controller.run_with_events(input, progress()).await?;

    for instruction in &args.revise {
        controller.revise_with_events(instruction, progress()).await?;
    }

    println!("{}", controller.article());
    Ok(())
}

fn keys(cmd: KeysCommand, store: &FileCredentialStore) -> anyhow::Result<()> {
    match cmd {
        KeysCommand::Set { provider, key } => {
            store.set(provider, &key)?;
            eprintln!("{} key saved to {}", provider.display_name(), store.path().display());
        }
        KeysCommand::List => {
            let keys = store.load_all()?;
            for tag in ProviderTag::ALL {
                let state = if keys.contains_key(&tag) { "configured" } else { "-" };
                println!("{:<10} {}", tag.as_str(), state);
            }
        }
    }
    Ok(())
}
