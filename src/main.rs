use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{error, info};

use ragline_core::{
    CompletionClient, EmbeddingClient, IncomingTextMessage, PipelineConfig, VectorStoreGateway,
};
use ragline_kafka::{KafkaRestConfig, KafkaRestConsumer, LineStream, TextPublisher};
use ragline_ollama::OllamaClient;
use ragline_pipeline::{IngestionPipeline, RetrievalPipeline};
use ragline_store::QdrantGateway;

mod logging;
mod server;
mod supervisor;

use server::AppState;
use supervisor::{SupervisorPolicy, run_alongside, supervise};

#[derive(Parser)]
#[command(name = "ragline")]
#[command(about = "Stream-fed retrieval-augmented generation service", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API and run ingestion in the background
    Serve {
        #[arg(long, env = "HOST", default_value = "127.0.0.1")]
        host: String,

        #[arg(long, env = "PORT", default_value_t = 8000)]
        port: u16,

        /// Exit on the first ingestion failure instead of restarting
        #[arg(long)]
        halt_on_error: bool,

        /// Serve queries only
        #[arg(long)]
        no_ingest: bool,
    },
    /// Run ingestion only
    Ingest {
        /// Read newline-delimited JSON messages from stdin instead of Kafka
        #[arg(long)]
        stdin: bool,

        /// Exit on the first ingestion failure instead of restarting
        #[arg(long)]
        halt_on_error: bool,
    },
    /// Answer one query from the command line
    Ask {
        query: String,

        /// Print the retrieved context instead of calling the model
        #[arg(long)]
        context_only: bool,
    },
    /// Create the vector collection if it is missing
    Migrate,
    /// Publish a text message onto the ingestion topic
    Publish { text: String },
}

/// Shared clients, built once at startup.
struct Services {
    config: PipelineConfig,
    ollama: Arc<OllamaClient>,
    store: Arc<dyn VectorStoreGateway>,
}

impl Services {
    fn from_env() -> Result<Self> {
        let config = PipelineConfig::from_env().context("invalid pipeline configuration")?;
        let ollama = OllamaClient::from_env(&config.pool).context("invalid Ollama configuration")?;
        let store =
            QdrantGateway::from_env(&config.pool).context("invalid Qdrant configuration")?;
        Ok(Self {
            config,
            ollama: Arc::new(ollama),
            store: Arc::new(store),
        })
    }

    fn embedder(&self) -> Arc<dyn EmbeddingClient> {
        self.ollama.clone()
    }

    fn completion(&self) -> Arc<dyn CompletionClient> {
        self.ollama.clone()
    }

    fn ingestion(&self) -> Result<IngestionPipeline> {
        Ok(IngestionPipeline::new(
            &self.config,
            self.embedder(),
            self.store.clone(),
        )?)
    }

    fn retrieval(&self) -> RetrievalPipeline {
        RetrievalPipeline::new(
            &self.config,
            self.embedder(),
            self.store.clone(),
            self.completion(),
        )
    }

    fn supervisor_policy(&self, halt_on_error: bool) -> SupervisorPolicy {
        SupervisorPolicy {
            restart_delay: self.config.restart_delay,
            halt_on_error,
        }
    }
}

/// Shutdown signal flipped on Ctrl-C or by the caller through the sender.
fn shutdown_on_ctrl_c() -> (Arc<watch::Sender<bool>>, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    let tx = Arc::new(tx);
    let signal = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal.send_replace(true);
        }
    });
    (tx, rx)
}

async fn run_kafka_ingestion(
    pipeline: &IngestionPipeline,
    policy: SupervisorPolicy,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let kafka = KafkaRestConfig::from_env().context("invalid Kafka configuration")?;
    supervise(
        pipeline,
        || KafkaRestConsumer::connect(kafka.clone()),
        policy,
        shutdown,
    )
    .await
}

async fn serve(
    services: Services,
    addr: SocketAddr,
    halt_on_error: bool,
    no_ingest: bool,
) -> Result<()> {
    services
        .store
        .ensure_collection()
        .await
        .context("failed to prepare the vector collection")?;

    let (stop, shutdown) = shutdown_on_ctrl_c();
    let publisher = match KafkaRestConfig::from_env().and_then(TextPublisher::new) {
        Ok(publisher) => Some(Arc::new(publisher)),
        Err(e) => {
            error!(error = %e, "publishing disabled");
            None
        }
    };

    let mut state = AppState {
        retrieval: Arc::new(services.retrieval()),
        ingestion: None,
        publisher,
    };

    let ingestion_task = if no_ingest {
        None
    } else {
        let pipeline = services.ingestion()?;
        state.ingestion = Some(pipeline.subscribe_state());
        let policy = services.supervisor_policy(halt_on_error);
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            run_kafka_ingestion(&pipeline, policy, shutdown).await
        }))
    };

    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "ragline listening");

    let mut server_shutdown = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .into_future();
    run_alongside(server, ingestion_task, &stop).await
}

async fn ingest(services: Services, stdin: bool, halt_on_error: bool) -> Result<()> {
    services
        .store
        .ensure_collection()
        .await
        .context("failed to prepare the vector collection")?;
    let pipeline = services.ingestion()?;
    let (_stop, shutdown) = shutdown_on_ctrl_c();

    if stdin {
        let mut stream = LineStream::new("stdin", BufReader::new(tokio::io::stdin()));
        let summary = pipeline.run(&mut stream, shutdown).await?;
        info!(
            messages = summary.messages_committed,
            chunks = summary.chunks_inserted,
            "stdin ingestion finished"
        );
        return Ok(());
    }

    run_kafka_ingestion(&pipeline, services.supervisor_policy(halt_on_error), shutdown).await
}

async fn ask(services: Services, query: &str, context_only: bool) -> Result<()> {
    let retrieval = services.retrieval();
    if context_only {
        let context = retrieval.retrieve(query).await?;
        println!("{}", context.render());
    } else {
        println!("{}", retrieval.answer(query).await?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Command::Serve {
            host,
            port,
            halt_on_error,
            no_ingest,
        } => {
            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("invalid bind address {host}:{port}"))?;
            serve(Services::from_env()?, addr, halt_on_error, no_ingest).await
        }
        Command::Ingest {
            stdin,
            halt_on_error,
        } => ingest(Services::from_env()?, stdin, halt_on_error).await,
        Command::Ask {
            query,
            context_only,
        } => ask(Services::from_env()?, &query, context_only).await,
        Command::Migrate => {
            let services = Services::from_env()?;
            services.store.ensure_collection().await?;
            let count = services.store.count().await?;
            println!(
                "collection {} ready ({} records)",
                services.store.collection_name(),
                count
            );
            Ok(())
        }
        Command::Publish { text } => {
            let publisher = TextPublisher::from_env()?;
            let coordinates = publisher
                .publish(&IncomingTextMessage::new(text, Utc::now()))
                .await?;
            println!("published at {}", coordinates);
            Ok(())
        }
    }
}
