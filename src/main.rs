use std::{fmt::Debug, net::SocketAddr, path::Path, sync::Arc};

use axum::{Router, serve::Listener};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use fanout::{
    adapters::{DnsResolver, HttpClientAdapter, HttpHandler},
    config::{ServerConfig, ServerConfigValidator, TlsConfig, loader::load_config},
    core::FanOutService,
    metrics,
    ports::{http_client::HttpClient, resolver::Resolver},
    tracing_setup,
    utils::GracefulShutdown,
};
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Start the fan-out proxy (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
}

/// Adapts a stream of accepted (TLS) connections to axum's `Listener`.
struct AxumListener<S> {
    stream: S,
    local_addr: SocketAddr,
}

impl<S, I, E> Listener for AxumListener<S>
where
    S: futures_util::Stream<Item = Result<(I, SocketAddr), E>> + Unpin + Send + 'static,
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    type Io = I;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.stream.next().await {
                Some(Ok((io, addr))) => return (io, addr),
                Some(Err(e)) => tracing::debug!("Accept error: {}", e),
                None => std::future::pending().await,
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let config_path = match args.command {
        Some(Commands::Validate { config }) => return validate_config_command(&config).await,
        Some(Commands::Init { config }) => return init_config_command(&config).await,
        Some(Commands::Serve { config }) => config,
        None => args.config,
    };

    serve(&config_path).await
}

async fn serve(config_path: &str) -> Result<()> {
    let config: ServerConfig = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    ServerConfigValidator::validate(&config).context("Invalid configuration")?;

    tracing_setup::init_tracing(&config.logging).context("Failed to initialize tracing")?;
    metrics::init_metrics().context("Failed to initialize metrics")?;

    if !Path::new(config_path).exists() {
        tracing::warn!(
            "Configuration file {} not found, using defaults and environment overrides",
            config_path
        );
    }

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            A provider was most likely installed already.",
            e
        );
    }

    let resolver: Arc<dyn Resolver> = Arc::new(DnsResolver::new());
    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client adapter")?);

    let fanout = FanOutService::from_config(resolver, http_client, &config.forwarding)
        .context("Invalid forwarding configuration")?;
    let request_timeout = config
        .forwarding
        .request_timeout()
        .context("Invalid forwarding.request_timeout")?;
    let app = HttpHandler::new(Arc::new(fanout), config.listener_scheme(), request_timeout).router();

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!(
        "Starting fanout proxy on {} (TLS enabled: {}, max body: {} bytes, attempt timeout: {:?}, request timeout: {:?})",
        config.listen_addr,
        config.tls.is_some(),
        config.forwarding.max_body_bytes,
        config.forwarding.attempt_timeout,
        config.forwarding.request_timeout,
    );
    println!(
        "fanout listening on {} (TLS: {})",
        config.listen_addr,
        config.tls.is_some()
    );

    let shutdown = GracefulShutdown::new();
    let signal_handler = shutdown.clone();
    tokio::spawn(async move { signal_handler.run_signal_handler().await });

    match &config.tls {
        Some(tls) => {
            let local_addr = listener.local_addr().context("Failed to get local addr")?;
            let acceptor = tls_acceptor(tls)?;
            let tls_listener = AxumListener {
                stream: tls_listener::TlsListener::new(acceptor, listener),
                local_addr,
            };
            tracing::info!("Serving with TLS");
            serve_until_shutdown(tls_listener, app, &shutdown).await
        }
        None => serve_until_shutdown(listener, app, &shutdown).await,
    }
}

/// Serve `app` until a shutdown signal, then let in-flight fan-outs drain.
async fn serve_until_shutdown<L>(listener: L, app: Router, shutdown: &GracefulShutdown) -> Result<()>
where
    L: Listener,
    L::Addr: Debug,
{
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.token().cancelled_owned())
        .into_future();
    let mut server = tokio::spawn(server);

    tokio::select! {
        joined = &mut server => {
            return joined
                .context("Server task failed")?
                .context("Server error");
        }
        reason = shutdown.cancelled() => {
            tracing::info!("Shutdown signal received: {:?}", reason);
        }
    }

    let drained = shutdown
        .drain(async {
            match (&mut server).await {
                Ok(Err(e)) => tracing::error!("Server error during shutdown: {}", e),
                Err(e) => tracing::error!("Server task failed during shutdown: {}", e),
                Ok(Ok(())) => {}
            }
        })
        .await;
    if !drained {
        server.abort();
    }
    Ok(())
}

fn tls_acceptor(tls: &TlsConfig) -> Result<tokio_rustls::TlsAcceptor> {
    use std::{fs::File, io::BufReader};

    use rustls_pemfile::{certs, pkcs8_private_keys};

    let cert_file = &mut BufReader::new(
        File::open(&tls.cert_path)
            .with_context(|| format!("failed to open cert file {}", tls.cert_path))?,
    );
    let key_file = &mut BufReader::new(
        File::open(&tls.key_path)
            .with_context(|| format!("failed to open key file {}", tls.key_path))?,
    );

    let cert_chain = certs(cert_file)
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse certificate chain")?;
    let key = pkcs8_private_keys(key_file)
        .next()
        .transpose()
        .context("failed to parse private key")?
        .ok_or_else(|| eyre!("No PKCS#8 private key found in key file"))?;

    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key.into())
        .context("Invalid TLS certificate or key")?;

    Ok(tokio_rustls::TlsAcceptor::from(Arc::new(server_config)))
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            let forwarding = &config.forwarding;
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • TLS Enabled: {}", config.tls.is_some());
            println!("   • Excluded Headers: {}", forwarding.excluded_headers.join(", "));
            println!("   • Max Body Bytes: {}", forwarding.max_body_bytes);
            println!(
                "   • Max Concurrent Attempts: {}",
                forwarding
                    .max_concurrent_attempts
                    .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
            );
            println!(
                "   • Attempt Timeout: {}",
                forwarding.attempt_timeout.as_deref().unwrap_or("none")
            );
            println!(
                "   • Request Timeout: {}",
                forwarding.request_timeout.as_deref().unwrap_or("none")
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8080')");
            println!("   • Check that TLS certificate and key files exist");
            println!("   • Use humantime durations such as '5s' or '750ms'");
            std::process::exit(1);
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# fanout proxy configuration
#
# Requests to /{service_name}/{target_port}/{path} are replayed against every
# address service_name resolves to. Any value can be overridden from the
# environment, e.g. FANOUT__FORWARDING__ATTEMPT_TIMEOUT=2s.

# The address to listen on
listen_addr: "127.0.0.1:8080"

# Serve HTTPS instead of HTTP
# tls:
#   cert_path: "certs/server.pem"
#   key_path: "certs/server.key"

forwarding:
  # Inbound headers never copied to targets (host is always excluded)
  excluded_headers:
    - host
  # Largest request body buffered for replay (bytes)
  max_body_bytes: 10485760
  # Bound on simultaneously in-flight attempts per request
  # max_concurrent_attempts: 16
  # Time budget for a single target
  # attempt_timeout: "5s"
  # Deadline for the whole fan-out
  # request_timeout: "30s"

logging:
  level: "info"
  json: true
"#;

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    tokio::fs::write(path, DEFAULT_CONFIG)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'fanout serve --config {config_path}' to start the proxy");
    Ok(())
}
