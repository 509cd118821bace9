use clap::{Parser, Subcommand};
use rri_frame::client::{self, ClientArgs};
use rri_frame::config::FramingConfig;
use rri_frame::server::metrics;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rri-frame")]
#[command(about = "Length-prefixed UTF-8 framing over TCP")]
struct Opts {
    #[command(subcommand)]
    cmd: Mode,
}

/// CLI modes
#[derive(Subcommand, Debug)]
enum Mode {
    /// Run a framed TCP server answering every frame with its own text
    #[cfg(feature = "tcp")]
    Server {
        #[arg(short, long, default_value = "127.0.0.1:51131")]
        addr: String,

        /// JSON file with framing timeouts and limits
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Idle read timeout in milliseconds, overrides the config file
        #[arg(long)]
        read_timeout_ms: Option<u64>,

        /// Login grace period in milliseconds, overrides the config file
        #[arg(long)]
        first_frame_timeout_ms: Option<u64>,

        /// Largest accepted payload in bytes, overrides the config file
        #[arg(long)]
        max_payload_size: Option<usize>,
    },

    /// Send the orders of a file and collect the answers
    Client {
        #[command(flatten)]
        client: ClientArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    metrics::init_logging();

    let opts = Opts::parse();
    match opts.cmd {
        #[cfg(feature = "tcp")]
        Mode::Server {
            addr,
            config,
            read_timeout_ms,
            first_frame_timeout_ms,
            max_payload_size,
        } => {
            let mut framing = match config {
                Some(path) => FramingConfig::from_json_file(path)?,
                None => FramingConfig::default(),
            };
            if let Some(ms) = read_timeout_ms {
                framing = framing.with_read_timeout(Duration::from_millis(ms));
            }
            if let Some(ms) = first_frame_timeout_ms {
                framing = framing.with_first_frame_timeout(Duration::from_millis(ms));
            }
            if let Some(max) = max_payload_size {
                framing = framing.with_max_payload_size(max);
            }
            run_tcp_server(&addr, framing).await?;
        }

        Mode::Client { client: args } => {
            client::run_client(args).await?;
        }
    }
    Ok(())
}

#[cfg(feature = "tcp")]
async fn run_tcp_server(addr: &str, framing: FramingConfig) -> anyhow::Result<()> {
    use rri_frame::transport::tcp::{self, TcpServerConfig};

    metrics::log_startup(addr, framing.max_payload_size);
    tracing::info!("Read timeout: {:?}", framing.read_timeout());
    tracing::info!("First frame timeout: {:?}", framing.first_frame_timeout());

    let config = TcpServerConfig::new(addr).with_framing(framing);
    tcp::run_with_framing(config).await
}
