use clap::{Parser, Subcommand};
use tracing::Level;

use streambench::client;
use streambench::config::BenchConfig;
use streambench::server;
use streambench::transport::TransportKind;

#[derive(Parser)]
#[clap(name = "streambench", version, about = "Streaming throughput benchmark over interchangeable transports")]
struct Args {
    #[clap(subcommand)]
    command: Command,

    #[clap(short, long)]
    verbose: bool,

    #[clap(long)]
    very_verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Accept benchmark streams and report server-side throughput
    Server {
        #[clap(value_enum)]
        transport: TransportKind,
        /// Port or listen address (tcp), or socket path (uds)
        listen: String,
    },
    /// Stream messages to a server and report client-side throughput
    Client {
        #[clap(value_enum)]
        transport: TransportKind,
        /// host:port or http://host:port (tcp), or socket path (uds)
        target: String,
        num_messages: u64,
        size_kb: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let config = BenchConfig::default();
    config.validate()?;

    match args.command {
        Command::Server { transport, listen } => {
            let transport = transport.create(&config);
            server::run_server(transport.as_ref(), &listen, config).await?;
        }
        Command::Client { transport, target, num_messages, size_kb } => {
            let payload_bytes = config.clamped_payload_bytes(size_kb);
            let transport = transport.create(&config);

            println!(
                "running {} client -> {} : {} messages of {} bytes",
                transport.name(), target, num_messages, payload_bytes,
            );
            client::run_client(transport.as_ref(), &target, num_messages, payload_bytes, &config).await?;
        }
    }
    Ok(())
}
