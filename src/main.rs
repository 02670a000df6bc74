use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use mqtt_bench::options::{
    parse_endpoint, parse_qos, ClientOptions, DEFAULT_CLIENT_ID, DEFAULT_SERVER, DEFAULT_TOPIC,
    IDLE_TIMEOUT,
};
use mqtt_bench::output;
use mqtt_bench::roles::publisher::{run_publisher, PublisherConfig};
use mqtt_bench::roles::subscriber::{run_subscriber, SubscriberConfig};

#[derive(Parser)]
#[command(name = "mqtt-bench")]
#[command(about = "MQTT broker benchmark probes")]
struct Cli {
    /// Log level (diagnostics go to stderr; stdout carries only READY and the result)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectArgs {
    /// MQTT client ID
    #[arg(long, default_value = DEFAULT_CLIENT_ID)]
    id: String,

    /// MQTT broker endpoint as tcp://host:port (repeatable; the first is used)
    #[arg(long, short = 's', default_value = DEFAULT_SERVER)]
    server: Vec<String>,

    /// MQTT client username (omit if auth disabled)
    #[arg(long, short = 'u')]
    username: Option<String>,

    /// MQTT client password (omit if auth disabled)
    #[arg(long, short = 'p')]
    password: Option<String>,
}

impl ConnectArgs {
    fn into_client_options(self) -> Result<ClientOptions> {
        let servers = self
            .server
            .iter()
            .map(|s| parse_endpoint(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ClientOptions {
            client_id: self.id,
            servers,
            username: self.username,
            password: self.password,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Publish probe: emit N timestamped messages and report throughput
    Pub {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Mark each message as retained
        #[arg(long)]
        retain: bool,

        /// MQTT topic
        #[arg(long, default_value = DEFAULT_TOPIC)]
        topic: String,

        /// MQTT QoS (0, 1, or 2)
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
        qos: u8,

        /// Number of messages to publish
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        n: u64,

        /// Approximate size of each message (the timestamp header is a floor)
        #[arg(long, default_value_t = 0)]
        size: usize,
    },
    /// Subscribe probe: consume N messages and report end-to-end latency
    Sub {
        #[command(flatten)]
        connect: ConnectArgs,

        /// MQTT topic, can be a wildcard
        #[arg(long, default_value = DEFAULT_TOPIC)]
        topic: String,

        /// Ignore messages whose topic does not start with this prefix
        #[arg(long)]
        match_prefix: Option<String>,

        /// MQTT QoS (0, 1, or 2)
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
        qos: u8,

        /// Number of messages to consume
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        n: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    mqtt_bench::logging::init(&cli.log_level)?;

    let result = match cli.command {
        Commands::Pub {
            connect,
            retain,
            topic,
            qos,
            n,
            size,
        } => {
            let config = PublisherConfig {
                client: connect.into_client_options()?,
                topic,
                qos: parse_qos(qos),
                count: n as usize,
                size,
                retain,
            };
            run_publisher(config).await?
        }
        Commands::Sub {
            connect,
            topic,
            match_prefix,
            qos,
            n,
        } => {
            let config = SubscriberConfig {
                client: connect.into_client_options()?,
                topic,
                match_prefix,
                qos: parse_qos(qos),
                count: n as usize,
                idle_timeout: IDLE_TIMEOUT,
            };
            run_subscriber(config).await?
        }
    };

    output::write_result(&result)?;
    Ok(())
}
