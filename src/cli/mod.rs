use crate::client::{EndpointConfig, PeerEndpoint};
use crate::error::Result;
use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "peerwire")]
#[command(about = "A swarm peer endpoint", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a known peer and poll it for messages
    Connect {
        /// Peer address
        #[arg(short, long)]
        addr: IpAddr,

        /// Peer port
        #[arg(short, long)]
        port: u16,

        /// Shared content identifier
        #[arg(short, long)]
        content: String,
    },

    /// Listen for inbound peers
    Listen {
        /// Port to listen on
        #[arg(short, long, default_value = "6881")]
        port: u16,

        /// Shared content identifier
        #[arg(short, long)]
        content: String,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Connect {
                addr,
                port,
                content,
            } => {
                let endpoint = PeerEndpoint::new(EndpointConfig {
                    listen_port: 0,
                    content_id: content.clone(),
                });
                let mut session = endpoint.dial(SocketAddr::new(*addr, *port)).await?;

                // Poll the session until the peer goes away
                let mut tick = tokio::time::interval(Duration::from_millis(250));
                while !session.is_terminated() {
                    tick.tick().await;
                    while let Some(message) = session.next_message() {
                        info!("Message: {} byte payload", message.payload.len());
                    }
                }
                info!("Peer {} disconnected", session.identity());
                session.close();
                Ok(())
            }

            Commands::Listen { port, content } => {
                let endpoint = PeerEndpoint::new(EndpointConfig {
                    listen_port: *port,
                    content_id: content.clone(),
                });
                endpoint.serve().await
            }
        }
    }
}
