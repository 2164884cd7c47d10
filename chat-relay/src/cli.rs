use clap::{Args, Parser, Subcommand};

use crate::{
    config::{DEFAULT_LISTEN_ADDR, DEFAULT_MAX_LINE, DEFAULT_READ_BUFFER, RelayConfig},
    protocol::Framing,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay server.
    Serve(ServeArgs),
    /// Connect to a relay from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind. Use port 0 for an ephemeral port.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: String,

    /// How inbound bytes are split into messages.
    #[arg(long, value_enum, default_value_t = Framing::Raw)]
    pub framing: Framing,

    /// Bytes per read in raw framing.
    #[arg(long, default_value_t = DEFAULT_READ_BUFFER)]
    pub read_buffer: usize,

    /// Longest accepted line in line framing.
    #[arg(long, default_value_t = DEFAULT_MAX_LINE)]
    pub max_line: usize,
}

impl ServeArgs {
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            framing: self.framing,
            read_buffer: self.read_buffer,
            max_line: self.max_line,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Display name announced to the chat.
    #[arg(long)]
    pub name: String,

    /// Address of the relay to connect to.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub server: String,

    /// How outbound messages are delimited. Must match the server.
    #[arg(long, value_enum, default_value_t = Framing::Raw)]
    pub framing: Framing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults_to_raw_on_port_5555() {
        let cli = Cli::try_parse_from(["chat-relay", "serve"]).expect("parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve command");
        };

        assert_eq!(args.listen, "localhost:5555");
        assert_eq!(args.relay_config(), RelayConfig::default());
    }

    #[test]
    fn serve_accepts_line_framing() {
        let cli = Cli::try_parse_from([
            "chat-relay",
            "serve",
            "--listen",
            "127.0.0.1:0",
            "--framing",
            "lines",
            "--max-line",
            "4096",
        ])
        .expect("parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve command");
        };

        let config = args.relay_config();
        assert_eq!(config.framing, Framing::Lines);
        assert_eq!(config.max_line, 4096);
        assert_eq!(config.read_limit(), 4096);
    }

    #[test]
    fn client_requires_name() {
        assert!(Cli::try_parse_from(["chat-relay", "client"]).is_err());

        let cli = Cli::try_parse_from(["chat-relay", "client", "--name", "Alice"]).expect("parse");
        let Command::Client(args) = cli.command else {
            panic!("expected client command");
        };
        assert_eq!(args.name, "Alice");
        assert_eq!(args.server, "localhost:5555");
        assert_eq!(args.framing, Framing::Raw);
    }
}
