use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::warn;

use postbox::bus::MailboxNaming;
use postbox::server::is_ping;
use postbox::{Client, ClientConfig, Error, Mailbox, Shutdown, Variant};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum VariantArg {
    Ping,
    Sequenced,
}

impl From<VariantArg> for Variant {
    fn from(value: VariantArg) -> Self {
        match value {
            VariantArg::Ping => Variant::Ping,
            VariantArg::Sequenced => Variant::Sequenced,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "postbox-client", version, about = "Mailbox rendezvous client")]
struct Args {
    /// Protocol variant (ignored when --config is given)
    #[arg(long, value_enum, default_value = "ping")]
    variant: VariantArg,

    /// Directory shared with servers
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Fixed mailbox path for the sequenced variant
    #[arg(long)]
    mailbox: Option<PathBuf>,

    /// JSON client config
    #[arg(long)]
    config: Option<PathBuf>,
}

enum Command {
    Exit,
    Status,
    Connect,
    Disconnect,
    Send(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match trimmed.to_ascii_lowercase().as_str() {
        "exit" => Command::Exit,
        "status" => Command::Status,
        "connect" => Command::Connect,
        "disconnect" => Command::Disconnect,
        _ => Command::Send(trimmed.to_string()),
    })
}

struct Session {
    client: Client,
    dir: PathBuf,
    mailbox_path: PathBuf,
    sequence: u64,
}

impl Session {
    fn connect(&mut self, out: &mut dyn Write) -> io::Result<()> {
        let result = match self.client.config().variant {
            Variant::Ping => self
                .client
                .connect(&self.dir, &MailboxNaming::default())
                .map(|candidate| candidate.path),
            Variant::Sequenced => Mailbox::create(&self.mailbox_path, Variant::Sequenced.layout())
                .map(|mailbox| {
                    let path = mailbox.path().to_path_buf();
                    self.client.bind(mailbox);
                    path
                }),
        };
        match result {
            Ok(path) => writeln!(out, "Connected to: {}", path.display()),
            Err(Error::NoServer) => writeln!(out, "No servers available."),
            Err(err) => writeln!(out, "Failed to connect: {err}"),
        }
    }

    fn send(&mut self, text: &str, shutdown: &Shutdown, out: &mut dyn Write) -> io::Result<()> {
        let payload = match self.client.config().variant {
            Variant::Ping => {
                if !is_ping(text) {
                    return writeln!(out, "Error: Only 'ping' is accepted.");
                }
                text.to_string()
            }
            Variant::Sequenced => {
                self.sequence += 1;
                format!("[{}] {text}", self.sequence)
            }
        };
        match self.client.request(&payload, shutdown) {
            Ok(exchange) => {
                if let Some(id) = exchange.assigned_id {
                    writeln!(out, "Server assigned Client ID: {id}")?;
                }
                if let Some(response) = exchange.payload {
                    writeln!(out, "Response: {response}")?;
                }
                Ok(())
            }
            Err(Error::NotConnected) => writeln!(out, "Error: Not connected to server."),
            Err(Error::Busy) => writeln!(out, "Server is busy."),
            Err(Error::Timeout) => writeln!(out, "Timeout waiting for response."),
            Err(Error::ServerShutdown) => writeln!(out, "Server has shut down."),
            Err(err) => writeln!(out, "Request failed: {err}"),
        }
    }

    fn status(&self, shutdown: &Shutdown, out: &mut dyn Write) -> io::Result<()> {
        match self.client.status(shutdown) {
            Ok(status) => {
                let Some(path) = status.mailbox else {
                    return writeln!(out, "Not connected to any server.");
                };
                writeln!(out, "Connected to: {}", path.display())?;
                if status.client_id > 0 {
                    writeln!(out, "Client ID: {}", status.client_id)?;
                } else {
                    writeln!(out, "Client ID: not assigned")?;
                }
                if status.alive == Some(false) {
                    writeln!(out, "NOT CONNECTED")?;
                }
                Ok(())
            }
            Err(err) => writeln!(out, "Status check failed: {err}"),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ClientConfig::for_variant(args.variant.into()),
    };

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.trigger())
            .context("failed to install Ctrl-C handler")?;
    }

    let mailbox_path = args
        .mailbox
        .clone()
        .unwrap_or_else(|| args.dir.join("ipc_mailbox.bin"));
    let mut session = Session {
        client: Client::new(config),
        dir: args.dir,
        mailbox_path,
        sequence: 0,
    };

    let mut out = io::stdout();
    session.connect(&mut out)?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    while !shutdown.is_triggered() {
        write!(out, "\nEnter command: ")?;
        out.flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("failed to read stdin")?;
        if shutdown.is_triggered() {
            break;
        }
        match parse_command(&line) {
            None => writeln!(out, "Enter a non-empty command.")?,
            Some(Command::Exit) => break,
            Some(Command::Status) => session.status(&shutdown, &mut out)?,
            Some(Command::Connect) => session.connect(&mut out)?,
            Some(Command::Disconnect) => {
                if session.client.disconnect().is_some() {
                    writeln!(out, "Disconnected.")?;
                }
            }
            Some(Command::Send(text)) => session.send(&text, &shutdown, &mut out)?,
        }
    }

    if let Err(err) = session.client.release() {
        warn!("failed to release mailbox: {err}");
    }
    writeln!(out, "Client stopped.")?;
    Ok(())
}
