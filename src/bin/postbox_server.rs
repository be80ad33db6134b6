use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use postbox::bus::{MailboxNaming, ServerInstance};
use postbox::server::{Handler, PingHandler, SequencedHandler, Server, ServerSession};
use postbox::{Mailbox, ServerConfig, Shutdown, Variant};

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
#[command(name = "postbox-server", version, about = "Mailbox rendezvous server")]
struct Args {
    /// Protocol variant (ignored when --config is given)
    #[arg(long, value_enum, default_value = "ping")]
    variant: VariantArg,

    /// Directory shared with clients
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Fixed mailbox path for the sequenced variant
    #[arg(long)]
    mailbox: Option<PathBuf>,

    /// JSON server config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable the reserved `delay`, `empty` and `silent` request bodies
    #[arg(long)]
    simulate_faults: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ServerConfig::for_variant(args.variant.into()),
    };
    config.simulate_faults |= args.simulate_faults;

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.trigger())
            .context("failed to install Ctrl-C handler")?;
    }

    match config.variant {
        Variant::Ping => {
            let instance =
                ServerInstance::create(&args.dir, &MailboxNaming::default(), config.variant.layout())
                    .context("failed to create server mailbox")?;
            info!("starting server #{}", instance.instance);
            let server = Server::new(
                instance.mailbox,
                PingHandler,
                ServerSession::new(instance.instance),
                config,
            )
            .remove_on_shutdown(true);
            serve(server, &shutdown)
        }
        Variant::Sequenced => {
            let path = args
                .mailbox
                .unwrap_or_else(|| args.dir.join("ipc_mailbox.bin"));
            let mailbox = Mailbox::create(&path, config.variant.layout())
                .with_context(|| format!("failed to open mailbox {}", path.display()))?;
            let handler = if config.simulate_faults {
                SequencedHandler::with_simulated_faults(config.fault_delay())
            } else {
                SequencedHandler::new()
            };
            let server = Server::new(mailbox, handler, ServerSession::new(1), config);
            serve(server, &shutdown)
        }
    }
}

fn serve<H: Handler>(mut server: Server<H>, shutdown: &Shutdown) -> Result<()> {
    let stats = server.run(shutdown).context("server loop failed")?;
    info!("total unique clients served: {}", stats.unique_clients);
    Ok(())
}
