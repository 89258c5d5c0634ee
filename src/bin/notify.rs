//! `notify`: bootstrap credentials, enroll subscriptions, list them, and push.

use clap::{Args, Parser, Subcommand};
use notify_tool::config::{default_env_file, DEFAULT_SUBSCRIBER, DEFAULT_TTL};
use notify_tool::{
    generate_credentials, Config, Dispatcher, NotificationBuilder, NotifyError, Result,
    Interruptee, ShutdownFlag, SubscriptionRecord, SubscriptionStore, WebPushTransport,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Enrollment page; receives the VAPID public key as `pubKey`.
const DEFAULT_PAGE_URL: &str = "https://pages.switch-science.com/notify-app/";

#[derive(Parser, Debug)]
#[command(name = "notify", version, about = "Send Web Push notifications to your own devices")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a VAPID key pair and write the credential file.
    Init {
        /// Contact address announced to push services.
        #[arg(long, default_value = DEFAULT_SUBSCRIBER)]
        subscriber: String,
        /// Credential file to create.
        path: Option<PathBuf>,
    },
    /// Enroll one subscription pasted from the enrollment page.
    Subscribe {
        #[command(flatten)]
        env: EnvArg,
        /// Enrollment page URL.
        #[arg(long, default_value = DEFAULT_PAGE_URL)]
        page_url: String,
    },
    /// Print the paths of enrolled subscription records.
    List {
        #[command(flatten)]
        env: EnvArg,
        /// List quarantined records instead of active ones.
        #[arg(long)]
        revoked: bool,
    },
    /// Send one notification to every active subscription.
    Push {
        #[command(flatten)]
        env: EnvArg,
        #[arg(long, default_value = "")]
        title: String,
        /// Opaque JSON passed through to the client as `data`.
        #[arg(long, default_value = "")]
        data: String,
        /// Seconds the push service may hold the message.
        #[arg(long, default_value_t = DEFAULT_TTL)]
        ttl: u32,
        /// Deliveries in flight at once.
        #[arg(long, default_value_t = 1)]
        workers: usize,
        /// Body text.
        words: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct EnvArg {
    /// Credential file; subscriptions live next to it.
    #[arg(long = "env", value_name = "PATH")]
    path: Option<PathBuf>,
}

impl EnvArg {
    fn config(&self) -> Config {
        Config::new(self.path.clone().unwrap_or_else(default_env_file))
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Init { subscriber, path } => init(subscriber, path),
        Command::Subscribe { env, page_url } => subscribe(env.config(), &page_url),
        Command::List { env, revoked } => list(env.config(), revoked),
        Command::Push {
            env,
            title,
            data,
            ttl,
            workers,
            words,
        } => {
            let config = Config {
                ttl,
                workers,
                ..env.config()
            };
            push(config, title, data, words)
        }
    }
}

fn init(subscriber: String, path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(default_env_file);
    let credentials = generate_credentials(subscriber)?;
    credentials.write_to(&path)
}

fn subscribe(config: Config, page_url: &str) -> Result<()> {
    let credentials = config.load_credentials()?;
    let store = config.open_store()?;

    let url = format!("{page_url}?pubKey={}", credentials.vapid_public_key);
    println!("open: {url}");

    eprint!("subscription:> ");
    io::stderr().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(NotifyError::InvalidRecord("no subscription given".into()));
    }

    let record = SubscriptionRecord::from_json(&line)?;
    let path = store.put(&record)?;
    tracing::info!(path = %path.display(), endpoint = %record.endpoint, "subscribed");
    Ok(())
}

fn list(config: Config, revoked: bool) -> Result<()> {
    let dir = if revoked {
        config.revoked_dir()
    } else {
        config.subscriptions_dir()
    };
    let paths = SubscriptionStore::paths(dir)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for path in paths {
        writeln!(out, "{}", path.display())?;
    }
    Ok(())
}

fn push(config: Config, title: String, data: String, words: Vec<String>) -> Result<()> {
    let credentials = config.load_credentials()?;
    let store = config.open_store()?;
    let transport = WebPushTransport::from_config(&config)?;

    let shutdown = ShutdownFlag::new();
    let handle = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || handle.trigger()) {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }

    let notification = NotificationBuilder::new()
        .title(title)
        .body_words(words)
        .data(data)
        .build();

    let report = Dispatcher::new(&store, transport, &credentials)
        .with_workers(config.workers)
        .run(&notification, &shutdown)?;

    if report.interrupted {
        tracing::warn!(
            skipped = report.skipped,
            "interrupted; remaining subscriptions left untouched"
        );
        shutdown.err_if_interrupted()?;
    }
    Ok(())
}
