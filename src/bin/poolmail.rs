use clap::{Parser, Subcommand};
use moneypool_mail::logging::init_tracing;
use moneypool_mail::mail_source::{message_id_for_path, read_mail_file};
use moneypool_mail::{
    collect_eml_files, ConfigError, LedgerStore, MailDirectory, MailEvent, MailEventProcessor,
    PoolListing, ProcessorConfig, TransactionMailParser,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "poolmail",
    version,
    about = "Turns payment-notification emails into money pool transactions"
)]
struct Cli {
    /// SQLite ledger file
    #[arg(long, env = "POOLMAIL_DB", global = true)]
    db: Option<PathBuf>,

    /// Directory holding raw messages named by message id
    #[arg(long, env = "POOLMAIL_MAIL_DIR", global = true)]
    mail_dir: Option<PathBuf>,

    /// Regex with `name` and `amount` named groups
    #[arg(long, env = "NAME_AMOUNT_REGEX", global = true)]
    name_amount_regex: Option<String>,

    /// Only mails with this subject are processed
    #[arg(long, env = "EMAIL_EXPECTED_SUBJECT", global = true)]
    expected_subject: Option<String>,

    #[arg(long, env = "POOLMAIL_LOG", global = true)]
    log_level: Option<String>,

    /// JSON settings file; command-line and environment values take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    json_logs: bool,

    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the ledger schema
    Migrate,

    /// Show what would be extracted from a stored message, without writing
    Parse { eml: PathBuf },

    /// Process an inbound-mail event (file path, or `-` for stdin)
    ProcessEvent {
        #[arg(default_value = "-")]
        event: String,
    },

    /// Process every .eml file under a path
    ProcessDir { path: PathBuf },

    #[command(subcommand)]
    Pool(PoolCommands),
}

#[derive(Subcommand)]
enum PoolCommands {
    /// Create a pool or update its title and state
    Add {
        name: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        closed: bool,
    },

    /// Load pools from a CSV with name,title,open columns
    Import { csv: PathBuf },

    List,

    Show { name: String },
}

#[derive(Debug, Serialize)]
struct CliErrorBody {
    category: String,
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum CliResponse {
    #[serde(rename = "success")]
    Success { payload: Value },
    #[serde(rename = "error")]
    Error { error: CliErrorBody },
}

struct CommandError {
    category: &'static str,
    message: String,
}

impl CommandError {
    fn new(category: &'static str, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    fn input(message: impl Into<String>) -> Self {
        Self::new("INPUT_ERROR", message)
    }

    fn store(message: impl Into<String>) -> Self {
        Self::new("STORE_ERROR", message)
    }
}

impl From<ConfigError> for CommandError {
    fn from(e: ConfigError) -> Self {
        Self::new("CONFIG_ERROR", e.to_string())
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, CommandError> {
    serde_json::to_value(value)
        .map_err(|e| CommandError::new("SERIALIZE_ERROR", format!("serialize payload failed: {e}")))
}

fn open_store(config: &ProcessorConfig) -> Result<LedgerStore, CommandError> {
    let (store, migrate_result) =
        LedgerStore::open(&config.db_path()).map_err(CommandError::store)?;
    if !migrate_result.applied_now.is_empty() {
        tracing::info!(applied = ?migrate_result.applied_now, "ledger schema upgraded");
    }
    Ok(store)
}

fn read_event(source: &str) -> Result<MailEvent, CommandError> {
    let raw = if source == "-" {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .map_err(|e| CommandError::input(format!("read stdin failed: {e}")))?;
        raw
    } else {
        fs::read_to_string(source)
            .map_err(|e| CommandError::input(format!("read event {source} failed: {e}")))?
    };
    MailEvent::from_json(&raw).map_err(CommandError::input)
}

fn dispatch(command: Commands, config: &ProcessorConfig) -> Result<Value, CommandError> {
    match command {
        Commands::Migrate => {
            let (store, migrate_result) =
                LedgerStore::open(&config.db_path()).map_err(CommandError::store)?;
            let status = store.status().map_err(CommandError::store)?;
            Ok(json!({
                "migrate": to_payload(&migrate_result)?,
                "status": to_payload(&status)?,
            }))
        }
        Commands::Parse { eml } => {
            let parser = config.build_parser()?;
            let mail = read_mail_file(&eml, &message_id_for_path(&eml))
                .map_err(CommandError::input)?;
            let transaction = parser
                .transaction_info(&mail.html_body_base64)
                .map_err(|e| CommandError::new("EXTRACT_ERROR", e.to_string()))?;
            Ok(json!({
                "message_id": mail.message_id,
                "subject": mail.subject,
                "fingerprint": mail.fingerprint,
                "transaction": to_payload(&transaction)?,
            }))
        }
        Commands::ProcessEvent { event } => {
            let parser = config.build_parser()?;
            let mail_dir = config.mail_dir.clone().ok_or_else(|| {
                CommandError::new("CONFIG_ERROR", "process-event needs --mail-dir")
            })?;
            let event = read_event(&event)?;
            let store = open_store(config)?;
            let summary = processor(config, parser, MailDirectory::new(mail_dir), &store)
                .process_event(&event);
            to_payload(&summary)
        }
        Commands::ProcessDir { path } => {
            let parser = config.build_parser()?;
            let files = collect_eml_files(&path).map_err(CommandError::input)?;
            let store = open_store(config)?;
            let source = MailDirectory::new(path);
            let summary = processor(config, parser, source, &store).process_files(&files);
            to_payload(&summary)
        }
        Commands::Pool(pool_command) => {
            let store = open_store(config)?;
            dispatch_pool(pool_command, &store)
        }
    }
}

fn processor<'a>(
    config: &ProcessorConfig,
    parser: TransactionMailParser,
    source: MailDirectory,
    store: &'a LedgerStore,
) -> MailEventProcessor<MailDirectory, &'a LedgerStore, &'a LedgerStore> {
    MailEventProcessor::new(
        config.expected_subject.clone(),
        parser,
        source,
        store,
        store,
    )
}

fn dispatch_pool(command: PoolCommands, store: &LedgerStore) -> Result<Value, CommandError> {
    match command {
        PoolCommands::Add {
            name,
            title,
            closed,
        } => {
            store
                .upsert_pool(&name, &title, !closed)
                .map_err(CommandError::store)?;
            let pool = store.get_money_pool(name.trim()).map_err(CommandError::store)?;
            to_payload(&pool)
        }
        PoolCommands::Import { csv } => {
            let summary = store.import_pools_csv(&csv).map_err(CommandError::store)?;
            to_payload(&summary)
        }
        PoolCommands::List => {
            let names = store.list_pool_names().map_err(CommandError::store)?;
            Ok(json!({ "pools": names }))
        }
        PoolCommands::Show { name } => match store
            .get_money_pool(&name)
            .map_err(CommandError::store)?
        {
            Some(pool) => to_payload(&pool),
            None => Err(CommandError::new(
                "NOT_FOUND",
                format!("money pool not found: {name}"),
            )),
        },
    }
}

fn resolve_config(cli: &Cli) -> Result<ProcessorConfig, CommandError> {
    let file_config = match &cli.config {
        Some(path) => {
            ProcessorConfig::load(path).map_err(|e| CommandError::new("CONFIG_ERROR", e))?
        }
        None => ProcessorConfig::default(),
    };
    Ok(file_config.merged(ProcessorConfig {
        db_path: cli.db.clone(),
        mail_dir: cli.mail_dir.clone(),
        name_amount_regex: cli.name_amount_regex.clone(),
        expected_subject: cli.expected_subject.clone(),
        log_level: cli.log_level.clone(),
    }))
}

fn main() {
    let cli = Cli::parse();
    let pretty = cli.pretty;

    let result = resolve_config(&cli).and_then(|config| {
        init_tracing(config.log_level(), cli.json_logs);
        dispatch(cli.command, &config)
    });
    let failed = result.is_err();

    let resp = match result {
        Ok(payload) => CliResponse::Success { payload },
        Err(e) => CliResponse::Error {
            error: CliErrorBody {
                category: e.category.to_string(),
                message: e.message,
                error_type: "PoolmailError".to_string(),
            },
        },
    };

    let out = if pretty {
        serde_json::to_string_pretty(&resp)
    } else {
        serde_json::to_string(&resp)
    }
    .unwrap_or_else(|e| {
        json!({
            "status": "error",
            "error": {
                "category": "SERIALIZE_ERROR",
                "message": format!("serialize response failed: {e}"),
                "type": "SerializeError",
            }
        })
        .to_string()
    });

    println!("{out}");
    if failed {
        std::process::exit(1);
    }
}
