pub mod amount;
pub mod config;
pub mod error;
pub mod event;
mod html_body;
pub mod ledger_store;
pub mod logging;
pub mod mail_parser;
pub mod mail_source;
pub mod model;
mod name_amount;
mod note;
pub mod pool_resolver;
pub mod processor;
mod text_locator;

pub use amount::{normalize_amount_text, parse_with_convention, CurrencyConvention};
pub use config::ProcessorConfig;
pub use error::{AmountError, ConfigError, ExtractError, PatternError, ResolveError};
pub use event::MailEvent;
pub use html_body::parse_html_body;
pub use ledger_store::{LedgerStore, MessageReceipt, PoolListing, TransactionStore};
pub use mail_parser::TransactionMailParser;
pub use mail_source::{collect_eml_files, InboundMail, MailDirectory, MailSource};
pub use model::{MoneyPool, MonetaryAmount, PoolTransaction, TransactionInfo};
pub use name_amount::NameAmountPattern;
pub use note::find_note;
pub use pool_resolver::{matching_pools, resolve_pool};
pub use processor::{BatchSummary, MailEventProcessor, RecordOutcome};
pub use text_locator::{located_texts, span_texts, StructuralPattern, SPAN_IN_PARAGRAPH};
