use chrono::Local;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ResolveError;
use crate::event::MailEvent;
use crate::ledger_store::{MessageReceipt, PoolListing, TransactionStore};
use crate::mail_parser::TransactionMailParser;
use crate::mail_source::{message_id_for_path, read_mail_file, InboundMail, MailSource};
use crate::model::PoolTransaction;
use crate::pool_resolver::resolve_pool;

const MAX_OUTCOME_SAMPLES: usize = 20;
const TRANSACTION_DATE_FORMAT: &str = "%d.%m.%y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Extract,
    Pools,
    Resolve,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Pools => "pools",
            Stage::Resolve => "resolve",
            Stage::Store => "store",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    SubjectMismatch { subject: String },
    Duplicate,
    NoPoolFound { note: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Imported {
        pool: String,
        transaction: PoolTransaction,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        stage: Stage,
        error: String,
    },
}

impl RecordOutcome {
    fn failed(stage: Stage, error: impl fmt::Display) -> Self {
        RecordOutcome::Failed {
            stage,
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordReport {
    pub message_id: String,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub records_count: usize,
    pub imported_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub imported: Vec<RecordReport>,
    pub skipped_samples: Vec<RecordReport>,
    pub failed_samples: Vec<RecordReport>,
}

impl BatchSummary {
    fn push(&mut self, report: RecordReport) {
        self.records_count += 1;
        match report.outcome {
            RecordOutcome::Imported { .. } => {
                self.imported_count += 1;
                self.imported.push(report);
            }
            RecordOutcome::Skipped { .. } => {
                self.skipped_count += 1;
                if self.skipped_samples.len() < MAX_OUTCOME_SAMPLES {
                    self.skipped_samples.push(report);
                }
            }
            RecordOutcome::Failed { .. } => {
                self.failed_count += 1;
                if self.failed_samples.len() < MAX_OUTCOME_SAMPLES {
                    self.failed_samples.push(report);
                }
            }
        }
    }
}

/// Runs received notifications through extraction, pool resolution and storage.
///
/// Each record is handled on its own; nothing a single record does can stop a batch.
pub struct MailEventProcessor<M, P, S> {
    expected_subject: Option<String>,
    parser: TransactionMailParser,
    mail_source: M,
    pools: P,
    store: S,
}

impl<M, P, S> MailEventProcessor<M, P, S>
where
    M: MailSource,
    P: PoolListing,
    S: TransactionStore,
{
    pub fn new(
        expected_subject: Option<String>,
        parser: TransactionMailParser,
        mail_source: M,
        pools: P,
        store: S,
    ) -> Self {
        Self {
            expected_subject: expected_subject
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            parser,
            mail_source,
            pools,
            store,
        }
    }

    pub fn process_event(&self, event: &MailEvent) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for message_id in event.message_ids() {
            summary.push(RecordReport {
                message_id: message_id.to_string(),
                outcome: self.process_record(message_id),
            });
        }
        log_summary(&summary);
        summary
    }

    /// Processes stored messages directly, without going through the mail source.
    pub fn process_files(&self, paths: &[PathBuf]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for path in paths {
            let message_id = message_id_for_path(path);
            let outcome = match read_mail_file(path, &message_id) {
                Ok(mail) => self.process_mail(&mail),
                Err(e) => {
                    error!(message_id = %message_id, error = %e, "could not read mail file");
                    RecordOutcome::failed(Stage::Fetch, e)
                }
            };
            summary.push(RecordReport {
                message_id,
                outcome,
            });
        }
        log_summary(&summary);
        summary
    }

    pub fn process_record(&self, message_id: &str) -> RecordOutcome {
        info!(message_id, "processing mail record");
        match self.mail_source.get_mail(message_id) {
            Ok(mail) => self.process_mail(&mail),
            Err(e) => {
                error!(message_id, error = %e, "could not fetch mail");
                RecordOutcome::failed(Stage::Fetch, e)
            }
        }
    }

    pub fn process_mail(&self, mail: &InboundMail) -> RecordOutcome {
        let message_id = mail.message_id.as_str();

        if let Some(expected) = &self.expected_subject {
            if mail.subject.trim().to_lowercase() != expected.to_lowercase() {
                warn!(message_id, subject = %mail.subject, "mail subject does not match");
                return RecordOutcome::Skipped {
                    reason: SkipReason::SubjectMismatch {
                        subject: mail.subject.clone(),
                    },
                };
            }
        }

        match self.store.is_processed(&mail.fingerprint) {
            Ok(true) => {
                warn!(message_id, fingerprint = %mail.fingerprint, "mail already processed");
                return RecordOutcome::Skipped {
                    reason: SkipReason::Duplicate,
                };
            }
            Ok(false) => {}
            Err(e) => {
                error!(message_id, error = %e, "could not check processed messages");
                return RecordOutcome::failed(Stage::Store, e);
            }
        }

        let info = match self.parser.transaction_info(&mail.html_body_base64) {
            Ok(info) => info,
            Err(e) => {
                error!(message_id, error = %e, "error while extracting transaction information");
                return RecordOutcome::failed(Stage::Extract, e);
            }
        };
        info!(
            message_id,
            sender = %info.name,
            note = %info.note,
            amount = %info.amount,
            "extracted transaction"
        );

        let pool_names = match self.pools.list_pool_names() {
            Ok(names) => names,
            Err(e) => {
                error!(message_id, error = %e, "could not list money pools");
                return RecordOutcome::failed(Stage::Pools, e);
            }
        };

        let pool = match resolve_pool(&info.note, &pool_names) {
            Ok(pool) => pool,
            Err(ResolveError::NoPoolFound { note }) => {
                info!(message_id, note = %note, "no money pool found for note");
                return RecordOutcome::Skipped {
                    reason: SkipReason::NoPoolFound { note },
                };
            }
            Err(e) => {
                error!(message_id, note = %info.note, error = %e, "could not resolve money pool");
                return RecordOutcome::failed(Stage::Resolve, e);
            }
        };

        let transaction = PoolTransaction {
            id: Uuid::new_v4().to_string(),
            name: info.name,
            base: info.amount.base,
            fraction: info.amount.fraction,
            date: Local::now().format(TRANSACTION_DATE_FORMAT).to_string(),
        };
        let receipt = MessageReceipt {
            message_id: message_id.to_string(),
            fingerprint: mail.fingerprint.clone(),
        };
        if let Err(e) = self.store.record_transaction(&pool, &transaction, &receipt) {
            error!(message_id, pool = %pool, error = %e, "could not add transaction");
            return RecordOutcome::failed(Stage::Store, e);
        }

        info!(
            message_id,
            pool = %pool,
            transaction_id = %transaction.id,
            "added transaction to money pool"
        );
        RecordOutcome::Imported { pool, transaction }
    }
}

fn log_summary(summary: &BatchSummary) {
    info!(
        records = summary.records_count,
        imported = summary.imported_count,
        skipped = summary.skipped_count,
        failed = summary.failed_count,
        "mail batch finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MailEvent;
    use crate::ledger_store::tests::seeded_store;
    use crate::mail_parser::tests::{notification_html, GERMAN_NOTIFICATION};
    use crate::mail_source::fingerprint;
    use crate::mail_source::tests::fixture_path;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};

    const SUBJECT: &str = "Sie haben Geld erhalten";

    #[derive(Default)]
    struct FakeMailbox {
        mails: HashMap<String, InboundMail>,
    }

    impl FakeMailbox {
        fn with(mut self, id: &str, subject: &str, headline: &str, note: &str) -> Self {
            let html = notification_html(headline, note);
            self.mails.insert(
                id.to_string(),
                InboundMail {
                    message_id: id.to_string(),
                    subject: subject.to_string(),
                    fingerprint: fingerprint(format!("{id}{html}").as_bytes()),
                    html_body_base64: STANDARD.encode(html),
                },
            );
            self
        }
    }

    impl MailSource for FakeMailbox {
        fn get_mail(&self, message_id: &str) -> Result<InboundMail, String> {
            self.mails
                .get(message_id)
                .cloned()
                .ok_or_else(|| format!("no stored message {message_id}"))
        }
    }

    struct FakePools(Vec<String>);

    impl PoolListing for FakePools {
        fn list_pool_names(&self) -> Result<Vec<String>, String> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        appended: RefCell<Vec<(String, String)>>,
        created: RefCell<Vec<PoolTransaction>>,
        processed: RefCell<HashSet<String>>,
    }

    impl TransactionStore for FakeStore {
        fn append_transaction_id(&self, pool_name: &str, transaction_id: &str) -> Result<(), String> {
            self.appended
                .borrow_mut()
                .push((pool_name.to_string(), transaction_id.to_string()));
            Ok(())
        }

        fn create_transaction(&self, txn: &PoolTransaction) -> Result<(), String> {
            self.created.borrow_mut().push(txn.clone());
            Ok(())
        }

        fn is_processed(&self, fingerprint: &str) -> Result<bool, String> {
            Ok(self.processed.borrow().contains(fingerprint))
        }

        fn record_transaction(
            &self,
            pool_name: &str,
            txn: &PoolTransaction,
            receipt: &MessageReceipt,
        ) -> Result<(), String> {
            self.append_transaction_id(pool_name, &txn.id)?;
            self.create_transaction(txn)?;
            self.processed
                .borrow_mut()
                .insert(receipt.fingerprint.clone());
            Ok(())
        }
    }

    fn processor<'a>(
        mailbox: &'a FakeMailbox,
        pools: &[&str],
        store: &'a FakeStore,
    ) -> MailEventProcessor<&'a FakeMailbox, FakePools, &'a FakeStore> {
        MailEventProcessor::new(
            Some(SUBJECT.to_string()),
            TransactionMailParser::new(GERMAN_NOTIFICATION).expect("compile pattern"),
            mailbox,
            FakePools(pools.iter().map(|p| p.to_string()).collect()),
            store,
        )
    }

    fn event_for(ids: &[&str]) -> MailEvent {
        let records = ids
            .iter()
            .map(|id| format!(r#"{{"ses":{{"mail":{{"messageId":"{id}"}}}}}}"#))
            .collect::<Vec<_>>()
            .join(",");
        MailEvent::from_json(&format!(r#"{{"Records":[{records}]}}"#)).expect("build event")
    }

    #[test]
    fn imports_resolved_transaction() {
        let mailbox = FakeMailbox::default().with(
            "m1",
            SUBJECT,
            "Sender Person hat Ihnen 1.234,56 EUR gesendet",
            "Urlaub Kasse",
        );
        let store = FakeStore::default();
        let outcome = processor(&mailbox, &["Urlaub", "Geschenk"], &store).process_record("m1");

        let RecordOutcome::Imported { pool, transaction } = outcome.clone() else {
            panic!("expected import, got {outcome:?}");
        };
        assert_eq!(pool, "Urlaub");
        assert_eq!(transaction.name, "Sender Person");
        assert_eq!((transaction.base, transaction.fraction), (1234, 56));
        assert_eq!(transaction.date.len(), 8);
        assert_eq!(
            *store.appended.borrow(),
            vec![("Urlaub".to_string(), transaction.id.clone())]
        );
        assert_eq!(*store.created.borrow(), vec![transaction]);
    }

    #[test]
    fn ambiguous_and_unknown_pools_write_nothing() {
        let mailbox = FakeMailbox::default()
            .with("amb", SUBJECT, "A hat Ihnen 5,00 EUR gesendet", "AlphaBeta Trip")
            .with("none", SUBJECT, "A hat Ihnen 5,00 EUR gesendet", "Gamma");
        let store = FakeStore::default();
        let processor = processor(&mailbox, &["Alpha", "AlphaBeta"], &store);

        assert!(matches!(
            processor.process_record("amb"),
            RecordOutcome::Failed {
                stage: Stage::Resolve,
                ..
            }
        ));
        assert_eq!(
            processor.process_record("none"),
            RecordOutcome::Skipped {
                reason: SkipReason::NoPoolFound {
                    note: "Gamma".to_string()
                }
            }
        );
        assert!(store.appended.borrow().is_empty());
        assert!(store.created.borrow().is_empty());
    }

    #[test]
    fn subject_mismatch_is_skipped_case_insensitively() {
        let mailbox = FakeMailbox::default()
            .with("news", "Unser Newsletter", "A hat Ihnen 5,00 EUR gesendet", "Urlaub")
            .with("upper", "SIE HABEN GELD ERHALTEN", "A hat Ihnen 5,00 EUR gesendet", "Urlaub");
        let store = FakeStore::default();
        let processor = processor(&mailbox, &["Urlaub"], &store);

        assert!(matches!(
            processor.process_record("news"),
            RecordOutcome::Skipped {
                reason: SkipReason::SubjectMismatch { .. }
            }
        ));
        assert!(matches!(
            processor.process_record("upper"),
            RecordOutcome::Imported { .. }
        ));
    }

    #[test]
    fn redelivered_message_is_skipped_as_duplicate() {
        let mailbox =
            FakeMailbox::default().with("m1", SUBJECT, "A hat Ihnen 5,00 EUR gesendet", "Urlaub");
        let store = FakeStore::default();
        let processor = processor(&mailbox, &["Urlaub"], &store);

        assert!(matches!(processor.process_record("m1"), RecordOutcome::Imported { .. }));
        assert_eq!(
            processor.process_record("m1"),
            RecordOutcome::Skipped {
                reason: SkipReason::Duplicate
            }
        );
        assert_eq!(store.created.borrow().len(), 1);
    }

    #[test]
    fn batch_continues_after_failing_records() {
        let mailbox = FakeMailbox::default()
            .with("ok1", SUBJECT, "A hat Ihnen 1,00 EUR gesendet", "Urlaub")
            .with("bad", SUBJECT, "A hat Ihnen 1,00 XQZ gesendet", "Urlaub")
            .with("ok2", SUBJECT, "B hat Ihnen 2,50 EUR gesendet", "urlaub 2");
        let store = FakeStore::default();
        let summary = processor(&mailbox, &["Urlaub"], &store)
            .process_event(&event_for(&["ok1", "bad", "missing", "ok2"]));

        assert_eq!(summary.records_count, 4);
        assert_eq!(summary.imported_count, 2);
        assert_eq!(summary.failed_count, 2);
        let stages = summary
            .failed_samples
            .iter()
            .map(|r| match &r.outcome {
                RecordOutcome::Failed { stage, .. } => *stage,
                other => panic!("unexpected outcome {other:?}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(stages, vec![Stage::Extract, Stage::Fetch]);
        assert_eq!(store.created.borrow().len(), 2);
    }

    #[test]
    fn outcome_serializes_with_flat_tags() {
        let report = RecordReport {
            message_id: "m1".to_string(),
            outcome: RecordOutcome::Skipped {
                reason: SkipReason::NoPoolFound {
                    note: "x".to_string(),
                },
            },
        };
        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "message_id": "m1",
                "outcome": "skipped",
                "reason": {"kind": "no_pool_found", "note": "x"}
            })
        );
    }

    #[test]
    fn processes_fixture_files_against_sqlite_ledger() {
        let (store, db_path) = seeded_store("processor", &["Urlaub", "Alpha"]);
        let paths = vec![
            fixture_path("newsletter.eml"),
            fixture_path("payment_eur.eml"),
            fixture_path("payment_usd.eml"),
        ];
        let processor = MailEventProcessor::new(
            Some(SUBJECT.to_string()),
            TransactionMailParser::new(GERMAN_NOTIFICATION).expect("compile pattern"),
            crate::mail_source::MailDirectory::new(fixture_path("")),
            &store,
            &store,
        );

        let first = processor.process_files(&paths);
        assert_eq!(first.imported_count, 2, "summary: {first:?}");
        assert_eq!(first.skipped_count, 1);

        let second = processor.process_files(&paths);
        assert_eq!(second.imported_count, 0);
        assert_eq!(second.skipped_count, 3);

        let urlaub = store.get_money_pool("Urlaub").expect("read").expect("exists");
        assert_eq!(urlaub.transactions.len(), 1);
        assert_eq!(urlaub.transactions[0].name, "Sender Person");
        assert_eq!(
            (urlaub.transactions[0].base, urlaub.transactions[0].fraction),
            (1234, 56)
        );
        let alpha = store.get_money_pool("Alpha").expect("read").expect("exists");
        assert_eq!(
            (alpha.transactions[0].base, alpha.transactions[0].fraction),
            (12345, 67)
        );

        drop(processor);
        drop(store);
        let _ = std::fs::remove_file(&db_path);
    }
}
