use std::collections::BTreeMap;

use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::poller::{PollError, Poller, Step};
use crate::domain::models::{DocumentExpectationSet, DriverConfig, SequenceCursor};
use crate::error::DriverError;
use crate::infrastructure::dataplane::{DataPlaneClient, DataPlaneError};

/// Document-level convergence checks against a sync endpoint.
///
/// Both verifications take the id -> rev map the writer got back from its
/// bulk adds and poll until the replica under test agrees with it, against
/// the generic convergence deadline.
#[derive(Debug, Clone)]
pub struct DocumentVerifier {
    client: DataPlaneClient,
    config: DriverConfig,
    shutdown: Option<broadcast::Sender<()>>,
}

/// Accumulator threaded through the changes-feed scan. Cloned before each
/// round, so a transient fetch error resumes from the last good state
/// instead of re-counting documents.
#[derive(Debug, Clone)]
struct ChangesScan {
    remaining: DocumentExpectationSet,
    cursor: SequenceCursor,
    /// Every sequence at which an expected document has been seen. A
    /// sequence showing up twice means the feed is emitting duplicates,
    /// which no amount of waiting will fix.
    seen: BTreeMap<u64, String>,
    /// Expected documents reported at a revision other than the expected
    /// one; they stay outstanding until the right revision shows up.
    stale_revisions: Vec<String>,
    /// Feed entries for documents nobody asked about, recorded for
    /// diagnostics and otherwise ignored.
    unexpected: Vec<String>,
}

impl DocumentVerifier {
    pub fn new(client: DataPlaneClient, config: DriverConfig) -> Self {
        Self {
            client,
            config,
            shutdown: None,
        }
    }

    /// Abort any in-flight poll early when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: broadcast::Sender<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn poller(&self, operation: &str) -> Poller {
        let poller = Poller::new(
            operation,
            self.config.client_request_deadline(),
            self.config.poll_interval(),
        );
        match &self.shutdown {
            Some(tx) => poller.with_shutdown(tx.subscribe()),
            None => poller,
        }
    }

    /// Block until every expected document is fetchable at exactly its
    /// expected revision.
    ///
    /// A present-but-stale revision is retried like an absent document; the
    /// replica may simply not have caught up yet. An empty expectation set
    /// is vacuously satisfied without touching the endpoint.
    #[instrument(skip(self, expected), fields(docs = expected.len()))]
    pub async fn verify_docs_present(
        &self,
        db: &str,
        expected: &DocumentExpectationSet,
    ) -> Result<(), DriverError> {
        if expected.is_empty() {
            return Ok(());
        }

        let flavor = self.client.flavor().await?;
        let ids: Vec<String> = expected.ids().cloned().collect();
        info!(?flavor, "verifying document presence");

        let presence: Result<(), PollError<DataPlaneError>> = self
            .poller("document presence")
            .fold((), |()| {
                let ids = &ids;
                async move {
                    let fetched = self.client.fetch_docs(flavor, db, ids).await?;

                    let mut found = BTreeMap::new();
                    for doc in &fetched {
                        if doc.missing {
                            debug!(id = %doc.id, "document not present yet");
                            continue;
                        }
                        if let Some(rev) = &doc.rev {
                            found.insert(doc.id.clone(), rev.clone());
                        }
                    }

                    if &found == expected.as_map() {
                        Ok(Step::Done(()))
                    } else {
                        debug!(
                            found = found.len(),
                            expected = expected.len(),
                            "documents not converged yet, retrying"
                        );
                        Ok(Step::Pending(()))
                    }
                }
            })
            .await;
        presence?;

        info!("all documents present at their expected revisions");
        Ok(())
    }

    /// Block until the changes feed has reported every expected document at
    /// its expected revision.
    ///
    /// The feed is consumed longpoll batch by longpoll batch, advancing the
    /// since cursor past each batch, shrinking the expectation set as
    /// documents are confirmed. Seeing the same sequence twice for expected
    /// documents is a feed integrity violation and fails immediately.
    #[instrument(skip(self, expected), fields(docs = expected.len()))]
    pub async fn verify_docs_in_changes(
        &self,
        db: &str,
        expected: &DocumentExpectationSet,
    ) -> Result<(), DriverError> {
        if expected.is_empty() {
            return Ok(());
        }

        let flavor = self.client.flavor().await?;
        info!(?flavor, "verifying documents in changes feed");

        let seed = ChangesScan {
            remaining: expected.clone(),
            cursor: SequenceCursor::start(),
            seen: BTreeMap::new(),
            stale_revisions: Vec::new(),
            unexpected: Vec::new(),
        };

        let scan = self
            .poller("changes feed convergence")
            .fold(seed, |mut scan| async move {
                let batch = self.client.changes(flavor, db, scan.cursor).await?;
                debug!(
                    results = batch.results.len(),
                    last_seq = batch.last_seq,
                    "changes batch received"
                );

                for entry in &batch.results {
                    if !scan.remaining.contains(&entry.id) {
                        debug!(id = %entry.id, seq = entry.seq, "feed entry outside expectation set");
                        scan.unexpected.push(entry.id.clone());
                        continue;
                    }
                    if scan.seen.contains_key(&entry.seq) {
                        return Err(DriverError::DuplicateSequence {
                            seq: entry.seq,
                            doc_id: entry.id.clone(),
                        });
                    }
                    scan.seen.insert(entry.seq, entry.id.clone());

                    let expected_rev = scan.remaining.expected_rev(&entry.id);
                    if entry
                        .changes
                        .iter()
                        .any(|change| Some(change.rev.as_str()) == expected_rev)
                    {
                        scan.remaining.confirm(&entry.id);
                    } else {
                        warn!(
                            id = %entry.id,
                            revs = ?entry.changes,
                            "expected document reported at a stale revision"
                        );
                        scan.stale_revisions.push(entry.id.clone());
                    }
                }

                scan.cursor.advance_to(batch.last_seq);
                if scan.remaining.is_empty() {
                    Ok(Step::Done(scan))
                } else {
                    debug!(
                        remaining = scan.remaining.len(),
                        cursor = %scan.cursor,
                        "changes feed not converged yet, retrying"
                    );
                    Ok(Step::Pending(scan))
                }
            })
            .await?;

        info!(
            sequences = scan.seen.len(),
            stale_revisions = scan.stale_revisions.len(),
            unexpected = scan.unexpected.len(),
            "changes feed converged"
        );
        Ok(())
    }
}
