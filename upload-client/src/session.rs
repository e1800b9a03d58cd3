use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    credential::Credential,
    error::{TransferError, UploadError, UploadResult},
    file::{CandidateFile, FileInfo},
    issuer::CredentialIssuer,
    policy::UploadPolicy,
    transfer::{ProgressReporter, TransferExecutor},
};

/// Identifies one upload attempt within a session
pub type AttemptId = u64;

/// Observable state of an upload session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// No file held
    Idle,
    /// A validated file is waiting to be uploaded
    Selected(FileInfo),
    /// The file is being transferred
    InProgress {
        /// File being uploaded
        file: FileInfo,
        /// Percentage sent, never decreasing
        percent: u8,
    },
    /// The object was stored
    Succeeded {
        /// Write URL without its signature
        retrieval_url: String,
    },
    /// The attempt failed; only `remove` leaves this state
    Failed {
        /// What went wrong
        reason: UploadError,
    },
}

impl UploadOutcome {
    /// Whether the attempt has ended
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }

    /// Short state name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Selected(_) => "selected",
            Self::InProgress { .. } => "in_progress",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Something that happened to a running transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Percentage of bytes sent
    Progress(u8),
    /// The PUT succeeded
    Completed {
        /// Retrieval URL reported by the executor
        retrieval_url: String,
    },
    /// The PUT failed
    Failed(TransferError),
}

/// A transfer event tagged with the attempt it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptEvent {
    /// Attempt that produced the event
    pub attempt: AttemptId,
    /// The event itself
    pub event: TransferEvent,
}

/// Handle on the running transfer; dropping it aborts the transfer
struct InFlight {
    cancel: CancellationToken,
    retrieval_url: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Drives one file through selection, credential acquisition and transfer
///
/// The session exclusively owns the candidate file and the write credential.
/// Transfers run on spawned tasks and report back through events tagged with
/// an [`AttemptId`]; events from an attempt that is no longer current are
/// discarded. Dropping the session aborts any running transfer.
pub struct UploadSession {
    issuer: Arc<dyn CredentialIssuer>,
    executor: Arc<dyn TransferExecutor>,
    policy: UploadPolicy,
    outcome: UploadOutcome,
    file: Option<CandidateFile>,
    credential: Option<Credential>,
    attempt: AttemptId,
    in_flight: Option<InFlight>,
    events_tx: mpsc::UnboundedSender<AttemptEvent>,
    events_rx: mpsc::UnboundedReceiver<AttemptEvent>,
    outcome_tx: watch::Sender<UploadOutcome>,
}

impl UploadSession {
    /// Creates an idle session holding no credential
    ///
    /// Call [`UploadSession::issue_credential`] to obtain the first credential.
    #[must_use]
    pub fn new(
        issuer: Arc<dyn CredentialIssuer>,
        executor: Arc<dyn TransferExecutor>,
        policy: UploadPolicy,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outcome_tx, _) = watch::channel(UploadOutcome::Idle);

        Self {
            issuer,
            executor,
            policy,
            outcome: UploadOutcome::Idle,
            file: None,
            credential: None,
            attempt: 0,
            in_flight: None,
            events_tx,
            events_rx,
            outcome_tx,
        }
    }

    /// Current state
    #[must_use]
    pub const fn outcome(&self) -> &UploadOutcome {
        &self.outcome
    }

    /// Current attempt identifier
    #[must_use]
    pub const fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Credential held for the next transfer, if any
    #[must_use]
    pub const fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Selected file, if any
    #[must_use]
    pub const fn file(&self) -> Option<&CandidateFile> {
        self.file.as_ref()
    }

    /// Validation rules in force
    #[must_use]
    pub const fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Receiver mirroring every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<UploadOutcome> {
        self.outcome_tx.subscribe()
    }

    /// Requests a fresh credential, replacing any held one
    ///
    /// # Errors
    ///
    /// Returns `UploadError::IssuerUnavailable` if issuance fails; the state is unchanged
    #[instrument(skip(self), fields(attempt = self.attempt))]
    pub async fn issue_credential(&mut self) -> UploadResult<&Credential> {
        let credential = self.issuer.issue_write_credential().await.map_err(|e| {
            warn!("Credential issuance failed: {e}");
            e
        })?;

        debug!(
            object_key = credential.object_key().unwrap_or_default(),
            issued_at = %credential.issued_at(),
            "Holding new credential"
        );
        Ok(self.credential.insert(credential))
    }

    /// Validates `file` and makes it the candidate, replacing any previous one
    ///
    /// # Errors
    ///
    /// - `UploadError::InvalidFile` if validation fails; the state is unchanged
    /// - `UploadError::UploadInProgress` while a transfer is running
    /// - `UploadError::AttemptFinished` after success or failure, until `remove`
    pub fn select(&mut self, file: CandidateFile) -> UploadResult<()> {
        match self.outcome {
            UploadOutcome::InProgress { .. } => return Err(UploadError::UploadInProgress),
            UploadOutcome::Succeeded { .. } | UploadOutcome::Failed { .. } => {
                return Err(UploadError::AttemptFinished)
            }
            UploadOutcome::Idle | UploadOutcome::Selected(_) => {}
        }

        if let Err(reason) = self.policy.validate(&file) {
            info!(
                name = file.name(),
                mime_type = file.mime_type(),
                size_bytes = file.size_bytes(),
                "Rejected file: {reason}"
            );
            return Err(reason.into());
        }

        let info = file.info();
        self.file = Some(file);
        self.set_outcome(UploadOutcome::Selected(info));
        Ok(())
    }

    /// Starts transferring the selected file
    ///
    /// Re-issues the credential first if it is missing or expired, judged by
    /// the shorter of its own TTL and the policy TTL. While a
    /// transfer is already running this does nothing and returns the current
    /// state.
    ///
    /// # Errors
    ///
    /// - `UploadError::NoFileSelected` when idle
    /// - `UploadError::AttemptFinished` after success or failure, until `remove`
    /// - `UploadError::CredentialExpired` if an expired credential could not be replaced
    /// - `UploadError::IssuerUnavailable` if no credential was held and issuance failed
    ///
    /// The last two also move the session to `Failed`.
    #[instrument(skip(self), fields(attempt = self.attempt))]
    pub async fn start(&mut self) -> UploadResult<UploadOutcome> {
        match self.outcome {
            UploadOutcome::InProgress { .. } => {
                debug!("Transfer already running");
                return Ok(self.outcome.clone());
            }
            UploadOutcome::Idle => return Err(UploadError::NoFileSelected),
            UploadOutcome::Succeeded { .. } | UploadOutcome::Failed { .. } => {
                return Err(UploadError::AttemptFinished)
            }
            UploadOutcome::Selected(_) => {}
        }

        let Some(file) = self.file.clone() else {
            return Err(UploadError::NoFileSelected);
        };

        let credential = match self.credential.take() {
            Some(credential) if !self.is_stale(&credential) => credential,
            Some(stale) => {
                info!(
                    object_key = stale.object_key().unwrap_or_default(),
                    "Credential expired, re-issuing"
                );
                match self.issuer.issue_write_credential().await {
                    Ok(credential) => credential,
                    Err(e) => {
                        return Err(self.fail(UploadError::CredentialExpired(issuer_message(e))));
                    }
                }
            }
            None => match self.issuer.issue_write_credential().await {
                Ok(credential) => credential,
                Err(e) => return Err(self.fail(e)),
            },
        };

        self.attempt += 1;
        self.spawn_transfer(credential, file);
        Ok(self.outcome.clone())
    }

    /// A credential is stale once its age reaches the shorter of its own TTL and the policy TTL
    fn is_stale(&self, credential: &Credential) -> bool {
        let ttl = credential.ttl().min(self.policy.credential_ttl());
        credential.age_at(Utc::now()) >= ttl
    }

    fn spawn_transfer(&mut self, credential: Credential, file: CandidateFile) {
        let attempt = self.attempt;
        let info = file.info();
        let cancel = CancellationToken::new();
        let retrieval_url = credential.retrieval_url().to_string();

        let progress_tx = self.events_tx.clone();
        let reporter = ProgressReporter::new(move |percent| {
            // Receiver lives as long as the session
            let _ = progress_tx.send(AttemptEvent {
                attempt,
                event: TransferEvent::Progress(percent),
            });
        });

        let events_tx = self.events_tx.clone();
        let executor = Arc::clone(&self.executor);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let transfer = AssertUnwindSafe(executor.transfer(&credential, &file, reporter));
            let result = tokio::select! {
                () = task_cancel.cancelled() => Err(TransferError::Cancelled),
                result = transfer.catch_unwind() => result.unwrap_or_else(|panic| {
                    warn!(attempt, "Transfer panicked");
                    Err(TransferError::Network(format!(
                        "transfer aborted: {}",
                        panic_message(panic.as_ref())
                    )))
                }),
            };

            let event = match result {
                Ok(retrieval_url) => TransferEvent::Completed { retrieval_url },
                Err(error) => TransferEvent::Failed(error),
            };

            if events_tx.send(AttemptEvent { attempt, event }).is_err() {
                debug!(attempt, "Session dropped before the transfer finished");
            }
        });

        self.in_flight = Some(InFlight {
            cancel,
            retrieval_url,
        });
        self.set_outcome(UploadOutcome::InProgress {
            file: info,
            percent: 0,
        });
    }

    /// Applies a transfer event, returning whether the state changed
    ///
    /// Events from other attempts, events outside `InProgress` and progress
    /// that does not increase are ignored.
    pub fn apply(&mut self, event: AttemptEvent) -> bool {
        if event.attempt != self.attempt {
            debug!(
                event_attempt = event.attempt,
                current_attempt = self.attempt,
                "Discarding event from a stale attempt"
            );
            return false;
        }

        if !matches!(self.outcome, UploadOutcome::InProgress { .. }) {
            debug!(state = self.outcome.name(), "Discarding event outside a transfer");
            return false;
        }

        match event.event {
            TransferEvent::Progress(percent) => self.progress(percent),
            TransferEvent::Completed { retrieval_url } => {
                self.complete(&retrieval_url);
                true
            }
            TransferEvent::Failed(error) => {
                self.fail(UploadError::Transfer(error));
                true
            }
        }
    }

    fn progress(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        let UploadOutcome::InProgress {
            file,
            percent: current,
        } = &self.outcome
        else {
            return false;
        };

        if percent <= *current {
            return false;
        }

        let file = file.clone();
        self.set_outcome(UploadOutcome::InProgress { file, percent });
        true
    }

    fn complete(&mut self, reported_url: &str) {
        let retrieval_url = self.in_flight.take().map_or_else(
            || reported_url.to_string(),
            |in_flight| in_flight.retrieval_url.clone(),
        );

        if retrieval_url != reported_url {
            warn!(
                %retrieval_url,
                reported_url, "Executor reported a different retrieval URL"
            );
        }

        self.set_outcome(UploadOutcome::Succeeded { retrieval_url });
    }

    fn fail(&mut self, reason: UploadError) -> UploadError {
        self.in_flight = None;
        self.set_outcome(UploadOutcome::Failed {
            reason: reason.clone(),
        });
        reason
    }

    /// Waits for the next event of the running transfer
    ///
    /// Outside `InProgress` this only drains already queued events and
    /// returns `None` once the queue is empty.
    pub async fn next_event(&mut self) -> Option<AttemptEvent> {
        if matches!(self.outcome, UploadOutcome::InProgress { .. }) {
            self.events_rx.recv().await
        } else {
            self.events_rx.try_recv().ok()
        }
    }

    /// Applies events until the attempt leaves `InProgress`, then returns the state
    pub async fn wait_for_outcome(&mut self) -> UploadOutcome {
        while matches!(self.outcome, UploadOutcome::InProgress { .. }) {
            match self.next_event().await {
                Some(event) => {
                    self.apply(event);
                }
                None => break,
            }
        }
        self.outcome.clone()
    }

    /// Discards the file and credential, aborts any transfer and requests a fresh credential
    ///
    /// The session is `Idle` afterwards even if issuance fails.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::IssuerUnavailable` if the fresh credential could not be issued
    #[instrument(skip(self), fields(attempt = self.attempt))]
    pub async fn remove(&mut self) -> UploadResult<()> {
        self.attempt += 1;
        if self.in_flight.take().is_some() {
            info!("Aborted running transfer");
        }
        while self.events_rx.try_recv().is_ok() {}

        self.file = None;
        self.credential = None;
        self.set_outcome(UploadOutcome::Idle);

        self.issue_credential().await.map(|_| ())
    }

    /// Same as [`UploadSession::remove`]
    ///
    /// # Errors
    ///
    /// Returns `UploadError::IssuerUnavailable` if the fresh credential could not be issued
    pub async fn reset(&mut self) -> UploadResult<()> {
        self.remove().await
    }

    fn set_outcome(&mut self, outcome: UploadOutcome) {
        if self.outcome.name() != outcome.name() {
            info!(
                attempt = self.attempt,
                from = self.outcome.name(),
                to = outcome.name(),
                "Upload state changed"
            );
        }
        self.outcome = outcome;
        self.outcome_tx.send_replace(self.outcome.clone());
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("executor panicked")
}

/// Keeps the issuer's own message when wrapping its failure
fn issuer_message(error: UploadError) -> String {
    match error {
        UploadError::IssuerUnavailable(message) => message,
        other => other.to_string(),
    }
}
