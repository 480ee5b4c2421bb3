use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    AllocationError, AllocationResult, Assignment, CancelToken, CreateOutcome, Ledger, LedgerStore,
    WriteOutcome,
};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_START: u64 = 1;

/// Tuning and initialization parameters for an [`Allocator`].
#[derive(Clone, Debug)]
pub struct AllocatorSettings {
    /// Prefix stamped on every issued code.
    pub prefix: String,
    /// First number handed out when the ledger is created lazily.
    pub start: u64,
    /// Conflicting writes tolerated before giving up with `Contention`.
    pub max_attempts: u32,
}

impl AllocatorSettings {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            start: DEFAULT_START,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_start(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Caller identity and display text recorded with an issued code.
#[derive(Clone, Debug)]
pub struct AllocationRequest {
    pub requester_id: String,
    pub label: String,
}

impl AllocationRequest {
    pub fn new(requester_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            requester_id: requester_id.into(),
            label: label.into(),
        }
    }
}

/// Code handed back to a caller after a committed allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedCode {
    pub code: String,
    pub number: u64,
}

/// Issues sequential codes through optimistic writes against a [`LedgerStore`].
///
/// The allocator holds no allocation state of its own. Every call re-reads
/// the document and commits through the store's version check, so concurrent
/// callers can never receive the same number: a write that lost a race comes
/// back as a conflict and the attempt restarts from fresh state.
pub struct Allocator {
    store: Arc<dyn LedgerStore>,
    settings: AllocatorSettings,
}

impl Allocator {
    pub fn new(store: Arc<dyn LedgerStore>, settings: AllocatorSettings) -> Self {
        Self { store, settings }
    }

    /// Allocate the next code for `request`.
    pub async fn allocate(&self, request: AllocationRequest) -> AllocationResult<IssuedCode> {
        self.allocate_with_cancel(request, &CancelToken::new())
            .await
    }

    /// Allocate, observing `cancel` between attempts (never mid-write).
    ///
    /// Transport failures from the store are terminal on first occurrence:
    /// a failed read is not evidence of contention, and retrying a failed
    /// write after a clean version check would mask outages.
    pub async fn allocate_with_cancel(
        &self,
        request: AllocationRequest,
        cancel: &CancelToken,
    ) -> AllocationResult<IssuedCode> {
        let mut attempt = 0u32;
        let mut initialized = false;
        loop {
            if cancel.is_cancelled() {
                return Err(AllocationError::Cancelled);
            }

            let Some(snapshot) = self.store.read().await? else {
                // Cold start: create the document once, then re-read. Losing
                // the creation race means someone else made it for us.
                if initialized {
                    return Err(AllocationError::InvalidState(
                        "ledger still missing after initialization".into(),
                    ));
                }
                initialized = true;
                let initial = Ledger::new(self.settings.prefix.as_str(), self.settings.start);
                match self.store.create(&initial).await? {
                    CreateOutcome::Created(_) => {
                        info!(
                            prefix = %self.settings.prefix,
                            start = self.settings.start,
                            "initialized code ledger"
                        );
                    }
                    CreateOutcome::AlreadyExists => {
                        debug!("lost ledger initialization race, re-reading");
                    }
                }
                continue;
            };

            let (mut ledger, token) = (snapshot.ledger, snapshot.token);
            let number = ledger.next_sequence;
            let code = ledger.code_for(number);
            ledger.next_sequence = number + 1;
            ledger.assignments.push(Assignment {
                code: code.clone(),
                requester_id: request.requester_id.clone(),
                label: request.label.clone(),
                issued_at: Utc::now(),
            });

            attempt += 1;
            match self.store.write_if_match(&ledger, &token).await? {
                WriteOutcome::Committed(_) => {
                    info!(code = %code, attempt, "issued code");
                    return Ok(IssuedCode { code, number });
                }
                WriteOutcome::Conflict if attempt < self.settings.max_attempts => {
                    debug!(attempt, "ledger write conflicted, re-reading");
                }
                WriteOutcome::Conflict => {
                    warn!(attempts = attempt, "allocation retry budget exhausted");
                    return Err(AllocationError::Contention { attempts: attempt });
                }
            }
        }
    }
}
