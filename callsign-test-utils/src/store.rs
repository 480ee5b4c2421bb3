use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use callsign_ledger::{
    CreateOutcome, Ledger, LedgerStore, StoreError, StoreResult, VersionToken, VersionedLedger,
    WriteOutcome,
};

/// In-memory [`LedgerStore`] with genuine compare-and-swap semantics.
///
/// Revisions are a simple counter, so concurrent writers really do conflict.
/// Faults can be scripted on top: forced conflicts, queued transport errors,
/// a create that loses a simulated race, and a create whose acknowledgement
/// is never persisted (for stores without a true create-if-absent primitive).
#[derive(Default)]
pub struct MockStore {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    doc: Option<(Ledger, u64)>,
    revision: u64,
    forced_conflicts: u32,
    read_faults: VecDeque<StoreError>,
    write_faults: VecDeque<StoreError>,
    preempted_create: Option<Ledger>,
    swallow_creates: bool,
    reads: u64,
    creates: u64,
    writes: u64,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(ledger: Ledger) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            state.revision = 1;
            state.doc = Some((ledger, 1));
        }
        store
    }

    /// Force the next `count` conditional writes to conflict without
    /// advancing the document.
    pub fn force_write_conflicts(&self, count: u32) {
        self.state.lock().unwrap().forced_conflicts += count;
    }

    pub fn fail_next_read(&self, error: StoreError) {
        self.state.lock().unwrap().read_faults.push_back(error);
    }

    pub fn fail_next_write(&self, error: StoreError) {
        self.state.lock().unwrap().write_faults.push_back(error);
    }

    /// The next `create` call loses the race: `winner` is installed first and
    /// the caller sees `AlreadyExists`.
    pub fn preempt_create(&self, winner: Ledger) {
        self.state.lock().unwrap().preempted_create = Some(winner);
    }

    /// Acknowledge creates without persisting anything, emulating a backend
    /// whose create is not a real only-if-absent primitive.
    pub fn swallow_creates(&self) {
        self.state.lock().unwrap().swallow_creates = true;
    }

    /// Current document, if any.
    pub fn ledger(&self) -> Option<Ledger> {
        self.state
            .lock()
            .unwrap()
            .doc
            .as_ref()
            .map(|(ledger, _)| ledger.clone())
    }

    pub fn reads(&self) -> u64 {
        self.state.lock().unwrap().reads
    }

    pub fn creates(&self) -> u64 {
        self.state.lock().unwrap().creates
    }

    pub fn writes(&self) -> u64 {
        self.state.lock().unwrap().writes
    }
}

#[async_trait]
impl LedgerStore for MockStore {
    async fn read(&self) -> StoreResult<Option<VersionedLedger>> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        if let Some(err) = state.read_faults.pop_front() {
            return Err(err);
        }
        Ok(state.doc.as_ref().map(|(ledger, revision)| VersionedLedger {
            ledger: ledger.clone(),
            token: VersionToken::new(revision.to_string()),
        }))
    }

    async fn create(&self, ledger: &Ledger) -> StoreResult<CreateOutcome> {
        let mut state = self.state.lock().unwrap();
        state.creates += 1;
        if let Some(winner) = state.preempted_create.take() {
            state.revision += 1;
            let revision = state.revision;
            state.doc = Some((winner, revision));
            return Ok(CreateOutcome::AlreadyExists);
        }
        if state.doc.is_some() {
            return Ok(CreateOutcome::AlreadyExists);
        }
        state.revision += 1;
        let revision = state.revision;
        if !state.swallow_creates {
            state.doc = Some((ledger.clone(), revision));
        }
        Ok(CreateOutcome::Created(VersionToken::new(
            revision.to_string(),
        )))
    }

    async fn write_if_match(
        &self,
        ledger: &Ledger,
        token: &VersionToken,
    ) -> StoreResult<WriteOutcome> {
        let mut state = self.state.lock().unwrap();
        state.writes += 1;
        if let Some(err) = state.write_faults.pop_front() {
            return Err(err);
        }
        if state.forced_conflicts > 0 {
            state.forced_conflicts -= 1;
            return Ok(WriteOutcome::Conflict);
        }
        let token_is_current = state
            .doc
            .as_ref()
            .is_some_and(|(_, revision)| revision.to_string() == token.as_str());
        if !token_is_current {
            return Ok(WriteOutcome::Conflict);
        }
        state.revision += 1;
        let revision = state.revision;
        state.doc = Some((ledger.clone(), revision));
        Ok(WriteOutcome::Committed(VersionToken::new(
            revision.to_string(),
        )))
    }
}
