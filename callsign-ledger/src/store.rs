use async_trait::async_trait;

use crate::{Ledger, StoreResult, VersionToken};

/// Ledger snapshot paired with the revision token that produced it.
#[derive(Clone, Debug)]
pub struct VersionedLedger {
    pub ledger: Ledger,
    pub token: VersionToken,
}

/// Outcome of a conditional write.
#[derive(Clone, Debug)]
pub enum WriteOutcome {
    /// The document was replaced; the token names the new revision.
    Committed(VersionToken),
    /// Another writer moved the document past the supplied token.
    Conflict,
}

/// Outcome of creating the initial document.
#[derive(Clone, Debug)]
pub enum CreateOutcome {
    Created(VersionToken),
    /// Another writer created the document first. The existing document is
    /// left untouched.
    AlreadyExists,
}

/// Versioned single-document storage for the allocation ledger.
///
/// Implementations move bytes: they never interpret the ledger beyond
/// serializing and deserializing it.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch the current document, or `None` when it has never been created.
    async fn read(&self) -> StoreResult<Option<VersionedLedger>>;

    /// Create the document only if it is absent.
    async fn create(&self, ledger: &Ledger) -> StoreResult<CreateOutcome>;

    /// Replace the document only if `token` still names the current revision.
    async fn write_if_match(
        &self,
        ledger: &Ledger,
        token: &VersionToken,
    ) -> StoreResult<WriteOutcome>;
}
