//! Ledger primitives and the optimistic code allocator used by Callsign.

mod allocator;
mod cancel;
mod document;
mod error;
mod file;
mod store;

pub use allocator::{AllocationRequest, Allocator, AllocatorSettings, IssuedCode};
pub use cancel::CancelToken;
pub use document::{Assignment, Ledger, VersionToken};
pub use error::{AllocationError, AllocationResult, StoreError, StoreResult};
pub use file::FileStore;
pub use store::{CreateOutcome, LedgerStore, VersionedLedger, WriteOutcome};
