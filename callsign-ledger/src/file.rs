use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;

use crate::{
    CreateOutcome, Ledger, LedgerStore, StoreError, StoreResult, VersionToken, VersionedLedger,
    WriteOutcome,
};

/// Ledger store backed by a JSON file on local disk.
///
/// Revisions are identified by the SHA-256 of the serialized bytes, so a
/// conditional write only lands while the file still holds the bytes the
/// caller read. Writes go through a sibling temp file and a rename; an
/// in-process mutex serializes the check-then-write.
pub struct FileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_raw(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::transport(err)),
        }
    }

    async fn persist(&self, ledger: &Ledger) -> StoreResult<VersionToken> {
        let bytes = encode(ledger)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(content_token(&bytes))
    }
}

fn encode(ledger: &Ledger) -> StoreResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(ledger)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> StoreResult<Ledger> {
    Ok(serde_json::from_slice(bytes)?)
}

fn content_token(bytes: &[u8]) -> VersionToken {
    VersionToken::new(hex::encode(Sha256::digest(bytes)))
}

#[async_trait]
impl LedgerStore for FileStore {
    async fn read(&self) -> StoreResult<Option<VersionedLedger>> {
        let Some(bytes) = self.read_raw().await? else {
            return Ok(None);
        };
        Ok(Some(VersionedLedger {
            ledger: decode(&bytes)?,
            token: content_token(&bytes),
        }))
    }

    async fn create(&self, ledger: &Ledger) -> StoreResult<CreateOutcome> {
        let _guard = self.guard.lock().await;
        if self.read_raw().await?.is_some() {
            return Ok(CreateOutcome::AlreadyExists);
        }
        Ok(CreateOutcome::Created(self.persist(ledger).await?))
    }

    async fn write_if_match(
        &self,
        ledger: &Ledger,
        token: &VersionToken,
    ) -> StoreResult<WriteOutcome> {
        let _guard = self.guard.lock().await;
        let Some(bytes) = self.read_raw().await? else {
            return Ok(WriteOutcome::Conflict);
        };
        if content_token(&bytes) != *token {
            return Ok(WriteOutcome::Conflict);
        }
        Ok(WriteOutcome::Committed(self.persist(ledger).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> FileStore {
        FileStore::new(dir.path().join("codes.json"))
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert!(store.read().await.unwrap().is_none());
        let outcome = store.create(&Ledger::new("OPS-", 700)).await.unwrap();
        assert!(matches!(outcome, CreateOutcome::Created(_)));

        let snapshot = store.read().await.unwrap().expect("file exists");
        assert_eq!(snapshot.ledger.next_sequence, 700);
        assert_eq!(snapshot.ledger.prefix, "OPS-");
    }

    #[tokio::test]
    async fn create_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.create(&Ledger::new("OPS-", 700)).await.unwrap();
        let outcome = store.create(&Ledger::new("ZZZ-", 1)).await.unwrap();
        assert!(matches!(outcome, CreateOutcome::AlreadyExists));

        let snapshot = store.read().await.unwrap().unwrap();
        assert_eq!(snapshot.ledger.prefix, "OPS-");
    }

    #[tokio::test]
    async fn stale_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.create(&Ledger::new("OPS-", 700)).await.unwrap();

        let first = store.read().await.unwrap().unwrap();
        let mut updated = first.ledger.clone();
        updated.next_sequence = 701;
        assert!(matches!(
            store.write_if_match(&updated, &first.token).await.unwrap(),
            WriteOutcome::Committed(_)
        ));

        // the old token no longer names the current bytes
        updated.next_sequence = 702;
        assert!(matches!(
            store.write_if_match(&updated, &first.token).await.unwrap(),
            WriteOutcome::Conflict
        ));
        assert_eq!(store.read().await.unwrap().unwrap().ledger.next_sequence, 701);
    }

    #[tokio::test]
    async fn write_against_missing_file_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let outcome = store
            .write_if_match(&Ledger::new("OPS-", 1), &VersionToken::new("gone"))
            .await
            .unwrap();
        assert!(matches!(outcome, WriteOutcome::Conflict));
    }

    #[tokio::test]
    async fn corrupt_document_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codes.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let err = FileStore::new(&path).read().await.expect_err("corrupt");
        assert!(matches!(err, StoreError::InvalidDocument(_)));
    }
}
