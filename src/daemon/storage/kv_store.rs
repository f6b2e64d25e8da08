use std::{future::Future, io::ErrorKind, path::PathBuf};

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;

/// The four logical records the store knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    Projects,
    Tasks,
    Sessions,
    State,
}

impl StoreKey {
    pub fn file_name(self) -> &'static str {
        match self {
            StoreKey::Projects => "projects.json",
            StoreKey::Tasks => "tasks.json",
            StoreKey::Sessions => "sessions.json",
            StoreKey::State => "state.json",
        }
    }
}

/// Interface for abstracting durable storage of the tracker records.
///
/// Every operation is durable before it returns. The mutating operations are
/// read-modify-write transactions: the store serializes them against other processes sharing
/// the same directory, so callers never observe a partial write and never lose an update to
/// an overlapping writer.
pub trait KeyValueStore: Send + Sync {
    /// Reads one record. A record that was never written is `None`, the caller supplies the
    /// fallback.
    fn get<T>(&self, key: StoreKey) -> impl Future<Output = Result<Option<T>>> + Send
    where
        T: DeserializeOwned + Send;

    /// Replaces one record.
    fn set<T>(&self, key: StoreKey, value: &T) -> impl Future<Output = Result<()>> + Send
    where
        T: Serialize + Sync;

    /// Appends an item to a collection record and returns the updated collection.
    fn append<T>(&self, key: StoreKey, item: T) -> impl Future<Output = Result<Vec<T>>> + Send
    where
        T: Serialize + DeserializeOwned + Send + Sync;

    /// Runs a closure against the current value of a record and persists the result, all
    /// under one exclusive lock. `T::default()` stands in for a record that was never written.
    fn update<T, R>(
        &self,
        key: StoreKey,
        apply: impl FnOnce(&mut T) -> R + Send,
    ) -> impl Future<Output = Result<R>> + Send
    where
        T: Serialize + DeserializeOwned + Default + Send + Sync,
        R: Send;
}

/// The main realization of [KeyValueStore]. One JSON document per key; every operation takes
/// a lock on a sidecar file (shared for reads, exclusive for writes) and documents become
/// visible through an atomic rename, so a crash mid-write leaves the previous document intact.
pub struct JsonStore {
    dir: PathBuf,
}

const LOCK_FILE: &str = "store.lock";

impl JsonStore {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    async fn lock_file(&self) -> Result<File> {
        let file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(self.dir.join(LOCK_FILE))
            .await?;
        Ok(file)
    }

    async fn read_doc<T: DeserializeOwned>(&self, key: StoreKey) -> Result<Option<T>> {
        let path = self.dir.join(key.file_name());
        match fs::read(&path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Found illegal json document in {path:?}"))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_doc<T: Serialize + ?Sized>(&self, key: StoreKey, value: &T) -> Result<()> {
        let path = self.dir.join(key.file_name());
        let staged = self.dir.join(format!("{}.tmp", key.file_name()));
        debug!("Writing {path:?}");

        let mut file = File::create(&staged).await?;
        file.write_all(&serde_json::to_vec(value)?).await?;
        // The document has to reach the disk before the rename makes it visible.
        file.sync_all().await?;
        drop(file);

        fs::rename(&staged, &path).await?;
        Ok(())
    }
}

impl KeyValueStore for JsonStore {
    async fn get<T>(&self, key: StoreKey) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        // Semi-safe acquire-release for the lock file
        let lock = self.lock_file().await?;
        lock.lock_shared()?;
        let result = self.read_doc(key).await;
        lock.unlock_async().await?;
        result
    }

    async fn set<T>(&self, key: StoreKey, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let lock = self.lock_file().await?;
        lock.lock_exclusive()?;
        let result = self.write_doc(key, value).await;
        lock.unlock_async().await?;
        result
    }

    async fn append<T>(&self, key: StoreKey, item: T) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let lock = self.lock_file().await?;
        lock.lock_exclusive()?;
        let result = async {
            let mut items: Vec<T> = self.read_doc(key).await?.unwrap_or_default();
            items.push(item);
            self.write_doc(key, &items).await?;
            Ok(items)
        }
        .await;
        lock.unlock_async().await?;
        result
    }

    async fn update<T, R>(&self, key: StoreKey, apply: impl FnOnce(&mut T) -> R + Send) -> Result<R>
    where
        T: Serialize + DeserializeOwned + Default + Send + Sync,
        R: Send,
    {
        let lock = self.lock_file().await?;
        lock.lock_exclusive()?;
        let result = async {
            let mut value: T = self.read_doc(key).await?.unwrap_or_default();
            let out = apply(&mut value);
            self.write_doc(key, &value).await?;
            Ok(out)
        }
        .await;
        lock.unlock_async().await?;
        result
    }
}
