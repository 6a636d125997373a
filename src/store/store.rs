//! The store: one value, one file, atomic commits
//!
//! [`Store<T>`] owns the canonical copy of a serde value and its backing
//! file. Reads see a consistent snapshot under a shared lock; writes run a
//! copy-mutate-commit protocol under an exclusive lock, so a failed mutation
//! can never corrupt memory or disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::durable;
use super::errors::{StoreError, StoreResult};

/// The last durably committed state: the exact bytes on disk and the value
/// they decode to.
#[derive(Debug)]
struct Committed<T> {
    bytes: Vec<u8>,
    value: T,
}

/// A persistent container for one value of type `T`, backed by one JSON file.
///
/// The value is accessed through [`read`](Store::read) and modified through
/// [`write`](Store::write). Construct a store with [`create`](Store::create)
/// for a fresh file or [`open`](Store::open) to attach to existing state.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use statefile::Store;
///
/// #[derive(Default, Serialize, Deserialize)]
/// struct Config {
///     greeting: String,
/// }
///
/// # fn main() -> statefile::StoreResult<()> {
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("config.json");
///
/// let store: Store<Config> = Store::create(&path)?;
/// store.write(|cfg| {
///     cfg.greeting = "hello".to_string();
///     Ok::<(), std::convert::Infallible>(())
/// })?;
///
/// let greeting = store.read(|cfg| cfg.greeting.clone());
/// assert_eq!(greeting, "hello");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Store<T> {
    /// Backing file location; immutable for the store's lifetime.
    path: PathBuf,
    /// Committed state. Readers share the lock; a writer holds it exclusively
    /// for the whole commit protocol, filesystem I/O included.
    state: RwLock<Committed<T>>,
}

impl<T> Store<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Creates a new store at `path`, materializing the file immediately.
    ///
    /// The default value is encoded and durably written before the store is
    /// returned, which proves the path is writable up front. An existing
    /// regular file at `path` is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the default value fails to encode or the durable
    /// write fails (unwritable directory, path occupied by a directory).
    pub fn create(path: &Path) -> StoreResult<Self>
    where
        T: Default,
    {
        let bytes = serde_json::to_vec(&T::default()).map_err(StoreError::encode)?;
        durable::write_atomic(path, &bytes)?;

        // Adopt what decoding the file yields, not the value we encoded.
        let value = serde_json::from_slice(&bytes).map_err(|e| StoreError::decode(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(Committed { bytes, value }),
        })
    }

    /// Opens an existing store at `path`.
    ///
    /// Open and create are separate so that a service restart can never
    /// silently replace existing state with an empty file. To attach to a
    /// file that may not exist yet, use
    /// [`open_or_create`](Store::open_or_create).
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the file is absent (check with
    ///   [`is_not_found`](StoreError::is_not_found))
    /// - [`StoreError::Decode`] if the file exists but does not parse as `T`
    /// - [`StoreError::Io`] for any other read failure
    pub fn open(path: &Path) -> StoreResult<Self> {
        let bytes = fs::read(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::not_found(path, e)
            } else {
                StoreError::io(format!("failed to read state file {}", path.display()), e)
            }
        })?;

        let value = serde_json::from_slice(&bytes).map_err(|e| StoreError::decode(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(Committed { bytes, value }),
        })
    }

    /// Opens the store at `path`, creating it if the file does not exist.
    ///
    /// Only a not-found failure falls through to creation; every other open
    /// failure is returned as-is, so corrupt state is never overwritten.
    pub fn open_or_create(path: &Path) -> StoreResult<Self>
    where
        T: Default,
    {
        match Self::open(path) {
            Err(e) if e.is_not_found() => Self::create(path),
            other => other,
        }
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Calls `f` with the current value and returns its result.
    ///
    /// The value is stable for the duration of the call: writers block until
    /// every active reader returns. Multiple readers run concurrently. The
    /// reference cannot outlive the closure; a later write replaces the value
    /// wholesale.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        // A panicked writer can only have touched its disposable draft, so
        // the state behind a poisoned lock is still the last committed one.
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state.value)
    }

    /// Calls `f` with a mutable copy of the value, then commits the result
    /// durably.
    ///
    /// The commit sequence, all under the exclusive lock:
    ///
    /// 1. Decode the committed bytes into a fresh draft; the canonical value
    ///    is never handed to the mutator, so failure rolls back for free.
    /// 2. Run `f` on the draft. An error aborts with nothing changed and is
    ///    passed through as [`StoreError::Mutator`].
    /// 3. Encode the draft.
    /// 4. If the encoding is byte-identical to the committed bytes, return
    ///    without touching the disk at all.
    /// 5. Durably replace the backing file (temp file + atomic rename).
    /// 6. Decode the written bytes into a fresh value; the draft the mutator
    ///    saw is dropped, never adopted, so committed state cannot alias
    ///    anything the caller still holds.
    /// 7. Swap the new bytes and value in as the committed state.
    ///
    /// At every observable instant the backing file holds either the
    /// previous or the new serialized state, never a partial write.
    ///
    /// `f` must not call [`read`](Store::read) or [`write`](Store::write) on
    /// the same store; doing so deadlocks against the exclusive lock.
    ///
    /// # Errors
    ///
    /// The mutator's own error, or an encode/decode/filesystem failure. On
    /// any error, memory and disk are exactly as they were before the call.
    pub fn write<F, E>(&self, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        // Mutate a disposable copy so any failure below rolls back to the
        // committed state untouched.
        let mut draft: T =
            serde_json::from_slice(&state.bytes).map_err(|e| StoreError::decode(&self.path, e))?;

        f(&mut draft).map_err(|e| StoreError::Mutator(e.into()))?;

        let encoded = serde_json::to_vec(&draft).map_err(StoreError::encode)?;
        if encoded == state.bytes {
            return Ok(()); // no change
        }

        durable::write_atomic(&self.path, &encoded)?;

        // Re-decode rather than adopt the draft: the committed value must not
        // share memory with anything the mutator captured or built.
        let value: T =
            serde_json::from_slice(&encoded).map_err(|e| StoreError::decode(&self.path, e))?;

        state.bytes = encoded;
        state.value = value;
        Ok(())
    }
}
