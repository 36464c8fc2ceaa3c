//! The `Store` adapter contract (§4.8): an abstract key/value interface the
//! runtime evaluator reads sensor inputs from and writes rule outputs to.
//! Real transport adapters (a database, a message bus, a fieldbus gateway)
//! are out of scope; this crate carries only the trait and an in-memory
//! reference implementation used by tests and examples.

use hashbrown::HashMap;
use parking_lot::RwLock;
use thiserror::Error;

use beacon_core::ids::SensorId;
use beacon_core::value::Value;

/// Failure reading from or writing to a store. Runtime I/O errors abort the
/// current cycle; the evaluator retries at the next external tick rather
/// than propagating the error further (§4.7 error conditions).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store read failed: {0}")]
    ReadFailed(String),

    #[error("store write failed: {0}")]
    WriteFailed(String),

    #[error("store is unavailable")]
    Unavailable,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// `read_all`/`write_batch`/`health` per §4.8. Implementations must be
/// idempotent on `write_batch`: writing the same batch twice leaves the
/// store in the same state as writing it once.
pub trait Store: Send + Sync {
    /// Read current values. `keys = None` means "every key the store knows
    /// about"; `Some(keys)` restricts the read to those keys, omitting any
    /// that have no value yet.
    fn read_all(&self, keys: Option<&[SensorId]>) -> StoreResult<HashMap<SensorId, Value>>;

    /// Commit a batch of writes. Must be atomic from the perspective of any
    /// concurrent `read_all`: a reader never observes a partial batch.
    fn write_batch(&self, values: &HashMap<SensorId, Value>) -> StoreResult<()>;

    /// Cheap liveness probe; the evaluator may skip a cycle's I/O rather
    /// than attempt it against a store reporting unhealthy.
    fn health(&self) -> bool;
}

/// An in-memory `Store`, used by tests, examples, and the compiler's own
/// round-trip checks. Not a production adapter.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<SensorId, Value>>,
    healthy: RwLock<bool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            healthy: RwLock::new(true),
        }
    }

    /// Seed the store with initial values, e.g. for a test fixture.
    pub fn seeded(values: HashMap<SensorId, Value>) -> Self {
        Self {
            values: RwLock::new(values),
            healthy: RwLock::new(true),
        }
    }

    /// Test hook: force `health()` to report `false` and every subsequent
    /// operation to fail, simulating a transport outage.
    pub fn set_unhealthy(&self) {
        *self.healthy.write() = false;
    }

    pub fn set_healthy(&self) {
        *self.healthy.write() = true;
    }
}

impl Store for InMemoryStore {
    fn read_all(&self, keys: Option<&[SensorId]>) -> StoreResult<HashMap<SensorId, Value>> {
        if !*self.healthy.read() {
            return Err(StoreError::Unavailable);
        }
        let values = self.values.read();
        let out = match keys {
            None => values.clone(),
            Some(keys) => keys
                .iter()
                .filter_map(|k| values.get(k).map(|v| (k.clone(), v.clone())))
                .collect(),
        };
        Ok(out)
    }

    fn write_batch(&self, values: &HashMap<SensorId, Value>) -> StoreResult<()> {
        if !*self.healthy.read() {
            return Err(StoreError::Unavailable);
        }
        let mut store = self.values.write();
        for (k, v) in values {
            store.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    fn health(&self) -> bool {
        *self.healthy.read()
    }
}
