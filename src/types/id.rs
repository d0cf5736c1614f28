// ABOUTME: Phantom-typed identifiers for compile-time type safety.
// ABOUTME: Execution IDs combine submission time, process id and a sequence.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Marker type for execution identifiers.
pub enum ExecutionMarker {}

/// A type-safe identifier that prevents accidental mixing of different ID types.
#[must_use = "IDs reference resources and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

static EXECUTION_SEQ: AtomicU64 = AtomicU64::new(0);

impl Id<ExecutionMarker> {
    /// Generate a fresh execution ID, e.g. `exec-20260118T093012123-4821-0004`.
    ///
    /// IDs sort by creation time. The process id separates CLI invocations
    /// sharing a state directory; the sequence separates IDs within a process.
    pub fn generate() -> Self {
        let seq = EXECUTION_SEQ.fetch_add(1, Ordering::Relaxed);
        Self::new(format!(
            "exec-{}-{}-{:04}",
            Utc::now().format("%Y%m%dT%H%M%S%3f"),
            std::process::id(),
            seq % 10_000
        ))
    }
}

// Manual trait implementations that don't require T to implement the trait.

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

pub type ExecutionId = Id<ExecutionMarker>;
