// src/codec/registry.rs
//! Type registry: stable identity → (codec, compact code)
//!
//! Codes are handed out 0, 1, 2, … and never reused, even after `remove`.
//! Only `clear` resets the counter.

use crate::codec::TypeCodec;
use crate::utils::errors::{ContinuumError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct RegistryInner {
    codecs: HashMap<Uuid, Arc<dyn TypeCodec>>,
    codes: HashMap<Uuid, i16>,
    next_code: i32,
}

/// Lock-guarded codec registry, shared by reference between readers,
/// writers and services
#[derive(Default)]
pub struct TypeRegistry {
    inner: Mutex<RegistryInner>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec and return its compact code
    pub fn add(&self, codec: Arc<dyn TypeCodec>) -> Result<i16> {
        let type_id = codec.type_id();
        let mut inner = self.inner.lock();

        if inner.codecs.contains_key(&type_id) {
            return Err(ContinuumError::DuplicateCodec(type_id));
        }

        let code = i16::try_from(inner.next_code).map_err(|_| ContinuumError::CodeSpaceExhausted)?;

        inner.codecs.insert(type_id, codec);
        inner.codes.insert(type_id, code);
        inner.next_code += 1;

        debug!("Registered type {} as code {}", type_id, code);
        Ok(code)
    }

    /// Remove both mappings for an identity. Returns whether it was present.
    pub fn remove(&self, type_id: &Uuid) -> bool {
        let mut inner = self.inner.lock();
        let had_codec = inner.codecs.remove(type_id).is_some();
        let had_code = inner.codes.remove(type_id).is_some();
        had_codec || had_code
    }

    pub fn find(&self, type_id: &Uuid) -> Option<Arc<dyn TypeCodec>> {
        self.inner.lock().codecs.get(type_id).cloned()
    }

    pub fn is_allocated(&self, type_id: &Uuid) -> bool {
        self.inner.lock().codes.contains_key(type_id)
    }

    pub fn allocated_code(&self, type_id: &Uuid) -> Option<i16> {
        self.inner.lock().codes.get(type_id).copied()
    }

    /// Snapshot of the current allocations, ordered by code
    pub fn allocation_table(&self) -> Vec<(i16, Uuid)> {
        let inner = self.inner.lock();
        let mut table: Vec<(i16, Uuid)> = inner.codes.iter().map(|(id, code)| (*code, *id)).collect();
        table.sort_by_key(|(code, _)| *code);
        table
    }

    pub fn len(&self) -> usize {
        self.inner.lock().codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every codec and restart allocation at 0
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.codecs.clear();
        inner.codes.clear();
        inner.next_code = 0;
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("table", &self.allocation_table())
            .finish()
    }
}
