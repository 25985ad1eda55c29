//! Expression cache: each distinct expression text is compiled once.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;
use tracing::trace;

use super::accessor::Accessor;
use crate::error::CompileError;

/// Maps expression text to its compiled accessor.
#[derive(Default)]
pub struct ExpressionCache {
    entries: RwLock<HashMap<String, Accessor>>,
}

static GLOBAL: OnceLock<ExpressionCache> = OnceLock::new();

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn global() -> &'static ExpressionCache {
        GLOBAL.get_or_init(ExpressionCache::new)
    }

    /// Return the accessor for `text`, compiling it on first use.
    ///
    /// Failed compilations are not remembered.
    pub fn get_or_compile(&self, text: &str) -> Result<Accessor, CompileError> {
        let cached = self.entries.read().get(text).cloned();
        if let Some(accessor) = cached {
            trace!(expression = text, "expression cache hit");
            return Ok(accessor);
        }

        let accessor = super::compile(text)?;
        let mut entries = self.entries.write();
        Ok(entries.entry(text.to_string()).or_insert(accessor).clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
