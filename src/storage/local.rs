use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{AppError, AppResult};

/// Device-side persistent key-value storage.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> AppResult<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> AppResult<()>;
    async fn remove_item(&self, key: &str) -> AppResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.items
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("local storage lock poisoned")))
    }
}

#[async_trait]
impl LocalStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> AppResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> AppResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Prefixes every key with a device namespace so one backing store can hold
/// the storage of many devices.
#[derive(Clone)]
pub struct ScopedStorage {
    inner: Arc<dyn LocalStorage>,
    prefix: String,
}

impl ScopedStorage {
    pub fn for_device(inner: Arc<dyn LocalStorage>, device_id: &str) -> Self {
        Self {
            inner,
            prefix: format!("device:{}:", device_id),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl LocalStorage for ScopedStorage {
    async fn get_item(&self, key: &str) -> AppResult<Option<String>> {
        self.inner.get_item(&self.key(key)).await
    }

    async fn set_item(&self, key: &str, value: &str) -> AppResult<()> {
        self.inner.set_item(&self.key(key), value).await
    }

    async fn remove_item(&self, key: &str) -> AppResult<()> {
        self.inner.remove_item(&self.key(key)).await
    }
}
