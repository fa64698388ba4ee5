//! 按名称注册的只写一次表
//!
//! 配置与日志都按名称注册：同一名称只能创建一次，之后只读。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::debug;

/// 默认注册名称
pub const DEFAULT_NAME: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} '{name}' does not exist")]
    NotFound { kind: &'static str, name: String },
}

/// 只写一次的命名表
#[derive(Debug)]
pub struct Registry<T> {
    kind: &'static str,
    entries: Mutex<HashMap<String, Arc<T>>>,
}

impl<T> Registry<T> {
    /// `kind` 仅用于错误信息和日志
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 在锁内构建并注册
    ///
    /// 名称已存在时不会调用 `build`；`build` 失败时不会注册任何值。
    pub fn create_with<E, F>(&self, name: &str, build: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RegistryError>,
    {
        let mut entries = self.entries();
        if entries.contains_key(name) {
            return Err(RegistryError::AlreadyExists {
                kind: self.kind,
                name: name.to_string(),
            }
            .into());
        }

        let value = Arc::new(build()?);
        entries.insert(name.to_string(), Arc::clone(&value));
        debug!(kind = self.kind, name, "Registered");
        Ok(value)
    }

    /// 注册一个已构建好的值
    pub fn insert(&self, name: &str, value: T) -> Result<Arc<T>, RegistryError> {
        self.create_with(name, || Ok::<_, RegistryError>(value))
    }

    pub fn get(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        self.entries()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    pub fn get_default(&self) -> Result<Arc<T>, RegistryError> {
        self.get(DEFAULT_NAME)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
