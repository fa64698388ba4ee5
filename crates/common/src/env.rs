//! 环境变量读取工具
//!
//! 所有读取函数都基于 [`EnvSource`]，生产环境使用 [`ProcessEnv`]，
//! 测试中可以直接传入 `HashMap`，避免修改进程级环境变量。

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("Invalid value {kind} for {key}: {value}")]
    InvalidValue {
        key: String,
        value: String,
        kind: &'static str,
    },

    #[error("Failed to load env file: {0}")]
    File(#[from] dotenvy::Error),
}

impl EnvError {
    fn invalid(key: &str, value: &str, kind: &'static str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            kind,
        }
    }
}

/// 环境变量来源
pub trait EnvSource {
    /// 查找变量，未设置时返回 `None`
    fn lookup(&self, key: &str) -> Option<String>;
}

/// 当前进程的环境变量
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl<T: EnvSource + ?Sized> EnvSource for &T {
    fn lookup(&self, key: &str) -> Option<String> {
        (**self).lookup(key)
    }
}

/// 两层来源：先查 `primary`，未设置时再查 `fallback`
///
/// 进程环境放在 `primary`，dotenv 文件放在 `fallback`，已设置的进程变量不会被文件覆盖。
#[derive(Debug, Clone)]
pub struct LayeredEnv<P, F> {
    primary: P,
    fallback: F,
}

impl<P: EnvSource, F: EnvSource> LayeredEnv<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: EnvSource, F: EnvSource> EnvSource for LayeredEnv<P, F> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.primary
            .lookup(key)
            .or_else(|| self.fallback.lookup(key))
    }
}

/// 读取 dotenv 文件为键值表（不写入进程环境）
pub fn load_env_file(path: impl AsRef<Path>) -> Result<HashMap<String, String>, EnvError> {
    let mut vars = HashMap::new();
    for item in dotenvy::from_path_iter(path)? {
        let (key, value) = item?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// 读取字符串，去除首尾空白；未设置或为空时返回默认值
pub fn get_env_string(env: &impl EnvSource, key: &str, default: &str) -> String {
    env.lookup(key)
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// 读取整数；已设置但无法解析时返回错误
pub fn get_env_int<T: FromStr>(env: &impl EnvSource, key: &str, default: T) -> Result<T, EnvError> {
    match env.lookup(key) {
        Some(val) => val
            .parse::<T>()
            .map_err(|_| EnvError::invalid(key, &val, "int")),
        None => Ok(default),
    }
}

/// 读取布尔值，接受 1/t/T/TRUE/true/True 与 0/f/F/FALSE/false/False
pub fn get_env_bool(env: &impl EnvSource, key: &str, default: bool) -> Result<bool, EnvError> {
    match env.lookup(key) {
        Some(val) => match val.as_str() {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
            _ => Err(EnvError::invalid(key, &val, "bool")),
        },
        None => Ok(default),
    }
}

/// 读取逗号分隔的字符串列表
///
/// 每一项去除空白，空项丢弃；结果为空时返回默认值。
pub fn get_env_string_slice(env: &impl EnvSource, key: &str, default: &[&str]) -> Vec<String> {
    if let Some(val) = env.lookup(key) {
        let items: Vec<String> = val
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect();
        if !items.is_empty() {
            return items;
        }
    }
    default.iter().map(|item| item.to_string()).collect()
}

/// 读取逗号分隔的整数列表
///
/// 变量为空或全是空白时返回默认值。任何一项无法解析都会使整个列表失败，
/// 与字符串列表丢弃空项的行为不同。
pub fn get_env_int_slice<T>(env: &impl EnvSource, key: &str, default: &[T]) -> Result<Vec<T>, EnvError>
where
    T: FromStr + Clone,
{
    let val = match env.lookup(key) {
        Some(val) if !val.trim().is_empty() => val,
        _ => return Ok(default.to_vec()),
    };

    val.split(',')
        .map(|item| {
            let item = item.trim();
            item.parse::<T>()
                .map_err(|_| EnvError::invalid(key, item, "int"))
        })
        .collect()
}
