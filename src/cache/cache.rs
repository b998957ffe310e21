use std::{fmt::Display, future::Future};

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    constants::CATALOG_CACHE_SECONDS,
    error::{CacheError, Error},
};

const CATALOG_CACHE_KEY: &str = "catalog-cache-key";

// Caching - keys

#[derive(Clone, Debug)]
pub struct CacheKey {
    _value: String,
    _type: CacheKeyType,
}

impl CacheKey {
    pub fn from<T: Display>(r#type: CacheKeyType, key: T) -> Self {
        Self {
            _value: key.to_string(),
            _type: r#type,
        }
    }

    pub fn lifetime(&self) -> CacheLifetime {
        match self._type {
            CacheKeyType::Tags
            | CacheKeyType::Tag
            | CacheKeyType::Ingredient
            | CacheKeyType::IngredientSearch => CacheLifetime::BindCatalogCache,
            CacheKeyType::ShortLink => CacheLifetime::Infinite,
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self._type {
            CacheKeyType::Tags => write!(f, "tags-{}", self._value),
            CacheKeyType::Tag => write!(f, "tag-{}", self._value),
            CacheKeyType::Ingredient => write!(f, "ingredient-{}", self._value),
            CacheKeyType::IngredientSearch => write!(f, "ingredients-{}", self._value),
            CacheKeyType::ShortLink => write!(f, "short-link-{}", self._value),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKeyType {
    Tags,
    Tag,
    Ingredient,
    /// Lowercased name prefix of an ingredient search.
    IngredientSearch,
    ShortLink,
}

impl CacheKeyType {
    pub fn new<T: Display>(self, key: T) -> CacheKey {
        CacheKey::from(self, key)
    }
}

// Cache - wrappers

/// What a cached value is bound to. A value is stale once its bind changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheLifetime {
    Infinite,
    BindCatalogCache,
}

impl CacheLifetime {
    pub async fn get_cache_bind(
        &self,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<String>, CacheError> {
        match self {
            CacheLifetime::Infinite => Ok(None),
            CacheLifetime::BindCatalogCache => {
                get_cache_value::<&str, String>(CATALOG_CACHE_KEY, cache).await
            }
        }
    }

    /// Seconds a value may stay in redis, if bounded.
    pub fn expiry(&self) -> Option<u64> {
        match self {
            CacheLifetime::Infinite => None,
            CacheLifetime::BindCatalogCache => Some(CATALOG_CACHE_SECONDS),
        }
    }
}

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs)]
struct RedisValue<T: Serialize> {
    value: T,
    _bind: Option<String>,
}

async fn lookup<T: Serialize + DeserializeOwned>(
    key: &CacheKey,
    cache: &mut MultiplexedConnection,
) -> Result<Option<T>, CacheError> {
    let value = match get_cache_value::<String, RedisValue<T>>(key.to_string(), cache).await {
        Ok(Some(value)) => value,
        Ok(None) => return Ok(None),
        Err(e) if e.is_malformed() => {
            log::error!("> Failed to deserialize cached value. Deleting {key}: {e}");
            delete_cache_value(key.to_string(), cache).await?;
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    if value._bind != key.lifetime().get_cache_bind(cache).await? {
        log::trace!("> Invalidated {key}");
        return Ok(None);
    }

    log::trace!("> Found {key}");
    Ok(Some(value.value))
}

async fn store<T: Serialize + Sync>(
    key: &CacheKey,
    value: &T,
    cache: &mut MultiplexedConnection,
) -> Result<(), CacheError> {
    let lifetime = key.lifetime();
    let _bind = lifetime.get_cache_bind(cache).await?;
    let value = RedisValue { value, _bind };

    match lifetime.expiry() {
        Some(seconds) => set_expiring_cache_value(key.to_string(), value, seconds, cache).await,
        None => set_cache_value(key.to_string(), value, cache).await,
    }
}

/// Returns the cached value for `key`, or runs `callback` and caches its result.
/// Without a connection, or when redis misbehaves, the callback result is used directly.
pub async fn get_or<T, F, Fut>(
    key: CacheKey,
    cache: Option<&MultiplexedConnection>,
    callback: F,
) -> Result<T, Error>
where
    T: Serialize + DeserializeOwned + Sync,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut cache = match cache {
        Some(cache) => cache.clone(),
        None => return callback().await,
    };

    match lookup(&key, &mut cache).await {
        Ok(Some(value)) => return Ok(value),
        Ok(None) => {}
        Err(e) => log::error!("> Cache lookup failed for {key}: {e}"),
    }

    log::trace!("> Fetching {key}");
    let value = callback().await?;

    if let Err(e) = store(&key, &value, &mut cache).await {
        log::error!("> Failed to cache {key}: {e}");
    }

    Ok(value)
}

/// Like [`get_or`], but a `None` result is not cached.
pub async fn get_or_optional<T, F, Fut>(
    key: CacheKey,
    cache: Option<&MultiplexedConnection>,
    callback: F,
) -> Result<Option<T>, Error>
where
    T: Serialize + DeserializeOwned + Sync,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>, Error>>,
{
    let mut cache = match cache {
        Some(cache) => cache.clone(),
        None => return callback().await,
    };

    match lookup(&key, &mut cache).await {
        Ok(Some(value)) => return Ok(Some(value)),
        Ok(None) => {}
        Err(e) => log::error!("> Cache lookup failed for {key}: {e}"),
    }

    log::trace!("> Fetching {key}");
    let value = callback().await?;

    if let Some(value) = &value {
        if let Err(e) = store(&key, value, &mut cache).await {
            log::error!("> Failed to cache {key}: {e}");
        }
    }

    Ok(value)
}

/// Invalidates every value bound to the catalog (tags and ingredients).
pub async fn rotate_catalog_cache(cache: &mut MultiplexedConnection) -> Result<(), CacheError> {
    let bind = uuid::Uuid::new_v4().to_string();
    set_cache_value(CATALOG_CACHE_KEY, bind, cache).await?;

    log::info!("> Rotated catalog cache");
    Ok(())
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), CacheError> {
    let _: () = cache.set(key, value).await?;

    Ok(())
}

pub async fn set_expiring_cache_value<K, V>(
    key: K,
    value: V,
    seconds: u64,
    cache: &mut MultiplexedConnection,
) -> Result<(), CacheError>
where
    K: ToRedisArgs + Send + Sync,
    V: ToRedisArgs + Send + Sync,
{
    let _: () = cache.set_ex(key, value, seconds).await?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), CacheError> {
    let _: () = cache.del(key).await?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, CacheError> {
    let value: Option<V> = cache.get(key).await?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_type() {
        assert_eq!(CacheKeyType::Tags.new("all").to_string(), "tags-all");
        assert_eq!(CacheKeyType::Tag.new(3).to_string(), "tag-3");
        assert_eq!(
            CacheKeyType::IngredientSearch.new("flo").to_string(),
            "ingredients-flo"
        );
        assert_eq!(
            CacheKeyType::ShortLink.new("/s/aB3/").to_string(),
            "short-link-/s/aB3/"
        );
    }

    #[test]
    fn catalog_entries_are_bound_to_the_catalog() {
        assert_eq!(
            CacheKeyType::IngredientSearch.new("a").lifetime(),
            CacheLifetime::BindCatalogCache
        );
        assert_eq!(
            CacheKeyType::ShortLink.new("a").lifetime(),
            CacheLifetime::Infinite
        );
    }

    #[tokio::test]
    async fn missing_connection_falls_through() {
        let value = get_or(CacheKeyType::Tags.new("all"), None, || async {
            Ok::<_, Error>(vec![1, 2, 3])
        })
        .await
        .unwrap();
        assert_eq!(value, vec![1, 2, 3]);

        let value = get_or_optional(CacheKeyType::Tag.new(9), None, || async {
            Ok::<Option<i32>, Error>(None)
        })
        .await
        .unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn stored_values_carry_their_bind() {
        let stored = RedisValue {
            value: vec!["a".to_owned()],
            _bind: Some("v1".to_owned()),
        };
        let args = stored.to_redis_args();
        assert_eq!(args.len(), 1);

        let raw = redis::Value::BulkString(args[0].clone());
        let value = RedisValue::<Vec<String>>::from_redis_value(&raw).unwrap();
        assert_eq!(value._bind.as_deref(), Some("v1"));
        assert_eq!(value.value, vec!["a".to_owned()]);
    }

    #[test]
    fn malformed_values_are_detected() {
        let raw = redis::Value::BulkString(b"not json".to_vec());
        let error: CacheError = RedisValue::<Vec<String>>::from_redis_value(&raw)
            .err()
            .unwrap()
            .into();
        assert!(error.is_malformed());
    }

    #[test]
    fn only_catalog_entries_expire() {
        assert_eq!(
            CacheLifetime::BindCatalogCache.expiry(),
            Some(CATALOG_CACHE_SECONDS)
        );
        assert_eq!(CacheLifetime::Infinite.expiry(), None);
    }
}
