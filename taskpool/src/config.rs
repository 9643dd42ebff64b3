use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// The configuration of the redis-backed task pool
pub struct PoolConfig {
    /// The URL of the Redis database, e.g. "redis://localhost:6379"
    pub redis_url: String,
    /// TTL applied to task and progress records, in seconds
    pub redis_ttl: u64,

    /// Whether to use the redis backend, otherwise the in-process memory backend
    pub enable_redis: bool,
}
