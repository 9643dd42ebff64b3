/// Implements `ToRedisArgs`/`FromRedisValue` for a type by round-tripping it
/// through serde_json, so the same record works against both the redis and
/// the memory backend.
#[macro_export]
macro_rules! impl_redis_value {
    ($type:ty) => {
        impl redis::ToRedisArgs for $type {
            fn write_redis_args<W>(&self, out: &mut W)
            where
                W: ?Sized + redis::RedisWrite,
            {
                let serialized = serde_json::to_string(self)
                    .expect(&format!("Failed to serialize {}", stringify!($type)));
                out.write_arg(serialized.as_bytes());
            }
        }

        impl redis::FromRedisValue for $type {
            fn from_redis_value(v: &redis::Value) -> redis::RedisResult<Self> {
                let serialized = String::from_redis_value(v)?;
                serde_json::from_str(&serialized).map_err(|e| {
                    redis::RedisError::from((
                        redis::ErrorKind::TypeError,
                        "Deserialization failed",
                        e.to_string(),
                    ))
                })
            }
        }
    };
}

/// Implements the Display trait for a type using serde_json serialization,
/// falling back to Debug formatting when serialization fails.
#[macro_export]
macro_rules! impl_display_using_json {
    ($type:ty) => {
        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match serde_json::to_string(self) {
                    Ok(s) => write!(f, "{}", s),
                    Err(_) => write!(f, "{:?}", self),
                }
            }
        }
    };
}
