//! Broker-backed dispatch queues.

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "redis")]
pub use self::redis::RedisDispatchQueue;
