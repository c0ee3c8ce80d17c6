//! Process-wide memoization of operator results.
//!
//! Entries are keyed by operator name plus a canonical encoding of the
//! resolved operands: object members are sorted, arrays keep their order and
//! numbers use serde_json's text form, so deep-equal operands always produce
//! the same key.
//!
//! The cache trusts the declared [`CachePolicy`]. An impure operator declared
//! `forever` or `ttl` will happily serve stale results; there is no way to
//! detect this from the outside. Use [`OperatorCache::invalidate`] when an
//! operator's backing data changes.

use std::fmt::Write;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::{EngineError, EngineResult};
use crate::operator::definition::CachePolicy;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operator: String,
    encoding: String,
}

impl CacheKey {
    /// Builds the key for `operator` over operands in declaration order.
    pub fn new(operator: &str, operands: &[&Value], max_depth: usize) -> EngineResult<Self> {
        let mut encoding = String::from("[");
        for (i, operand) in operands.iter().enumerate() {
            if i > 0 {
                encoding.push(',');
            }
            encode(operand, 1, max_depth, &mut encoding)
                .map_err(|message| EngineError::CacheKey {
                    operator: operator.to_string(),
                    message,
                })?;
        }
        encoding.push(']');
        Ok(Self {
            operator: operator.to_string(),
            encoding,
        })
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }
}

fn encode(value: &Value, depth: usize, max_depth: usize, out: &mut String) -> Result<(), String> {
    if depth > max_depth {
        return Err(format!("operand nesting exceeds {} levels", max_depth));
    }
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            // scalars serialize infallibly
            let _ = write!(out, "{}", value);
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode(item, depth + 1, max_depth, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}:", Value::String(key.clone()));
                if let Some(member) = map.get(key) {
                    encode(member, depth + 1, max_depth, out)?;
                }
            }
            out.push('}');
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub created_at: DateTime<Utc>,
    /// `None` for entries kept for the life of the process.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }
}

#[derive(Debug)]
pub struct OperatorCache {
    entries: DashMap<CacheKey, CacheEntry>,
    max_ttl: Duration,
}

impl Default for OperatorCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl OperatorCache {
    pub fn new(max_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_ttl)
    }

    /// Live value for `key`. Expired entries are evicted on the way.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = Instant::now();

        let expired = self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some();
        if expired {
            trace!(operator = key.operator(), "cache entry expired");
            return None;
        }

        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.get(key)?;
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Stores `value` according to `policy`; `Never` is a no-op.
    pub fn insert(&self, key: CacheKey, value: Value, policy: CachePolicy) {
        let expires_at = match policy {
            CachePolicy::Never => return,
            CachePolicy::Forever => None,
            CachePolicy::Ttl(secs) => {
                Some(Instant::now() + Duration::from_secs(secs).min(self.max_ttl))
            }
        };
        debug!(operator = key.operator(), policy = %policy, "caching result");
        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: Utc::now(),
                expires_at,
            },
        );
    }

    /// Drops every entry of `operator` and returns how many were removed.
    pub fn invalidate(&self, operator: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.operator != operator);
        let removed = before.saturating_sub(self.entries.len());
        debug!(operator, removed, "cache invalidated");
        removed
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{Map, json};

    fn key(operator: &str, operands: &[Value]) -> CacheKey {
        let refs: Vec<&Value> = operands.iter().collect();
        CacheKey::new(operator, &refs, 64).unwrap()
    }

    fn member_order(value: &Value) -> Vec<String> {
        value
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_key_ignores_member_order() {
        let first = json!({"a": 1, "b": {"x": [1, 2], "y": null}});
        let second = json!({"b": {"y": null, "x": [1, 2]}, "a": 1});
        assert_ne!(member_order(&first), member_order(&second));
        assert_eq!(key("eq", &[first]), key("eq", &[second]));
    }

    #[test]
    fn test_key_distinguishes_operators_and_slots() {
        assert_ne!(key("eq", &[json!(1)]), key("not", &[json!(1)]));
        assert_ne!(
            key("eq", &[json!(1), json!(2)]),
            key("eq", &[json!(2), json!(1)])
        );
        assert_ne!(key("eq", &[json!("1")]), key("eq", &[json!(1)]));
    }

    #[test]
    fn test_deep_operands_fail_loudly() {
        let deep = json!([[[[1]]]]);
        let err = CacheKey::new("eq", &[&deep], 3).unwrap_err();
        assert!(matches!(err, EngineError::CacheKey { .. }));
        assert!(CacheKey::new("eq", &[&deep], 5).is_ok());
    }

    #[test]
    fn test_never_is_not_stored() {
        let cache = OperatorCache::default();
        cache.insert(key("now", &[]), json!("t"), CachePolicy::Never);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_forever_survives_until_invalidated() {
        let cache = OperatorCache::default();
        cache.insert(key("eq", &[json!(1)]), json!(true), CachePolicy::Forever);
        cache.insert(key("not", &[json!(1)]), json!(false), CachePolicy::Forever);

        assert_eq!(cache.get(&key("eq", &[json!(1)])), Some(json!(true)));
        assert!(cache.entry(&key("eq", &[json!(1)])).is_some());
        assert_eq!(cache.invalidate("eq"), 1);
        assert_eq!(cache.get(&key("eq", &[json!(1)])), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ttl_entries_expire() {
        let cache = OperatorCache::default();
        cache.insert(key("read", &[json!(1)]), json!({}), CachePolicy::Ttl(0));
        assert_eq!(cache.get(&key("read", &[json!(1)])), None);
        assert!(cache.is_empty());

        cache.insert(key("read", &[json!(2)]), json!({}), CachePolicy::Ttl(3600));
        assert_eq!(cache.get(&key("read", &[json!(2)])), Some(json!({})));
    }

    #[test]
    fn test_ttl_is_clamped() {
        let cache = OperatorCache::new(Duration::ZERO);
        cache.insert(key("read", &[json!(1)]), json!({}), CachePolicy::Ttl(3600));
        assert_eq!(cache.purge_expired(), 1);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,6}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,4}", inner), 0..5).prop_map(|members| {
                    Value::Object(members.into_iter().collect::<Map<String, Value>>())
                }),
            ]
        })
    }

    fn reversed(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut members: Vec<(String, Value)> =
                    map.iter().map(|(k, v)| (k.clone(), reversed(v))).collect();
                members.reverse();
                Value::Object(members.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(reversed).collect()),
            other => other.clone(),
        }
    }

    proptest! {
        #[test]
        fn prop_key_is_order_independent(value in arb_json()) {
            let rebuilt = reversed(&value);
            prop_assert_eq!(&value, &rebuilt);
            if member_order(&value).len() > 1 {
                prop_assert_ne!(member_order(&value), member_order(&rebuilt));
            }
            prop_assert_eq!(key("op", &[value]), key("op", &[rebuilt]));
        }
    }
}
