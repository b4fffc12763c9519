//! Engine-neutral foreign object protocol.
//!
//! Host data reaches scripts through [`HostObject`] implementations that
//! only know how to *resolve* a slot or member, returning `None` when they
//! have nothing to offer. Each engine wraps host objects in a
//! [`ForeignAdapter`], which consults the host object first and falls back
//! to the engine's canonical absent value second. Every engine therefore
//! inherits the same lookup rules; only the absent value differs.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A value produced by a host object lookup.
#[derive(Debug, Clone)]
pub enum HostValue {
    /// A string.
    Str(String),
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A nested host object.
    Object(Arc<dyn HostObject>),
}

/// Read-only host data exposed to scripts.
///
/// Implementations must not have side effects: resolving a value never
/// changes host state.
pub trait HostObject: Send + Sync + fmt::Debug {
    /// Class name used in error messages and primitive conversion.
    fn class_name(&self) -> &'static str;

    /// Whether the object is addressed by integer slots rather than names.
    fn is_indexed(&self) -> bool {
        false
    }

    /// Resolves an integer slot.
    fn resolve_slot(&self, _index: i64) -> Option<HostValue> {
        None
    }

    /// Resolves a named member.
    fn resolve_member(&self, _name: &str) -> Option<HostValue> {
        None
    }

    /// Names (or slot numbers) currently resolvable, for enumeration.
    fn member_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Capability an engine's value type provides to the adapter.
pub trait EngineValue: Sized {
    /// The engine's canonical "slot absent" value.
    fn absent() -> Self;

    /// Converts a resolved host value into an engine value.
    fn from_host(value: HostValue) -> Self;
}

/// Wraps a host object for one engine.
pub struct ForeignAdapter<V> {
    object: Arc<dyn HostObject>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for ForeignAdapter<V> {
    fn clone(&self) -> Self {
        Self {
            object: Arc::clone(&self.object),
            _value: PhantomData,
        }
    }
}

impl<V> fmt::Debug for ForeignAdapter<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ForeignAdapter").field(&self.object).finish()
    }
}

impl<V: EngineValue> ForeignAdapter<V> {
    /// Wraps a host object.
    #[must_use]
    pub fn new(object: Arc<dyn HostObject>) -> Self {
        Self {
            object,
            _value: PhantomData,
        }
    }

    /// Looks up an integer slot, yielding the absent value when unresolved.
    #[must_use]
    pub fn get_slot(&self, index: i64) -> V {
        self.object
            .resolve_slot(index)
            .map_or_else(V::absent, V::from_host)
    }

    /// Looks up a named member, yielding the absent value when unresolved.
    #[must_use]
    pub fn get_member(&self, name: &str) -> V {
        self.object
            .resolve_member(name)
            .map_or_else(V::absent, V::from_host)
    }

    /// Enumerates resolvable members.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.object.member_names()
    }

    /// Whether the wrapped object is addressed by integer slots.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.object.is_indexed()
    }

    /// Class name of the wrapped object.
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        self.object.class_name()
    }

    /// Primitive string conversion (`[object Step]`).
    #[must_use]
    pub fn to_primitive(&self) -> String {
        format!("[object {}]", self.object.class_name())
    }

    /// Checks whether two adapters wrap the same host object.
    #[must_use]
    pub fn same_object(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Pair;

    impl HostObject for Pair {
        fn class_name(&self) -> &'static str {
            "Pair"
        }

        fn is_indexed(&self) -> bool {
            true
        }

        fn resolve_slot(&self, index: i64) -> Option<HostValue> {
            match index {
                0 => Some(HostValue::Str("left".to_string())),
                1 => Some(HostValue::Str("right".to_string())),
                _ => None,
            }
        }
    }

    #[derive(Debug, PartialEq)]
    enum TestValue {
        Absent,
        Text(String),
        Other,
    }

    impl EngineValue for TestValue {
        fn absent() -> Self {
            Self::Absent
        }

        fn from_host(value: HostValue) -> Self {
            match value {
                HostValue::Str(s) => Self::Text(s),
                _ => Self::Other,
            }
        }
    }

    #[test]
    fn resolved_slot_is_converted() {
        let adapter: ForeignAdapter<TestValue> = ForeignAdapter::new(Arc::new(Pair));
        assert_eq!(adapter.get_slot(1), TestValue::Text("right".to_string()));
    }

    #[test]
    fn unresolved_slot_falls_back_to_absent() {
        let adapter: ForeignAdapter<TestValue> = ForeignAdapter::new(Arc::new(Pair));
        assert_eq!(adapter.get_slot(2), TestValue::Absent);
        assert_eq!(adapter.get_slot(-1), TestValue::Absent);
        assert_eq!(adapter.get_member("length"), TestValue::Absent);
    }

    #[test]
    fn primitive_conversion() {
        let adapter: ForeignAdapter<TestValue> = ForeignAdapter::new(Arc::new(Pair));
        assert_eq!(adapter.to_primitive(), "[object Pair]");
        assert!(adapter.is_indexed());
        assert!(adapter.keys().is_empty());
    }
}
