//! Dependency values and the comparator that decides whether they changed.
//!
//! A consumer passes a dependency list with every `subscribe` call. When the
//! list differs from the one the cached data was fetched with, the entry is
//! refetched even inside its TTL window.
//!
//! Value dependencies are type-tagged: a string never equals a number or a
//! boolean, even when they render alike (`"1"` vs `1`). All integer widths
//! share one tag, so `1u32` equals `1i64`.
//!
//! [`Dependency::Ref`] compares by `Arc` identity. Passing a freshly
//! allocated `Arc` on every call therefore never matches and refetches every
//! time; hold on to the same `Arc` to keep the entry cached.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::keys::CacheableKey;

/// One entry of a dependency list.
#[derive(Clone)]
pub enum Dependency {
    Str(String),
    Int(i128),
    Bool(bool),
    Ref(Arc<dyn Any + Send + Sync>),
}

impl Dependency {
    /// Builds a string dependency from anything that renders a cache key.
    ///
    /// # Examples
    ///
    /// ```
    /// use resourcache_core::Dependency;
    ///
    /// assert_eq!(Dependency::value(&Some(3u32)), Dependency::from("Some(3)"));
    /// assert_ne!(Dependency::value(&3u32), Dependency::from(3u32));
    /// ```
    pub fn value<K: CacheableKey + ?Sized>(key: &K) -> Self {
        Dependency::Str(key.to_cache_key())
    }

    /// Builds an identity dependency.
    pub fn reference<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Dependency::Ref(value)
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Dependency::Str(a), Dependency::Str(b)) => a == b,
            (Dependency::Int(a), Dependency::Int(b)) => a == b,
            (Dependency::Bool(a), Dependency::Bool(b)) => a == b,
            (Dependency::Ref(a), Dependency::Ref(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Str(v) => f.debug_tuple("Str").field(v).finish(),
            Dependency::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Dependency::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Dependency::Ref(r) => f
                .debug_tuple("Ref")
                .field(&Arc::as_ptr(r).cast::<()>())
                .finish(),
        }
    }
}

impl From<&str> for Dependency {
    fn from(value: &str) -> Self {
        Dependency::Str(value.to_string())
    }
}

impl From<String> for Dependency {
    fn from(value: String) -> Self {
        Dependency::Str(value)
    }
}

impl From<char> for Dependency {
    fn from(value: char) -> Self {
        Dependency::Str(value.to_string())
    }
}

impl From<bool> for Dependency {
    fn from(value: bool) -> Self {
        Dependency::Bool(value)
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Dependency {
                fn from(value: $t) -> Self {
                    Dependency::Int(i128::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(u8, u16, u32, u64, i8, i16, i32, i64);

impl From<usize> for Dependency {
    fn from(value: usize) -> Self {
        Dependency::Int(value as i128)
    }
}

impl From<isize> for Dependency {
    fn from(value: isize) -> Self {
        Dependency::Int(value as i128)
    }
}

/// Decides whether two dependency lists are the same.
///
/// The default ([`ShallowEq`]) compares lists index by index with
/// [`Dependency`]'s `PartialEq`. Lists of different length are different.
pub trait DependencyComparator: Send + Sync {
    fn same(&self, previous: &[Dependency], next: &[Dependency]) -> bool;
}

/// Shallow, index-wise equality.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShallowEq;

impl DependencyComparator for ShallowEq {
    fn same(&self, previous: &[Dependency], next: &[Dependency]) -> bool {
        previous.len() == next.len() && previous.iter().zip(next).all(|(a, b)| a == b)
    }
}

impl<F> DependencyComparator for F
where
    F: Fn(&[Dependency], &[Dependency]) -> bool + Send + Sync,
{
    fn same(&self, previous: &[Dependency], next: &[Dependency]) -> bool {
        self(previous, next)
    }
}
