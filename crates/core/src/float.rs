//! Floating-point column types
//!
//! `f32` and `f64` have no total order, so they cannot back an index
//! directly. [`Float32`] and [`Float64`] wrap them with an order given by
//! `total_cmp` and equality/hashing on the bit pattern, which agree with
//! each other: `-0.0` sorts before `0.0`, and NaNs sort after every number.

use crate::cell::{KeyValue, TypedCell};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

macro_rules! ordered_float {
    ($(#[$doc:meta])* $name:ident, $inner:ty) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Default)]
        pub struct $name(pub $inner);

        impl $name {
            /// The wrapped value
            pub fn get(self) -> $inner {
                self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.0.to_bits() == other.0.to_bits()
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.to_bits().hash(state);
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.total_cmp(&other.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(&self.0, f)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                $name(value)
            }
        }

        impl From<$name> for $inner {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl From<$inner> for TypedCell {
            fn from(value: $inner) -> Self {
                TypedCell::of($name(value))
            }
        }

        impl KeyValue for $name {
            fn to_cell_string(&self) -> String {
                self.0.to_string()
            }

            fn parse_cell_string(text: &str) -> Option<Self> {
                text.trim().parse().ok().map($name)
            }
        }
    };
}

ordered_float!(
    /// `f64` column value with a total order
    Float64,
    f64
);

ordered_float!(
    /// `f32` column value with a total order
    Float32,
    f32
);
