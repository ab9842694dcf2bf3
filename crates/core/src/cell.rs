//! Type-erased cell storage
//!
//! Every column value in a record lives in a [`TypedCell`]. The cell owns a
//! boxed value of some concrete type plus the [`TypeTag`] of that type, and
//! optionally a destructor callback that runs when the value is reset or
//! dropped.
//!
//! # Design
//!
//! - Values are stored behind the object-safe `CellValue` trait, which is
//!   blanket-implemented for every [`KeyValue`] type.
//! - Typed reads downcast through `Any`; a type mismatch is reported as
//!   `false`/`None` and never touches the caller's output.
//! - Cloning a cell deep-clones the value and shares the destructor.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Runtime identity of a stored type
///
/// Equality and hashing use the `TypeId` only; the name is carried for
/// error messages.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Tag of `T`
    pub fn of<T: 'static>() -> Self {
        TypeTag {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Tag used for an empty cell
    pub fn void() -> Self {
        Self::of::<()>()
    }

    /// Whether this is the tag of an empty cell
    pub fn is_void(&self) -> bool {
        self.id == TypeId::of::<()>()
    }

    /// Underlying `TypeId`
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Bound for every type that can be stored in a column
///
/// Columns are indexed by a hash map and an ordered map at the same time,
/// so values must be hashable and totally ordered. The two string hooks are
/// used by text-oriented layers (printing, CSV); types that have no textual
/// form can rely on the defaults.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// struct Point { x: i32, y: i32 }
///
/// impl KeyValue for Point {}
/// ```
pub trait KeyValue: Any + Clone + Eq + Hash + Ord + Send + Sync + fmt::Debug {
    /// Textual form of the value
    fn to_cell_string(&self) -> String {
        format!("{:?}", self)
    }

    /// Parse a value from its textual form
    fn parse_cell_string(_text: &str) -> Option<Self> {
        None
    }
}

macro_rules! impl_key_value_via_str {
    ($($t:ty),* $(,)?) => {
        $(
            impl KeyValue for $t {
                fn to_cell_string(&self) -> String {
                    self.to_string()
                }

                fn parse_cell_string(text: &str) -> Option<Self> {
                    text.parse().ok()
                }
            }
        )*
    };
}

impl_key_value_via_str!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, bool, char, String,
);

/// Object-safe view of a stored value
trait CellValue: Send + Sync {
    fn clone_box(&self) -> Box<dyn CellValue>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn type_tag(&self) -> TypeTag;
    fn to_cell_string(&self) -> String;
    fn dyn_eq(&self, other: &dyn CellValue) -> bool;
}

impl<T: KeyValue> CellValue for T {
    fn clone_box(&self) -> Box<dyn CellValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_tag(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn to_cell_string(&self) -> String {
        KeyValue::to_cell_string(self)
    }

    fn dyn_eq(&self, other: &dyn CellValue) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }
}

type Destructor = Arc<dyn Fn(&mut dyn Any) + Send + Sync>;

/// Type-erased holder for one column value
///
/// # Thread Safety
///
/// `TypedCell` is `Send + Sync`; it has no interior mutability. Records
/// guard their cells with their own lock.
#[derive(Default)]
pub struct TypedCell {
    value: Option<Box<dyn CellValue>>,
    destructor: Option<Destructor>,
}

impl TypedCell {
    /// Create an empty cell
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cell holding `value`
    pub fn of<T: KeyValue>(value: T) -> Self {
        TypedCell {
            value: Some(Box::new(value)),
            destructor: None,
        }
    }

    /// Create a cell holding `value` with a destructor
    ///
    /// The destructor runs exactly once per stored copy, when the copy is
    /// reset, overwritten or dropped.
    pub fn with_destructor<T, F>(value: T, destructor: F) -> Self
    where
        T: KeyValue,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        let erased: Destructor = Arc::new(move |any: &mut dyn Any| {
            if let Some(v) = any.downcast_mut::<T>() {
                destructor(v);
            }
        });
        TypedCell {
            value: Some(Box::new(value)),
            destructor: Some(erased),
        }
    }

    /// Store `value`, releasing whatever was held before
    pub fn store<T: KeyValue>(&mut self, value: T) {
        self.reset();
        self.value = Some(Box::new(value));
    }

    /// Store `value` together with a destructor
    pub fn store_with_destructor<T, F>(&mut self, value: T, destructor: F)
    where
        T: KeyValue,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.reset();
        *self = Self::with_destructor(value, destructor);
    }

    /// Copy the stored value into `out`
    ///
    /// # Returns
    ///
    /// `true` if the cell holds a `T`. On mismatch `out` is left untouched.
    pub fn get<T: KeyValue>(&self, out: &mut T) -> bool {
        match self.get_ref::<T>() {
            Some(v) => {
                *out = v.clone();
                true
            }
            None => false,
        }
    }

    /// Borrow the stored value if it is a `T`
    pub fn get_ref<T: 'static>(&self) -> Option<&T> {
        self.value.as_deref().and_then(|v| v.as_any().downcast_ref::<T>())
    }

    /// Tag of the stored type, `TypeTag::void()` when empty
    pub fn type_tag(&self) -> TypeTag {
        self.value
            .as_deref()
            .map(|v| v.type_tag())
            .unwrap_or_else(TypeTag::void)
    }

    /// Whether the cell holds no value
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// Whether a destructor is registered
    pub fn has_destructor(&self) -> bool {
        self.destructor.is_some()
    }

    /// Textual form of the stored value
    pub fn to_cell_string(&self) -> Option<String> {
        self.value.as_deref().map(|v| v.to_cell_string())
    }

    /// Run the destructor (if any) and clear the cell
    pub fn reset(&mut self) {
        let destructor = self.destructor.take();
        if let Some(mut value) = self.value.take() {
            if let Some(d) = destructor {
                d(value.as_any_mut());
            }
        }
    }
}

impl Clone for TypedCell {
    fn clone(&self) -> Self {
        TypedCell {
            value: self.value.as_deref().map(|v| v.clone_box()),
            destructor: self.destructor.clone(),
        }
    }
}

impl Drop for TypedCell {
    fn drop(&mut self) {
        self.reset();
    }
}

impl PartialEq for TypedCell {
    fn eq(&self, other: &Self) -> bool {
        match (self.value.as_deref(), other.value.as_deref()) {
            (Some(a), Some(b)) => a.dyn_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for TypedCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCell")
            .field("type", &self.type_tag())
            .field("value", &self.to_cell_string())
            .finish()
    }
}

impl<T: KeyValue> From<T> for TypedCell {
    fn from(value: T) -> Self {
        TypedCell::of(value)
    }
}

impl From<&str> for TypedCell {
    fn from(value: &str) -> Self {
        TypedCell::of(value.to_string())
    }
}
