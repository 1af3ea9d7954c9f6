#![forbid(unsafe_code)]

//! Deep change observation over a [`Value`] tree.
//!
//! [`observe`] takes ownership of a plain-data root and returns a [`Tracked`]
//! handle. Every write goes through [`Tracked::set`] (or
//! [`push`](Tracked::push)), which commits the value and then fires the
//! change callback synchronously, before `set` returns. Callbacks therefore
//! always see committed state.
//!
//! Reading a container field yields another `Tracked` view rooted deeper in
//! the same store, so writes through nested views are observed too. Leaves
//! (including dates and opaque handles) are handed back as plain values.
//!
//! # Invariants
//!
//! 1. A write of a value equal to the current one is a no-op: nothing is
//!    assigned and no callback fires.
//! 2. Writing a key that does not exist yet always notifies, with
//!    `old_value = Null`.
//! 3. Reported paths elide array indices (see [`FieldPath::reported`]).
//! 4. No internal borrow is held while the callback runs, so callbacks may
//!    read and write through any handle of the same store.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use fform_core::{FieldPath, PathError, Segment, Value};

/// One accepted write.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Reported (index-elided) dotted path of the written field.
    pub path: String,
    pub new_value: Value,
    /// `Null` when the field did not exist before.
    pub old_value: Value,
}

type ChangeCallback = dyn Fn(&Tracked, &Change);

struct Store {
    root: RefCell<Value>,
    on_change: Box<ChangeCallback>,
}

/// Wrap `root` so every write through the returned handle is reported to
/// `on_change` as `(root handle, change)`.
pub fn observe(root: Value, on_change: impl Fn(&Tracked, &Change) + 'static) -> Tracked {
    Tracked {
        store: Rc::new(Store {
            root: RefCell::new(root),
            on_change: Box::new(on_change),
        }),
        prefix: FieldPath::root(),
    }
}

/// Handle to a tracked store, scoped to a path prefix.
///
/// Cloning is cheap; all clones share the same store.
#[derive(Clone)]
pub struct Tracked {
    store: Rc<Store>,
    prefix: FieldPath,
}

/// Result of reading one field through a [`Tracked`] view.
#[derive(Debug, Clone)]
pub enum Field {
    /// An object or array, wrapped so writes stay observed.
    Tracked(Tracked),
    /// A leaf value, returned as-is.
    Value(Value),
}

impl Field {
    #[must_use]
    pub fn as_tracked(&self) -> Option<&Tracked> {
        match self {
            Self::Tracked(view) => Some(view),
            Self::Value(_) => None,
        }
    }

    /// Plain value of the field (containers are deep-cloned).
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Tracked(view) => view.snapshot(),
            Self::Value(value) => value,
        }
    }
}

impl fmt::Debug for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("path", &self.prefix.to_string())
            .field("value", &self.snapshot())
            .finish()
    }
}

impl Tracked {
    /// Prefix of this view inside the store.
    #[must_use]
    pub fn path(&self) -> &FieldPath {
        &self.prefix
    }

    /// Handle to the store root.
    #[must_use]
    pub fn root(&self) -> Tracked {
        Tracked {
            store: Rc::clone(&self.store),
            prefix: FieldPath::root(),
        }
    }

    /// Whether two handles share a store.
    #[must_use]
    pub fn same_store(&self, other: &Tracked) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }

    /// Read one direct child of this view.
    #[must_use]
    pub fn field(&self, key: impl Into<Segment>) -> Option<Field> {
        let path = self.prefix.child(key);
        let root = self.store.root.borrow();
        let value = root.get_path(&path)?;
        Some(if value.is_container() {
            Field::Tracked(Tracked {
                store: Rc::clone(&self.store),
                prefix: path,
            })
        } else {
            Field::Value(value.clone())
        })
    }

    /// Clone of the value at a dotted path relative to this view. Invalid
    /// or missing paths yield `None`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        self.with(path, |value| value.cloned())
    }

    /// Borrow the value at `path` for the duration of `f`.
    ///
    /// `f` must not write through any handle of this store.
    pub fn with<R>(&self, path: &str, f: impl FnOnce(Option<&Value>) -> R) -> R {
        let Ok(relative) = FieldPath::parse(path) else {
            return f(None);
        };
        let full = self.prefix.join(&relative);
        let root = self.store.root.borrow();
        f(root.get_path(&full))
    }

    /// Deep clone of this view's value (`Null` if the view's path no longer
    /// exists).
    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.store
            .root
            .borrow()
            .get_path(&self.prefix)
            .cloned()
            .unwrap_or_default()
    }

    /// Write `value` at a dotted path relative to this view.
    ///
    /// Returns `Ok(false)` when the value is unchanged, `Ok(true)` when the
    /// write was committed and reported.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<bool, PathError> {
        let relative = FieldPath::parse(path)?;
        self.set_path(&relative, value)
    }

    /// Typed-path form of [`set`](Self::set).
    pub fn set_path(&self, path: &FieldPath, value: impl Into<Value>) -> Result<bool, PathError> {
        let full = self.prefix.join(path);
        let value = value.into();
        let (new_value, old_value) = {
            let mut root = self.store.root.borrow_mut();
            let slot = root.slot_mut(&full)?;
            if slot.existed && *slot.value == value {
                return Ok(false);
            }
            let old = std::mem::replace(slot.value, value);
            (slot.value.clone(), old)
        };
        self.emit(Change {
            path: full.reported(),
            new_value,
            old_value,
        });
        Ok(true)
    }

    /// Append to the array at `path`, reporting one change at the array's
    /// path.
    pub fn push(&self, path: &str, value: impl Into<Value>) -> Result<(), PathError> {
        let full = self.prefix.join(&FieldPath::parse(path)?);
        let value = value.into();
        let (new_value, old_value) = {
            let mut root = self.store.root.borrow_mut();
            let target = if full.is_root() {
                &mut *root
            } else {
                if root.get_path(&full).is_none() {
                    return Err(PathError::not_found(&full));
                }
                root.slot_mut(&full)?.value
            };
            match target {
                Value::Array(items) => {
                    let old = Value::Array(items.clone());
                    items.push(value);
                    (Value::Array(items.clone()), old)
                }
                other => {
                    return Err(PathError::NotAContainer {
                        path: full.to_string(),
                        kind: other.kind().name(),
                    });
                }
            }
        };
        self.emit(Change {
            path: full.reported(),
            new_value,
            old_value,
        });
        Ok(())
    }

    /// Overwrite the store from `data` without reporting any change.
    pub(crate) fn restore_silently(&self, data: &Value) {
        self.store.root.borrow_mut().restore_from(data);
    }

    fn emit(&self, change: Change) {
        tracing::trace!(path = %change.path, "change");
        (self.store.on_change)(&self.root(), &change);
    }
}
