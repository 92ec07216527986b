use crate::core::{BodyHandle, ConstraintHandle, GroupHandle};
use crate::error::PhysicsError;
use crate::Result;
use std::collections::HashMap;

/// Generic storage trait for physics objects
pub trait Storage<T, H> {
    /// Creates a new empty storage
    fn new() -> Self;

    /// Adds an item to the storage and returns its handle
    fn add(&mut self, item: T) -> H;

    /// Gets a reference to an item by its handle
    fn get(&self, handle: H) -> Option<&T>;

    /// Gets a mutable reference to an item by its handle
    fn get_mut(&mut self, handle: H) -> Option<&mut T>;

    /// Removes an item from the storage
    fn remove(&mut self, handle: H) -> Option<T>;

    /// Returns the number of items in the storage
    fn len(&self) -> usize;

    /// Returns whether the storage is empty
    fn is_empty(&self) -> bool;

    /// Returns all live handles
    fn handles(&self) -> Vec<H>;
}

macro_rules! handle_storage {
    ($name:ident, $handle:ident, $get:ident, $get_mut:ident, $what:literal) => {
        /// Handle-keyed storage with monotonically increasing, never-reused ids
        pub struct $name<T> {
            items: HashMap<$handle, T>,
            next_id: u32,
        }

        impl<T> Storage<T, $handle> for $name<T> {
            fn new() -> Self {
                Self {
                    items: HashMap::new(),
                    next_id: 1, // 0 is reserved for an invalid handle
                }
            }

            fn add(&mut self, item: T) -> $handle {
                let handle = $handle(self.next_id);
                self.next_id += 1;
                self.items.insert(handle, item);
                handle
            }

            fn get(&self, handle: $handle) -> Option<&T> {
                self.items.get(&handle)
            }

            fn get_mut(&mut self, handle: $handle) -> Option<&mut T> {
                self.items.get_mut(&handle)
            }

            fn remove(&mut self, handle: $handle) -> Option<T> {
                self.items.remove(&handle)
            }

            fn len(&self) -> usize {
                self.items.len()
            }

            fn is_empty(&self) -> bool {
                self.items.is_empty()
            }

            fn handles(&self) -> Vec<$handle> {
                self.items.keys().copied().collect()
            }
        }

        impl<T> $name<T> {
            /// Gets an item by handle, returning an error if not found
            pub fn $get(&self, handle: $handle) -> Result<&T> {
                self.get(handle).ok_or_else(|| {
                    PhysicsError::ResourceNotFound(format!(
                        concat!($what, " with handle {:?} not found"),
                        handle
                    ))
                })
            }

            /// Gets a mutable item by handle, returning an error if not found
            pub fn $get_mut(&mut self, handle: $handle) -> Result<&mut T> {
                self.get_mut(handle).ok_or_else(|| {
                    PhysicsError::ResourceNotFound(format!(
                        concat!($what, " with handle {:?} not found"),
                        handle
                    ))
                })
            }

            /// Returns an iterator over all items
            pub fn iter(&self) -> impl Iterator<Item = ($handle, &T)> {
                self.items.iter().map(|(h, item)| (*h, item))
            }

            /// Returns a mutable iterator over all items
            pub fn iter_mut(&mut self) -> impl Iterator<Item = ($handle, &mut T)> {
                self.items.iter_mut().map(|(h, item)| (*h, item))
            }

            /// Returns whether the handle refers to a live item
            pub fn contains(&self, handle: $handle) -> bool {
                self.items.contains_key(&handle)
            }
        }
    };
}

handle_storage!(BodyStorage, BodyHandle, get_body, get_body_mut, "Body");
handle_storage!(
    ConstraintStorage,
    ConstraintHandle,
    get_constraint,
    get_constraint_mut,
    "Constraint"
);
handle_storage!(GroupStorage, GroupHandle, get_group, get_group_mut, "Constraint group");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_never_reused() {
        let mut storage: BodyStorage<u32> = BodyStorage::new();
        let a = storage.add(1);
        storage.remove(a);
        let b = storage.add(2);
        assert_ne!(a, b);
        assert!(storage.get(a).is_none());
        assert_eq!(storage.get(b), Some(&2));
    }
}
