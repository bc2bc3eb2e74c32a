//! Specialized collection types

pub use slotmap::{new_key_type, SlotMap};

/// Free list for component slot pooling
///
/// Removed indices are handed out again (most recently freed first), which is
/// what lets a recreated component land on the memory slot its predecessor
/// used.
#[derive(Debug, Clone)]
pub struct FreeList<T> {
    items: Vec<Option<T>>,
    free_indices: Vec<usize>,
}

impl<T> FreeList<T> {
    /// Create a new free list
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            free_indices: Vec::new(),
        }
    }

    /// Index the next `insert` will use, and whether it is a reused slot
    pub fn peek_next_index(&self) -> (usize, bool) {
        self.free_indices
            .last()
            .map_or((self.items.len(), false), |&index| (index, true))
    }

    /// Insert an item and return its index
    pub fn insert(&mut self, item: T) -> usize {
        if let Some(index) = self.free_indices.pop() {
            self.items[index] = Some(item);
            index
        } else {
            let index = self.items.len();
            self.items.push(Some(item));
            index
        }
    }

    /// Remove an item by index
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let item = self.items.get_mut(index)?.take()?;
        self.free_indices.push(index);
        Some(item)
    }

    /// Get an item by index
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)?.as_ref()
    }

    /// Get a mutable reference to an item by index
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)?.as_mut()
    }

    /// Number of live items
    pub fn len(&self) -> usize {
        self.items.len() - self.free_indices.len()
    }

    /// Whether no item is alive
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest index ever handed out plus one
    pub fn capacity_used(&self) -> usize {
        self.items.len()
    }

    /// Iterate live items with their indices
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| item.as_ref().map(|item| (i, item)))
    }

    /// Iterate live items mutably with their indices
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.items
            .iter_mut()
            .enumerate()
            .filter_map(|(i, item)| item.as_mut().map(|item| (i, item)))
    }
}

impl<T> Default for FreeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_list_reuses_removed_index() {
        let mut list = FreeList::new();
        let a = list.insert("a");
        let b = list.insert("b");
        assert_eq!((a, b), (0, 1));

        assert_eq!(list.remove(a), Some("a"));
        assert_eq!(list.peek_next_index(), (0, true));
        assert_eq!(list.insert("c"), 0);
        assert_eq!(list.peek_next_index(), (2, false));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_free_list_double_remove() {
        let mut list = FreeList::new();
        let a = list.insert(1);
        assert!(list.remove(a).is_some());
        assert!(list.remove(a).is_none());
        assert!(list.is_empty());
    }
}
