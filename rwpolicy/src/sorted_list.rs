//! A singly-linked list of unique u64 keys kept in ascending order.  Every operation is a linear
//! scan from the head.  The list does no synchronization of its own; share it through an
//! [crate::RwPolicyCell] so that [SortedList::member] runs under a read guard and the mutators run
//! under a write guard.

use biometrics::Counter;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static MEMBER: Counter = Counter::new("rwpolicy.sorted_list.member");
static MEMBER_HIT: Counter = Counter::new("rwpolicy.sorted_list.member_hit");
static INSERT: Counter = Counter::new("rwpolicy.sorted_list.insert");
static INSERT_DUPLICATE: Counter = Counter::new("rwpolicy.sorted_list.insert_duplicate");
static DELETE: Counter = Counter::new("rwpolicy.sorted_list.delete");
static DELETE_ABSENT: Counter = Counter::new("rwpolicy.sorted_list.delete_absent");

/// Register biometrics for the sorted list.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&MEMBER);
    collector.register_counter(&MEMBER_HIT);
    collector.register_counter(&INSERT);
    collector.register_counter(&INSERT_DUPLICATE);
    collector.register_counter(&DELETE);
    collector.register_counter(&DELETE_ABSENT);
}

/////////////////////////////////////////////// Node ///////////////////////////////////////////////

#[derive(Debug)]
struct Node {
    key: u64,
    next: Option<Box<Node>>,
}

//////////////////////////////////////////// SortedList ////////////////////////////////////////////

/// An ordered set of u64 keys.
#[derive(Debug, Default)]
pub struct SortedList {
    head: Option<Box<Node>>,
    len: usize,
}

impl SortedList {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff `key` is in the list.
    pub fn member(&self, key: u64) -> bool {
        MEMBER.click();
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            if n.key >= key {
                if n.key == key {
                    MEMBER_HIT.click();
                    return true;
                }
                return false;
            }
            node = n.next.as_deref();
        }
        false
    }

    /// Insert `key` before the first node whose key is not less than it.  Returns false and leaves
    /// the list untouched if `key` is already present.
    pub fn insert(&mut self, key: u64) -> bool {
        INSERT.click();
        let mut link = &mut self.head;
        while link.as_ref().map_or(false, |n| n.key < key) {
            // The loop condition guarantees the link is Some.
            link = &mut link.as_mut().unwrap().next;
        }
        if link.as_ref().map_or(false, |n| n.key == key) {
            INSERT_DUPLICATE.click();
            return false;
        }
        let next = link.take();
        *link = Some(Box::new(Node { key, next }));
        self.len += 1;
        true
    }

    /// Unlink and free the node holding `key`.  Returns false if there is no such node.
    pub fn delete(&mut self, key: u64) -> bool {
        DELETE.click();
        let mut link = &mut self.head;
        while link.as_ref().map_or(false, |n| n.key < key) {
            // The loop condition guarantees the link is Some.
            link = &mut link.as_mut().unwrap().next;
        }
        match link.take() {
            Some(node) if node.key == key => {
                *link = node.next;
                self.len -= 1;
                true
            }
            other => {
                *link = other;
                DELETE_ABSENT.click();
                false
            }
        }
    }

    /// The number of keys in the list.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Iterate the keys in ascending order.
    pub fn iter(&self) -> SortedListIterator<'_> {
        SortedListIterator {
            node: self.head.as_deref(),
        }
    }
}

impl Drop for SortedList {
    fn drop(&mut self) {
        // Unlink one node at a time; the default drop recurses once per node.
        let mut node = self.head.take();
        while let Some(mut n) = node {
            node = n.next.take();
        }
    }
}

impl<'a> IntoIterator for &'a SortedList {
    type Item = u64;
    type IntoIter = SortedListIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

//////////////////////////////////////// SortedListIterator ////////////////////////////////////////

/// Iterates a [SortedList] from smallest to largest key.
pub struct SortedListIterator<'a> {
    node: Option<&'a Node>,
}

impl Iterator for SortedListIterator<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let node = self.node?;
        self.node = node.next.as_deref();
        Some(node.key)
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use guacamole::combinators::range_to;
    use guacamole::Guacamole;

    use super::*;

    fn keys(list: &SortedList) -> Vec<u64> {
        list.iter().collect()
    }

    #[test]
    fn empty() {
        let list = SortedList::new();
        assert!(list.is_empty());
        assert_eq!(0, list.len());
        assert!(!list.member(0));
        assert_eq!(Vec::<u64>::new(), keys(&list));
    }

    #[test]
    fn insert_keeps_order() {
        let mut list = SortedList::new();
        assert!(list.insert(5));
        assert!(list.insert(1));
        assert!(list.insert(9));
        assert!(list.insert(3));
        assert!(list.insert(0));
        assert_eq!(vec![0, 1, 3, 5, 9], keys(&list));
        assert_eq!(5, list.len());
        assert!(list.member(3));
        assert!(!list.member(4));
        assert!(!list.member(10));
    }

    #[test]
    fn insert_duplicate() {
        let mut list = SortedList::new();
        assert!(list.insert(7));
        assert!(list.insert(2));
        assert!(!list.insert(7));
        assert!(!list.insert(2));
        assert_eq!(vec![2, 7], keys(&list));
        assert_eq!(2, list.len());
    }

    #[test]
    fn delete_head_middle_tail() {
        let mut list = SortedList::new();
        for key in [1, 2, 3, 4, 5] {
            assert!(list.insert(key));
        }
        assert!(list.delete(1));
        assert_eq!(vec![2, 3, 4, 5], keys(&list));
        assert!(list.delete(3));
        assert_eq!(vec![2, 4, 5], keys(&list));
        assert!(list.delete(5));
        assert_eq!(vec![2, 4], keys(&list));
        assert_eq!(2, list.len());
    }

    #[test]
    fn delete_absent() {
        let mut list = SortedList::new();
        assert!(!list.delete(3));
        for key in [2, 4, 6] {
            assert!(list.insert(key));
        }
        assert!(!list.delete(0));
        assert!(!list.delete(3));
        assert!(!list.delete(7));
        assert_eq!(vec![2, 4, 6], keys(&list));
        assert_eq!(3, list.len());
    }

    #[test]
    fn delete_everything() {
        let mut list = SortedList::new();
        for key in [8, 6, 7] {
            assert!(list.insert(key));
        }
        for key in [7, 8, 6] {
            assert!(list.delete(key));
        }
        assert!(list.is_empty());
        assert_eq!(0, list.len());
    }

    #[test]
    fn random_operations_match_btree_set() {
        let mut guac = Guacamole::new(42);
        let mut key = range_to(256u64);
        let mut list = SortedList::new();
        let mut reference = std::collections::BTreeSet::new();
        for i in 0..10_000 {
            let k = key(&mut guac);
            if i % 3 == 0 {
                assert_eq!(reference.remove(&k), list.delete(k));
            } else {
                assert_eq!(reference.insert(k), list.insert(k));
            }
            assert_eq!(reference.contains(&k), list.member(k));
        }
        assert_eq!(reference.len(), list.len());
        assert_eq!(reference.into_iter().collect::<Vec<_>>(), keys(&list));
    }

    #[test]
    fn drop_long_list() {
        let mut list = SortedList::new();
        // Prepend in descending order so construction stays linear.
        for key in (0..500_000u64).rev() {
            assert!(list.insert(key));
        }
        assert_eq!(500_000, list.len());
        drop(list);
    }
}
