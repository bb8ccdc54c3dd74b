use std::collections::HashMap;
use std::sync::Arc;

use crate::stream::{Fd, Stream, FIRST_UNRESERVED_FD};

/// Descriptor table mapping descriptor numbers to streams.
///
/// The table is the data guarded by the coordinator's single mutex; it is
/// only reachable through [`Coordinator::lock`].
///
/// [`Coordinator::lock`]: crate::Coordinator::lock
pub struct FdTable {
    streams: HashMap<Fd, Arc<dyn Stream>>,
}

impl FdTable {
    pub(crate) fn new() -> Self {
        Self {
            streams: HashMap::new(),
        }
    }

    /// Lowest free descriptor at or above `min`.
    pub fn next_free(&self, min: Fd) -> Fd {
        let mut fd = min;
        while self.streams.contains_key(&fd) {
            fd += 1;
        }
        fd
    }

    /// Lowest free descriptor outside the reserved stdio range.
    pub fn alloc_fd(&self) -> Fd {
        self.next_free(FIRST_UNRESERVED_FD)
    }

    /// Register a stream under the given descriptor. Replacing an existing
    /// entry drops the old reference.
    pub fn insert(&mut self, fd: Fd, stream: Arc<dyn Stream>) {
        self.streams.insert(fd, stream);
    }

    /// Stream registered under the descriptor, if any.
    pub fn get(&self, fd: Fd) -> Option<Arc<dyn Stream>> {
        self.streams.get(&fd).cloned()
    }

    /// Remove and return the stream registered under the descriptor.
    pub fn remove(&mut self, fd: Fd) -> Option<Arc<dyn Stream>> {
        self.streams.remove(&fd)
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether the table has no registered descriptors.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null::NullStream;
    use crate::stream::OpenFlags;

    fn null(fd: Fd) -> Arc<dyn Stream> {
        NullStream::open(fd, OpenFlags::RDWR)
    }

    #[test]
    fn test_alloc_skips_reserved_range() {
        let table = FdTable::new();
        assert_eq!(table.alloc_fd(), 3);
    }

    #[test]
    fn test_alloc_lowest_free() {
        let mut table = FdTable::new();
        table.insert(3, null(3));
        table.insert(4, null(4));
        assert_eq!(table.alloc_fd(), 5);
        table.remove(3);
        assert_eq!(table.alloc_fd(), 3);
    }

    #[test]
    fn test_insert_get_remove() {
        let mut table = FdTable::new();
        table.insert(3, null(3));
        assert!(table.get(3).is_some());
        assert!(table.get(4).is_none());
        assert!(table.remove(3).is_some());
        assert!(table.remove(3).is_none());
        assert!(table.is_empty());
    }
}
