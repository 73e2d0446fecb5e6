//! List parsing and the consumer callback interface
//!
//! A map's consumer supplies a [`MapReader`]: `read` is fed the source bytes
//! (possibly in several chunks) and builds the current generation inside a
//! [`ParseState`], `finish` flushes the parser and retires the previous
//! generation. Three canned readers cover the common shapes:
//!
//! - [`RadixList`] - IP networks into a [`RadixTree`]
//! - [`HostList`] - hosts or domains into a [`HostSet`]
//! - [`KvList`] - `key value` lines into a [`KvTable`]

pub mod fsm;
pub mod radix;
pub mod tables;

pub use fsm::{finish_kv_list, finish_list, parse_kv_list, parse_list, ListCursor, HASH_FILL};
pub use radix::RadixTree;
pub use tables::{HostSet, KvTable};

use crate::map::MapPool;
use std::sync::Arc;
use tracing::{debug, info};

/// Per-cycle parsing state
///
/// At most one current generation exists per cycle. Once finished it is
/// published and becomes the previous generation of the next cycle.
#[derive(Debug)]
pub struct ParseState<T> {
    /// Resumable parser position
    pub cursor: ListCursor,
    /// Generation currently published to the consumer
    pub prev: Option<Arc<T>>,
    /// Generation being built
    pub cur: Option<T>,
}

impl<T> ParseState<T> {
    pub fn new(prev: Option<Arc<T>>) -> Self {
        ParseState {
            cursor: ListCursor::new(),
            prev,
            cur: None,
        }
    }
}

/// Consumer callbacks for one data shape
pub trait MapReader: Send + Sync + 'static {
    /// Structure published to the consumer
    type Output: Send + Sync + 'static;

    /// Consume a chunk of source bytes
    fn read(&self, pool: &MapPool, chunk: &[u8], data: &mut ParseState<Self::Output>);

    /// Finish the cycle: flush the parser and drop the previous generation
    ///
    /// Must cope with both `prev` and `cur` being absent.
    fn finish(&self, pool: &MapPool, data: &mut ParseState<Self::Output>);
}

/// IP network list reader
#[derive(Debug, Clone, Copy, Default)]
pub struct RadixList;

impl MapReader for RadixList {
    type Output = RadixTree;

    fn read(&self, pool: &MapPool, chunk: &[u8], data: &mut ParseState<RadixTree>) {
        let tree = data.cur.get_or_insert_with(RadixTree::new);
        parse_list(chunk, &mut data.cursor, |key, _| {
            debug!(tag = %pool.tag(), "insert element: {}", key);
            tree.add_iplist(key);
        });
    }

    fn finish(&self, pool: &MapPool, data: &mut ParseState<RadixTree>) {
        if let Some(tree) = data.cur.as_mut() {
            finish_list(&mut data.cursor, |key, _| {
                tree.add_iplist(key);
            });
            info!(
                tag = %pool.tag(),
                elements = tree.len(),
                "read radix trie: {}",
                tree.info()
            );
        }
        data.prev.take();
    }
}

/// Host or domain list reader
#[derive(Debug, Clone, Copy, Default)]
pub struct HostList;

impl MapReader for HostList {
    type Output = HostSet;

    fn read(&self, pool: &MapPool, chunk: &[u8], data: &mut ParseState<HostSet>) {
        let hosts = data.cur.get_or_insert_with(HostSet::new);
        parse_list(chunk, &mut data.cursor, |key, _| {
            debug!(tag = %pool.tag(), "insert element: {}", key);
            hosts.insert(key);
        });
    }

    fn finish(&self, pool: &MapPool, data: &mut ParseState<HostSet>) {
        if let Some(hosts) = data.cur.as_mut() {
            finish_list(&mut data.cursor, |key, _| {
                hosts.insert(key);
            });
            info!(tag = %pool.tag(), elements = hosts.len(), "read hash of elements");
        }
        data.prev.take();
    }
}

/// Key/value list reader
#[derive(Debug, Clone, Copy, Default)]
pub struct KvList;

impl MapReader for KvList {
    type Output = KvTable;

    fn read(&self, pool: &MapPool, chunk: &[u8], data: &mut ParseState<KvTable>) {
        let table = data.cur.get_or_insert_with(KvTable::new);
        parse_kv_list(chunk, &mut data.cursor, |key, value| {
            debug!(tag = %pool.tag(), "insert kv pair: {} -> {}", key, value);
            table.insert(key, value);
        });
    }

    fn finish(&self, pool: &MapPool, data: &mut ParseState<KvTable>) {
        if let Some(table) = data.cur.as_mut() {
            finish_kv_list(&mut data.cursor, |key, value| {
                table.insert(key, value);
            });
            info!(tag = %pool.tag(), elements = table.len(), "read hash of elements");
        }
        data.prev.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> MapPool {
        MapPool::new("file:///test/list")
    }

    #[test]
    fn test_host_list_two_chunks() {
        let pool = pool();
        let mut state = ParseState::new(None);

        HostList.read(&pool, b"example.com\nexam", &mut state);
        HostList.read(&pool, b"ple.org # spam\n", &mut state);
        HostList.finish(&pool, &mut state);

        let hosts = state.cur.unwrap();
        assert_eq!(hosts.len(), 2);
        assert!(hosts.contains("example.org"));
    }

    #[test]
    fn test_finish_drops_previous_generation() {
        let pool = pool();
        let old = Arc::new(KvTable::new());
        let mut state = ParseState::new(Some(old.clone()));

        KvList.read(&pool, b"k v", &mut state);
        KvList.finish(&pool, &mut state);

        assert!(state.prev.is_none());
        assert_eq!(Arc::strong_count(&old), 1);
        assert_eq!(state.cur.unwrap().get("k"), Some("v"));
    }

    #[test]
    fn test_finish_without_any_read() {
        let pool = pool();
        let mut state: ParseState<RadixTree> = ParseState::new(None);
        RadixList.finish(&pool, &mut state);
        assert!(state.cur.is_none());
    }

    #[test]
    fn test_zero_byte_source_yields_empty_structure() {
        let pool = pool();
        let mut state = ParseState::new(None);
        RadixList.read(&pool, b"", &mut state);
        RadixList.finish(&pool, &mut state);
        assert!(state.cur.unwrap().is_empty());
    }
}
