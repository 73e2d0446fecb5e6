//! Property-based tests for list parsing and the LRU cache
//!
//! Uses proptest to check that parsing does not depend on how the source is
//! split into chunks, and that the cache never exceeds its bound.

use mapkeeper::list::{finish_kv_list, finish_list, parse_kv_list, parse_list, ListCursor};
use mapkeeper::LruHash;
use proptest::prelude::*;
use std::time::{Duration, Instant};

fn parse_all(chunks: &[&[u8]], kv: bool) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut cursor = ListCursor::new();
    for chunk in chunks {
        let mut push = |k: &str, v: &str| out.push((k.to_string(), v.to_string()));
        if kv {
            parse_kv_list(chunk, &mut cursor, &mut push);
        } else {
            parse_list(chunk, &mut cursor, &mut push);
        }
    }
    let mut push = |k: &str, v: &str| out.push((k.to_string(), v.to_string()));
    if kv {
        finish_kv_list(&mut cursor, &mut push);
    } else {
        finish_list(&mut cursor, &mut push);
    }
    out
}

fn list_source() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[a-z0-9.]{1,12}",
            "[a-z]{1,6} [a-z0-9]{1,6}",
            "# [a-z ]{0,10}",
            "[a-z]{1,6} # [a-z]{0,5}",
            " {0,3}",
        ],
        0..20,
    )
    .prop_map(|lines| lines.join("\n"))
}

proptest! {
    #[test]
    fn prop_list_chunking_is_irrelevant(source in list_source(), split in any::<prop::sample::Index>()) {
        let bytes = source.as_bytes();
        let at = if bytes.is_empty() { 0 } else { split.index(bytes.len() + 1) };
        let (a, b) = bytes.split_at(at);

        prop_assert_eq!(parse_all(&[bytes], false), parse_all(&[a, b], false));
    }

    #[test]
    fn prop_kv_chunking_is_irrelevant(source in list_source(), split in any::<prop::sample::Index>()) {
        let bytes = source.as_bytes();
        let at = if bytes.is_empty() { 0 } else { split.index(bytes.len() + 1) };
        let (a, b) = bytes.split_at(at);

        prop_assert_eq!(parse_all(&[bytes], true), parse_all(&[a, b], true));
    }

    #[test]
    fn prop_byte_at_a_time_matches_whole(source in list_source()) {
        let bytes = source.as_bytes();
        let singles: Vec<&[u8]> = bytes.chunks(1).collect();

        prop_assert_eq!(parse_all(&[bytes], false), parse_all(&singles, false));
    }

    #[test]
    fn prop_cache_never_exceeds_bound(
        max in 1usize..16,
        keys in prop::collection::vec(0u32..64, 1..200)
    ) {
        let now = Instant::now();
        let mut cache = LruHash::new(max, None);

        for (i, key) in keys.iter().enumerate() {
            cache.insert(*key, i, now, None);
            prop_assert!(cache.len() <= max);
        }

        // The most recent insert always survives
        let last = *keys.last().unwrap();
        prop_assert!(cache.lookup(&last, now).is_some());
    }

    #[test]
    fn prop_ttl_entries_expire(ttl_ms in 1u64..1000, extra_ms in 1u64..1000) {
        let start = Instant::now();
        let ttl = Duration::from_millis(ttl_ms);
        let mut cache = LruHash::new(8, Some(Duration::from_secs(3600)));

        cache.insert("key".to_string(), 1, start, Some(ttl));
        let later = start + ttl + Duration::from_millis(extra_ms);

        prop_assert!(cache.lookup("key", later).is_none());
    }
}
