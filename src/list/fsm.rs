//! Resumable list parsers
//!
//! Both parsers consume bytes one at a time and keep every bit of progress in
//! a [`ListCursor`], so a source may be fed in arbitrary chunks. The same
//! total input produces the same sequence of insertions however it is split.

/// Value passed for every element of a plain token list
pub const HASH_FILL: &str = "1";

// Token list states
const READ_SYMBOL: u8 = 0;
const SKIP_COMMENT: u8 = 1;

// Key/value states
const READ_KEY: u8 = 0;
const SKIP_SPACES: u8 = 2;
const READ_VALUE: u8 = 3;
const SKIP_KV_COMMENT: u8 = 99;

/// Parser position carried between chunks
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ListCursor {
    /// Parser-specific state number
    pub state: u8,
    /// Partial token or key
    token: Vec<u8>,
    /// Partial value (key/value parser only)
    value: Vec<u8>,
}

impl ListCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no partial line is buffered
    pub fn is_idle(&self) -> bool {
        self.token.is_empty() && self.value.is_empty()
    }

    fn reset(&mut self) {
        self.state = 0;
        self.token.clear();
        self.value.clear();
    }
}

#[inline]
fn is_eol(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}

fn emit_token<F: FnMut(&str, &str)>(cursor: &mut ListCursor, insert: &mut F) {
    let token = cursor.token.trim_ascii();
    if !token.is_empty() {
        insert(&String::from_utf8_lossy(token), HASH_FILL);
    }
    cursor.token.clear();
}

fn emit_pair<F: FnMut(&str, &str)>(cursor: &mut ListCursor, insert: &mut F) {
    if !cursor.token.is_empty() {
        let key = String::from_utf8_lossy(&cursor.token);
        let value = String::from_utf8_lossy(cursor.value.trim_ascii());
        insert(&key, &value);
    }
    cursor.token.clear();
    cursor.value.clear();
}

/// Feed a chunk of a plain token list
///
/// Lines split on `\r`/`\n`, surrounding whitespace is stripped, `#` starts a
/// comment running to the end of the line. Text before a `#` on the same
/// line is still an element. Blank lines are ignored.
pub fn parse_list<F>(chunk: &[u8], cursor: &mut ListCursor, mut insert: F)
where
    F: FnMut(&str, &str),
{
    for &b in chunk {
        match cursor.state {
            READ_SYMBOL => {
                if b == b'#' {
                    // Lines like "127.0.0.1 #localhost"
                    emit_token(cursor, &mut insert);
                    cursor.state = SKIP_COMMENT;
                } else if is_eol(b) {
                    emit_token(cursor, &mut insert);
                } else {
                    cursor.token.push(b);
                }
            }
            SKIP_COMMENT => {
                if is_eol(b) {
                    cursor.state = READ_SYMBOL;
                }
            }
            _ => cursor.state = READ_SYMBOL,
        }
    }
}

/// Flush a final line that had no terminating newline
pub fn finish_list<F>(cursor: &mut ListCursor, mut insert: F)
where
    F: FnMut(&str, &str),
{
    if cursor.state == READ_SYMBOL {
        emit_token(cursor, &mut insert);
    }
    cursor.reset();
}

/// Feed a chunk of a key/value list
///
/// The key runs up to the first whitespace, the rest of the line (trimmed)
/// is the value. A key alone on a line gets an empty value. `#` truncates
/// the line.
pub fn parse_kv_list<F>(chunk: &[u8], cursor: &mut ListCursor, mut insert: F)
where
    F: FnMut(&str, &str),
{
    for &b in chunk {
        match cursor.state {
            READ_KEY => {
                if b == b'#' {
                    emit_pair(cursor, &mut insert);
                    cursor.state = SKIP_KV_COMMENT;
                } else if is_eol(b) {
                    emit_pair(cursor, &mut insert);
                } else if b.is_ascii_whitespace() {
                    // Leading whitespace is skipped, trailing ends the key
                    if !cursor.token.is_empty() {
                        cursor.state = SKIP_SPACES;
                    }
                } else {
                    cursor.token.push(b);
                }
            }
            SKIP_SPACES => {
                if b == b'#' {
                    emit_pair(cursor, &mut insert);
                    cursor.state = SKIP_KV_COMMENT;
                } else if is_eol(b) {
                    emit_pair(cursor, &mut insert);
                    cursor.state = READ_KEY;
                } else if !b.is_ascii_whitespace() {
                    cursor.value.push(b);
                    cursor.state = READ_VALUE;
                }
            }
            READ_VALUE => {
                if b == b'#' {
                    emit_pair(cursor, &mut insert);
                    cursor.state = SKIP_KV_COMMENT;
                } else if is_eol(b) {
                    emit_pair(cursor, &mut insert);
                    cursor.state = READ_KEY;
                } else {
                    cursor.value.push(b);
                }
            }
            SKIP_KV_COMMENT => {
                if is_eol(b) {
                    cursor.state = READ_KEY;
                }
            }
            _ => cursor.state = READ_KEY,
        }
    }
}

/// Flush a final key/value line that had no terminating newline
pub fn finish_kv_list<F>(cursor: &mut ListCursor, mut insert: F)
where
    F: FnMut(&str, &str),
{
    if cursor.state != SKIP_KV_COMMENT {
        emit_pair(cursor, &mut insert);
    }
    cursor.reset();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_list(input: &[u8]) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut cursor = ListCursor::new();
        parse_list(input, &mut cursor, |k, v| out.push((k.to_string(), v.to_string())));
        finish_list(&mut cursor, |k, v| out.push((k.to_string(), v.to_string())));
        out
    }

    fn collect_kv(input: &[u8]) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut cursor = ListCursor::new();
        parse_kv_list(input, &mut cursor, |k, v| out.push((k.to_string(), v.to_string())));
        finish_kv_list(&mut cursor, |k, v| out.push((k.to_string(), v.to_string())));
        out
    }

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn test_token_before_comment() {
        assert_eq!(
            collect_list(b"127.0.0.1 #comment\n"),
            vec![pair("127.0.0.1", HASH_FILL)]
        );
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        assert_eq!(
            collect_list(b"\r\n  a.example  \r\n\r\n# full comment\nb.example\n"),
            vec![pair("a.example", "1"), pair("b.example", "1")]
        );
    }

    #[test]
    fn test_unterminated_last_line() {
        assert_eq!(collect_list(b"one\ntwo"), vec![pair("one", "1"), pair("two", "1")]);
    }

    #[test]
    fn test_comment_without_newline_at_end() {
        assert_eq!(collect_list(b"one # trailing"), vec![pair("one", "1")]);
    }

    #[test]
    fn test_kv_value_keeps_inner_spaces() {
        assert_eq!(collect_kv(b"foo   bar baz\n"), vec![pair("foo", "bar baz")]);
    }

    #[test]
    fn test_kv_key_only() {
        assert_eq!(collect_kv(b"solokey\n"), vec![pair("solokey", "")]);
        assert_eq!(collect_kv(b"solokey   \n"), vec![pair("solokey", "")]);
    }

    #[test]
    fn test_kv_comment_truncates() {
        assert_eq!(
            collect_kv(b"key value # note\n# whole line\nother#x\n"),
            vec![pair("key", "value"), pair("other", "")]
        );
    }

    #[test]
    fn test_kv_leading_whitespace() {
        assert_eq!(collect_kv(b"   key\tvalue\n"), vec![pair("key", "value")]);
    }

    #[test]
    fn test_chunked_feed_matches_whole() {
        let input = b"alpha beta\n# c\n gamma  delta epsilon # z\nzeta\r\neta";
        let whole = collect_kv(input);

        for split in 0..input.len() {
            let mut out = Vec::new();
            let mut cursor = ListCursor::new();
            let (a, b) = input.split_at(split);
            parse_kv_list(a, &mut cursor, |k, v| out.push(pair(k, v)));
            parse_kv_list(b, &mut cursor, |k, v| out.push(pair(k, v)));
            finish_kv_list(&mut cursor, |k, v| out.push(pair(k, v)));
            assert_eq!(out, whole, "split at {}", split);
        }
    }

    #[test]
    fn test_cursor_reset_after_finish() {
        let mut cursor = ListCursor::new();
        parse_list(b"partial", &mut cursor, |_, _| {});
        assert!(!cursor.is_idle());
        finish_list(&mut cursor, |_, _| {});
        assert!(cursor.is_idle());
        assert_eq!(cursor.state, 0);
    }
}
