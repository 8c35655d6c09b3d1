//! Incremental request parser.
//!
//! A request is either a multi-bulk frame (`*<N>\r\n` followed by `N`
//! bulk arguments) or an inline command line terminated by `\n`. The
//! first byte of the buffer decides which grammar applies.
//!
//! The parser never consumes the buffer itself. On success it returns
//! the parsed argument vector together with the number of bytes it
//! covered, and the caller advances the buffer. `Ok(None)` means the
//! buffer does not yet hold a complete request.

use bytes::Bytes;

use crate::error::ProtocolError;

/// Maximum number of arguments a multi-bulk request may declare.
const MAX_ARGS: i64 = 1_048_576;

/// Maximum length of a single bulk argument (512 MB).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Maximum bytes a `*<N>` or `$<len>` line may span before CRLF.
const MAX_LENGTH_LINE: usize = 64;

/// Maximum bytes an inline command line may span before `\n`.
const MAX_INLINE_LINE: usize = 64 * 1024;

/// Cap for the argument vector pre-allocation.
const PREALLOC_CAP: usize = 1024;

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command name followed by its arguments. May be empty for a blank
    /// inline line or a `*0` multi-bulk header.
    pub argv: Vec<Bytes>,
    /// Whether the request used the inline grammar.
    pub inline: bool,
}

/// Tries to parse one request from the front of `buf`.
///
/// Returns `Ok(Some((request, consumed)))` when a complete request was
/// parsed, `Ok(None)` when more data is needed, or an error when the
/// framing is malformed. A framing error is fatal to the connection.
pub fn parse_request(buf: &[u8]) -> Result<Option<(Request, usize)>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] == b'*' {
        parse_multibulk(buf)
    } else {
        parse_inline(buf)
    }
}

fn parse_multibulk(buf: &[u8]) -> Result<Option<(Request, usize)>, ProtocolError> {
    let mut pos = 0usize;

    let count = match read_length(buf, &mut pos, b'*')? {
        Some(n) => n,
        None => return Ok(None),
    };
    if !(0..=MAX_ARGS).contains(&count) {
        return Err(ProtocolError::InvalidMultibulkCount);
    }

    let count = count as usize;
    let mut argv = Vec::with_capacity(count.min(PREALLOC_CAP));
    for _ in 0..count {
        let len = match read_length(buf, &mut pos, b'$')? {
            Some(n) => n,
            None => return Ok(None),
        };
        if !(0..=MAX_BULK_LEN).contains(&len) {
            return Err(ProtocolError::InvalidBulkLength);
        }
        let len = len as usize;

        if buf.len() - pos < len + 2 {
            return Ok(None);
        }
        // each bulk payload is followed by a CRLF that must actually
        // be there, not merely assumed
        if buf[pos + len] != b'\r' || buf[pos + len + 1] != b'\n' {
            return Err(ProtocolError::InvalidBulkTerminator);
        }
        argv.push(Bytes::copy_from_slice(&buf[pos..pos + len]));
        pos += len + 2;
    }

    Ok(Some((
        Request {
            argv,
            inline: false,
        },
        pos,
    )))
}

fn parse_inline(buf: &[u8]) -> Result<Option<(Request, usize)>, ProtocolError> {
    let Some(nl) = memchr::memchr(b'\n', buf) else {
        if buf.len() > MAX_INLINE_LINE {
            return Err(ProtocolError::LengthLineTooLong);
        }
        return Ok(None);
    };

    let mut line = &buf[..nl];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }

    let argv = line
        .split(|&b| b == b' ')
        .filter(|tok| !tok.is_empty())
        .map(Bytes::copy_from_slice)
        .collect();

    Ok(Some((Request { argv, inline: true }, nl + 1)))
}

/// Reads a `<prefix><decimal>\r\n` line at `*pos`, advancing past it.
///
/// Returns `Ok(None)` when the line is not complete yet.
fn read_length(
    buf: &[u8],
    pos: &mut usize,
    prefix: u8,
) -> Result<Option<i64>, ProtocolError> {
    if *pos >= buf.len() {
        return Ok(None);
    }
    if buf[*pos] != prefix {
        return Err(ProtocolError::InvalidLengthPrefix);
    }
    let start = *pos + 1;

    let window = &buf[start..buf.len().min(start + MAX_LENGTH_LINE)];
    let Some(cr) = memchr::memchr(b'\r', window) else {
        if buf.len() - start > MAX_LENGTH_LINE {
            return Err(ProtocolError::LengthLineTooLong);
        }
        return Ok(None);
    };
    if start + cr + 1 >= buf.len() {
        return Ok(None);
    }
    if buf[start + cr + 1] != b'\n' {
        return Err(ProtocolError::InvalidLength);
    }

    let line = &window[..cr];
    if line.is_empty() {
        return Err(ProtocolError::MissingLength);
    }
    let n = parse_i64(line).ok_or(ProtocolError::InvalidLength)?;

    *pos = start + cr + 2;
    Ok(Some(n))
}

/// Parses a decimal i64 from raw bytes without allocating.
fn parse_i64(digits: &[u8]) -> Option<i64> {
    let (neg, digits) = match digits.first() {
        Some(b'-') => (true, &digits[1..]),
        _ => (false, digits),
    };
    if digits.is_empty() {
        return None;
    }
    let mut n: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        // accumulate negatively so i64::MIN parses without overflow
        n = n.checked_mul(10)?.checked_sub(i64::from(b - b'0'))?;
    }
    if neg {
        Some(n)
    } else {
        n.checked_neg()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must_parse(input: &[u8]) -> Request {
        let (req, consumed) = parse_request(input)
            .expect("parse should not error")
            .expect("parse should return a request");
        assert_eq!(consumed, input.len(), "should consume entire input");
        req
    }

    fn args(req: &Request) -> Vec<&[u8]> {
        req.argv.iter().map(|a| a.as_ref()).collect()
    }

    #[test]
    fn multibulk_request() {
        let req = must_parse(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        assert!(!req.inline);
        assert_eq!(args(&req), vec![b"SET".as_ref(), b"foo", b"bar"]);
    }

    #[test]
    fn multibulk_empty_argument() {
        let req = must_parse(b"*2\r\n$4\r\nECHO\r\n$0\r\n\r\n");
        assert_eq!(args(&req), vec![b"ECHO".as_ref(), b""]);
    }

    #[test]
    fn multibulk_binary_argument() {
        let req = must_parse(b"*2\r\n$3\r\nGET\r\n$4\r\n\x00\x01\r\n\r\n");
        assert_eq!(req.argv[1].as_ref(), &[0x00, 0x01, b'\r', b'\n']);
    }

    #[test]
    fn multibulk_zero_args() {
        let req = must_parse(b"*0\r\n");
        assert!(req.argv.is_empty());
        assert!(!req.inline);
    }

    #[test]
    fn inline_request() {
        let req = must_parse(b"SET foo bar\r\n");
        assert!(req.inline);
        assert_eq!(args(&req), vec![b"SET".as_ref(), b"foo", b"bar"]);
    }

    #[test]
    fn inline_bare_newline() {
        let req = must_parse(b"PING\n");
        assert_eq!(args(&req), vec![b"PING".as_ref()]);
    }

    #[test]
    fn inline_collapses_repeated_spaces() {
        let req = must_parse(b"SET  foo   bar\r\n");
        assert_eq!(args(&req), vec![b"SET".as_ref(), b"foo", b"bar"]);
    }

    #[test]
    fn inline_blank_line_is_empty_request() {
        let req = must_parse(b"\r\n");
        assert!(req.argv.is_empty());
        assert!(req.inline);
    }

    #[test]
    fn incomplete_returns_none() {
        assert_eq!(parse_request(b"").unwrap(), None);
        assert_eq!(parse_request(b"*2\r\n").unwrap(), None);
        assert_eq!(parse_request(b"*2\r\n$3\r\nGET\r\n").unwrap(), None);
        assert_eq!(parse_request(b"*1\r\n$3\r\nGE").unwrap(), None);
        assert_eq!(parse_request(b"*1\r\n$3\r\nGET\r").unwrap(), None);
        assert_eq!(parse_request(b"PING").unwrap(), None);
        assert_eq!(parse_request(b"*1").unwrap(), None);
    }

    #[test]
    fn consumed_stops_at_request_boundary() {
        let buf = b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n";
        let (req, consumed) = parse_request(buf).unwrap().unwrap();
        assert_eq!(args(&req), vec![b"PING".as_ref()]);
        assert_eq!(consumed, 14);
    }

    #[test]
    fn bad_bulk_prefix() {
        let err = parse_request(b"*1\r\n:3\r\nfoo\r\n").unwrap_err();
        assert_eq!(err, ProtocolError::InvalidLengthPrefix);
    }

    #[test]
    fn bad_length_digits() {
        let err = parse_request(b"*x\r\n").unwrap_err();
        assert_eq!(err, ProtocolError::InvalidLength);
    }

    #[test]
    fn missing_length() {
        let err = parse_request(b"*\r\n").unwrap_err();
        assert_eq!(err, ProtocolError::MissingLength);
    }

    #[test]
    fn negative_multibulk_count() {
        let err = parse_request(b"*-1\r\n").unwrap_err();
        assert_eq!(err, ProtocolError::InvalidMultibulkCount);
    }

    #[test]
    fn negative_bulk_length() {
        let err = parse_request(b"*1\r\n$-1\r\n").unwrap_err();
        assert_eq!(err, ProtocolError::InvalidBulkLength);
    }

    #[test]
    fn bulk_without_crlf_terminator() {
        let err = parse_request(b"*1\r\n$4\r\nPINGxx").unwrap_err();
        assert_eq!(err, ProtocolError::InvalidBulkTerminator);
    }

    #[test]
    fn oversized_length_line() {
        let mut buf = vec![b'*'];
        buf.extend(vec![b'1'; MAX_LENGTH_LINE + 8]);
        let err = parse_request(&buf).unwrap_err();
        assert_eq!(err, ProtocolError::LengthLineTooLong);
    }

    #[test]
    fn parse_i64_limits() {
        assert_eq!(parse_i64(b"0"), Some(0));
        assert_eq!(parse_i64(b"9223372036854775807"), Some(i64::MAX));
        assert_eq!(parse_i64(b"-9223372036854775808"), Some(i64::MIN));
        assert_eq!(parse_i64(b"9223372036854775808"), None);
        assert_eq!(parse_i64(b""), None);
        assert_eq!(parse_i64(b"-"), None);
        assert_eq!(parse_i64(b"1a"), None);
    }
}
