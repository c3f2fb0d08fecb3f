//! Reversible escaping of path segments.
//!
//! Shell commands contain bytes that cannot appear in a path segment (`/`,
//! NUL) or that shells and editors treat specially. Each such byte `b` is
//! written as the marker `!` followed by `b ^ 0x40`, so `/` becomes `!o` and
//! `!` itself becomes `!a`.

use super::error::{FsError, FsResult};

/// Byte introducing an escape sequence.
pub const MARKER: u8 = b'!';
/// Mask applied to the escaped byte.
pub const XOR_MASK: u8 = 0x40;

/// Returns true when `byte` must be written as an escape sequence.
pub fn needs_escape(byte: u8) -> bool {
    match byte {
        b' ' | b'>' | b'?' => false,
        0x00..=0x3f => true,
        b'~' | 0x7f => true,
        _ => false,
    }
}

/// Decodes a raw path segment into the text it stands for.
///
/// Fails with [`FsError::MalformedEscape`] when the marker is the last byte.
pub fn decode(raw: &[u8]) -> FsResult<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter();
    while let Some(&byte) = bytes.next() {
        if byte == MARKER {
            match bytes.next() {
                Some(&escaped) => out.push(escaped ^ XOR_MASK),
                None => {
                    return Err(FsError::MalformedEscape(
                        String::from_utf8_lossy(raw).into_owned(),
                    ))
                }
            }
        } else {
            out.push(byte);
        }
    }
    Ok(out)
}

/// Encodes text so that it can be used as a single path segment.
pub fn encode(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for &byte in text {
        if needs_escape(byte) {
            out.push(MARKER);
            out.push(byte ^ XOR_MASK);
        } else {
            out.push(byte);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(assert_ok!(decode(b"echo hello")), b"echo hello");
        assert_eq!(encode(b"echo hello"), b"echo hello");
    }

    #[test]
    fn test_decode_escape_sequences() {
        assert_eq!(assert_ok!(decode(b"cat !oetc!opasswd")), b"cat /etc/passwd");
        assert_eq!(assert_ok!(decode(b"echo hi!a")), b"echo hi!");
        assert_eq!(assert_ok!(decode(b"!>")), b"~");
    }

    #[test]
    fn test_trailing_marker_is_malformed() {
        let err = assert_err!(decode(b"echo!"));
        assert!(matches!(err, FsError::MalformedEscape(ref raw) if raw == "echo!"));
        assert_err!(decode(b"!"));
    }

    #[test]
    fn test_escaped_class() {
        for byte in 0x00..=0x3fu8 {
            let expected = !matches!(byte, b' ' | b'>' | b'?');
            assert_eq!(needs_escape(byte), expected, "byte {:#04x}", byte);
        }
        assert!(needs_escape(b'~'));
        assert!(needs_escape(0x7f));
        assert!(!needs_escape(b'a'));
        assert!(!needs_escape(b'|'));
        assert!(!needs_escape(b'@'));
    }

    #[test]
    fn test_encode_never_emits_separator() {
        let encoded = encode(b"ls -l /tmp/x");
        assert!(!encoded.contains(&b'/'));
        assert_eq!(encoded, b"ls !ml !otmp!ox");
    }

    #[test]
    fn test_decode_inverts_encode() {
        let samples: [&[u8]; 5] = [
            b"grep -v '^#' ~/.bashrc",
            b"awk '{print $1}' | sort -u > out.txt",
            b"printf 'a\\tb\\n'",
            b"echo \"what?\" !!",
            b"",
        ];
        for sample in samples {
            assert_eq!(assert_ok!(decode(&encode(sample))), sample);
        }
    }
}
