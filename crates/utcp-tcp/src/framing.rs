//! TCP/UDP wire framing strategies: a payload is the unit a
//! call exchanges once; how it's delimited on the wire is the framing
//! strategy configured on the call template.

use tokio::io::{AsyncRead, AsyncReadExt};

use utcp_types::call_template::{Endian, FramingStrategy};
use utcp_types::{UtcpError, UtcpResult};

/// Unescape `\n` and `\0` sequences in a delimiter spec string; any other character passes
/// through as its own UTF-8 bytes.
#[must_use]
pub fn unescape_delimiter(raw: &str) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('n') => {
                    chars.next();
                    out.push(b'\n');
                }
                Some('0') => {
                    chars.next();
                    out.push(0);
                }
                _ => out.push(b'\\'),
            }
        } else {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    out
}

fn encode_length_prefix(len: usize, bytes: u8, endian: Endian) -> Vec<u8> {
    let be = (len as u64).to_be_bytes();
    let n = bytes as usize;
    let mut slice = be[8 - n..].to_vec();
    if endian == Endian::Little {
        slice.reverse();
    }
    slice
}

fn decode_length_prefix(buf: &[u8], endian: Endian) -> u64 {
    let mut oriented = buf.to_vec();
    if endian == Endian::Little {
        oriented.reverse();
    }
    let mut be = [0u8; 8];
    be[8 - oriented.len()..].copy_from_slice(&oriented);
    u64::from_be_bytes(be)
}

/// Frame `payload` for sending under `strategy`; length-prefix framing
/// prepends the length, delimiter framing appends the (unescaped)
/// delimiter, and fixed-length/stream framing send the payload as-is.
#[must_use]
pub fn encode_frame(
    strategy: FramingStrategy,
    length_prefix_bytes: u8,
    length_prefix_endian: Endian,
    message_delimiter: Option<&str>,
    payload: &[u8],
) -> Vec<u8> {
    match strategy {
        FramingStrategy::LengthPrefix => {
            let mut out = encode_length_prefix(payload.len(), length_prefix_bytes, length_prefix_endian);
            out.extend_from_slice(payload);
            out
        }
        FramingStrategy::Delimiter => {
            let delim = unescape_delimiter(message_delimiter.unwrap_or("\n"));
            let mut out = payload.to_vec();
            out.extend_from_slice(&delim);
            out
        }
        FramingStrategy::FixedLength | FramingStrategy::Stream => payload.to_vec(),
    }
}

/// Read exactly one framed message from `reader` under `strategy`.
///
/// # Errors
///
/// Returns [`UtcpError::CallFailure`] on I/O error or on reaching EOF
/// before a complete frame is available. Returns [`UtcpError::InvalidConfig`]
/// when `fixed_length` framing is selected without `fixed_message_length`.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    strategy: FramingStrategy,
    length_prefix_bytes: u8,
    length_prefix_endian: Endian,
    message_delimiter: Option<&str>,
    fixed_message_length: Option<usize>,
    max_response_size: Option<usize>,
) -> UtcpResult<Vec<u8>> {
    match strategy {
        FramingStrategy::LengthPrefix => {
            let mut len_buf = vec![0u8; length_prefix_bytes as usize];
            reader
                .read_exact(&mut len_buf)
                .await
                .map_err(|e| UtcpError::CallFailure(format!("reading length prefix: {e}")))?;
            let len = decode_length_prefix(&len_buf, length_prefix_endian);
            let len = usize::try_from(len)
                .map_err(|_| UtcpError::CallFailure("length prefix exceeds addressable size".to_string()))?;
            let mut payload = vec![0u8; len];
            reader
                .read_exact(&mut payload)
                .await
                .map_err(|e| UtcpError::CallFailure(format!("reading payload: {e}")))?;
            Ok(payload)
        }
        FramingStrategy::Delimiter => {
            let delim = unescape_delimiter(message_delimiter.unwrap_or("\n"));
            let mut buf = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                let n = reader
                    .read(&mut byte)
                    .await
                    .map_err(|e| UtcpError::CallFailure(format!("reading delimited frame: {e}")))?;
                if n == 0 {
                    return Err(UtcpError::CallFailure(
                        "connection closed before delimiter".to_string(),
                    ));
                }
                buf.push(byte[0]);
                if !delim.is_empty() && buf.len() >= delim.len() && buf[buf.len() - delim.len()..] == delim[..] {
                    buf.truncate(buf.len() - delim.len());
                    return Ok(buf);
                }
                if let Some(max) = max_response_size
                    && buf.len() >= max
                {
                    return Ok(buf);
                }
            }
        }
        FramingStrategy::FixedLength => {
            let len = fixed_message_length.ok_or_else(|| {
                UtcpError::InvalidConfig("fixed_length framing requires fixed_message_length".to_string())
            })?;
            let mut payload = vec![0u8; len];
            reader
                .read_exact(&mut payload)
                .await
                .map_err(|e| UtcpError::CallFailure(format!("reading fixed-length frame: {e}")))?;
            Ok(payload)
        }
        FramingStrategy::Stream => {
            let mut payload = Vec::new();
            match max_response_size {
                Some(max) => {
                    reader
                        .take(max as u64)
                        .read_to_end(&mut payload)
                        .await
                        .map_err(|e| UtcpError::CallFailure(format!("reading stream: {e}")))?;
                }
                None => {
                    reader
                        .read_to_end(&mut payload)
                        .await
                        .map_err(|e| UtcpError::CallFailure(format!("reading stream: {e}")))?;
                }
            }
            Ok(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn unescapes_newline_and_null() {
        assert_eq!(unescape_delimiter("\\n"), vec![b'\n']);
        assert_eq!(unescape_delimiter("\\0"), vec![0]);
        assert_eq!(unescape_delimiter("||"), vec![b'|', b'|']);
    }

    #[tokio::test]
    async fn length_prefix_round_trips_big_endian() {
        let frame = encode_frame(FramingStrategy::LengthPrefix, 4, Endian::Big, None, b"hello");
        let mut cursor = Cursor::new(frame);
        let payload = read_frame(&mut cursor, FramingStrategy::LengthPrefix, 4, Endian::Big, None, None, None)
            .await
            .unwrap();
        assert_eq!(payload, b"hello");
    }

    #[tokio::test]
    async fn length_prefix_round_trips_little_endian() {
        let frame = encode_frame(FramingStrategy::LengthPrefix, 2, Endian::Little, None, b"hi");
        assert_eq!(&frame[..2], &[2, 0]);
        let mut cursor = Cursor::new(frame);
        let payload = read_frame(&mut cursor, FramingStrategy::LengthPrefix, 2, Endian::Little, None, None, None)
            .await
            .unwrap();
        assert_eq!(payload, b"hi");
    }

    #[tokio::test]
    async fn delimiter_framing_round_trips() {
        let frame = encode_frame(FramingStrategy::Delimiter, 0, Endian::Big, Some("\\n"), b"line one");
        let mut cursor = Cursor::new(frame);
        let payload = read_frame(
            &mut cursor,
            FramingStrategy::Delimiter,
            0,
            Endian::Big,
            Some("\\n"),
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(payload, b"line one");
    }

    #[tokio::test]
    async fn fixed_length_reads_exact_bytes() {
        let mut cursor = Cursor::new(b"abcdef".to_vec());
        let payload = read_frame(
            &mut cursor,
            FramingStrategy::FixedLength,
            0,
            Endian::Big,
            None,
            Some(4),
            None,
        )
        .await
        .unwrap();
        assert_eq!(payload, b"abcd");
    }

    #[tokio::test]
    async fn stream_framing_reads_to_eof() {
        let mut cursor = Cursor::new(b"all of it".to_vec());
        let payload = read_frame(&mut cursor, FramingStrategy::Stream, 0, Endian::Big, None, None, None)
            .await
            .unwrap();
        assert_eq!(payload, b"all of it");
    }

    #[tokio::test]
    async fn stream_framing_caps_at_max_response_size() {
        let mut cursor = Cursor::new(b"0123456789".to_vec());
        let payload = read_frame(&mut cursor, FramingStrategy::Stream, 0, Endian::Big, None, None, Some(4))
            .await
            .unwrap();
        assert_eq!(payload, b"0123");
    }
}
