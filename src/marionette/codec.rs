//! Marionette wire protocol codec
//!
//! Every packet is the decimal byte length of the JSON body, a colon, then
//! the body itself:
//! ```text
//! <byte-length>:<JSON body>
//! ```

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::Error;

/// Longest length prefix we accept before giving up on the stream
const MAX_PREFIX_DIGITS: usize = 10;

/// Read a Marionette packet from the stream
///
/// Parses the length prefix and reads the JSON body
pub async fn read_message<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, Error> {
    let mut prefix = Vec::new();
    let bytes_read = reader
        .read_until(b':', &mut prefix)
        .await
        .map_err(eof_as_closed)?;

    if bytes_read == 0 {
        return Err(Error::ConnectionClosed);
    }

    if prefix.pop() != Some(b':') {
        return Err(Error::ConnectionClosed);
    }

    if prefix.is_empty() || prefix.len() > MAX_PREFIX_DIGITS {
        return Err(Error::Protocol(format!(
            "Invalid length prefix: {:?}",
            String::from_utf8_lossy(&prefix)
        )));
    }

    let len: usize = std::str::from_utf8(&prefix)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| {
            Error::Protocol(format!(
                "Invalid length prefix: {:?}",
                String::from_utf8_lossy(&prefix)
            ))
        })?;

    // Sanity check - 100MB should be plenty for any packet
    if len > 100 * 1024 * 1024 {
        return Err(Error::Protocol(format!("Packet too large: {} bytes", len)));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(eof_as_closed)?;

    String::from_utf8(body).map_err(|e| Error::Protocol(format!("Invalid UTF-8: {}", e)))
}

/// Write a Marionette packet to the stream
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, json: &str) -> Result<(), Error> {
    let header = format!("{}:", json.len());

    writer.write_all(header.as_bytes()).await?;
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;

    Ok(())
}

fn eof_as_closed(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_read_message() {
        let data = b"13:{\"test\":true}";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));

        let result = read_message(&mut reader).await.unwrap();
        assert_eq!(result, "{\"test\":true}");
    }

    #[tokio::test]
    async fn test_read_back_to_back_messages() {
        let data = b"2:{}13:{\"test\":true}";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));

        assert_eq!(read_message(&mut reader).await.unwrap(), "{}");
        assert_eq!(read_message(&mut reader).await.unwrap(), "{\"test\":true}");
        assert!(matches!(
            read_message(&mut reader).await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_truncated_body() {
        let data = b"20:{\"test\":true}";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));

        assert!(matches!(
            read_message(&mut reader).await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_bad_prefix() {
        let data = b"abc:{}";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));

        assert!(matches!(
            read_message(&mut reader).await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_write_message() {
        let mut output = Vec::new();
        write_message(&mut output, "{\"test\":true}").await.unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), "13:{\"test\":true}");
    }
}
