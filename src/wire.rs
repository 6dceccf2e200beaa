//! Length-prefixed framing over file descriptors.
//!
//! Integers are fixed-width little-endian. Byte strings are an `int32`
//! length (possibly zero) followed by the raw bytes; sequences are an
//! `int32` count followed by that many elements.

use super::*;

/// Upper bound on a single length-prefixed field, shared by both directions.
///
/// A malformed length must not make the decoder allocate unbounded memory.
const MAX_FIELD_BYTES: i32 = 256 * 1024 * 1024;

fn stream_error(operation: &str, error: io::Error) -> Error {
  Error::Protocol(format!("{operation}: {error}"))
}

pub fn read_i32(reader: &mut impl io::Read) -> Result<i32> {
  let mut buffer = [0u8; 4];

  reader
    .read_exact(&mut buffer)
    .map_err(|e| stream_error("read int32", e))?;

  Ok(i32::from_le_bytes(buffer))
}

pub fn read_i64(reader: &mut impl io::Read) -> Result<i64> {
  let mut buffer = [0u8; 8];

  reader
    .read_exact(&mut buffer)
    .map_err(|e| stream_error("read int64", e))?;

  Ok(i64::from_le_bytes(buffer))
}

pub fn read_bytes(reader: &mut impl io::Read) -> Result<Vec<u8>> {
  let length = read_i32(reader)?;

  ensure!(
    length >= 0,
    Error::Protocol(format!("negative length {length}"))
  );

  ensure!(
    length <= MAX_FIELD_BYTES,
    Error::Protocol(format!("field of {length} bytes exceeds frame limit"))
  );

  let mut buffer = vec![0u8; length as usize];

  reader
    .read_exact(&mut buffer)
    .map_err(|e| stream_error("read bytes", e))?;

  Ok(buffer)
}

pub fn read_string(reader: &mut impl io::Read) -> Result<String> {
  String::from_utf8(read_bytes(reader)?)
    .map_err(|e| Error::Protocol(format!("invalid utf-8 string: {e}")))
}

pub fn write_i32(writer: &mut impl io::Write, value: i32) -> Result {
  writer
    .write_all(&value.to_le_bytes())
    .map_err(|e| stream_error("write int32", e))
}

pub fn write_i64(writer: &mut impl io::Write, value: i64) -> Result {
  writer
    .write_all(&value.to_le_bytes())
    .map_err(|e| stream_error("write int64", e))
}

pub fn write_bytes(writer: &mut impl io::Write, bytes: &[u8]) -> Result {
  let length =
    i32::try_from(bytes.len()).map_err(|_| Error::Protocol("field too large".into()))?;

  ensure!(
    length <= MAX_FIELD_BYTES,
    Error::Protocol(format!("field of {length} bytes exceeds frame limit"))
  );

  write_i32(writer, length)?;

  writer
    .write_all(bytes)
    .map_err(|e| stream_error("write bytes", e))
}

pub fn write_str(writer: &mut impl io::Write, value: &str) -> Result {
  write_bytes(writer, value.as_bytes())
}

#[cfg(test)]
mod tests {
  use {super::*, assert_matches::assert_matches, std::io::Cursor};

  #[test]
  fn integers_are_little_endian() {
    let mut buffer = Vec::new();

    write_i32(&mut buffer, 0x0403_0201).unwrap();
    write_i64(&mut buffer, -1).unwrap();

    assert_eq!(&buffer[..4], &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(&buffer[4..], &[0xff; 8]);

    let mut cursor = Cursor::new(buffer);

    assert_eq!(read_i32(&mut cursor).unwrap(), 0x0403_0201);
    assert_eq!(read_i64(&mut cursor).unwrap(), -1);
  }

  #[test]
  fn bytes_round_trip() {
    let mut buffer = Vec::new();

    write_bytes(&mut buffer, b"hello\n").unwrap();
    write_bytes(&mut buffer, b"").unwrap();
    write_str(&mut buffer, "/bin/sh").unwrap();

    let mut cursor = Cursor::new(buffer);

    assert_eq!(read_bytes(&mut cursor).unwrap(), b"hello\n");
    assert_eq!(read_bytes(&mut cursor).unwrap(), b"");
    assert_eq!(read_string(&mut cursor).unwrap(), "/bin/sh");
  }

  #[test]
  fn truncated_field_is_a_protocol_error() {
    let mut buffer = Vec::new();

    write_i32(&mut buffer, 16).unwrap();
    buffer.extend_from_slice(b"short");

    let mut cursor = Cursor::new(buffer);

    assert_matches!(read_bytes(&mut cursor), Err(Error::Protocol(_)));
  }

  #[test]
  fn eof_mid_integer_is_a_protocol_error() {
    let mut cursor = Cursor::new(vec![0x01, 0x02]);

    assert_matches!(read_i32(&mut cursor), Err(Error::Protocol(_)));
  }

  #[test]
  fn negative_length_is_rejected() {
    let mut buffer = Vec::new();

    write_i32(&mut buffer, -4).unwrap();

    let mut cursor = Cursor::new(buffer);

    assert_matches!(
      read_bytes(&mut cursor),
      Err(Error::Protocol(message)) if message.contains("negative length")
    );
  }

  #[test]
  fn oversized_length_is_rejected() {
    let mut buffer = Vec::new();

    write_i32(&mut buffer, i32::MAX).unwrap();

    let mut cursor = Cursor::new(buffer);

    assert_matches!(
      read_bytes(&mut cursor),
      Err(Error::Protocol(message)) if message.contains("frame limit")
    );
  }

  #[test]
  fn invalid_utf8_is_rejected() {
    let mut buffer = Vec::new();

    write_bytes(&mut buffer, &[0xff, 0xfe]).unwrap();

    let mut cursor = Cursor::new(buffer);

    assert_matches!(
      read_string(&mut cursor),
      Err(Error::Protocol(message)) if message.contains("utf-8")
    );
  }
}
