//! Byte-level encoding shared by the client and the fake host.
//!
//! # Wire format
//!
//! ```text
//! request  := name '\n' arg*
//! response := value* status
//! status   := int32            (0 = ok)
//!           | int32 string     (non-zero, followed by a message)
//! ```
//!
//! | kind      | encoding                                              |
//! |-----------|-------------------------------------------------------|
//! | int32     | 4 bytes big-endian                                    |
//! | float64   | 8 bytes big-endian IEEE-754                           |
//! | string    | int32 length, UTF-8 bytes                             |
//! | item      | int32 id                                              |
//! | item list | int32 count, count int32 ids                          |
//! | matrix    | int32 rows, int32 cols, rows*cols float64 column-major |
//! | joints    | matrix with one column                                |
//! | pose      | 4x4 matrix                                            |
//!
//! Frames are not self-describing; both sides derive the layout from the
//! command table, so any decode error leaves the stream unusable.

use std::io::{self, BufRead, Read, Write};

use crate::joints::Joints;
use crate::matrix::Matrix;
use crate::pose::Pose;

/// Longest command name accepted when reading a request line.
pub const MAX_LINE_LEN: usize = 1024;
/// Largest string payload accepted (64 MiB).
pub const MAX_STRING_LEN: usize = 64 * 1024 * 1024;
/// Largest matrix accepted, in elements (16 Mi values, 128 MiB).
pub const MAX_MATRIX_ELEMENTS: usize = 16 * 1024 * 1024;
/// Largest item list accepted.
pub const MAX_ITEM_LIST: usize = 1024 * 1024;

/// Shape of one argument or reply slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Int,
    Float,
    Str,
    Item,
    ItemList,
    Matrix,
    Joints,
    Pose,
}

/// One encoded slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f64),
    Str(String),
    Item(i32),
    ItemList(Vec<i32>),
    Matrix(Matrix),
    Joints(Joints),
    Pose(Pose),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::Str(_) => Kind::Str,
            Value::Item(_) => Kind::Item,
            Value::ItemList(_) => Kind::ItemList,
            Value::Matrix(_) => Kind::Matrix,
            Value::Joints(_) => Kind::Joints,
            Value::Pose(_) => Kind::Pose,
        }
    }

    /// Number of bytes [`write_value`] emits for this value.
    pub fn encoded_len(&self) -> usize {
        match self {
            Value::Int(_) | Value::Item(_) => 4,
            Value::Float(_) => 8,
            Value::Str(text) => 4 + text.len(),
            Value::ItemList(ids) => 4 + 4 * ids.len(),
            Value::Matrix(matrix) => 8 + 8 * matrix.as_column_major().len(),
            Value::Joints(joints) => 8 + 8 * joints.len(),
            Value::Pose(_) => 8 + 8 * 16,
        }
    }
}

impl Kind {
    /// Placeholder a host sends in place of a payload it could not compute.
    pub fn default_value(self) -> Value {
        match self {
            Kind::Int => Value::Int(0),
            Kind::Float => Value::Float(0.0),
            Kind::Str => Value::Str(String::new()),
            Kind::Item => Value::Item(0),
            Kind::ItemList => Value::ItemList(Vec::new()),
            Kind::Matrix => Value::Matrix(Matrix::empty()),
            Kind::Joints => Value::Joints(Joints::default()),
            Kind::Pose => Value::Pose(Pose::IDENTITY),
        }
    }
}

fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn length(value: i32, max: usize, what: &str) -> io::Result<usize> {
    let len = usize::try_from(value)
        .map_err(|_| invalid_data(format!("negative {what} length {value}")))?;
    if len > max {
        return Err(invalid_data(format!(
            "{what} length {len} exceeds maximum {max}"
        )));
    }
    Ok(len)
}

/// Write `line` terminated by `\n`, escaping embedded newlines as `<br>`.
///
/// The escape is lossy: a literal `<br>` in `line` reads back as a newline.
pub fn write_line<W: Write>(writer: &mut W, line: &str) -> io::Result<()> {
    let line = line.replace('\n', "<br>");
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")
}

pub fn write_int<W: Write>(writer: &mut W, value: i32) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

pub fn write_float<W: Write>(writer: &mut W, value: f64) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

pub fn write_str<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    let len = i32::try_from(value.len())
        .map_err(|_| invalid_data(format!("string of {} bytes is too long", value.len())))?;
    write_int(writer, len)?;
    writer.write_all(value.as_bytes())
}

fn write_dims<W: Write>(writer: &mut W, rows: usize, cols: usize) -> io::Result<()> {
    let rows = i32::try_from(rows).map_err(|_| invalid_data("matrix has too many rows"))?;
    let cols = i32::try_from(cols).map_err(|_| invalid_data("matrix has too many columns"))?;
    write_int(writer, rows)?;
    write_int(writer, cols)
}

pub fn write_matrix<W: Write>(writer: &mut W, matrix: &Matrix) -> io::Result<()> {
    write_dims(writer, matrix.rows(), matrix.cols())?;
    for value in matrix.as_column_major() {
        write_float(writer, *value)?;
    }
    Ok(())
}

pub fn write_value<W: Write>(writer: &mut W, value: &Value) -> io::Result<()> {
    match value {
        Value::Int(v) | Value::Item(v) => write_int(writer, *v),
        Value::Float(v) => write_float(writer, *v),
        Value::Str(text) => write_str(writer, text),
        Value::ItemList(ids) => {
            let count =
                i32::try_from(ids.len()).map_err(|_| invalid_data("item list is too long"))?;
            write_int(writer, count)?;
            ids.iter().try_for_each(|id| write_int(writer, *id))
        }
        Value::Matrix(matrix) => write_matrix(writer, matrix),
        Value::Joints(joints) => {
            write_dims(writer, joints.len(), 1)?;
            joints.iter().try_for_each(|v| write_float(writer, *v))
        }
        Value::Pose(pose) => {
            write_dims(writer, 4, 4)?;
            pose.to_column_major()
                .iter()
                .try_for_each(|v| write_float(writer, *v))
        }
    }
}

/// Read one `\n`-terminated line, undoing the `<br>` escape.
///
/// Returns `Ok(None)` on a clean end of stream before any byte.
pub fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', &mut buf)?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        if buf.len() > MAX_LINE_LEN {
            return Err(invalid_data("line exceeds maximum length"));
        }
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream ended inside a line",
        ));
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    let line = String::from_utf8(buf).map_err(|_| invalid_data("line is not valid UTF-8"))?;
    Ok(Some(line.replace("<br>", "\n")))
}

pub fn read_int<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

pub fn read_float<R: Read>(reader: &mut R) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_be_bytes(buf))
}

pub fn read_str<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = length(read_int(reader)?, MAX_STRING_LEN, "string")?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| invalid_data("string is not valid UTF-8"))
}

pub fn read_matrix<R: Read>(reader: &mut R) -> io::Result<Matrix> {
    let rows = length(read_int(reader)?, MAX_MATRIX_ELEMENTS, "matrix row")?;
    let cols = length(read_int(reader)?, MAX_MATRIX_ELEMENTS, "matrix column")?;
    let count = rows
        .checked_mul(cols)
        .filter(|count| *count <= MAX_MATRIX_ELEMENTS)
        .ok_or_else(|| invalid_data(format!("matrix {rows}x{cols} is too large")))?;
    let mut data = Vec::with_capacity(count);
    for _ in 0..count {
        data.push(read_float(reader)?);
    }
    Matrix::from_column_major(rows, cols, data).map_err(|err| invalid_data(err.to_string()))
}

pub fn read_value<R: Read>(reader: &mut R, kind: Kind) -> io::Result<Value> {
    Ok(match kind {
        Kind::Int => Value::Int(read_int(reader)?),
        Kind::Float => Value::Float(read_float(reader)?),
        Kind::Str => Value::Str(read_str(reader)?),
        Kind::Item => Value::Item(read_int(reader)?),
        Kind::ItemList => {
            let count = length(read_int(reader)?, MAX_ITEM_LIST, "item list")?;
            let mut ids = Vec::with_capacity(count);
            for _ in 0..count {
                ids.push(read_int(reader)?);
            }
            Value::ItemList(ids)
        }
        Kind::Matrix => Value::Matrix(read_matrix(reader)?),
        Kind::Joints => {
            let matrix = read_matrix(reader)?;
            if matrix.cols() > 1 {
                return Err(invalid_data(format!(
                    "joint vector must have one column, got {}",
                    matrix.cols()
                )));
            }
            Value::Joints(Joints::from(matrix.as_column_major()))
        }
        Kind::Pose => {
            let matrix = read_matrix(reader)?;
            if matrix.shape() != (4, 4) {
                return Err(invalid_data(format!(
                    "pose must be 4x4, got {}x{}",
                    matrix.rows(),
                    matrix.cols()
                )));
            }
            Value::Pose(Pose::from_column_major_unchecked(matrix.as_column_major()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        write_value(&mut buf, value).unwrap();
        buf
    }

    #[test]
    fn primitives_are_big_endian() {
        assert_eq!(encode(&Value::Int(1)), vec![0, 0, 0, 1]);
        assert_eq!(encode(&Value::Int(-2)), vec![0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(encode(&Value::Float(1.0)), 1.0f64.to_be_bytes().to_vec());
        assert_eq!(encode(&Value::Str("ab".into())), vec![0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn matrices_are_column_major() {
        let m = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).unwrap();
        let bytes = encode(&Value::Matrix(m.clone()));
        let mut expected = vec![0, 0, 0, 3, 0, 0, 0, 2];
        for v in [1.0f64, 3.0, 5.0, 2.0, 4.0, 6.0] {
            expected.extend_from_slice(&v.to_be_bytes());
        }
        assert_eq!(bytes, expected);
        let back = read_value(&mut Cursor::new(bytes), Kind::Matrix).unwrap();
        assert_eq!(back, Value::Matrix(m));
    }

    #[test]
    fn encoded_len_matches_bytes_written() {
        let values = [
            Value::Int(7),
            Value::Float(-0.5),
            Value::Str("Frame 1".into()),
            Value::Str(String::new()),
            Value::Item(42),
            Value::ItemList(vec![1, 2, 3]),
            Value::Matrix(Matrix::zeros(3, 5)),
            Value::Joints(Joints::from([0.0, 10.0, 20.0, 30.0, 40.0, 50.0])),
            Value::Pose(Pose::transl(1.0, 2.0, 3.0)),
        ];
        for value in &values {
            assert_eq!(encode(value).len(), value.encoded_len(), "{value:?}");
        }
    }

    #[test]
    fn lines_escape_newlines() {
        let mut buf = Vec::new();
        write_line(&mut buf, "two\nlines").unwrap();
        assert_eq!(buf, b"two<br>lines\n");
        let line = read_line(&mut Cursor::new(buf)).unwrap();
        assert_eq!(line.as_deref(), Some("two\nlines"));
        assert_eq!(read_line(&mut Cursor::new(Vec::new())).unwrap(), None);
    }

    #[test]
    fn literal_breaks_read_back_as_newlines() {
        let mut buf = Vec::new();
        write_line(&mut buf, "a<br>b").unwrap();
        assert_eq!(buf, b"a<br>b\n");
        let line = read_line(&mut Cursor::new(buf)).unwrap();
        assert_eq!(line.as_deref(), Some("a\nb"));
    }

    #[test]
    fn corrupted_lengths_are_rejected() {
        let negative = (-5i32).to_be_bytes().to_vec();
        let err = read_value(&mut Cursor::new(negative), Kind::Str).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mut huge = Vec::new();
        huge.extend_from_slice(&i32::MAX.to_be_bytes());
        huge.extend_from_slice(&i32::MAX.to_be_bytes());
        let err = read_value(&mut Cursor::new(huge), Kind::Matrix).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn poses_must_be_four_by_four() {
        let bytes = encode(&Value::Matrix(Matrix::zeros(3, 3)));
        let err = read_value(&mut Cursor::new(bytes), Kind::Pose).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
