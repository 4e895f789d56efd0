//! Size and MD5 hash of files queued for the HDX filestore.
//!
//! XLSX files are zip archives whose bytes change on every save even when the
//! cells do not, so for them the hash is taken over the rendered cell values
//! of every sheet, row by row. The size is always the raw byte count.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use calamine::{Data, Reader, Xlsx};

use crate::error::{HdxError, Result};

const CHUNK_SIZE: usize = 64 * 1024;
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// Incremental MD5 hasher.
#[derive(Clone)]
pub struct MD5Hasher(md5::Context);

impl Default for MD5Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl MD5Hasher {
    /// Creates a new instance of the MD5 hasher.
    pub fn new() -> Self {
        MD5Hasher(md5::Context::new())
    }

    /// Consumes a chunk of data to be included in the hash computation.
    pub fn consume(&mut self, data: &[u8]) {
        self.0.consume(data);
    }

    /// Consumes everything `reader` yields and returns the number of bytes read.
    pub fn consume_reader(&mut self, reader: &mut impl Read) -> Result<u64> {
        let mut buffer = vec![0; CHUNK_SIZE];
        let mut size = 0;
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            size += bytes_read as u64;
            self.consume(&buffer[..bytes_read]);
        }
        Ok(size)
    }

    /// Consumes the cell values of every sheet of an XLSX workbook.
    pub fn consume_spreadsheet(&mut self, bytes: &[u8]) -> Result<()> {
        let mut workbook = Xlsx::new(Cursor::new(bytes))
            .map_err(|err| HdxError::Spreadsheet(err.to_string()))?;

        for sheet_name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&sheet_name)
                .map_err(|err| HdxError::Spreadsheet(err.to_string()))?;

            for row in range.rows() {
                self.consume(render_row(row).as_bytes());
            }
        }

        Ok(())
    }

    /// Computes the final hash value as a hexadecimal string.
    pub fn compute(&self) -> String {
        format!("{:x}", self.0.clone().compute())
    }
}

/// Renders a row as a tuple, e.g. `('name', 3, None)`.
fn render_row(row: &[Data]) -> String {
    let cells: Vec<String> = row
        .iter()
        .map(|cell| match cell {
            Data::Empty => "None".to_string(),
            Data::String(text) => format!("'{}'", text),
            other => other.to_string(),
        })
        .collect();

    if cells.len() == 1 {
        format!("({},)", cells[0])
    } else {
        format!("({})", cells.join(", "))
    }
}

/// Returns the size and hash of a file to upload.
///
/// # Arguments
///
/// * `path` - The file to upload.
/// * `file_format` - The resource format; `xlsx` enables cell based hashing
///   when the file carries a zip signature.
///
/// # Returns
///
/// A tuple `(size in bytes, md5 hex digest)`.
pub fn get_size_and_hash(path: impl AsRef<Path>, file_format: &str) -> Result<(u64, String)> {
    let mut file = File::open(path)?;
    let mut hasher = MD5Hasher::new();

    if file_format.eq_ignore_ascii_case("xlsx") {
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        if buffer.starts_with(ZIP_SIGNATURE) {
            hasher.consume_spreadsheet(&buffer)?;
        } else {
            hasher.consume(&buffer);
        }

        return Ok((buffer.len() as u64, hasher.compute()));
    }

    let size = hasher.consume_reader(&mut file)?;
    Ok((size, hasher.compute()))
}
