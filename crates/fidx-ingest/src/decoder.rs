//! Index decoding
//!
//! Turns the raw bytes of one fetched resource into a single-pass stream of
//! text lines. The declared [`Encoding`] is checked against the leading magic
//! bytes before anything is decompressed.
//!
//! | Encoding   | Magic        | Decoder                                 |
//! |------------|--------------|-----------------------------------------|
//! | `none`     | (none)       | pass-through                            |
//! | `gzip`     | `1f 8b`      | `flate2::read::MultiGzDecoder`, lazy    |
//! | `compress` | `1f 9d`      | [`crate::compress`] LZW                 |
//! | `zip`      | `PK 03 04`   | `zip::ZipArchive`, first file           |

use crate::error::DecodeError;
use crate::locator::Encoding;
use flate2::read::MultiGzDecoder;
use std::io::{BufRead, BufReader, Cursor, Read};
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];

/// One decoded line, newline and carriage return stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLine {
    /// 1-based position in the decoded resource
    pub number: u64,
    pub text: String,
}

/// Guess the encoding of a buffer from its leading bytes
///
/// Plain text has no magic, so anything unrecognised is `None`.
pub fn sniff(data: &[u8]) -> Encoding {
    if data.starts_with(&GZIP_MAGIC) {
        Encoding::Gzip
    } else if data.starts_with(&crate::compress::MAGIC) {
        Encoding::Compress
    } else if data.starts_with(&ZIP_MAGIC) {
        Encoding::Zip
    } else {
        Encoding::None
    }
}

/// Start decoding `raw` as `encoding`
///
/// Header problems fail here; truncation and corruption inside the body
/// surface while iterating.
pub fn decode(raw: Vec<u8>, encoding: Encoding) -> Result<IndexLines, DecodeError> {
    let detected = sniff(&raw);
    if detected != encoding {
        return Err(DecodeError::HeaderMismatch {
            expected: encoding.as_str(),
        });
    }

    let raw_len = raw.len();
    let reader: Box<dyn BufRead + Send> = match encoding {
        Encoding::None => Box::new(Cursor::new(raw)),
        Encoding::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(Cursor::new(raw)))),
        Encoding::Compress => Box::new(Cursor::new(crate::compress::decompress(&raw)?)),
        Encoding::Zip => Box::new(Cursor::new(extract_first_entry(raw)?)),
    };
    debug!(encoding = encoding.as_str(), bytes = raw_len, "Decoding index resource");

    Ok(IndexLines {
        reader,
        encoding,
        line_number: 0,
        buf: Vec::with_capacity(256),
        done: false,
    })
}

fn extract_first_entry(raw: Vec<u8>) -> Result<Vec<u8>, DecodeError> {
    let corrupt = |reason: String| DecodeError::Corrupt {
        encoding: "zip",
        reason,
    };

    let mut archive = zip::ZipArchive::new(Cursor::new(raw)).map_err(|e| corrupt(e.to_string()))?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| corrupt(e.to_string()))?;
        if file.is_dir() {
            continue;
        }
        let mut contents = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut contents)
            .map_err(|e| corrupt(format!("{}: {}", file.name(), e)))?;
        debug!(entry = file.name(), bytes = contents.len(), "Extracted zip entry");
        return Ok(contents);
    }
    Err(DecodeError::EmptyArchive)
}

/// Lazy, single-pass line stream over a decoded resource
///
/// Yields at most one error and then ends.
pub struct IndexLines {
    reader: Box<dyn BufRead + Send>,
    encoding: Encoding,
    line_number: u64,
    buf: Vec<u8>,
    done: bool,
}

impl IndexLines {
    /// Lines yielded so far
    pub fn lines_read(&self) -> u64 {
        self.line_number
    }

    fn read_error(&self, err: std::io::Error) -> DecodeError {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            DecodeError::TransportIncomplete(format!(
                "{} stream ended after line {}",
                self.encoding.as_str(),
                self.line_number
            ))
        } else {
            DecodeError::Corrupt {
                encoding: self.encoding.as_str(),
                reason: err.to_string(),
            }
        }
    }
}

impl Iterator for IndexLines {
    type Item = Result<IndexLine, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        self.buf.clear();
        let read = match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(n) => n,
            Err(err) => {
                self.done = true;
                return Some(Err(self.read_error(err)));
            }
        };

        if read == 0 {
            self.done = true;
            return None;
        }

        self.line_number += 1;

        if self.buf.last() != Some(&b'\n') {
            // Every index file ends with a newline; anything else was cut short
            self.done = true;
            return Some(Err(DecodeError::TransportIncomplete(format!(
                "line {} has no terminator",
                self.line_number
            ))));
        }

        self.buf.pop();
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }

        Some(Ok(IndexLine {
            number: self.line_number,
            text: String::from_utf8_lossy(&self.buf).into_owned(),
        }))
    }
}

impl std::iter::FusedIterator for IndexLines {}
