//! Acceptance checks for uploaded files, applied before any parsing.

use thiserror::Error;

const CSV_EXTENSION: &str = ".csv";
const CSV_MIME: &str = "text/csv";

#[derive(Debug, Error, PartialEq)]
pub enum UploadRejection {
    #[error("Only CSV files are accepted, got '{file_name}' ({content_type})")]
    NotCsv {
        file_name: String,
        content_type: String,
    },
    #[error("Uploaded file '{0}' is empty")]
    EmptyFile(String),
    #[error("Uploaded file is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("Multipart body has no '{0}' field")]
    MissingField(&'static str),
}

/// A file received from the browser, fully buffered.
#[derive(Clone, Debug, Default)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Accepts `.csv` names or a `text/csv` MIME type; either one is enough.
    pub fn is_csv(&self) -> bool {
        let name = self.file_name.trim().to_ascii_lowercase();
        // Browsers may append parameters, e.g. "text/csv; charset=utf-8".
        let mime = self
            .content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        name.ends_with(CSV_EXTENSION) || mime == CSV_MIME
    }

    /// Checks type, emptiness and size, in that order.
    pub fn ensure_csv(&self, max_bytes: usize) -> Result<&[u8], UploadRejection> {
        if !self.is_csv() {
            return Err(UploadRejection::NotCsv {
                file_name: self.file_name.clone(),
                content_type: self.content_type.clone(),
            });
        }
        if self.bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(UploadRejection::EmptyFile(self.file_name.clone()));
        }
        if self.bytes.len() > max_bytes {
            return Err(UploadRejection::TooLarge {
                size: self.bytes.len(),
                limit: max_bytes,
            });
        }
        Ok(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 1024;

    #[test]
    fn accepts_by_extension_or_mime_type() {
        let by_name = UploadedFile::new("Inventory.CSV", "application/octet-stream", b"a\n1".to_vec());
        assert!(by_name.ensure_csv(LIMIT).is_ok());

        let by_mime = UploadedFile::new("export", "text/csv; charset=utf-8", b"a\n1".to_vec());
        assert!(by_mime.ensure_csv(LIMIT).is_ok());
    }

    #[test]
    fn rejects_other_types_before_looking_at_contents() {
        let file = UploadedFile::new("items.xlsx", "application/vnd.ms-excel", Vec::new());
        assert!(matches!(
            file.ensure_csv(LIMIT),
            Err(UploadRejection::NotCsv { .. })
        ));

        let text = UploadedFile::new("notes.txt", "text/plain", b"item_id\n1".to_vec());
        assert!(!text.is_csv());
    }

    #[test]
    fn rejects_empty_and_oversized_files() {
        let empty = UploadedFile::new("items.csv", "text/csv", b" \n\r\n".to_vec());
        assert_eq!(
            empty.ensure_csv(LIMIT),
            Err(UploadRejection::EmptyFile("items.csv".to_string()))
        );

        let big = UploadedFile::new("items.csv", "text/csv", vec![b'a'; LIMIT + 1]);
        assert_eq!(
            big.ensure_csv(LIMIT),
            Err(UploadRejection::TooLarge {
                size: LIMIT + 1,
                limit: LIMIT,
            })
        );
    }
}
