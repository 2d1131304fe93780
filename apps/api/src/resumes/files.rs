use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::errors::AppError;

text_enum! {
    FileKind {
        Pdf => "pdf",
        Docx => "docx",
        Doc => "doc",
    }
}

const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

impl FileKind {
    pub fn content_type(self) -> &'static str {
        match self {
            FileKind::Pdf => "application/pdf",
            FileKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            FileKind::Doc => "application/msword",
        }
    }

    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.rsplit_once('.')?;
        FileKind::parse(&extension.to_ascii_lowercase())
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Identifies the document type from its leading bytes.
pub fn sniff(bytes: &[u8]) -> Option<FileKind> {
    if bytes.starts_with(PDF_MAGIC) {
        Some(FileKind::Pdf)
    } else if bytes.starts_with(ZIP_MAGIC)
        && (contains(bytes, b"word/") || contains(bytes, b"[Content_Types].xml"))
    {
        Some(FileKind::Docx)
    } else if bytes.starts_with(OLE_MAGIC) {
        Some(FileKind::Doc)
    } else {
        None
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FileError {
    #[error("Uploaded file is empty")]
    Empty,
    #[error("File exceeds the {limit_mb} MB upload limit")]
    TooLarge { limit_mb: usize },
    #[error("Only .pdf, .docx and .doc files are accepted")]
    UnsupportedExtension,
    #[error("File content is {actual} but the name says {declared}")]
    Mismatch { declared: FileKind, actual: FileKind },
    #[error("File content is not a valid {0} document")]
    Unrecognized(FileKind),
}

impl From<FileError> for AppError {
    fn from(e: FileError) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// Checks size, extension and content of an upload. The extension and the
/// sniffed content must agree.
pub fn validate_upload(filename: &str, bytes: &[u8], max_bytes: usize) -> Result<FileKind, FileError> {
    if bytes.is_empty() {
        return Err(FileError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(FileError::TooLarge {
            limit_mb: max_bytes / (1024 * 1024),
        });
    }

    let declared = FileKind::from_filename(filename).ok_or(FileError::UnsupportedExtension)?;
    match sniff(bytes) {
        Some(actual) if actual == declared => Ok(actual),
        Some(actual) => Err(FileError::Mismatch { declared, actual }),
        None => Err(FileError::Unrecognized(declared)),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = 1024 * 1024;

    fn fake_docx() -> Vec<u8> {
        let mut bytes = ZIP_MAGIC.to_vec();
        bytes.extend_from_slice(b"\x14\x00\x06\x00[Content_Types].xml....word/document.xml");
        bytes
    }

    #[test]
    fn sniffs_supported_formats() {
        assert_eq!(sniff(b"%PDF-1.7\n..."), Some(FileKind::Pdf));
        assert_eq!(sniff(&fake_docx()), Some(FileKind::Docx));
        assert_eq!(sniff(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1]), Some(FileKind::Doc));
        assert_eq!(sniff(b"PK\x03\x04plain zip"), None);
        assert_eq!(sniff(b"hello"), None);
    }

    #[test]
    fn extension_is_case_insensitive() {
        assert_eq!(FileKind::from_filename("CV.PDF"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_filename("cv.final.docx"), Some(FileKind::Docx));
        assert_eq!(FileKind::from_filename("cv"), None);
        assert_eq!(FileKind::from_filename("cv.txt"), None);
    }

    #[test]
    fn upload_validation() {
        assert_eq!(
            validate_upload("cv.pdf", b"%PDF-1.4", MB).unwrap(),
            FileKind::Pdf
        );
        assert_eq!(validate_upload("cv.pdf", b"", MB), Err(FileError::Empty));
        assert_eq!(
            validate_upload("cv.pdf", &vec![b'%'; MB + 1], MB),
            Err(FileError::TooLarge { limit_mb: 1 })
        );
        assert_eq!(
            validate_upload("cv.txt", b"%PDF-1.4", MB),
            Err(FileError::UnsupportedExtension)
        );
        assert_eq!(
            validate_upload("cv.docx", b"%PDF-1.4", MB),
            Err(FileError::Mismatch {
                declared: FileKind::Docx,
                actual: FileKind::Pdf
            })
        );
        assert_eq!(
            validate_upload("cv.pdf", b"not a pdf", MB),
            Err(FileError::Unrecognized(FileKind::Pdf))
        );
    }

    #[test]
    fn hash_is_stable_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
