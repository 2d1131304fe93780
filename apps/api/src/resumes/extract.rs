//! Plain-text extraction from uploaded resumes.

use std::io::{Cursor, Read};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use zip::ZipArchive;

use super::files::FileKind;

/// Text beyond this many characters is dropped before prompting.
pub const MAX_TEXT_CHARS: usize = 25_000;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF text extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX archive is unreadable: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document contains no extractable text")]
    Empty,

    #[error("extraction task failed: {0}")]
    Task(String),
}

pub fn extract_text(kind: FileKind, bytes: &[u8]) -> Result<String, ExtractError> {
    let raw = match kind {
        FileKind::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?,
        FileKind::Docx => docx_text(bytes)?,
        FileKind::Doc => doc_text(bytes),
    };

    let text = truncate_chars(&normalize_whitespace(&raw), MAX_TEXT_CHARS);
    if text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(text)
}

/// Runs `extract_text` on the blocking pool; PDF parsing is CPU-bound.
pub async fn extract_text_blocking(kind: FileKind, bytes: Vec<u8>) -> Result<String, ExtractError> {
    tokio::task::spawn_blocking(move || extract_text(kind, &bytes))
        .await
        .map_err(|e| ExtractError::Task(e.to_string()))?
}

fn tag_pattern() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"))
}

fn docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive.by_name("word/document.xml")?.read_to_string(&mut xml)?;

    let spaced = xml
        .replace("</w:p>", "\n")
        .replace("<w:tab/>", "\t")
        .replace("<w:br/>", "\n");
    let stripped = tag_pattern().replace_all(&spaced, "");
    Ok(unescape_xml(&stripped))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Legacy Word binaries store body text as UTF-16LE. Keep runs of printable
/// characters long enough to be words.
fn doc_text(bytes: &[u8]) -> String {
    const MIN_RUN: usize = 4;

    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));

    let mut runs = Vec::new();
    let mut current = String::new();
    for decoded in char::decode_utf16(units) {
        match decoded {
            Ok(c) if !c.is_control() || c == '\n' || c == '\r' || c == '\t' => current.push(c),
            _ => {
                if current.trim().chars().count() >= MIN_RUN {
                    runs.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
        }
    }
    if current.trim().chars().count() >= MIN_RUN {
        runs.push(current);
    }
    runs.join("\n")
}

/// Trims each line and collapses runs of blank lines to one.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank = false;
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !blank && !out.is_empty() {
                out.push('\n');
            }
            blank = true;
        } else {
            out.push_str(line);
            out.push('\n');
            blank = false;
        }
    }
    out.trim_end().to_string()
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn docx_with(body: &str) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("[Content_Types].xml", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"<Types/>").unwrap();
            writer
                .start_file("word/document.xml", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Zhang San</w:t></w:r></w:p><w:p><w:r><w:t>R&amp;D Engineer</w:t></w:r></w:p></w:body></w:document>"#;
        let text = extract_text(FileKind::Docx, &docx_with(xml)).unwrap();
        assert_eq!(text, "Zhang San\nR&D Engineer");
    }

    #[test]
    fn docx_without_text_is_empty_error() {
        let err = extract_text(FileKind::Docx, &docx_with("<w:document/>")).unwrap_err();
        assert!(matches!(err, ExtractError::Empty));
    }

    #[test]
    fn corrupt_docx_is_zip_error() {
        let err = extract_text(FileKind::Docx, b"PK\x03\x04garbage").unwrap_err();
        assert!(matches!(err, ExtractError::Zip(_)));
    }

    #[test]
    fn doc_runs_of_utf16_text_are_kept() {
        let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0x00, 0x00];
        for unit in "Senior Java 工程师".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes.extend_from_slice(&[0x00, 0x00, 0x01, 0x00]);
        let text = extract_text(FileKind::Doc, &bytes).unwrap();
        assert!(text.contains("Senior Java 工程师"));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("工程师abc", 3), "工程师");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn blank_lines_collapse() {
        assert_eq!(normalize_whitespace("  a \n\n\n b\n"), "a\n\nb");
    }
}
