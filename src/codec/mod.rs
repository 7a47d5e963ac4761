//! Descriptor container codec
//!
//! The engine exchanges descriptors as zlib streams compressed at the best
//! level, and its parser is whitespace-sensitive, so all edits on the
//! embedded text are bounded substring operations rather than DOM rewrites.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{AgentError, Result};

/// Compresses `input` into `output` as a zlib stream at the best level.
pub fn compress_file(input: &Path, output: &Path) -> Result<()> {
    let bytes = std::fs::read(input)?;
    let out = File::create(output)?;
    let mut encoder = ZlibEncoder::new(out, Compression::best());
    encoder.write_all(&bytes)?;
    encoder.finish()?;
    Ok(())
}

/// Decompresses a zlib stream from `input` and returns the payload bytes.
pub fn decompress_file(input: &Path) -> Result<Vec<u8>> {
    let file = File::open(input)?;
    let mut decoder = ZlibDecoder::new(file);
    let mut payload = Vec::new();
    decoder
        .read_to_end(&mut payload)
        .map_err(|e| AgentError::Format(format!("not a valid zlib stream: {e}")))?;
    Ok(payload)
}

/// Decompresses a container file and returns its payload as text.
pub fn decompress_to_string(input: &Path) -> Result<String> {
    let bytes = decompress_file(input)?;
    String::from_utf8(bytes).map_err(|e| AgentError::Format(format!("payload is not utf-8: {e}")))
}

/// Compresses an `.xml` descriptor into its sibling `.job` container,
/// optionally deleting the source. Returns the container path.
pub fn compress_descriptor(xml_path: &Path, delete_original: bool) -> Result<PathBuf> {
    let job_path = xml_path.with_extension("job");
    compress_file(xml_path, &job_path)
        .map_err(|e| AgentError::Compression(format!("{}: {e}", xml_path.display())))?;
    if delete_original {
        std::fs::remove_file(xml_path)?;
    }
    Ok(job_path)
}

/// Replaces the inner content of the first `<tag>…</tag>` occurrence.
/// Text is returned unchanged when the tag is absent.
pub fn replace_tag(text: &str, tag: &str, value: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    match (text.find(&open), text.find(&close)) {
        (Some(start), Some(end)) if start < end => {
            format!("{}{open}{value}{close}{}", &text[..start], &text[end + close.len()..])
        }
        _ => text.to_string(),
    }
}

/// Deletes the first `<tag>…</tag>` occurrence, collapsing the whitespace
/// that flanked it so no blank line is left behind.
pub fn remove_tag(text: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    match (text.find(&open), text.find(&close)) {
        (Some(start), Some(end)) if start < end => {
            let before = text[..start].trim_end_matches([' ', '\t', '\n', '\r']);
            let after = text[end + close.len()..].trim_start_matches([' ', '\t', '\n', '\r']);
            format!("{before}\n{after}")
        }
        _ => text.to_string(),
    }
}

/// Returns the trimmed inner content of the first `<tag>…</tag>` occurrence.
pub fn read_tag(text: &str, tag: &str) -> Result<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    match (text.find(&open), text.find(&close)) {
        (Some(start), Some(end)) if start < end => {
            Ok(text[start + open.len()..end].trim().to_string())
        }
        _ => Err(AgentError::TagNotFound(tag.to_string())),
    }
}

/// Inserts `<tag>value</tag>` immediately before the final `</Job>`.
/// Text is returned unchanged when no closing job element exists.
pub fn add_tag(text: &str, tag: &str, value: &str) -> String {
    match text.rfind("</Job>") {
        Some(at) => format!("{}  <{tag}>{value}</{tag}>\n{}", &text[..at], &text[at..]),
        None => text.to_string(),
    }
}

/// Rewrites the first `<Job>` opening tag into `<Job attr="value">`.
pub fn add_job_attribute(text: &str, attr: &str, value: &str) -> String {
    match text.find("<Job>") {
        Some(at) => format!(
            "{}<Job {attr}=\"{value}\">{}",
            &text[..at],
            &text[at + "<Job>".len()..]
        ),
        None => text.to_string(),
    }
}
