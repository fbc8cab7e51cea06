//! multipart/form-data body encoding for the socket fallback path
//!
//! Only what the fallback needs from the MIME layer: a random boundary,
//! text fields, and file parts streamed from disk so large uploads never
//! require full in-memory buffering. The total length is computable up
//! front, letting the request carry an exact `Content-Length`.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use rand::distributions::Alphanumeric;
use rand::Rng;

/// One form value: inline text or a file on disk
#[derive(Debug, Clone)]
pub enum Part {
    Text(String),
    File {
        path: PathBuf,
        /// Defaults to the path's file name
        file_name: Option<String>,
        /// Defaults to `application/octet-stream`
        mime: Option<String>,
    },
}

impl Part {
    pub fn text(value: impl Into<String>) -> Self {
        Part::Text(value.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Part::File {
            path: path.into(),
            file_name: None,
            mime: None,
        }
    }
}

/// A multipart/form-data body with a precomputable length
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    parts: Vec<(String, Part)>,
}

impl MultipartBody {
    pub fn new(parts: Vec<(String, Part)>) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        Self {
            boundary: format!("wirecall{suffix}"),
            parts,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's `Content-Type` header
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    fn part_header(&self, name: &str, part: &Part) -> String {
        match part {
            Part::Text(_) => format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n",
                self.boundary, name
            ),
            Part::File {
                path,
                file_name,
                mime,
            } => {
                let file_name = file_name.clone().unwrap_or_else(|| {
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                });
                let mime = mime.as_deref().unwrap_or("application/octet-stream");
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    self.boundary, name, file_name, mime
                )
            }
        }
    }

    fn closing(&self) -> String {
        format!("--{}--\r\n", self.boundary)
    }

    /// Total encoded length in bytes; stats file parts on disk
    pub fn content_length(&self) -> io::Result<u64> {
        let mut total = 0u64;
        for (name, part) in &self.parts {
            total += self.part_header(name, part).len() as u64;
            total += match part {
                Part::Text(value) => value.len() as u64,
                Part::File { path, .. } => fs::metadata(path)?.len(),
            };
            total += 2; // trailing CRLF per part
        }
        total += self.closing().len() as u64;
        Ok(total)
    }

    /// Turn the body into a reader that streams parts lazily; files are
    /// opened as the read position reaches them.
    pub fn into_reader(self) -> MultipartReader {
        let mut segments = VecDeque::new();
        for (name, part) in &self.parts {
            segments.push_back(Segment::Bytes(
                self.part_header(name, part).into_bytes(),
            ));
            match part {
                Part::Text(value) => {
                    segments.push_back(Segment::Bytes(value.clone().into_bytes()))
                }
                Part::File { path, .. } => segments.push_back(Segment::File(path.clone())),
            }
            segments.push_back(Segment::Bytes(b"\r\n".to_vec()));
        }
        segments.push_back(Segment::Bytes(self.closing().into_bytes()));

        MultipartReader {
            segments,
            current: None,
        }
    }
}

enum Segment {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// Streaming reader over the encoded multipart body
pub struct MultipartReader {
    segments: VecDeque<Segment>,
    current: Option<Box<dyn Read + Send>>,
}

impl Read for MultipartReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.current.is_none() {
                match self.segments.pop_front() {
                    Some(Segment::Bytes(bytes)) => {
                        self.current = Some(Box::new(io::Cursor::new(bytes)));
                    }
                    Some(Segment::File(path)) => {
                        self.current = Some(Box::new(fs::File::open(path)?));
                    }
                    None => return Ok(0),
                }
            }

            let reader = self.current.as_mut().unwrap();
            let got = reader.read(buf)?;
            if got == 0 {
                self.current = None;
                continue;
            }
            return Ok(got);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn read_all(body: MultipartBody) -> Vec<u8> {
        let mut out = Vec::new();
        body.into_reader().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_text_fields_encoding() {
        let body = MultipartBody::new(vec![
            ("alpha".to_string(), Part::text("one")),
            ("beta".to_string(), Part::text("two")),
        ]);
        let boundary = body.boundary().to_string();
        let encoded = String::from_utf8(read_all(body)).unwrap();

        assert!(encoded.contains(&format!("--{boundary}\r\n")));
        assert!(encoded.contains("Content-Disposition: form-data; name=\"alpha\"\r\n\r\none\r\n"));
        assert!(encoded.contains("Content-Disposition: form-data; name=\"beta\"\r\n\r\ntwo\r\n"));
        assert!(encoded.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn test_content_length_matches_encoding() {
        let body = MultipartBody::new(vec![
            ("k".to_string(), Part::text("value")),
            ("empty".to_string(), Part::text("")),
        ]);
        let expected = body.content_length().unwrap();
        let encoded = read_all(body);

        assert_eq!(encoded.len() as u64, expected);
    }

    #[test]
    fn test_file_part_streams_from_disk() {
        let path = std::env::temp_dir().join(format!(
            "wirecall-mp-{}.bin",
            std::process::id()
        ));
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(b"file-payload-bytes").unwrap();
        drop(f);

        let body = MultipartBody::new(vec![(
            "upload".to_string(),
            Part::File {
                path: path.clone(),
                file_name: Some("data.bin".to_string()),
                mime: Some("application/test".to_string()),
            },
        )]);

        let expected = body.content_length().unwrap();
        let encoded = read_all(body);
        let text = String::from_utf8_lossy(&encoded);

        assert_eq!(encoded.len() as u64, expected);
        assert!(text.contains("filename=\"data.bin\""));
        assert!(text.contains("Content-Type: application/test"));
        assert!(text.contains("file-payload-bytes"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_boundaries_are_unique() {
        let a = MultipartBody::new(vec![]);
        let b = MultipartBody::new(vec![]);
        assert_ne!(a.boundary(), b.boundary());
    }
}
