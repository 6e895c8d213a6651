//! Zip package access for office containers.
//!
//! Parts that are never written back are copied raw, compressed bytes and
//! timestamps included, so an untouched part is identical in the output.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::DocumentError;

pub struct Package<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    replaced: BTreeMap<String, Vec<u8>>,
    added: Vec<(String, Vec<u8>)>,
}

impl<'a> Package<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self, DocumentError> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        Ok(Self {
            archive,
            replaced: BTreeMap::new(),
            added: Vec::new(),
        })
    }

    /// Names of all parts, original order first, then parts added in this session.
    pub fn part_names(&self) -> Vec<String> {
        let mut names: Vec<String> = (0..self.archive.len())
            .filter_map(|i| self.archive.name_for_index(i).map(str::to_string))
            .collect();
        names.extend(self.added.iter().map(|(name, _)| name.clone()));
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
            || self.added.iter().any(|(added, _)| added == name)
    }

    /// Current content of a part as text, `None` if the part does not exist.
    pub fn read_text(&mut self, name: &str) -> Result<Option<String>, DocumentError> {
        let Some(bytes) = self.read(name)? else {
            return Ok(None);
        };
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| DocumentError::malformed(format!("part {} is not UTF-8", name)))
    }

    pub fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>, DocumentError> {
        if let Some(bytes) = self.replaced.get(name) {
            return Ok(Some(bytes.clone()));
        }
        if let Some((_, bytes)) = self.added.iter().find(|(added, _)| added == name) {
            return Ok(Some(bytes.clone()));
        }
        let mut file = match self.archive.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| DocumentError::malformed(format!("cannot read part {}: {}", name, e)))?;
        Ok(Some(buf))
    }

    /// Replace an existing part or add a new one.
    pub fn write(&mut self, name: &str, content: impl Into<Vec<u8>>) {
        let content = content.into();
        if self.archive.index_for_name(name).is_some() {
            self.replaced.insert(name.to_string(), content);
        } else if let Some(slot) = self.added.iter_mut().find(|(added, _)| added == name) {
            slot.1 = content;
        } else {
            self.added.push((name.to_string(), content));
        }
    }

    /// Serialize the package. Entry order is preserved and new parts go last.
    pub fn finish(mut self) -> Result<Vec<u8>, DocumentError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for i in 0..self.archive.len() {
            let file = self.archive.by_index_raw(i)?;
            let name = file.name().to_string();
            match self.replaced.remove(&name) {
                Some(content) => {
                    let options = entry_options(file.compression());
                    drop(file);
                    writer.start_file(name, options)?;
                    writer.write_all(&content).map_err(write_error)?;
                }
                None => writer.raw_copy_file(file)?,
            }
        }

        for (name, content) in self.added {
            writer.start_file(name, entry_options(CompressionMethod::Deflated))?;
            writer.write_all(&content).map_err(write_error)?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

fn entry_options(compression: CompressionMethod) -> SimpleFileOptions {
    // Fixed timestamp keeps output deterministic.
    SimpleFileOptions::default()
        .compression_method(compression)
        .last_modified_time(DateTime::default())
}

fn write_error(e: std::io::Error) -> DocumentError {
    DocumentError::malformed(format!("cannot write container: {}", e))
}
