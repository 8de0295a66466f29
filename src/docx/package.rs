use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use anyhow::{bail, Context};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::xml::{parse_xml_part, XmlPart};

pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";

/// Largest uncompressed entry accepted from a package. Uploaded files are
/// untrusted, so declared sizes are checked before anything is allocated.
pub const MAX_PART_BYTES: u64 = 64 * 1024 * 1024;

/// A DOCX container held fully in memory. Entries keep their original order,
/// compression and timestamps so untouched parts are written back verbatim.
pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let f = File::open(path).with_context(|| format!("open docx: {}", path.display()))?;
        Self::read_from(f).with_context(|| format!("read docx: {}", path.display()))
    }

    pub fn read_from<R: Read + Seek>(reader: R) -> anyhow::Result<Self> {
        let mut zip = ZipArchive::new(reader).context("read zip")?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let name = file.name().to_string();
            if file.size() > MAX_PART_BYTES {
                bail!("zip entry too large: {name} declares {} bytes", file.size());
            }
            let mut data = Vec::new();
            (&mut file)
                .take(MAX_PART_BYTES + 1)
                .read_to_end(&mut data)
                .with_context(|| format!("read zip entry: {name}"))?;
            if data.len() as u64 > MAX_PART_BYTES {
                bail!("zip entry too large: {name} inflates past {MAX_PART_BYTES} bytes");
            }
            entries.push(DocxEntry {
                name,
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Name of the main document part. Falls back to any `word/*document.xml` for
    /// packages written by tools that rename it.
    pub fn main_document_name(&self) -> Option<&str> {
        if self.entry(MAIN_DOCUMENT_PART).is_some() {
            return Some(MAIN_DOCUMENT_PART);
        }
        self.entries
            .iter()
            .map(|e| e.name.as_str())
            .find(|n| n.starts_with("word/") && n.ends_with("document.xml") && !n.contains("/_rels/"))
    }

    pub fn main_document(&self) -> anyhow::Result<XmlPart> {
        let name = self
            .main_document_name()
            .context("docx has no main document part")?;
        self.xml_part(name)
    }

    pub fn xml_part(&self, name: &str) -> anyhow::Result<XmlPart> {
        let entry = self
            .entry(name)
            .with_context(|| format!("missing part: {name}"))?;
        parse_xml_part(name, &entry.data).with_context(|| format!("parse part: {name}"))
    }

    /// Header and footer parts, in package order.
    pub fn header_footer_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.name.as_str())
            .filter(|n| {
                let lower = n.to_ascii_lowercase();
                lower.starts_with("word/")
                    && lower.ends_with(".xml")
                    && (lower.contains("/header") || lower.contains("/footer"))
            })
            .collect()
    }

    pub fn write_with_replacements(
        &self,
        output_path: &Path,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<()> {
        let f = File::create(output_path)
            .with_context(|| format!("create output docx: {}", output_path.display()))?;
        self.write_to(f, replacements)
            .with_context(|| format!("write output docx: {}", output_path.display()))
    }

    pub fn write_to<W: Write + Seek>(
        &self,
        writer: W,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<()> {
        let mut zout = ZipWriter::new(writer);
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(ent.name.as_str(), opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(ent.name.as_str(), opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        zout.finish().context("finish zip")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::docx::testutil::{body_paragraph, forge_declared_size, write_docx};

    use super::DocxPackage;

    #[test]
    fn replacement_only_touches_named_part() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_docx(dir.path(), "in.docx", &body_paragraph("Hello"));
        let pkg = DocxPackage::read(&path).expect("read");
        assert_eq!(pkg.main_document_name(), Some("word/document.xml"));
        assert_eq!(pkg.header_footer_names(), vec!["word/header1.xml", "word/footer1.xml"]);

        let mut repl = HashMap::new();
        repl.insert("word/document.xml".to_string(), b"<x/>".to_vec());
        let out = dir.path().join("out.docx");
        pkg.write_with_replacements(&out, &repl).expect("write");

        let back = DocxPackage::read(&out).expect("reread");
        assert_eq!(back.entry("word/document.xml").expect("doc").data, b"<x/>");
        assert_eq!(
            back.entry("word/header1.xml").expect("header").data,
            pkg.entry("word/header1.xml").expect("header").data
        );
    }

    #[test]
    fn non_zip_input_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip").expect("write");
        assert!(DocxPackage::read(&path).is_err());
    }

    #[test]
    fn oversized_declared_entry_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_docx(dir.path(), "forged.docx", &body_paragraph("Hello"));
        forge_declared_size(&path, "word/document.xml", 0xFFFF_FFF0);
        let err = DocxPackage::read(&path).err().expect("forged size must fail");
        assert!(format!("{err:#}").contains("zip entry too large"), "{err:#}");
    }
}
