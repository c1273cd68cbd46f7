//! Document discovery and plain-text extraction.
//!
//! Each supported format is a [`TextExtractor`]; the [`ExtractorRegistry`]
//! picks one by file extension so new formats plug in without touching the
//! ingestion pipeline.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

use super::types::{Document, extension_of};

/// Extensions picked up by discovery.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["pdf", "docx", "txt", "md"];

/// Errors from document discovery and extraction.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("failed to extract PDF text from {path}: {reason}")]
    Pdf { path: PathBuf, reason: String },

    #[error("failed to read Word document {path}: {reason}")]
    Docx { path: PathBuf, reason: String },
}

impl LoaderError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Capability: extract plain text from one file format.
pub trait TextExtractor: Send + Sync {
    /// Lower-case extensions (without dot) this extractor handles.
    fn extensions(&self) -> &[&'static str];

    /// Read `path` and return its text.
    fn extract(&self, path: &Path) -> Result<String, LoaderError>;
}

/// PDF pages joined by newlines. Pages without text contribute "".
#[derive(Debug, Default)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    fn extract(&self, path: &Path) -> Result<String, LoaderError> {
        let pages = pdf_extract::extract_text_by_pages(path).map_err(|e| LoaderError::Pdf {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        // Positional spacing pdf-extract adds at page edges is dropped
        let pages: Vec<&str> = pages.iter().map(|page| page.trim()).collect();
        Ok(pages.join("\n"))
    }
}

/// Word-processor (`.docx`) paragraphs joined by newlines.
#[derive(Debug, Default)]
pub struct DocxExtractor;

/// Main document part inside the OOXML package.
const DOCX_MAIN_PART: &str = "word/document.xml";

impl TextExtractor for DocxExtractor {
    fn extensions(&self) -> &[&'static str] {
        &["docx"]
    }

    fn extract(&self, path: &Path) -> Result<String, LoaderError> {
        let docx_err = |reason: String| LoaderError::Docx {
            path: path.to_path_buf(),
            reason,
        };

        let file = std::fs::File::open(path).map_err(|e| LoaderError::io(path, e))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| docx_err(e.to_string()))?;
        let mut part = archive
            .by_name(DOCX_MAIN_PART)
            .map_err(|e| docx_err(format!("{DOCX_MAIN_PART}: {e}")))?;

        let mut xml = String::new();
        part.read_to_string(&mut xml)
            .map_err(|e| LoaderError::io(path, e))?;

        let paragraphs = docx_paragraphs(&xml).map_err(docx_err)?;
        Ok(paragraphs.join("\n"))
    }
}

/// Collect paragraph texts from a WordprocessingML body.
///
/// Runs inside one `w:p` are concatenated; `w:tab` becomes a tab and
/// `w:br`/`w:cr` a newline. Paragraphs in tables are included.
pub fn docx_paragraphs(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_paragraph = false;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => {
                    in_paragraph = true;
                    current.clear();
                }
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" if in_paragraph => current.push('\t'),
                b"w:br" | b"w:cr" if in_paragraph => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                current.push_str(&text);
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    in_paragraph = false;
                    paragraphs.push(std::mem::take(&mut current));
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

/// Plain text and Markdown, read verbatim. Invalid UTF-8 is dropped.
#[derive(Debug, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extensions(&self) -> &[&'static str] {
        &["txt", "md"]
    }

    fn extract(&self, path: &Path) -> Result<String, LoaderError> {
        let bytes = std::fs::read(path).map_err(|e| LoaderError::io(path, e))?;
        Ok(decode_lossy(&bytes))
    }
}

/// Decode UTF-8, skipping undecodable byte sequences entirely.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

/// Extension -> extractor lookup.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,
    by_extension: HashMap<String, usize>,
    fallback: PlainTextExtractor,
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<&String> = self.by_extension.keys().collect();
        extensions.sort();
        f.debug_struct("ExtractorRegistry")
            .field("extensions", &extensions)
            .finish()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(PdfExtractor));
        registry.register(Box::new(DocxExtractor));
        registry.register(Box::new(PlainTextExtractor));
        registry
    }
}

impl ExtractorRegistry {
    /// Registry with no extractors; unknown extensions read as plain text.
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
            by_extension: HashMap::new(),
            fallback: PlainTextExtractor,
        }
    }

    /// Add an extractor. Later registrations win for shared extensions.
    pub fn register(&mut self, extractor: Box<dyn TextExtractor>) {
        let index = self.extractors.len();
        for ext in extractor.extensions() {
            self.by_extension.insert(ext.to_lowercase(), index);
        }
        self.extractors.push(extractor);
    }

    /// Extractor for `path`, plain text when the extension is unknown.
    pub fn extractor_for(&self, path: &Path) -> &dyn TextExtractor {
        match self.by_extension.get(&extension_of(path)) {
            Some(&index) => self.extractors[index].as_ref(),
            None => &self.fallback,
        }
    }

    /// Extract `path` into a [`Document`].
    pub fn load(&self, path: &Path) -> Result<Document, LoaderError> {
        let text = self.extractor_for(path).extract(path)?;
        Ok(Document::new(path.to_path_buf(), text))
    }
}

/// Finds supported files and turns them into documents.
#[derive(Debug, Default)]
pub struct DocumentLoader {
    registry: ExtractorRegistry,
    recursive: bool,
}

impl DocumentLoader {
    /// Descend into subdirectories during discovery.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// All files under `dir` with a supported extension.
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>, LoaderError> {
        discover_files(dir, self.recursive)
    }

    /// Extract one file.
    pub fn load(&self, path: &Path) -> Result<Document, LoaderError> {
        self.registry.load(path)
    }
}

/// Files directly in `dir` (or below it when `recursive`) whose extension is
/// one of [`SUPPORTED_EXTENSIONS`], matched case-insensitively.
///
/// The result is sorted for stable output; callers must not rely on the
/// order carrying meaning.
pub fn discover_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, LoaderError> {
    if !dir.is_dir() {
        return Err(LoaderError::MissingDirectory(dir.to_path_buf()));
    }

    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    let base = Pattern::escape(&dir.to_string_lossy());
    let prefix = if recursive { "**/" } else { "" };

    let mut files = Vec::new();
    for ext in SUPPORTED_EXTENSIONS {
        let pattern = format!("{base}/{prefix}*.{ext}");
        for path in glob::glob_with(&pattern, options)?.flatten() {
            if path.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    files.dedup();

    tracing::debug!(
        target: "loader",
        "discovered {} document(s) in {}",
        files.len(),
        dir.display()
    );

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_discover_filters_by_extension() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for name in ["a.txt", "b.md", "c.pdf", "d.docx", "e.csv", "f.TXT", "notes"] {
            std::fs::write(root.join(name), "x").unwrap();
        }
        std::fs::create_dir(root.join("nested")).unwrap();
        std::fs::write(root.join("nested/g.md"), "x").unwrap();

        let files = discover_files(root, false).unwrap();
        let mut names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.md", "c.pdf", "d.docx", "f.TXT"]);

        let recursive = discover_files(root, true).unwrap();
        assert_eq!(recursive.len(), 6);
        assert!(recursive.iter().any(|p| p.ends_with("nested/g.md")));
    }

    #[test]
    fn test_discover_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        assert!(matches!(
            discover_files(&missing, false),
            Err(LoaderError::MissingDirectory(_))
        ));
    }

    #[test]
    fn test_discover_escapes_glob_characters_in_dir() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("sops [2024]");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("gate.txt"), "x").unwrap();

        let files = discover_files(&dir, false).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_plain_text_drops_invalid_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mixed.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"Quay \xff\xfecrane\n\xc3\xa9t\xc3\xa9").unwrap();

        let text = PlainTextExtractor.extract(&path).unwrap();
        assert_eq!(text, "Quay crane\nété");
    }

    #[test]
    fn test_decode_lossy_keeps_valid_text() {
        assert_eq!(decode_lossy("plain ✓".as_bytes()), "plain ✓");
        assert_eq!(decode_lossy(b"\x80abc\xc3"), "abc");
        assert_eq!(decode_lossy(b""), "");
    }

    /// Write a PDF with one text page per entry; `None` gives a page with an
    /// empty content stream.
    fn write_pdf(path: &Path, pages: &[Option<&str>]) {
        use lopdf::content::{Content, Operation};
        use lopdf::{Document, Object, Stream, dictionary};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in pages {
            let operations = match text {
                Some(text) => vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
                None => Vec::new(),
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_pdf_pages_joined_with_empty_middle_page() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("berth.pdf");
        write_pdf(&path, &[Some("p1"), None, Some("p3")]);

        let text = PdfExtractor.extract(&path).unwrap();
        assert_eq!(text.trim_end_matches('\n'), "p1\n\np3");

        let document = ExtractorRegistry::default().load(&path).unwrap();
        assert_eq!(document.extension, "pdf");
        assert!(!document.is_blank());
    }

    #[test]
    fn test_corrupt_pdf_is_pdf_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        match PdfExtractor.extract(&path) {
            Err(LoaderError::Pdf { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("expected a PDF error, got {other:?}"),
        }
    }

    #[test]
    fn test_docx_paragraphs() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Hazardous cargo</w:t></w:r><w:r><w:t xml:space="preserve"> &amp; IMDG</w:t></w:r></w:p>
    <w:p/>
    <w:p><w:r><w:t>Step</w:t><w:tab/><w:t>1</w:t><w:br/><w:t>Notify</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

        let paragraphs = docx_paragraphs(xml).unwrap();
        assert_eq!(
            paragraphs,
            vec!["Hazardous cargo & IMDG", "", "Step\t1\nNotify"]
        );
    }

    #[test]
    fn test_docx_extractor_reads_package() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sop.docx");

        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file(DOCX_MAIN_PART, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer
            .write_all(
                br#"<w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t>Line one</w:t></w:r></w:p><w:p><w:r><w:t>Line two</w:t></w:r></w:p></w:body></w:document>"#,
            )
            .unwrap();
        writer.finish().unwrap();

        let text = DocxExtractor.extract(&path).unwrap();
        assert_eq!(text, "Line one\nLine two");
    }

    #[test]
    fn test_docx_extractor_rejects_non_zip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.docx");
        std::fs::write(&path, "not a zip").unwrap();

        assert!(matches!(
            DocxExtractor.extract(&path),
            Err(LoaderError::Docx { .. })
        ));
    }

    #[test]
    fn test_registry_selects_by_extension() {
        let registry = ExtractorRegistry::default();
        assert_eq!(
            registry.extractor_for(Path::new("a.PDF")).extensions(),
            &["pdf"]
        );
        assert_eq!(
            registry.extractor_for(Path::new("a.docx")).extensions(),
            &["docx"]
        );
        assert_eq!(
            registry.extractor_for(Path::new("a.md")).extensions(),
            &["txt", "md"]
        );
        // Unknown extensions read as text
        assert_eq!(
            registry.extractor_for(Path::new("a.log")).extensions(),
            &["txt", "md"]
        );
    }

    #[test]
    fn test_registry_accepts_new_format() {
        struct Upper;
        impl TextExtractor for Upper {
            fn extensions(&self) -> &[&'static str] {
                &["txt"]
            }
            fn extract(&self, path: &Path) -> Result<String, LoaderError> {
                let text = std::fs::read_to_string(path).map_err(|e| LoaderError::io(path, e))?;
                Ok(text.to_uppercase())
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        std::fs::write(&path, "berth").unwrap();

        let mut registry = ExtractorRegistry::default();
        registry.register(Box::new(Upper));
        let doc = registry.load(&path).unwrap();
        assert_eq!(doc.text, "BERTH");
        assert_eq!(doc.extension, "txt");
    }

    #[test]
    fn test_loader_read_failure_is_error() {
        let loader = DocumentLoader::default();
        let result = loader.load(Path::new("/definitely/not/here.txt"));
        assert!(matches!(result, Err(LoaderError::Io { .. })));
    }
}
