use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use url::Url;


/// Fallback content type for unknown extensions
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const BUILTIN_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("txt", "text/plain"),
    ("xml", "application/xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("pdf", "application/pdf"),
];

/// Extension to content type table
///
/// Extensions are matched case-insensitively and without the leading dot.
#[derive(Debug, Clone)]
pub struct MimeTypes {
    types: HashMap<String, String>,
}

impl MimeTypes {
    /// Table with the built-in types only
    pub fn new() -> MimeTypes {
        let mut mime = MimeTypes { types: HashMap::new() };
        for &(ext, mime_type) in BUILTIN_TYPES {
            mime.insert(ext, mime_type);
        }
        mime
    }
    /// Adds or overrides a mapping
    pub fn insert(&mut self, extension: &str, mime_type: &str) {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        self.types.insert(ext, mime_type.to_string());
    }
    pub fn lookup(&self, extension: &str) -> &str {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        self.types.get(&ext).map(|x| &x[..]).unwrap_or(DEFAULT_MIME_TYPE)
    }
    pub fn for_path(&self, path: &Path) -> &str {
        match path.extension().and_then(|x| x.to_str()) {
            Some(ext) => self.lookup(ext),
            None => DEFAULT_MIME_TYPE,
        }
    }
}

impl Default for MimeTypes {
    fn default() -> MimeTypes {
        MimeTypes::new()
    }
}

/// Everything handlers need to know about the served site
#[derive(Debug, Clone)]
pub struct Context {
    document_root: PathBuf,
    mime_types: MimeTypes,
}

impl Context {
    pub fn new<P: Into<PathBuf>>(document_root: P, mime_types: MimeTypes)
        -> Context
    {
        Context {
            document_root: document_root.into(),
            mime_types: mime_types,
        }
    }
    pub fn document_root(&self) -> &Path {
        &self.document_root
    }
    pub fn mime_types(&self) -> &MimeTypes {
        &self.mime_types
    }
    /// Maps a request-target to an existing file under the document root
    ///
    /// Dot segments are collapsed at the root, query and fragment are
    /// dropped and percent escapes decoded. A directory resolves to its
    /// `index.html`.
    pub fn resolve(&self, target: &str) -> Option<PathBuf> {
        let url = Url::parse("http://localhost/").ok()?.join(target).ok()?;
        let file = Url::parse("file:///").ok()?.join(url.path()).ok()?;
        let decoded = file.to_file_path().ok()?;
        let mut path = self.document_root.clone();
        for component in decoded.components() {
            match component {
                Component::RootDir => {}
                Component::Normal(part) => path.push(part),
                // Encoded slashes may smuggle `..` past the URL parser
                _ => return None,
            }
        }
        if path.is_dir() {
            path.push("index.html");
        }
        if path.is_file() {
            Some(path)
        } else {
            None
        }
    }
}
