mod text;

pub use text::TextLoader;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use super::{Document, DocumentError};

pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Document, DocumentError>> + Send + 'a>>;

/// Turns a file into an ordered list of paragraphs.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> LoadFuture<'_>;

    /// Lower-case extensions, without the leading dot.
    fn supported_extensions(&self) -> &[&str];
}

/// Lower-cased extension of `path`, or an empty string.
pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// File name used as the chunk `source_file`.
pub(crate) fn source_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |n| n.to_string_lossy().into_owned(),
    )
}
