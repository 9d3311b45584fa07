use std::path::Path;

use super::super::{DEFAULT_MAX_FILE_SIZE, Document, DocumentError, Paragraph};
use super::{DocumentLoader, LoadFuture, extension_of, source_name};

const PAGE_BREAK: char = '\x0c';

/// Plain text and Markdown. Paragraphs are separated by blank lines; a form
/// feed starts a new page.
pub struct TextLoader {
    pub max_file_size: u64,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> LoadFuture<'_> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let meta = tokio::fs::metadata(&path).await?;
            if meta.len() > max_size {
                return Err(DocumentError::FileTooLarge(meta.len()));
            }

            let content_type = match extension_of(&path).as_str() {
                "md" | "markdown" => "text/markdown",
                _ => "text/plain",
            };

            let content = tokio::fs::read_to_string(&path).await?;

            Ok(Document {
                source: source_name(&path),
                content_type: content_type.to_owned(),
                paragraphs: split_paragraphs(&content),
            })
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "md", "markdown"]
    }
}

/// Split on blank lines. Page numbers are attached only when the text
/// contains page breaks.
pub(crate) fn split_paragraphs(content: &str) -> Vec<Paragraph> {
    let paged = content.contains(PAGE_BREAK);
    let mut out = Vec::new();

    for (page_idx, page) in content.split(PAGE_BREAK).enumerate() {
        let page_number = if paged {
            u32::try_from(page_idx + 1).ok()
        } else {
            None
        };
        let mut current: Vec<&str> = Vec::new();
        for line in page.lines() {
            if line.trim().is_empty() {
                flush(&mut current, page_number, &mut out);
            } else {
                current.push(line.trim_end());
            }
        }
        flush(&mut current, page_number, &mut out);
    }

    out
}

fn flush(lines: &mut Vec<&str>, page_number: Option<u32>, out: &mut Vec<Paragraph>) {
    if lines.is_empty() {
        return;
    }
    out.push(Paragraph {
        text: lines.join("\n"),
        page_number,
    });
    lines.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_text_file_into_paragraphs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "1 Overview\n\nFirst line.\nSecond line.\n\n\nLast.").unwrap();

        let doc = TextLoader::default().load(&file).await.unwrap();
        assert_eq!(doc.source, "notes.txt");
        assert_eq!(doc.content_type, "text/plain");
        let texts: Vec<_> = doc.paragraphs.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, ["1 Overview", "First line.\nSecond line.", "Last."]);
        assert!(doc.paragraphs.iter().all(|p| p.page_number.is_none()));
    }

    #[tokio::test]
    async fn load_markdown_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("readme.md");
        std::fs::write(&file, "# Title").unwrap();

        let doc = TextLoader::default().load(&file).await.unwrap();
        assert_eq!(doc.content_type, "text/markdown");
    }

    #[tokio::test]
    async fn load_nonexistent_file() {
        let result = TextLoader::default()
            .load(Path::new("/nonexistent/file.txt"))
            .await;
        assert!(matches!(result, Err(DocumentError::Io(_))));
    }

    #[tokio::test]
    async fn load_empty_file_has_no_paragraphs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty.txt");
        std::fs::write(&file, "").unwrap();

        let doc = TextLoader::default().load(&file).await.unwrap();
        assert!(doc.paragraphs.is_empty());
    }

    #[tokio::test]
    async fn file_too_large_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.txt");
        std::fs::write(&file, "x").unwrap();

        let loader = TextLoader { max_file_size: 0 };
        let result = loader.load(&file).await;
        assert!(matches!(result, Err(DocumentError::FileTooLarge(1))));
    }

    #[test]
    fn form_feed_starts_new_page() {
        let paras = split_paragraphs("Intro.\n\nMore.\x0cPage two.\n\nStill two.\x0c\x0cFour.");
        let pages: Vec<_> = paras.iter().map(|p| p.page_number).collect();
        assert_eq!(pages, [Some(1), Some(1), Some(2), Some(2), Some(4)]);
    }

    #[test]
    fn whitespace_only_lines_separate_paragraphs() {
        let paras = split_paragraphs("a\n   \nb\n\t\nc");
        assert_eq!(paras.len(), 3);
    }

    #[test]
    fn supported_extensions_list() {
        let loader = TextLoader::default();
        let exts = loader.supported_extensions();
        assert!(exts.contains(&"txt"));
        assert!(exts.contains(&"md"));
        assert!(exts.contains(&"markdown"));
    }
}
