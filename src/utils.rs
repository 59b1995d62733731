use std::fs::{self, DirBuilder};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

use crate::document::Document;

/// Creates a directory if it doesn't exist
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .create(path)?;
    Ok(())
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Sentences with their original terminators. Runs of bare punctuation are dropped.
fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(is_terminator)
        .map(str::trim)
        .filter(|s| s.chars().any(|c| !is_terminator(c)))
}

/// Pieces of at most max_chars: the whole sentence if it fits, otherwise its
/// words, with any word longer than max_chars cut at char boundaries
fn fit_to_width(sentence: &str, max_chars: usize) -> Vec<String> {
    if sentence.chars().count() <= max_chars {
        return vec![sentence.to_string()];
    }

    let mut pieces = Vec::new();
    for word in sentence.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        pieces.extend(chars.chunks(max_chars).map(|part| part.iter().collect::<String>()));
    }
    pieces
}

/// Splits text into chunks of at most max_chars at sentence boundaries,
/// falling back to word boundaries for sentences that don't fit
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current_chunk = String::new();
    let mut current_length = 0;

    for piece in split_sentences(text).flat_map(|s| fit_to_width(s, max_chars)) {
        let piece_len = piece.chars().count();
        if !current_chunk.is_empty() && current_length + 1 + piece_len > max_chars {
            chunks.push(std::mem::take(&mut current_chunk));
            current_length = 0;
        }

        if !current_chunk.is_empty() {
            current_chunk.push(' ');
            current_length += 1;
        }
        current_chunk.push_str(&piece);
        current_length += piece_len;
    }

    if !current_chunk.is_empty() {
        chunks.push(current_chunk);
    }

    chunks
}

/// Loads all text files from a directory recursively, sorted by path
pub fn load_text_files(dir_path: impl AsRef<Path>) -> Result<Vec<(PathBuf, String)>> {
    let mut texts = Vec::new();

    if !dir_path.as_ref().exists() {
        ensure_dir(&dir_path)?;
        return Ok(texts);
    }

    let mut entries = fs::read_dir(&dir_path)
        .with_context(|| format!("failed to read {}", dir_path.as_ref().display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let path = entry.path();

        if path.is_file() {
            if path.extension().is_some_and(|ext| ext == "txt") {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                texts.push((path, content));
            }
        } else if path.is_dir() {
            texts.extend(load_text_files(path)?);
        }
    }

    Ok(texts)
}

/// Chunks every text file under `dir_path` into documents tagged with their source
pub fn load_documents(dir_path: impl AsRef<Path>, max_chars: usize) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for (path, content) in load_text_files(dir_path)? {
        let source = path.display().to_string();
        for (i, chunk) in split_into_chunks(&content, max_chars).into_iter().enumerate() {
            documents.push(
                Document::new(chunk)
                    .with_metadata("source", source.clone())
                    .with_metadata("chunk", i),
            );
        }
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn test_split_into_chunks() {
        let text = "This is a test. It has multiple sentences! How will it be split? Let's see.";
        let chunks = split_into_chunks(text, 20);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 20));
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0], "This is a test. It");
    }

    #[test]
    fn test_split_keeps_terminators() {
        let chunks = split_into_chunks("Really? Yes! Fine. No terminator", 100);
        assert_eq!(chunks, vec!["Really? Yes! Fine. No terminator"]);

        let chunks = split_into_chunks("Is the desk orange? It is!", 20);
        assert_eq!(chunks, vec!["Is the desk orange?", "It is!"]);
    }

    #[test]
    fn test_split_long_sentence_at_words() {
        let text = "Supercalifragilistic words keep going on and on.";
        let chunks = split_into_chunks(text, 10);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 10), "{chunks:?}");
        assert_eq!(chunks[0], "Supercalif");
        assert_eq!(chunks[1], "ragilistic");

        let squeeze = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        assert_eq!(squeeze(&chunks.concat()), squeeze(text));
        assert!(chunks.last().unwrap().ends_with("on."));
    }

    #[test]
    fn test_load_text_files() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.txt");
        let mut file = File::create(file_path)?;
        writeln!(file, "Test content")?;
        File::create(dir.path().join("skip.md"))?;

        let texts = load_text_files(dir.path())?;
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].1.trim(), "Test content");

        Ok(())
    }

    #[test]
    fn test_load_documents_recurses_and_tags_source() -> Result<()> {
        let dir = tempdir()?;
        fs::create_dir(dir.path().join("nested"))?;
        fs::write(dir.path().join("a.txt"), "The desk is orange. The car is red.")?;
        fs::write(dir.path().join("nested").join("b.txt"), "The house is blue.")?;

        let docs = load_documents(dir.path(), 20)?;
        let contents: Vec<_> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["The desk is orange.", "The car is red.", "The house is blue."]);
        assert!(docs[2].metadata["source"].as_str().unwrap().ends_with("b.txt"));
        assert_eq!(docs[1].metadata["chunk"], 1);

        Ok(())
    }

    #[test]
    fn test_missing_dir_is_created() -> Result<()> {
        let dir = tempdir()?;
        let docs_dir = dir.path().join("docs");
        assert!(load_documents(&docs_dir, 100)?.is_empty());
        assert!(docs_dir.is_dir());
        Ok(())
    }
}
