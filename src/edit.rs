use std::ops::Range;

use sourcemap::SourceMapBuilder;

use crate::error::TransformError;
use crate::lines::{utf16_len, LineIndex};

/// Replace `range` of the original text with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: Range<usize>,
    pub replacement: String,
}

impl Edit {
    pub fn replace(range: Range<usize>, replacement: impl Into<String>) -> Self {
        Self { range, replacement: replacement.into() }
    }

    pub fn remove(range: Range<usize>) -> Self {
        Self { range, replacement: String::new() }
    }

    fn overlaps(&self, other: &Edit) -> bool {
        self.range.start < other.range.end && other.range.start < self.range.end
    }
}

/// Non-overlapping edits against one source text, kept ordered by start.
#[derive(Debug, Clone, Default)]
pub struct EditSet {
    edits: Vec<Edit>,
}

impl EditSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Edit> {
        self.edits.iter()
    }

    /// Adds every edit of `group`, or none of them if any would overlap an
    /// edit already in the set or another edit of the group.
    pub fn insert_group(&mut self, group: Vec<Edit>) -> bool {
        for (i, edit) in group.iter().enumerate() {
            if edit.range.start > edit.range.end
                || self.edits.iter().any(|e| e.overlaps(edit))
                || group[..i].iter().any(|e| e.overlaps(edit))
            {
                return false;
            }
        }
        for edit in group {
            let at = self.edits.partition_point(|e| e.range.start <= edit.range.start);
            self.edits.insert(at, edit);
        }
        true
    }

    /// Applies the edits to `source` in one pass and returns the new text
    /// with a v3 source map (as JSON) back to `source`.
    pub fn apply(&self, source: &str, file: &str) -> Result<(String, String), TransformError> {
        let mut writer = MappedWriter::new(source, file);
        let mut cursor = 0;
        for edit in &self.edits {
            writer.copy(cursor..edit.range.start);
            writer.replace(edit.range.start, &edit.replacement);
            cursor = edit.range.end;
        }
        writer.copy(cursor..source.len());
        writer.finish()
    }
}

// -----------------------------------------------------------------------------
// Output with mappings
// -----------------------------------------------------------------------------

struct MappedWriter<'a> {
    source: &'a str,
    file: &'a str,
    index: LineIndex<'a>,
    builder: SourceMapBuilder,
    source_id: u32,
    out: String,
    line: u32,
    column: u32,
}

impl<'a> MappedWriter<'a> {
    fn new(source: &'a str, file: &'a str) -> Self {
        let mut builder = SourceMapBuilder::new(Some(file));
        let source_id = builder.add_source(file);
        builder.set_source_contents(source_id, Some(source));
        Self {
            source,
            file,
            index: LineIndex::new(source),
            builder,
            source_id,
            out: String::with_capacity(source.len()),
            line: 0,
            column: 0,
        }
    }

    fn map_here(&mut self, original: usize) {
        let (src_line, src_col) = self.index.line_col(original);
        self.builder.add_raw(
            self.line,
            self.column,
            src_line,
            src_col,
            Some(self.source_id),
            None,
            false,
        );
    }

    fn advance(&mut self, text: &str) {
        match text.rfind('\n') {
            Some(last) => {
                self.line += text.matches('\n').count() as u32;
                self.column = utf16_len(&text[last + 1..]);
            }
            None => self.column += utf16_len(text),
        }
        self.out.push_str(text);
    }

    /// Unchanged text: one mapping at the chunk start and one per line start.
    fn copy(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let source = self.source;
        let chunk = &source[range.clone()];
        self.map_here(range.start);
        let mut written = 0;
        for (i, _) in chunk.match_indices('\n') {
            self.advance(&chunk[written..=i]);
            written = i + 1;
            if written < chunk.len() {
                self.map_here(range.start + written);
            }
        }
        self.advance(&chunk[written..]);
    }

    fn replace(&mut self, original: usize, replacement: &str) {
        if replacement.is_empty() {
            return;
        }
        self.map_here(original);
        self.advance(replacement);
    }

    fn finish(self) -> Result<(String, String), TransformError> {
        let mut map = Vec::new();
        self.builder
            .into_sourcemap()
            .to_writer(&mut map)
            .map_err(|source| TransformError::SourceMap {
                file: self.file.to_string(),
                source,
            })?;
        Ok((self.out, String::from_utf8_lossy(&map).into_owned()))
    }
}
