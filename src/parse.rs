use std::ops::Range;

use log::{debug, warn};
use swc_core::{
    common::{sync::Lrc, BytePos, FileName, FilePathMapping, Globals, SourceMap, Spanned, GLOBALS},
    ecma::{
        ast::{EsVersion, Program},
        parser::{error::Error as ParseError, parse_file_as_program, Syntax},
    },
};

use crate::error::TransformError;
use crate::filter::ParseSyntax;
use crate::matcher::ENTRY_POINT;

const BOM: char = '\u{feff}';

/// A parsed file plus what is needed to turn swc positions back into byte
/// offsets and line/column pairs of the caller's text.
///
/// A file that parses cleanly has a single chunk. A file with a fatal syntax
/// error is split into runs of whole lines that parse on their own; lines that
/// never parse are left out.
pub(crate) struct ParsedModule {
    pub chunks: Vec<ParsedChunk>,
    cm: Lrc<SourceMap>,
}

pub(crate) struct ParsedChunk {
    pub program: Program,
    pub positions: Positions,
}

#[derive(Clone, Copy)]
pub(crate) struct Positions {
    base: BytePos,
    /// Byte offset of the chunk in the caller's text.
    shift: usize,
    /// Zero-based line of the caller's text the chunk starts on.
    first_line: usize,
}

impl Positions {
    pub fn offset(&self, pos: BytePos) -> usize {
        pos.0.saturating_sub(self.base.0) as usize + self.shift
    }
}

impl ParsedModule {
    /// One-based line and one-based column (in characters) of `pos`.
    pub fn line_col(&self, positions: &Positions, pos: BytePos) -> (u32, u32) {
        line_col(&self.cm, positions, pos)
    }
}

fn line_col(cm: &SourceMap, positions: &Positions, pos: BytePos) -> (u32, u32) {
    let loc = cm.lookup_char_pos(pos);
    ((positions.first_line + loc.line) as u32, (loc.col.0 + 1) as u32)
}

struct ChunkParser<'a> {
    cm: Lrc<SourceMap>,
    id: &'a str,
    /// Source without its BOM.
    text: &'a str,
    bom: usize,
    syntax: Syntax,
}

impl ChunkParser<'_> {
    fn parse(&self, range: Range<usize>, first_line: usize) -> Result<ParsedChunk, (ParseError, Positions)> {
        let name = if range.start == 0 {
            FileName::Custom(self.id.to_string())
        } else {
            FileName::Custom(format!("{}:{}", self.id, first_line + 1))
        };
        let fm = self.cm.new_source_file(name.into(), self.text[range.clone()].to_string());
        let positions = Positions {
            base: fm.start_pos,
            shift: self.bom + range.start,
            first_line,
        };

        let mut recovered = Vec::new();
        let parsed = parse_file_as_program(&fm, self.syntax, EsVersion::latest(), None, &mut recovered);

        for err in &recovered {
            debug!(
                "[script-bundle] recovered from syntax error in {} at byte {}: {}",
                self.id,
                positions.offset(err.span().lo()),
                err.kind().msg()
            );
        }

        match parsed {
            Ok(program) => Ok(ParsedChunk { program, positions }),
            Err(err) => Err((err, positions)),
        }
    }

    /// Zero-based line of the caller's text where `err` was raised.
    fn error_line(&self, err: &ParseError, positions: &Positions) -> usize {
        line_col(&self.cm, positions, err.span().lo()).0 as usize - 1
    }

    /// Parses what it can of the runs of lines in `pending` after a fatal
    /// error. A failing run is split around the line its error points at; runs
    /// without a call to the entry point are not parsed at all.
    fn recover(&self, line_starts: &[usize], mut pending: Vec<Range<usize>>) -> Vec<ParsedChunk> {
        let mut chunks = Vec::new();
        while let Some(lines) = pending.pop() {
            if lines.is_empty() {
                continue;
            }
            let start = line_starts[lines.start];
            let end = line_starts.get(lines.end).copied().unwrap_or(self.text.len());
            if !self.text[start..end].contains(ENTRY_POINT) {
                continue;
            }
            match self.parse(start..end, lines.start) {
                Ok(chunk) => chunks.push(chunk),
                Err((err, positions)) => {
                    let line = self.error_line(&err, &positions).clamp(lines.start, lines.end - 1);
                    debug!(
                        "[script-bundle] skipping line {} of {}: {}",
                        line + 1,
                        self.id,
                        err.kind().msg()
                    );
                    pending.push(line + 1..lines.end);
                    pending.push(lines.start..line);
                }
            }
        }
        chunks
    }
}

pub(crate) fn parse_module(source: &str, id: &str) -> Result<ParsedModule, TransformError> {
    // swc drops a leading BOM; parse without it and shift offsets back
    let (text, bom) = match source.strip_prefix(BOM) {
        Some(rest) => (rest, BOM.len_utf8()),
        None => (source, 0),
    };

    let parser = ChunkParser {
        cm: Lrc::new(SourceMap::new(FilePathMapping::empty())),
        id,
        text,
        bom,
        syntax: ParseSyntax::for_file(id).to_swc(),
    };

    GLOBALS.set(&Globals::new(), || {
        let (err, positions) = match parser.parse(0..text.len(), 0) {
            Ok(chunk) => {
                return Ok(ParsedModule {
                    chunks: vec![chunk],
                    cm: parser.cm.clone(),
                })
            }
            Err(failed) => failed,
        };

        let (line, column) = line_col(&parser.cm, &positions, err.span().lo());
        let error = TransformError::Parse {
            file: id.to_string(),
            line,
            column,
            message: err.kind().msg().to_string(),
        };

        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        let failed = parser.error_line(&err, &positions).min(line_starts.len() - 1);
        let chunks = parser.recover(&line_starts, vec![failed + 1..line_starts.len(), 0..failed]);
        if chunks.is_empty() {
            return Err(error);
        }
        warn!("[script-bundle] {error}; rewriting the lines that still parse");
        Ok(ParsedModule {
            chunks,
            cm: parser.cm.clone(),
        })
    })
}
