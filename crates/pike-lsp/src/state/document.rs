//! Document state management
//!
//! Tracks open buffer content and applies incremental LSP changes with
//! UTF-16 column mapping.

/// One open text document.
///
/// `version` is assigned by the editor and strictly increases for the
/// lifetime of the open document; content at version N is the result of
/// applying the version-N change set to content at N-1.
#[derive(Debug, Clone)]
pub struct DocumentState {
    /// Full document text
    pub text: String,
    /// Editor-assigned version
    pub version: i32,
    /// Language identifier from didOpen (usually `pike`)
    pub language_id: String,
}

impl DocumentState {
    /// New document from a didOpen notification.
    pub fn new(text: impl Into<String>, version: i32, language_id: impl Into<String>) -> Self {
        Self { text: text.into(), version, language_id: language_id.into() }
    }

    /// Apply one content change. `range` is `((start_line, start_char),
    /// (end_line, end_char))` in UTF-16 columns; `None` replaces the whole
    /// document.
    pub fn apply_change(
        &mut self,
        range: Option<((u32, u32), (u32, u32))>,
        new_text: &str,
        version: i32,
    ) {
        match range {
            Some((start, end)) => {
                let start_offset = self.offset_of(start.0, start.1);
                let end_offset = self.offset_of(end.0, end.1).max(start_offset);
                self.text.replace_range(start_offset..end_offset, new_text);
            }
            None => {
                self.text = new_text.to_string();
            }
        }
        self.version = version;
    }

    /// Byte offset of a `(line, utf16_column)` position, clamped to the
    /// document.
    fn offset_of(&self, line: u32, character: u32) -> usize {
        let mut remaining_lines = line;
        let mut line_start = 0usize;
        if remaining_lines > 0 {
            for (index, byte) in self.text.bytes().enumerate() {
                if byte == b'\n' {
                    remaining_lines -= 1;
                    if remaining_lines == 0 {
                        line_start = index + 1;
                        break;
                    }
                }
            }
            if remaining_lines > 0 {
                return self.text.len();
            }
        }

        let line_text = &self.text[line_start..];
        let line_end = line_text.find('\n').map(|i| line_start + i).unwrap_or(self.text.len());

        let mut utf16_seen = 0u32;
        for (index, ch) in self.text[line_start..line_end].char_indices() {
            if utf16_seen >= character {
                return line_start + index;
            }
            utf16_seen += ch.len_utf16() as u32;
        }
        line_end
    }
}
