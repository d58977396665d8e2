//! Line-oriented document chunking.
//!
//! Documents are cut into fragments along blank lines (treated as section
//! boundaries) and whenever the next line would push the current fragment past
//! the configured length. A single line is never split, so a line longer than
//! the limit becomes its own oversized fragment.

/// Default upper bound for a fragment, in characters.
pub const DEFAULT_MAX_FRAGMENT_LEN: usize = 2048;

/// Splits `text` into fragments of at most `max_len` characters.
///
/// Fragments keep their lines joined by `\n`. Returns an empty vector when the
/// input is empty or contains only blank lines.
pub fn split(text: &str, max_len: usize) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = Accumulator::default();

    for line in lines(text) {
        if line.trim().is_empty() {
            current.flush_into(&mut fragments);
            continue;
        }
        let line_len = line.chars().count();
        if !current.is_empty() && current.len + line_len > max_len {
            current.flush_into(&mut fragments);
        }
        current.push_line(line, line_len);
    }
    current.flush_into(&mut fragments);
    fragments
}

/// Iterates the lines of `text`, treating CR, LF and CRLF as one delimiter each.
fn lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match rest.find(|ch: char| ch == '\r' || ch == '\n') {
            Some(idx) => {
                let line = &rest[..idx];
                let skip = if rest[idx..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[idx + skip..];
                Some(line)
            }
            None => {
                let line = rest;
                rest = "";
                Some(line)
            }
        }
    })
}

#[derive(Default)]
struct Accumulator {
    buf: String,
    // characters in `buf`, counting the trailing newline after each line
    len: usize,
}

impl Accumulator {
    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn push_line(&mut self, line: &str, line_len: usize) {
        self.buf.push_str(line);
        self.buf.push('\n');
        self.len += line_len + 1;
    }

    fn flush_into(&mut self, fragments: &mut Vec<String>) {
        if self.buf.is_empty() {
            return;
        }
        let mut fragment = std::mem::take(&mut self.buf);
        fragment.truncate(fragment.trim_end_matches('\n').len());
        fragments.push(fragment);
        self.len = 0;
    }
}
