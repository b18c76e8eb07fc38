//! Control sequence stripping for input lines.

use vte::{Parser, Perform};

/// Input sanitizer using the VTE parser.
pub struct InputSanitizer;

impl InputSanitizer {
    /// Strip escape sequences and control characters from a line, then trim it.
    ///
    /// Tabs become spaces so they still separate tokens.
    pub fn sanitize(input: &str) -> String {
        Self::strip_controls(input.as_bytes()).trim().to_string()
    }

    /// Strip escape sequences and control characters from raw bytes.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn strip_controls(input: &[u8]) -> String {
        let mut collector = PrintableCollector::default();
        let mut parser = Parser::new();

        parser.advance(&mut collector, input);

        collector.text
    }
}

/// VTE performer that keeps printable characters only.
#[derive(Default)]
struct PrintableCollector {
    text: String,
}

impl Perform for PrintableCollector {
    fn print(&mut self, c: char) {
        // C1 controls and other non-printables arrive here as chars
        if !c.is_control() {
            self.text.push(c);
        }
    }

    fn execute(&mut self, byte: u8) {
        if byte == b'\t' {
            self.text.push(' ');
        }
    }
}
