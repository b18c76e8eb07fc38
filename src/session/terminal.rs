//! Line framing over a raw byte stream.
//!
//! Peers without a PTY send newline-terminated lines and read output
//! verbatim. Peers with a PTY send raw keystrokes: the server has to echo
//! them, handle backspace and control keys, and emit `\r\n` line endings.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest line kept, in bytes. Further input on the same line is dropped.
pub const MAX_LINE_LEN: usize = 4096;

/// Prompt written before each read in PTY mode.
pub const PROMPT: &str = "$ ";

const READ_CHUNK: usize = 1024;

const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const BEL: u8 = 0x07;
const BACKSPACE: u8 = 0x08;
const ESC: u8 = 0x1b;
const DEL: u8 = 0x7f;

/// How the peer's terminal is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminalMode {
    /// Newline-framed input, output written verbatim, no prompt.
    #[default]
    Line,
    /// Raw keystrokes from a PTY: echo, prompt and CRLF output.
    Pty,
}

impl TerminalMode {
    /// Prompt to write before reading a line, if any.
    pub fn prompt(&self) -> Option<&'static str> {
        match self {
            TerminalMode::Line => None,
            TerminalMode::Pty => Some(PROMPT),
        }
    }

    /// Translate output text for this terminal.
    ///
    /// In PTY mode a bare `\n` becomes `\r\n`.
    pub fn render<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if *self == TerminalMode::Line || !text.contains('\n') {
            return Cow::Borrowed(text);
        }

        let mut out = String::with_capacity(text.len() + text.len() / 8);
        let mut prev = '\0';
        for c in text.chars() {
            if c == '\n' && prev != '\r' {
                out.push('\r');
            }
            out.push(c);
            prev = c;
        }
        Cow::Owned(out)
    }
}

/// Escape sequence being skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    /// Saw ESC.
    Start,
    /// Inside `ESC [ ... final`.
    Csi,
    /// Saw `ESC O`, one more byte follows.
    Ss3,
    /// Inside `ESC ] ...`, up to BEL or `ESC \`.
    Osc,
}

/// What a single input byte did to the current line.
enum Step {
    Continue,
    Line,
    Eof,
}

/// Incremental line reader.
///
/// `read_line` is cancel-safe: bytes already read from the stream are kept
/// in the reader and picked up by the next call.
#[derive(Debug)]
pub struct LineReader {
    mode: TerminalMode,
    line: Vec<u8>,
    pending: VecDeque<u8>,
    escape: Escape,
    skip_lf: bool,
    eof: bool,
}

impl LineReader {
    pub fn new(mode: TerminalMode) -> Self {
        Self {
            mode,
            line: Vec::new(),
            pending: VecDeque::new(),
            escape: Escape::None,
            skip_lf: false,
            eof: false,
        }
    }

    /// Read the next line, without its terminator.
    ///
    /// Returns `Ok(None)` at end of input (EOF, or Ctrl-D on an empty line in
    /// PTY mode). A partial last line is returned before EOF is reported.
    /// Echo for PTY peers is written to `io` as input is consumed.
    pub async fn read_line<S>(&mut self, io: &mut S) -> io::Result<Option<String>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let mut echo = Vec::new();
            let mut done = None;

            while let Some(byte) = self.pending.pop_front() {
                match self.step(byte, &mut echo) {
                    Step::Continue => {}
                    Step::Line => {
                        done = Some(Some(self.take_line()));
                        break;
                    }
                    Step::Eof => {
                        done = Some(None);
                        break;
                    }
                }
            }

            if !echo.is_empty() {
                io.write_all(&echo).await?;
                io.flush().await?;
            }

            if let Some(result) = done {
                return Ok(result);
            }

            if self.eof {
                if self.line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            let mut buf = [0u8; READ_CHUNK];
            let n = io.read(&mut buf).await?;
            if n == 0 {
                self.eof = true;
            } else {
                self.pending.extend(&buf[..n]);
            }
        }
    }

    fn step(&mut self, byte: u8, echo: &mut Vec<u8>) -> Step {
        match self.escape {
            Escape::None => {}
            Escape::Start => {
                self.escape = match byte {
                    b'[' => Escape::Csi,
                    b'O' => Escape::Ss3,
                    b']' => Escape::Osc,
                    _ => Escape::None,
                };
                return Step::Continue;
            }
            Escape::Csi => {
                if (0x40..=0x7e).contains(&byte) {
                    self.escape = Escape::None;
                }
                return Step::Continue;
            }
            Escape::Ss3 => {
                self.escape = Escape::None;
                return Step::Continue;
            }
            Escape::Osc => match byte {
                BEL => {
                    self.escape = Escape::None;
                    return Step::Continue;
                }
                ESC => {
                    self.escape = Escape::Start;
                    return Step::Continue;
                }
                // an unterminated string never swallows the line end
                b'\r' | b'\n' => self.escape = Escape::None,
                _ => return Step::Continue,
            },
        }

        if std::mem::take(&mut self.skip_lf) && byte == b'\n' {
            return Step::Continue;
        }

        let pty = self.mode == TerminalMode::Pty;
        match byte {
            b'\r' | b'\n' => {
                self.skip_lf = byte == b'\r';
                if pty {
                    echo.extend_from_slice(b"\r\n");
                }
                Step::Line
            }
            ESC => {
                self.escape = Escape::Start;
                Step::Continue
            }
            BACKSPACE | DEL => {
                if self.pop_char() && pty {
                    echo.extend_from_slice(b"\x08 \x08");
                }
                Step::Continue
            }
            CTRL_C if pty => {
                self.line.clear();
                echo.extend_from_slice(b"^C\r\n");
                Step::Line
            }
            CTRL_D if pty && self.line.is_empty() => Step::Eof,
            b'\t' => self.push(byte, echo),
            b if b < 0x20 => Step::Continue,
            b => self.push(b, echo),
        }
    }

    fn push(&mut self, byte: u8, echo: &mut Vec<u8>) -> Step {
        if self.line.len() < MAX_LINE_LEN {
            self.line.push(byte);
            if self.mode == TerminalMode::Pty {
                echo.push(byte);
            }
        }
        Step::Continue
    }

    /// Remove the last UTF-8 character of the line.
    fn pop_char(&mut self) -> bool {
        let mut removed = false;
        while let Some(byte) = self.line.pop() {
            removed = true;
            // stop once a lead byte (not a continuation byte) is removed
            if byte & 0xc0 != 0x80 {
                break;
            }
        }
        removed
    }

    fn take_line(&mut self) -> String {
        let line = std::mem::take(&mut self.line);
        String::from_utf8_lossy(&line).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    async fn lines(mode: TerminalMode, input: &[u8]) -> Vec<String> {
        // the client half stays alive so PTY echo has somewhere to go
        let (mut client, mut server) = duplex(64 * 1024);
        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();

        let mut reader = LineReader::new(mode);
        let mut out = Vec::new();
        while let Ok(Some(line)) = reader.read_line(&mut server).await {
            out.push(line);
        }
        drop(client);
        out
    }

    #[tokio::test]
    async fn test_newline_framing() {
        assert_eq!(
            lines(TerminalMode::Line, b"whoami\nhelp\n").await,
            vec!["whoami", "help"]
        );
    }

    #[tokio::test]
    async fn test_crlf_is_one_terminator() {
        assert_eq!(
            lines(TerminalMode::Line, b"a\r\nb\r\n\r\n").await,
            vec!["a", "b", ""]
        );
    }

    #[tokio::test]
    async fn test_partial_last_line() {
        assert_eq!(
            lines(TerminalMode::Line, b"help\nwhoami").await,
            vec!["help", "whoami"]
        );
    }

    #[tokio::test]
    async fn test_escape_sequences_dropped() {
        assert_eq!(
            lines(TerminalMode::Line, b"who\x1b[Aami\x1bOB\n").await,
            vec!["whoami"]
        );
    }

    #[tokio::test]
    async fn test_osc_strings_dropped() {
        assert_eq!(
            lines(
                TerminalMode::Line,
                b"ls\x1b]0;title\x07\nwho\x1b]2;x\x1b\\ami\n\x1b]0;open\nhelp\n"
            )
            .await,
            vec!["ls", "whoami", "", "help"]
        );
    }

    #[tokio::test]
    async fn test_backspace_removes_utf8_char() {
        assert_eq!(
            lines(TerminalMode::Line, "abé\x7fc\n".as_bytes()).await,
            vec!["abc"]
        );
    }

    #[tokio::test]
    async fn test_overlong_line_truncated() {
        let mut input = vec![b'x'; MAX_LINE_LEN + 100];
        input.push(b'\n');
        let out = lines(TerminalMode::Line, &input).await;
        assert_eq!(out[0].len(), MAX_LINE_LEN);
    }

    #[tokio::test]
    async fn test_pty_echo() {
        let mut io = tokio_test::io::Builder::new()
            .read(b"hi\r")
            .write(b"hi\r\n")
            .build();

        let mut reader = LineReader::new(TerminalMode::Pty);
        let line = reader.read_line(&mut io).await.unwrap();
        assert_eq!(line.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_pty_ctrl_c_discards_line() {
        let out = lines(TerminalMode::Pty, b"whoa\x03help\r").await;
        assert_eq!(out, vec!["", "help"]);
    }

    #[tokio::test]
    async fn test_pty_ctrl_d_on_empty_line() {
        let out = lines(TerminalMode::Pty, b"help\r\x04whoami\r").await;
        assert_eq!(out, vec!["help"]);
    }

    #[tokio::test]
    async fn test_line_mode_ignores_ctrl_d() {
        let out = lines(TerminalMode::Line, b"he\x04lp\n").await;
        assert_eq!(out, vec!["help"]);
    }

    #[test]
    fn test_render_line_mode_verbatim() {
        let text = "a\nb\n";
        assert!(matches!(TerminalMode::Line.render(text), Cow::Borrowed(_)));
        assert_eq!(TerminalMode::Line.render(text), "a\nb\n");
    }

    #[test]
    fn test_render_pty_crlf() {
        assert_eq!(TerminalMode::Pty.render("a\nb\n"), "a\r\nb\r\n");
        assert_eq!(TerminalMode::Pty.render("a\r\nb"), "a\r\nb");
    }

    #[test]
    fn test_prompt() {
        assert_eq!(TerminalMode::Line.prompt(), None);
        assert_eq!(TerminalMode::Pty.prompt(), Some("$ "));
    }
}
