//! Echo wire protocol.
//!
//! There is no framing: every read hands over an arbitrary chunk of raw
//! bytes, and every chunk is answered on its own.
//!
//! ```text
//! Request:  hello
//! Response: server says: hello
//!
//! Request:  QUIT\r\n
//! Response: Client quitting:
//! ```
//!
//! A chunk whose trailing-whitespace-trimmed form equals `quit` (any case)
//! ends the session. Idle clients receive the timeout notice before the
//! connection is closed.

use bytes::BytesMut;

/// Prefix of every echoed chunk.
pub const ECHO_PREFIX: &[u8] = b"server says: ";

/// Sent when the client asks to quit.
pub const QUIT_NOTICE: &[u8] = b"Client quitting: ";

/// Sent when the client stays silent past the idle timeout.
pub const TIMEOUT_NOTICE: &[u8] = b"Client timed out: ";

const QUIT: &[u8] = b"quit";

/// Meaning of one received chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Echo the chunk back verbatim.
    Echo(&'a [u8]),
    /// Close the session.
    Quit,
}

/// Classify a non-empty chunk read from the client.
pub fn parse(chunk: &[u8]) -> Command<'_> {
    if trim_end(chunk).eq_ignore_ascii_case(QUIT) {
        Command::Quit
    } else {
        Command::Echo(chunk)
    }
}

/// Build the echo response for a chunk.
pub fn echo_response(chunk: &[u8]) -> BytesMut {
    let mut response = BytesMut::with_capacity(ECHO_PREFIX.len() + chunk.len());
    response.extend_from_slice(ECHO_PREFIX);
    response.extend_from_slice(chunk);
    response
}

/// Strip trailing whitespace (space, tab, CR, LF, vertical tab, form feed).
fn trim_end(input: &[u8]) -> &[u8] {
    let end = input
        .iter()
        .rposition(|b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n' | 0x0b | 0x0c))
        .map_or(0, |pos| pos + 1);
    &input[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quit_variants() {
        let inputs: [&[u8]; 5] = [b"quit", b"QUIT\r\n", b"Quit ", b"qUiT\n\t", b"quit\x0b\x0c"];
        for input in inputs {
            assert_eq!(parse(input), Command::Quit, "input {:?}", input);
        }
    }

    #[test]
    fn test_leading_whitespace_is_not_quit() {
        assert_eq!(parse(b" quit"), Command::Echo(b" quit"));
    }

    #[test]
    fn test_parse_echo() {
        assert_eq!(parse(b"hello"), Command::Echo(b"hello"));
        assert_eq!(parse(b"quitter\r\n"), Command::Echo(b"quitter\r\n"));
        assert_eq!(parse(b"quit now"), Command::Echo(b"quit now"));
    }

    #[test]
    fn test_whitespace_only_is_echoed() {
        assert_eq!(parse(b"\r\n"), Command::Echo(b"\r\n"));
    }

    #[test]
    fn test_echo_response_is_verbatim() {
        let response = echo_response(b"hello\r\n");
        assert_eq!(&response[..], b"server says: hello\r\n");

        let binary = [0u8, 0xff, b'\n', 0x80];
        let response = echo_response(&binary);
        assert_eq!(&response[..ECHO_PREFIX.len()], ECHO_PREFIX);
        assert_eq!(&response[ECHO_PREFIX.len()..], &binary);
    }

    #[test]
    fn test_trim_end() {
        assert_eq!(trim_end(b"abc \r\n"), b"abc");
        assert_eq!(trim_end(b"   "), b"");
        assert_eq!(trim_end(b""), b"");
        assert_eq!(trim_end(b" a"), b" a");
    }
}
