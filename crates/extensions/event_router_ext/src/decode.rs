use serde_json::Value;
use std::ops::Range;

/// Decodes a stream of concatenated JSON values, as the chunks of the stream are received.
///
/// The values can be of any JSON type, separated by whitespace or simply adjacent:
/// `{"a":1}{"b":2}`, `1true` and `nulltrue` are sequences of two values.
/// A value ends as soon as it is complete, so in `2x` the number `2` is decoded before `x` is rejected.
/// No enclosing array is expected.
///
/// Each byte is scanned once, whatever the number of chunks a value is split into,
/// and each complete value is parsed once.
#[derive(Debug, Default)]
pub struct JsonStreamDecoder {
    buffer: Vec<u8>,
    /// Next byte to be scanned
    cursor: usize,
    /// Start and state of the value being scanned
    current: Option<(usize, Token)>,
}

#[derive(Debug, Clone, Copy)]
enum Token {
    Container {
        depth: usize,
        in_string: bool,
        escaped: bool,
    },
    String {
        escaped: bool,
    },
    Number {
        last: u8,
    },
    Literal {
        remaining: usize,
    },
}

enum Step {
    Continue,
    /// The value ends with this byte
    Complete,
    /// The value ended with the previous byte
    CompleteBefore,
}

impl Token {
    /// None if the byte cannot start a value
    fn start(byte: u8) -> Option<Token> {
        match byte {
            b'{' | b'[' => Some(Token::Container {
                depth: 1,
                in_string: false,
                escaped: false,
            }),
            b'"' => Some(Token::String { escaped: false }),
            b'-' | b'0'..=b'9' => Some(Token::Number { last: byte }),
            b't' | b'n' => Some(Token::Literal { remaining: 3 }),
            b'f' => Some(Token::Literal { remaining: 4 }),
            _ => None,
        }
    }

    fn step(&mut self, byte: u8) -> Step {
        match self {
            Token::Container {
                depth,
                in_string,
                escaped,
            } => {
                if *in_string {
                    if *escaped {
                        *escaped = false;
                    } else if byte == b'\\' {
                        *escaped = true;
                    } else if byte == b'"' {
                        *in_string = false;
                    }
                    return Step::Continue;
                }
                match byte {
                    b'"' => *in_string = true,
                    b'{' | b'[' => *depth += 1,
                    b'}' | b']' => {
                        *depth -= 1;
                        if *depth == 0 {
                            return Step::Complete;
                        }
                    }
                    _ => {}
                }
                Step::Continue
            }
            Token::String { escaped } => {
                if *escaped {
                    *escaped = false;
                } else if byte == b'\\' {
                    *escaped = true;
                } else if byte == b'"' {
                    return Step::Complete;
                }
                Step::Continue
            }
            Token::Number { last } => {
                let exponent_sign = matches!(byte, b'+' | b'-') && matches!(*last, b'e' | b'E');
                if byte.is_ascii_digit() || matches!(byte, b'.' | b'e' | b'E') || exponent_sign {
                    *last = byte;
                    Step::Continue
                } else {
                    Step::CompleteBefore
                }
            }
            Token::Literal { remaining } => {
                *remaining -= 1;
                if *remaining == 0 {
                    Step::Complete
                } else {
                    Step::Continue
                }
            }
        }
    }
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

impl JsonStreamDecoder {
    /// Decode the values completed by this chunk, appending them to `rows`.
    ///
    /// On error, `rows` still receives the values decoded before the faulty one.
    pub fn decode(&mut self, chunk: &[u8], rows: &mut Vec<Value>) -> Result<(), serde_json::Error> {
        self.buffer.extend_from_slice(chunk);
        self.decode_buffer(false, rows)
    }

    /// Decode the remaining values, once the end of the stream has been reached.
    ///
    /// A value still incomplete is an error.
    pub fn finish(&mut self, rows: &mut Vec<Value>) -> Result<(), serde_json::Error> {
        self.decode_buffer(true, rows)
    }

    fn decode_buffer(
        &mut self,
        end_of_stream: bool,
        rows: &mut Vec<Value>,
    ) -> Result<(), serde_json::Error> {
        let result = loop {
            let Some(range) = self.next_value(end_of_stream) else {
                break Ok(());
            };
            match serde_json::from_slice(&self.buffer[range]) {
                Ok(value) => rows.push(value),
                Err(err) => break Err(err),
            }
        };

        self.discard_decoded();
        result
    }

    /// Scan the buffer up to the end of the next value.
    ///
    /// Return None when more input is needed. A byte that cannot start a value
    /// is returned alone, so the parser reports it.
    fn next_value(&mut self, end_of_stream: bool) -> Option<Range<usize>> {
        while self.cursor < self.buffer.len() {
            let position = self.cursor;
            let byte = self.buffer[position];
            self.cursor += 1;

            match &mut self.current {
                None if is_whitespace(byte) => {}
                None => match Token::start(byte) {
                    Some(token) => self.current = Some((position, token)),
                    None => return Some(position..self.cursor),
                },
                Some((start, token)) => match token.step(byte) {
                    Step::Continue => {}
                    Step::Complete => {
                        let start = *start;
                        self.current = None;
                        return Some(start..self.cursor);
                    }
                    Step::CompleteBefore => {
                        let start = *start;
                        self.current = None;
                        self.cursor = position;
                        return Some(start..position);
                    }
                },
            }
        }

        // A number might go on in the next chunk
        if end_of_stream {
            let end = self.buffer.len();
            self.current.take().map(|(start, _)| start..end)
        } else {
            None
        }
    }

    fn discard_decoded(&mut self) {
        let decoded = match &self.current {
            Some((start, _)) => *start,
            None => self.cursor,
        };
        if decoded > 0 {
            self.buffer.drain(..decoded);
            self.cursor -= decoded;
            if let Some((start, _)) = &mut self.current {
                *start -= decoded;
            }
        }
    }
}
