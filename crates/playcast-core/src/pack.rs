//! Message packing
//!
//! Serializes a word and its arguments into a single protocol line (without
//! the terminating newline). Arguments that would confuse the tokenizer are
//! single-quoted, with embedded single quotes written as `'\''`.

/// Pack a message word and its arguments into bytes ready for sending
///
/// The caller appends the `\n` terminator.
pub fn pack<S: AsRef<str>>(word: &str, args: &[S]) -> Vec<u8> {
    let mut packed = String::from(word);
    for arg in args {
        let arg = arg.as_ref();
        packed.push(' ');
        if needs_escape(arg) {
            packed.push_str(&escape(arg));
        } else {
            packed.push_str(arg);
        }
    }
    packed.into_bytes()
}

/// Whether an argument contains ASCII whitespace, a quote, or a backslash
fn needs_escape(arg: &str) -> bool {
    arg.bytes()
        .any(|b| matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r' | b'\'' | b'"' | b'\\'))
}

fn escape(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}
