//! Command-line text handling for the fallback file.
//!
//! Launchers that cannot pass argv through write the raw command line as wide
//! text. This module turns those bytes back into an argument list using the
//! Windows `CommandLineToArgvW` splitting rules.

use crate::{RelayError, Result};

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];
const UTF16_BE_BOM: [u8; 2] = [0xFE, 0xFF];

/// Decode the fallback file contents.
///
/// The file is UTF-16LE unless it starts with a byte-order mark selecting
/// UTF-16BE or UTF-8.
pub fn decode_cmdline_text(bytes: &[u8]) -> Result<String> {
    if let Some(rest) = bytes.strip_prefix(&UTF8_BOM) {
        return String::from_utf8(rest.to_vec()).map_err(|e| RelayError::Decode {
            message: format!("Invalid UTF-8 command line: {}", e),
        });
    }

    let (rest, big_endian) = if let Some(rest) = bytes.strip_prefix(&UTF16_LE_BOM) {
        (rest, false)
    } else if let Some(rest) = bytes.strip_prefix(&UTF16_BE_BOM) {
        (rest, true)
    } else {
        (bytes, false)
    };

    if rest.len() % 2 != 0 {
        return Err(RelayError::Decode {
            message: format!("UTF-16 command line has odd byte length {}", rest.len()),
        });
    }

    let units: Vec<u16> = rest
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();

    String::from_utf16(&units).map_err(|e| RelayError::Decode {
        message: format!("Invalid UTF-16 command line: {}", e),
    })
}

fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Split a raw command line into arguments.
///
/// Follows `CommandLineToArgvW`:
/// - The program name ends at the first unquoted whitespace; quotes only toggle.
/// - `2n` backslashes before `"` produce `n` backslashes and toggle quoting.
/// - `2n + 1` backslashes before `"` produce `n` backslashes and a literal `"`.
/// - `""` inside a quoted run produces a literal `"`.
/// - Backslashes not followed by `"` are literal.
///
/// Line breaks count as whitespace so a trailing newline in the file is harmless.
pub fn split_command_line(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut args = Vec::new();
    let mut i = 0;

    while i < chars.len() && is_separator(chars[i]) {
        i += 1;
    }
    if i == chars.len() {
        return args;
    }

    // Program name
    let mut program = String::new();
    let mut in_quotes = false;
    while i < chars.len() {
        let c = chars[i];
        if c == '"' {
            in_quotes = !in_quotes;
        } else if is_separator(c) && !in_quotes {
            break;
        } else {
            program.push(c);
        }
        i += 1;
    }
    args.push(program);

    loop {
        while i < chars.len() && is_separator(chars[i]) {
            i += 1;
        }
        if i == chars.len() {
            break;
        }

        let mut arg = String::new();
        let mut in_quotes = false;
        while i < chars.len() {
            let c = chars[i];
            if c == '\\' {
                let start = i;
                while i < chars.len() && chars[i] == '\\' {
                    i += 1;
                }
                let count = i - start;
                if i < chars.len() && chars[i] == '"' {
                    arg.extend(std::iter::repeat('\\').take(count / 2));
                    if count % 2 == 1 {
                        arg.push('"');
                        i += 1;
                    }
                    // Even count: the quote is handled on the next pass
                } else {
                    arg.extend(std::iter::repeat('\\').take(count));
                }
                continue;
            }

            if c == '"' {
                if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                    arg.push('"');
                    i += 2;
                    continue;
                }
                in_quotes = !in_quotes;
            } else if is_separator(c) && !in_quotes {
                break;
            } else {
                arg.push(c);
            }
            i += 1;
        }
        args.push(arg);
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn test_split_simple() {
        assert_eq!(split_command_line("app.exe --x"), vec!["app.exe", "--x"]);
    }

    #[test]
    fn test_split_empty_and_blank() {
        assert!(split_command_line("").is_empty());
        assert!(split_command_line("  \t \r\n").is_empty());
    }

    #[test]
    fn test_split_quoted_program_with_spaces() {
        assert_eq!(
            split_command_line(r#""C:\Program Files\App\app.exe" open "my file.txt""#),
            vec![r"C:\Program Files\App\app.exe", "open", "my file.txt"]
        );
    }

    #[test]
    fn test_split_program_name_keeps_backslashes() {
        assert_eq!(
            split_command_line(r#"C:\dir\"x y"\app.exe a"#),
            vec![r"C:\dir\x y\app.exe", "a"]
        );
    }

    #[test]
    fn test_split_backslash_rules() {
        // 2n backslashes + quote: n backslashes, quote toggles
        assert_eq!(split_command_line(r#"app a\\"b c""#), vec!["app", r"a\b c"]);
        // 2n+1 backslashes + quote: n backslashes, literal quote
        assert_eq!(split_command_line(r#"app a\\\"b"#), vec!["app", r#"a\"b"#]);
        // backslashes without a quote are literal
        assert_eq!(split_command_line(r"app a\\b\c"), vec!["app", r"a\\b\c"]);
    }

    #[test]
    fn test_split_doubled_quote_inside_quotes() {
        assert_eq!(
            split_command_line(r#"app "say ""hi"" now""#),
            vec!["app", r#"say "hi" now"#]
        );
    }

    #[test]
    fn test_split_empty_quoted_argument() {
        assert_eq!(split_command_line(r#"app "" b"#), vec!["app", "", "b"]);
    }

    #[test]
    fn test_split_collapses_whitespace_and_trailing_newline() {
        assert_eq!(
            split_command_line("app   -a\t-b\r\n"),
            vec!["app", "-a", "-b"]
        );
    }

    #[test]
    fn test_decode_utf16le_without_bom() {
        assert_eq!(decode_cmdline_text(&utf16le("app.exe --x")).unwrap(), "app.exe --x");
    }

    #[test]
    fn test_decode_utf16le_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(utf16le("ünï"));
        assert_eq!(decode_cmdline_text(&bytes).unwrap(), "ünï");
    }

    #[test]
    fn test_decode_utf16be_with_bom() {
        let mut bytes = vec![0xFE, 0xFF];
        bytes.extend("go".encode_utf16().flat_map(|u| u.to_be_bytes()));
        assert_eq!(decode_cmdline_text(&bytes).unwrap(), "go");
    }

    #[test]
    fn test_decode_utf8_with_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("app --y".as_bytes());
        assert_eq!(decode_cmdline_text(&bytes).unwrap(), "app --y");
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        assert!(decode_cmdline_text(&[0x61, 0x00, 0x62]).is_err());
    }

    #[test]
    fn test_decode_rejects_lone_surrogate() {
        assert!(decode_cmdline_text(&[0x00, 0xD8]).is_err());
    }
}
