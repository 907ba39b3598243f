//! Local fallback syntax check: bracket balance outside strings and comments.
//!
//! This is a weak approximation used only when the target's own checker is
//! missing. It knows just enough lexical structure to avoid counting
//! brackets inside literals and comments.

/// Bracket-balance scanner for `#`-comment languages.
#[derive(Debug, Clone, Copy)]
pub struct BasicScanner {
    /// Perl: `=pod` ... `=cut` blocks and `$#array`.
    perl: bool,
    /// Ruby: `=begin` ... `=end` blocks.
    ruby: bool,
}

impl BasicScanner {
    pub fn perl() -> Self {
        Self {
            perl: true,
            ruby: false,
        }
    }

    pub fn ruby() -> Self {
        Self {
            perl: false,
            ruby: true,
        }
    }

    /// Scanner for `language`; unknown languages get plain `#` comments.
    pub fn for_language(language: &str) -> Self {
        match language {
            "perl" => Self::perl(),
            "ruby" => Self::ruby(),
            _ => Self {
                perl: false,
                ruby: false,
            },
        }
    }

    /// Problems found in `code`; empty when balanced.
    pub fn scan(&self, code: &str) -> Vec<String> {
        let mut errors = Vec::new();
        let mut stack: Vec<(char, usize)> = Vec::new();
        let mut in_doc_block = false;

        for (idx, raw_line) in code.lines().enumerate() {
            let line_no = idx + 1;
            if in_doc_block {
                if (self.perl && raw_line.starts_with("=cut"))
                    || (self.ruby && raw_line.starts_with("=end"))
                {
                    in_doc_block = false;
                }
                continue;
            }
            if self.perl && raw_line.starts_with("__END__") {
                break;
            }
            if (self.perl && is_pod_start(raw_line)) || (self.ruby && raw_line.starts_with("=begin"))
            {
                in_doc_block = true;
                continue;
            }

            let chars: Vec<char> = raw_line.chars().collect();
            let mut i = 0;
            while i < chars.len() {
                let c = chars[i];
                match c {
                    '#' => {
                        // `$#array` / `$#{...}` in Perl is not a comment.
                        if self.perl && i > 0 && chars[i - 1] == '$' {
                            i += 1;
                            continue;
                        }
                        break;
                    }
                    '\'' | '"' => match skip_string(&chars, i) {
                        Some(end) => i = end,
                        None => {
                            errors.push(format!("line {line_no}: unterminated string"));
                            break;
                        }
                    },
                    // Escaped delimiters in regex bodies (`qr{\{}`).
                    '\\' => i += 1,
                    '(' | '[' | '{' => stack.push((c, line_no)),
                    ')' | ']' | '}' => match stack.pop() {
                        Some((open, _)) if closes(open) == c => {}
                        Some((open, open_line)) => errors.push(format!(
                            "line {line_no}: '{c}' does not match '{open}' opened at line {open_line}"
                        )),
                        None => errors.push(format!("line {line_no}: unexpected '{c}'")),
                    },
                    _ => {}
                }
                i += 1;
            }
        }

        for (open, line) in stack {
            errors.push(format!("line {line}: unclosed '{open}'"));
        }
        errors
    }
}

fn is_pod_start(line: &str) -> bool {
    line.starts_with('=')
        && line[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
}

fn closes(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Index of the closing quote of the string starting at `start`, which
/// must end on the same line.
fn skip_string(chars: &[char], start: usize) -> Option<usize> {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_perl() {
        let code = "sub f {\n    my ($a) = @_;\n    return [map { $_ * 2 } @{$a}];\n}\n";
        assert!(BasicScanner::perl().scan(code).is_empty());
    }

    #[test]
    fn test_brackets_in_strings_and_comments_ignored() {
        let code = "my $s = '({[';\nmy $t = \"\\\")\"; # )))\n";
        assert!(BasicScanner::perl().scan(code).is_empty());
    }

    #[test]
    fn test_last_index_is_not_a_comment() {
        let code = "for my $i (0 .. $#{$a}) {\n}\n";
        assert!(BasicScanner::perl().scan(code).is_empty());
    }

    #[test]
    fn test_reports_unclosed_and_mismatched() {
        let errors = BasicScanner::perl().scan("sub f {\n    (1, 2];\n");
        assert_eq!(
            errors,
            vec![
                "line 2: ']' does not match '(' opened at line 2",
                "line 1: unclosed '{'",
            ]
        );
        assert_eq!(
            BasicScanner::ruby().scan("x = 1)\n"),
            vec!["line 1: unexpected ')'"]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let errors = BasicScanner::ruby().scan("puts 'oops\n");
        assert_eq!(errors, vec!["line 1: unterminated string"]);
    }

    #[test]
    fn test_doc_blocks_skipped() {
        let perl = "=pod\n\n( unbalanced\n\n=cut\n\nmy $x = 1;\n";
        assert!(BasicScanner::perl().scan(perl).is_empty());
        let ruby = "=begin\n{ nope\n=end\nx = [1]\n";
        assert!(BasicScanner::ruby().scan(ruby).is_empty());
    }
}
