/// Delimiter the shell splits input lines on.
pub const DELIMITER: char = ' ';

/// Splits `line` on `delimiter`, dropping the empty tokens produced by runs of
/// consecutive delimiters.
pub fn tokenize(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter)
        .filter(|token| !token.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
