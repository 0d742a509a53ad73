//! Spoken Korean numbers to digits.

/// Korean number words and their digits. Substitution happens in this order,
/// so earlier entries win when words overlap ("일곱" inside a sentence becomes
/// "1곱" before "일곱" is considered).
const TOKENS: &[(&str, &str)] = &[
    ("영", "0"),
    ("공", "0"),
    ("일", "1"),
    ("하나", "1"),
    ("이", "2"),
    ("둘", "2"),
    ("삼", "3"),
    ("셋", "3"),
    ("사", "4"),
    ("넷", "4"),
    ("오", "5"),
    ("다섯", "5"),
    ("육", "6"),
    ("여섯", "6"),
    ("칠", "7"),
    ("일곱", "7"),
    ("팔", "8"),
    ("여덟", "8"),
    ("구", "9"),
    ("아홉", "9"),
    ("십", "10"),
    ("열", "10"),
];

/// Convert a transcript into a string of ASCII digits.
///
/// An exact (trimmed) match against a number word wins outright. Otherwise
/// every number word is replaced by its digits and everything that is not a
/// digit is dropped. The result may be empty or longer than one digit; range
/// checking is up to the caller.
pub fn normalize(text: &str) -> String {
    let trimmed = text.trim();
    if let Some((_, digits)) = TOKENS.iter().find(|(word, _)| *word == trimmed) {
        return (*digits).to_string();
    }

    let replaced = TOKENS
        .iter()
        .fold(text.to_string(), |acc, (word, digits)| acc.replace(word, digits));

    replaced.chars().filter(char::is_ascii_digit).collect()
}
