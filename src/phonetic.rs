//! Soundex-style phonetic codes for "did you mean" suggestions.
//!
//! Best-effort only: short names collide easily. Suggestions built on these
//! codes are always sorted so output stays deterministic.

/// Digits kept after the leading letter.
const CODE_DIGITS: usize = 3;

/// Soundex digit for an uppercase ASCII letter. Vowels and `H`, `W`, `Y`
/// have no digit but still separate runs of equal digits.
const fn digit_for(letter: char) -> Option<char> {
    return match letter {
        'B' | 'F' | 'P' | 'V' => Some('1'),
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
        'D' | 'T' => Some('3'),
        'L' => Some('4'),
        'M' | 'N' => Some('5'),
        'R' => Some('6'),
        _ => None,
    };
}

/// Compute the phonetic code of an identifier: its first letter followed by
/// three digits, zero-padded. Non-letters are ignored, so `UIKit2` and
/// `UIKit` share a code. Returns an empty string if there are no letters.
pub fn soundex(input: &str) -> String {
    let letters: Vec<char> = input
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| return c.to_ascii_uppercase())
        .collect();

    let Some(&first) = letters.first() else {
        return String::new();
    };

    let mut code = String::with_capacity(CODE_DIGITS.saturating_add(1));
    code.push(first);

    let mut digits = 0_usize;
    let mut previous = digit_for(first);
    for &letter in letters.iter().skip(1) {
        if digits == CODE_DIGITS {
            break;
        }
        let current = digit_for(letter);
        if let Some(digit) = current.filter(|_| return current != previous) {
            code.push(digit);
            digits = digits.saturating_add(1);
        }
        previous = current;
    }

    for _ in digits..CODE_DIGITS {
        code.push('0');
    }
    return code;
}

/// Whether two identifiers share a phonetic code.
pub fn sounds_like(a: &str, b: &str) -> bool {
    let code = soundex(a);
    return !code.is_empty() && code == soundex(b);
}

/// All candidates that sound like `name`, sorted lexically and deduplicated.
pub fn matches<'a, I>(name: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut found: Vec<String> = candidates
        .into_iter()
        .filter(|c| return sounds_like(name, c))
        .map(String::from)
        .collect();
    found.sort();
    found.dedup();
    return found;
}
