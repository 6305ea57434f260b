//! Phone number normalization.
//!
//! [`normalize`] turns a raw phone string into a comparable form (digits with
//! an optional leading `+`) and a grouped display form. It is total: input it
//! cannot format is reduced to its digits, and input without digits keeps its
//! trimmed raw text as the display form.
//!
//! | Digits | Display |
//! |--------|---------|
//! | 10, no `+` | `(555) 123-4567` |
//! | 11 starting with `1`, or `+1` + 10 | `+1 (555) 123-4567` |
//! | 7, no `+` | `123-4567` |
//! | other `+` numbers | `+442 079 460 958` (groups of 3, last group holds 2–4 digits) |
//! | anything else | digits as-is |

/// Canonical and display forms of a phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPhone {
    pub normalized: String,
    pub display: String,
}

/// Normalize a raw phone string.
pub fn normalize(raw: &str) -> NormalizedPhone {
    let trimmed = raw.trim();
    let plus = trimmed.starts_with('+');
    let digits = digits_of(trimmed);

    if digits.is_empty() {
        return NormalizedPhone {
            normalized: String::new(),
            display: trimmed.to_string(),
        };
    }

    let normalized = if plus {
        format!("+{}", digits)
    } else {
        digits.clone()
    };

    NormalizedPhone {
        normalized,
        display: display_form(&digits, plus),
    }
}

/// Extract the ASCII digits of `s`, dropping everything else.
pub fn digits_of(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn display_form(digits: &str, plus: bool) -> String {
    match (digits.len(), plus) {
        (10, false) => nanp(digits),
        (11, _) if digits.starts_with('1') => format!("+1 {}", nanp(&digits[1..])),
        (7, false) => format!("{}-{}", &digits[..3], &digits[3..]),
        (_, true) => format!("+{}", grouped(digits)),
        _ => digits.to_string(),
    }
}

fn nanp(ten: &str) -> String {
    format!("({}) {}-{}", &ten[..3], &ten[3..6], &ten[6..])
}

/// Groups of three, with the final group holding the last two to four digits.
fn grouped(digits: &str) -> String {
    let mut groups: Vec<&str> = Vec::new();
    let mut rest = digits;
    while rest.len() > 4 {
        let (head, tail) = rest.split_at(3);
        groups.push(head);
        rest = tail;
    }
    groups.push(rest);
    groups.join(" ")
}
