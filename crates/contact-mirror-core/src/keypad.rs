//! Keypad grouping.
//!
//! Maps a display name to one of eleven fixed buckets that follow the letter
//! layout of a phone keypad. The key is derived from the first character of
//! the trimmed display name on every read and is never stored, so renames
//! and rule changes need no backfill.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One of the eleven keypad buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKey {
    One,
    Abc,
    Def,
    Ghi,
    Jkl,
    Mno,
    Pqrs,
    Tuv,
    Wxyz,
    Zero,
    /// Empty names and names starting outside `A–Z`/`0–9`.
    Other,
}

impl GroupKey {
    /// All keys in keypad order: `1`, `2ABC` … `9WXYZ`, `0`, `#`.
    pub const ALL: [GroupKey; 11] = [
        GroupKey::One,
        GroupKey::Abc,
        GroupKey::Def,
        GroupKey::Ghi,
        GroupKey::Jkl,
        GroupKey::Mno,
        GroupKey::Pqrs,
        GroupKey::Tuv,
        GroupKey::Wxyz,
        GroupKey::Zero,
        GroupKey::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKey::One => "1",
            GroupKey::Abc => "2ABC",
            GroupKey::Def => "3DEF",
            GroupKey::Ghi => "4GHI",
            GroupKey::Jkl => "5JKL",
            GroupKey::Mno => "6MNO",
            GroupKey::Pqrs => "7PQRS",
            GroupKey::Tuv => "8TUV",
            GroupKey::Wxyz => "9WXYZ",
            GroupKey::Zero => "0",
            GroupKey::Other => "#",
        }
    }

    fn of_char(c: char) -> GroupKey {
        match c.to_ascii_uppercase() {
            '1' => GroupKey::One,
            '2' | 'A'..='C' => GroupKey::Abc,
            '3' | 'D'..='F' => GroupKey::Def,
            '4' | 'G'..='I' => GroupKey::Ghi,
            '5' | 'J'..='L' => GroupKey::Jkl,
            '6' | 'M'..='O' => GroupKey::Mno,
            '7' | 'P'..='S' => GroupKey::Pqrs,
            '8' | 'T'..='V' => GroupKey::Tuv,
            '9' | 'W'..='Z' => GroupKey::Wxyz,
            '0' => GroupKey::Zero,
            _ => GroupKey::Other,
        }
    }
}

/// Compute the keypad group of a display name.
///
/// Total: every input maps to exactly one key.
pub fn group_of(display_name: &str) -> GroupKey {
    display_name
        .trim_start()
        .chars()
        .next()
        .map(GroupKey::of_char)
        .unwrap_or(GroupKey::Other)
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for GroupKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for GroupKey {
    type Err = anyhow::Error;

    /// Accepts the label (`"2abc"`), the bare digit (`"2"`), and `#`, `*`
    /// or `other` for the catch-all.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "#" | "*" => return Ok(GroupKey::Other),
            _ if s.eq_ignore_ascii_case("other") => return Ok(GroupKey::Other),
            _ => {}
        }
        GroupKey::ALL
            .iter()
            .find(|k| {
                k.as_str().eq_ignore_ascii_case(s)
                    || (s.len() == 1 && **k != GroupKey::Other && k.as_str().starts_with(s))
            })
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown keypad group: '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_follow_keypad() {
        assert_eq!(group_of("Alice"), GroupKey::Abc);
        assert_eq!(group_of("dave"), GroupKey::Def);
        assert_eq!(group_of("Quentin"), GroupKey::Pqrs);
        assert_eq!(group_of("Sam"), GroupKey::Pqrs);
        assert_eq!(group_of("Zoe"), GroupKey::Wxyz);
        assert_eq!(group_of("victor"), GroupKey::Tuv);
    }

    #[test]
    fn test_digits_map_to_their_key() {
        assert_eq!(group_of("3M Corp"), GroupKey::Def);
        assert_eq!(group_of("1-800 Flowers"), GroupKey::One);
        assert_eq!(group_of("0800 Hotline"), GroupKey::Zero);
        assert_eq!(group_of("911"), GroupKey::Wxyz);
    }

    #[test]
    fn test_leading_whitespace_is_trimmed() {
        assert_eq!(group_of("   bob"), GroupKey::Abc);
        assert_eq!(group_of("\tmary"), GroupKey::Mno);
    }

    #[test]
    fn test_catch_all() {
        assert_eq!(group_of(""), GroupKey::Other);
        assert_eq!(group_of("    "), GroupKey::Other);
        assert_eq!(group_of("Émile"), GroupKey::Other);
        assert_eq!(group_of("(Office)"), GroupKey::Other);
        assert_eq!(group_of("日本"), GroupKey::Other);
    }

    #[test]
    fn test_grouping_is_total() {
        let names = ["", "a", "Z", "5", "?", "ñandú", "  7up", "\u{1F600} smile", "O'Brien"];
        for name in names {
            assert!(GroupKey::ALL.contains(&group_of(name)), "no key for {:?}", name);
        }
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!("2ABC".parse::<GroupKey>().unwrap(), GroupKey::Abc);
        assert_eq!("7pqrs".parse::<GroupKey>().unwrap(), GroupKey::Pqrs);
        assert_eq!("9".parse::<GroupKey>().unwrap(), GroupKey::Wxyz);
        assert_eq!("1".parse::<GroupKey>().unwrap(), GroupKey::One);
        assert_eq!("0".parse::<GroupKey>().unwrap(), GroupKey::Zero);
        assert_eq!("#".parse::<GroupKey>().unwrap(), GroupKey::Other);
        assert_eq!("*".parse::<GroupKey>().unwrap(), GroupKey::Other);
        assert_eq!("other".parse::<GroupKey>().unwrap(), GroupKey::Other);
        assert!("10".parse::<GroupKey>().is_err());
        assert!("abc".parse::<GroupKey>().is_err());
    }

    #[test]
    fn test_all_has_eleven_distinct_keys() {
        let mut labels: Vec<&str> = GroupKey::ALL.iter().map(|k| k.as_str()).collect();
        labels.dedup();
        assert_eq!(labels.len(), 11);
    }
}
