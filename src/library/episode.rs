//! Episode numbers: a numeric sort key derived from a track title.
//!
//! Audiobook chapters are named inconsistently ("第3集", "Chapter 7",
//! "三十五", "Book II 12"), so the catalog stores `part * 10000 + episode`
//! and sorts on that. Parts come from "第N部/季/卷/册" markers or a Roman
//! numeral; episodes from "第N集/章/节/话/回" markers, else the first Arabic
//! number, else the first Chinese numeral.

const PART_MARKERS: &[char] = &['部', '季', '卷', '册'];
const EPISODE_MARKERS: &[char] = &['集', '章', '节', '话', '回'];

const PART_NUMERALS: &str = "一二三四五六七八九十百";
const EPISODE_NUMERALS: &str = "一二三四五六七八九十百千万两";
const BARE_NUMERALS: &str = "一二三四五六七八九十百千万";

const ASCII_ROMAN: &[&str] = &["I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X"];

/// Derive the sort key for a title.
pub fn extract_episode_number(title: &str) -> i64 {
    let mut part = roman_part(title).unwrap_or(0);

    let part_marker = find_marker(title, PART_NUMERALS, PART_MARKERS);
    if let Some(marker) = &part_marker {
        part = numeral_value(marker.value);
    }

    // A digit part number would otherwise be read as the episode
    let search = match &part_marker {
        Some(marker) if is_digits(marker.value) => title.replacen(marker.matched, "", 1),
        _ => title.to_string(),
    };

    let episode = if let Some(marker) = find_marker(&search, EPISODE_NUMERALS, EPISODE_MARKERS) {
        numeral_value(marker.value)
    } else if let Some(digits) = first_digit_run(&search, 4) {
        parse_digits(digits)
    } else if let Some(run) = first_run_of(&search, BARE_NUMERALS) {
        chinese_to_number(run)
    } else {
        0
    };

    part.saturating_mul(10_000).saturating_add(episode)
}

/// Read a Chinese numeral, right to left.
///
/// Digits accumulate at the current unit. A unit larger than any seen so
/// far replaces the multiplier; a smaller one multiplies it ("二十万" is
/// 200000). Consequently a leading bare "十" contributes nothing: "十五"
/// reads as 5 and "十" as 0. Unknown characters are ignored.
pub fn chinese_to_number(chinese: &str) -> i64 {
    let mut num: i64 = 0;
    let mut unit: i64 = 1;
    let mut last_unit: i64 = 1;

    for c in chinese.chars().rev() {
        let Some(value) = numeral(c) else {
            continue;
        };
        if value >= 10 {
            if value > last_unit {
                last_unit = value;
                unit = value;
            } else {
                unit = unit.saturating_mul(value);
            }
        } else {
            num = num.saturating_add(value.saturating_mul(unit));
        }
    }

    num
}

fn numeral(c: char) -> Option<i64> {
    Some(match c {
        '零' | '〇' => 0,
        '一' => 1,
        '二' | '两' => 2,
        '三' => 3,
        '四' => 4,
        '五' => 5,
        '六' => 6,
        '七' => 7,
        '八' => 8,
        '九' => 9,
        '十' => 10,
        '百' => 100,
        '千' => 1000,
        '万' => 10_000,
        _ => return None,
    })
}

struct Marker<'a> {
    /// Whole "第 N 部" span
    matched: &'a str,
    /// The N
    value: &'a str,
}

/// Leftmost `第 <numeral> <marker>` with optional whitespace around the
/// numeral.
fn find_marker<'a>(title: &'a str, numerals: &str, markers: &[char]) -> Option<Marker<'a>> {
    for (start, c) in title.char_indices() {
        if c != '第' {
            continue;
        }

        let after = title[start + c.len_utf8()..].trim_start();
        let value_len: usize = after
            .chars()
            .take_while(|ch| ch.is_ascii_digit() || numerals.contains(*ch))
            .map(char::len_utf8)
            .sum();
        if value_len == 0 {
            continue;
        }

        let tail = after[value_len..].trim_start();
        if let Some(m) = tail.chars().next()
            && markers.contains(&m)
        {
            let end = title.len() - tail.len() + m.len_utf8();
            return Some(Marker {
                matched: &title[start..end],
                value: &after[..value_len],
            });
        }
    }
    None
}

/// Leftmost Roman numeral part indicator.
///
/// Either a single Unicode numeral (Ⅰ-Ⅹ, any case) anywhere, or an ASCII
/// numeral I-X with whitespace on both sides.
fn roman_part(title: &str) -> Option<i64> {
    let chars: Vec<char> = title.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        let upper = c.to_uppercase().next().unwrap_or(c);
        if ('\u{2160}'..='\u{2169}').contains(&upper) {
            return Some(i64::from(u32::from(upper) - 0x2160 + 1));
        }

        if !is_separator(c) {
            continue;
        }
        let token: String = chars[i + 1..]
            .iter()
            .take_while(|ch| matches!(ch.to_ascii_uppercase(), 'I' | 'V' | 'X'))
            .map(|ch| ch.to_ascii_uppercase())
            .collect();
        let followed_by_separator = chars
            .get(i + 1 + token.len())
            .is_some_and(|ch| is_separator(*ch));
        if followed_by_separator
            && let Some(pos) = ASCII_ROMAN.iter().position(|r| *r == token)
        {
            return Some(pos as i64 + 1);
        }
    }
    None
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == '\u{8}'
}

fn first_digit_run(s: &str, max_len: usize) -> Option<&str> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let len = s[start..]
        .chars()
        .take(max_len)
        .take_while(char::is_ascii_digit)
        .count();
    Some(&s[start..start + len])
}

fn first_run_of<'a>(s: &'a str, alphabet: &str) -> Option<&'a str> {
    let start = s.find(|c: char| alphabet.contains(c))?;
    let len: usize = s[start..]
        .chars()
        .take_while(|c| alphabet.contains(*c))
        .map(char::len_utf8)
        .sum();
    Some(&s[start..start + len])
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn parse_digits(s: &str) -> i64 {
    s.parse().unwrap_or(i64::MAX)
}

fn numeral_value(value: &str) -> i64 {
    if is_digits(value) {
        parse_digits(value)
    } else {
        chinese_to_number(value)
    }
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Same title, same key
        #[test]
        fn extraction_is_deterministic(title in "\\PC{0,40}") {
            prop_assert_eq!(extract_episode_number(&title), extract_episode_number(&title));
        }

        /// Every episode of a later part sorts after every episode of an earlier one
        #[test]
        fn later_parts_sort_after_earlier_parts(
            p1 in 1i64..50,
            gap in 1i64..50,
            e1 in 0i64..10_000,
            e2 in 0i64..10_000,
        ) {
            let p2 = p1 + gap;
            let a = extract_episode_number(&format!("第{p1}部第{e1}集"));
            let b = extract_episode_number(&format!("第{p2}部第{e2}集"));
            prop_assert!(a < b, "{} !< {}", a, b);
        }

        /// Plain digit titles sort numerically
        #[test]
        fn digit_titles_keep_their_value(n in 0i64..10_000) {
            prop_assert_eq!(extract_episode_number(&format!("Chapter {n}")), n);
        }
    }
}
