//! Pure text → value conversions.
//!
//! All functions return `None` for text they cannot make sense of.

/// Splits a leading (possibly fractional) number from its suffix.
fn split_number(text: &str) -> Option<(f64, &str)> {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (c == '.' && i > 0) || (c == '-' && i == 0)))
        .map_or(text.len(), |(i, _)| i);
    let number = text[..end].parse::<f64>().ok()?;
    Some((number, text[end..].trim()))
}

fn round(value: f64) -> Option<i64> {
    let rounded = value.round();
    (rounded.is_finite() && rounded.abs() < i64::MAX as f64).then_some(rounded as i64)
}

/// Byte sizes: `1234`, `1234 B`, `16384 kB`, `32K`, `2 GiB`.
///
/// Two-letter suffixes use the kernel convention (`kB` = 1024), the `iB`
/// forms are decimal (`KiB` = 1000). The first letter is case-insensitive.
/// An unknown suffix leaves the plain number.
pub fn to_bytes(text: &str) -> Option<i64> {
    let (number, suffix) = split_number(text)?;
    let mut chars = suffix.chars();
    let exponent = match chars.next().map(|c| c.to_ascii_lowercase()) {
        Some('k') => 1,
        Some('m') => 2,
        Some('g') => 3,
        Some('t') => 4,
        _ => 0,
    };
    let factor: f64 = match (exponent, chars.as_str()) {
        (0, _) => 1.0,
        (n, "B") | (n, "") => 1024f64.powi(n),
        (n, "iB") => 1000f64.powi(n),
        _ => 1.0,
    };
    round(number * factor)
}

/// Frequencies: a bare number is kHz (sysfs cpufreq), otherwise `Hz`,
/// `kHz`, `MHz` or `GHz`, case-insensitive.
pub fn to_hertz(text: &str) -> Option<i64> {
    let (number, unit) = split_number(text)?;
    let factor = match unit.to_ascii_lowercase().as_str() {
        "" | "khz" => 1e3,
        "hz" => 1.0,
        "mhz" => 1e6,
        "ghz" => 1e9,
        _ => return None,
    };
    round(number * factor)
}

/// Hexadecimal cpumask to the indices of its set bits.
///
/// Accepts an optional `0x` prefix and comma separated 32-bit groups as
/// written by the kernel (`ff,ffffffff`).
pub fn mask_to_list(text: &str) -> Option<Vec<i64>> {
    let text = text.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let digits: Vec<u32> = text
        .chars()
        .filter(|&c| c != ',')
        .map(|c| c.to_digit(16))
        .collect::<Option<_>>()?;
    if digits.is_empty() {
        return None;
    }
    let mut bits = Vec::new();
    for (nibble, digit) in digits.iter().rev().enumerate() {
        for bit in 0..4 {
            if digit & (1 << bit) != 0 {
                bits.push((nibble * 4 + bit) as i64);
            }
        }
    }
    Some(bits)
}

/// Upper bound on the entries of an integer list, well above any CPU count.
pub const MAX_LIST_LEN: usize = 1 << 16;

/// Integer lists with ranges: `0-3,8 9` → `[0, 1, 2, 3, 8, 9]`.
///
/// Lists longer than [`MAX_LIST_LEN`] are rejected.
pub fn to_int_list(text: &str) -> Option<Vec<i64>> {
    let mut out = Vec::new();
    for part in text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
    {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: i64 = start.parse().ok()?;
                let end: i64 = end.parse().ok()?;
                let len = usize::try_from(end.checked_sub(start)?).ok()?;
                if len >= MAX_LIST_LEN - out.len() {
                    return None;
                }
                out.extend(start..=end);
            }
            None => {
                if out.len() >= MAX_LIST_LEN {
                    return None;
                }
                out.push(part.parse().ok()?);
            }
        }
    }
    Some(out)
}

/// Hertz applied to every comma or whitespace separated item.
pub fn to_hertz_list(text: &str) -> Option<Vec<i64>> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(to_hertz)
        .collect()
}

/// Words separated by whitespace or commas.
pub fn to_str_list(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Title-cases every word and drops underscores and spaces:
/// `package_0` → `Package0`, `dram` → `Dram`.
pub fn to_title(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            in_word = false;
            if c != '_' && c != ' ' {
                out.push(c);
            }
        }
    }
    out
}

/// Integers (non-zero is true) and the usual on/off words.
pub fn to_bool(text: &str) -> Option<bool> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(i != 0);
    }
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "enabled" | "y" => Some(true),
        "false" | "no" | "off" | "disabled" | "n" => Some(false),
        _ => None,
    }
}
