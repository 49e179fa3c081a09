//! Client futures notation to platform notation.
//!
//! Clients name contracts either as `MESH26` (root, month letter, two-digit
//! year) or `MES 0326`; the platform expects `MES 03-26`.

/// Two-digit month for a futures month letter (case-insensitive).
pub fn month_number(code: char) -> Option<&'static str> {
    let month = match code.to_ascii_uppercase() {
        'F' => "01",
        'G' => "02",
        'H' => "03",
        'J' => "04",
        'K' => "05",
        'M' => "06",
        'N' => "07",
        'Q' => "08",
        'U' => "09",
        'V' => "10",
        'X' => "11",
        'Z' => "12",
        _ => return None,
    };
    Some(month)
}

/// Translate a client symbol to the platform's canonical notation.
/// Total: anything that does not match a known shape is returned unchanged.
pub fn translate_symbol(input: &str) -> String {
    if input.contains('-') {
        return input.to_string();
    }

    if input.contains(' ') {
        let mut parts = input.split(' ');
        if let (Some(root), Some(expiry), None) = (parts.next(), parts.next(), parts.next()) {
            if expiry.chars().count() == 4 {
                let (month, year) = split_at_char(expiry, 2);
                return format!("{root} {month}-{year}");
            }
        }
        return input.to_string();
    }

    let chars: Vec<char> = input.chars().collect();
    if chars.len() >= 6 {
        let code = chars[chars.len() - 3];
        if let Some(month) = month_number(code) {
            let root: String = chars[..chars.len() - 3].iter().collect();
            let year: String = chars[chars.len() - 2..].iter().collect();
            return format!("{root} {month}-{year}");
        }
    }

    input.to_string()
}

fn split_at_char(s: &str, n: usize) -> (&str, &str) {
    let idx = s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len());
    s.split_at(idx)
}
