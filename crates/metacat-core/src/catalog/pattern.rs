//! Table-name patterns: `*` matches any run of characters and `|`
//! separates alternatives. Matching is case-insensitive.

/// Check whether `name` matches `pattern`.
pub fn matches(pattern: &str, name: &str) -> bool {
    let name = name.to_lowercase();
    pattern
        .split('|')
        .map(|alt| alt.trim().to_lowercase())
        .any(|alt| glob(alt.as_bytes(), name.as_bytes()))
}

fn glob(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}
