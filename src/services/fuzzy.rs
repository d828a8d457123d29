//! Substring-tolerant similarity scoring for catalog lookups.

/// Best similarity (0-100) between the shorter string and any equally long
/// window of the longer one, ignoring case.
///
/// A query that appears verbatim inside a candidate scores 100, so `CA116`
/// matches `CA116[1] Computing Fundamentals` fully.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_uppercase().chars().collect();
    let b: Vec<char> = b.to_uppercase().chars().collect();

    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return 0.0;
    }

    let needle: String = short.iter().collect();
    long.windows(short.len())
        .map(|window| {
            let window: String = window.iter().collect();
            strsim::normalized_levenshtein(&needle, &window)
        })
        .fold(0.0, f64::max)
        * 100.0
}
