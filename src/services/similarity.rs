use strsim::jaro_winkler;

/// Similarity at or above which two feedback texts count as copy/paste.
pub const COPY_PASTE_THRESHOLD: f64 = 0.90;

/// Feedback shorter than this is too generic to compare ("good app").
pub const MIN_COMPARABLE_LEN: usize = 20;

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Jaro-Winkler similarity over whitespace-normalized, lowercased text.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    jaro_winkler(&normalize(a), &normalize(b))
}

/// Best match of `text` against a keyed corpus of other feedback, if any
/// candidate clears the copy/paste threshold. Texts below the minimum length
/// on either side are skipped.
pub fn best_match<K, I, S>(text: &str, others: I) -> Option<(f64, K)>
where
    I: IntoIterator<Item = (K, S)>,
    S: AsRef<str>,
{
    if text.trim().len() < MIN_COMPARABLE_LEN {
        return None;
    }

    let mut best: Option<(f64, K)> = None;
    for (key, other) in others {
        if other.as_ref().trim().len() < MIN_COMPARABLE_LEN {
            continue;
        }
        let score = text_similarity(text, other.as_ref());
        if score >= COPY_PASTE_THRESHOLD
            && best.as_ref().map(|(s, _)| score > *s).unwrap_or(true)
        {
            best = Some((score, key));
        }
    }
    best
}
