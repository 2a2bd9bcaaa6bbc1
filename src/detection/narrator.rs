//! Result narrator: detections to a spoken sentence

use super::aggregator::Detection;

/// Sentence used when nothing was confidently identified
pub const NOTHING_IDENTIFIED: &str = "I cannot clearly identify any objects.";

/// At most this many detections are read out
pub const MAX_NARRATED: usize = 5;

/// Describe detections in aggregator order
pub fn describe(detections: &[Detection]) -> String {
    if detections.is_empty() {
        return NOTHING_IDENTIFIED.to_string();
    }

    let phrases: Vec<String> = detections
        .iter()
        .take(MAX_NARRATED)
        .map(|d| {
            format!(
                "{} {} with {}% confidence",
                article(&d.label),
                d.label,
                percent(d.confidence)
            )
        })
        .collect();

    format!("I detect {}.", join_with_and(&phrases))
}

fn article(label: &str) -> &'static str {
    match label.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}

fn percent(confidence: f32) -> u32 {
    (f64::from(confidence) * 100.0).round() as u32
}

fn join_with_and(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{first} and {second}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
    }
}
