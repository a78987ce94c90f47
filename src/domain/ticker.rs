use super::Headline;

const TICKER_MAX_CHARS: usize = 180;
pub const EMPTY_TICKER: &str = "No headlines available right now.";

/// Build the one-line ticker from headlines in display order.
///
/// Segments look like `[section] title` and are joined with ` | ` until the
/// next one would overflow. An oversized first segment is cut with `…`.
pub fn build_ticker_text(headlines: &[Headline]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut used = 0usize;

    for headline in headlines {
        let title = headline.title.trim();
        if title.is_empty() {
            continue;
        }
        let segment = if headline.section.is_empty() {
            title.to_string()
        } else {
            format!("[{}] {}", headline.section, title)
        };
        let segment_len = segment.chars().count();
        let prospective = if parts.is_empty() {
            segment_len
        } else {
            used + 3 + segment_len
        };

        if prospective > TICKER_MAX_CHARS {
            if parts.is_empty() {
                let cut: String = segment.chars().take(TICKER_MAX_CHARS - 1).collect();
                parts.push(format!("{}…", cut.trim_end()));
            }
            break;
        }
        used = prospective;
        parts.push(segment);
    }

    if parts.is_empty() {
        return EMPTY_TICKER.to_string();
    }
    parts.join(" | ")
}
