//! Telegram digest rendering and chunking.
//!
//! The digest is HTML (`parse_mode=HTML`): every piece of scraped text is
//! escaped before it is interpolated. Telegram caps a message at 4096
//! characters, so [`split_message`] cuts the digest into parts below a
//! configurable budget, only ever at line boundaries.

use chrono::NaiveDate;
use html_escape::encode_text;
use std::fmt::Write;

use crate::models::ResultItem;

pub const DEFAULT_CHUNK_LIMIT: usize = 3800;

const HEADER: &str = "⚖️ <b>JUSTIÇA DO TRABALHO – MT</b>";
const SEPARATOR: &str = "———————————————";

/// Escaped headline: the summary when there is one, the title otherwise.
pub fn format_headline(summary: Option<&str>, title: &str) -> String {
    let text = summary.filter(|s| !s.trim().is_empty()).unwrap_or(title);
    encode_text(text.trim()).into_owned()
}

/// Render the whole digest for `date`.
pub fn render_digest(results: &[ResultItem], date: NaiveDate) -> String {
    let mut out = String::new();
    let _ = write!(out, "{HEADER}\n📅 {}\n\n", date.format("%d/%m/%Y"));
    for item in results {
        let _ = write!(out, "📌 <b>{}</b>", encode_text(&item.record.source_label));
        if let Some(time) = &item.record.time_of_day {
            let _ = write!(out, " · {time}");
        }
        let _ = write!(
            out,
            "\n📝 {}\n🔗 {}\n\n{SEPARATOR}\n\n",
            item.headline,
            encode_text(&item.record.url)
        );
    }
    out
}

/// Split `text` into parts of at most `limit` characters, cutting only after
/// a `\n`. A single line longer than `limit` is the one case that gets cut
/// mid-line. Concatenating the parts gives back `text`.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len <= limit {
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        let chars: Vec<char> = line.chars().collect();
        let mut pieces = chars.chunks(limit).map(|c| c.iter().collect::<String>()).peekable();
        while let Some(piece) = pieces.next() {
            if pieces.peek().is_some() {
                parts.push(piece);
            } else {
                current_len = piece.chars().count();
                current = piece;
            }
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleRecord;

    fn item(label: &str, title: &str, url: &str, time: Option<&str>) -> ResultItem {
        ResultItem {
            record: ArticleRecord {
                url: url.to_string(),
                title: title.to_string(),
                body: String::new(),
                source_label: label.to_string(),
                time_of_day: time.map(str::to_string),
            },
            matched_phrase: None,
            headline: format_headline(None, title),
        }
    }

    #[test]
    fn test_render_digest_escapes_scraped_text() {
        let results = vec![
            item(
                "Olhar Direto",
                "TRT <condena> R&D",
                "https://www.olhardireto.com.br/noticias/exibir.asp?id=1&secao=2",
                Some("14:30"),
            ),
            item("G1 MT", "Vara de Sinop", "https://g1.globo.com/mt/a.ghtml", None),
        ];
        let date = NaiveDate::from_ymd_opt(2025, 5, 6).unwrap();
        let digest = render_digest(&results, date);

        assert!(digest.starts_with("⚖️ <b>JUSTIÇA DO TRABALHO – MT</b>\n📅 06/05/2025\n\n"));
        assert!(digest.contains("📌 <b>Olhar Direto</b> · 14:30\n"));
        assert!(digest.contains("📝 TRT &lt;condena&gt; R&amp;D\n"));
        assert!(digest.contains("exibir.asp?id=1&amp;secao=2"));
        assert!(digest.contains("📌 <b>G1 MT</b>\n"));
        assert_eq!(digest.matches(SEPARATOR).count(), 2);
    }

    #[test]
    fn test_headline_prefers_summary() {
        assert_eq!(format_headline(Some(" Resumo. "), "Título"), "Resumo.");
        assert_eq!(format_headline(Some("  "), "Título"), "Título");
        assert_eq!(format_headline(None, "A & B"), "A &amp; B");
    }

    #[test]
    fn test_split_nine_thousand_chars_into_three_parts() {
        let line = format!("{}\n", "x".repeat(59));
        let text = line.repeat(150);
        assert_eq!(text.chars().count(), 9000);

        let parts = split_message(&text, 3800);
        assert_eq!(parts.len(), 3);
        for part in &parts {
            assert!(part.chars().count() <= 3800);
            assert!(part.ends_with('\n'));
        }
        assert_eq!(parts.concat(), text);
    }

    #[test]
    fn test_split_short_text_is_one_part() {
        let parts = split_message("linha 1\nlinha 2", 3800);
        assert_eq!(parts, vec!["linha 1\nlinha 2".to_string()]);
        assert!(split_message("", 3800).is_empty());
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let text = "ção\n".repeat(10);
        let parts = split_message(&text, 8);
        assert_eq!(parts.len(), 5);
        assert!(parts.iter().all(|p| p == "ção\nção\n"));
    }

    #[test]
    fn test_split_oversized_line_is_cut_hard() {
        let text = format!("{}\nfim\n", "y".repeat(25));
        let parts = split_message(&text, 10);
        assert_eq!(parts.concat(), text);
        assert!(parts.iter().all(|p| p.chars().count() <= 10));
        assert_eq!(parts[0], "y".repeat(10));
    }
}
