/// Pull the JSON body out of a model reply.
///
/// Handles fenced replies with or without a language tag, and replies with
/// prose around a single top-level object.
pub fn strip_code_blocks(response: &str) -> &str {
    let mut body = response.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // Drop the info string ("json", "JSON", ...) up to the first newline.
        body = match rest.find('\n') {
            Some(newline) if !rest[..newline].contains('{') => &rest[newline + 1..],
            _ => rest,
        };
        body = body.trim_end().trim_end_matches("```").trim();
    }
    if body.starts_with('{') || body.starts_with('[') {
        return body;
    }
    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    }
}

/// First `max_chars` characters of `s`, marked with an ellipsis when cut.
pub fn preview(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &s[..cut]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tagged_and_bare_fences() {
        assert_eq!(strip_code_blocks("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_blocks("```JSON\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("  {}  "), "{}");
    }

    #[test]
    fn cuts_prose_around_object() {
        let reply = "Đây là kết quả:\n{\"price\": 2500000}\nHy vọng hữu ích.";
        assert_eq!(strip_code_blocks(reply), "{\"price\": 2500000}");
    }

    #[test]
    fn leaves_non_json_alone() {
        assert_eq!(strip_code_blocks("no json here"), "no json here");
    }

    #[test]
    fn preview_counts_characters_not_bytes() {
        assert_eq!(preview("Phòng trọ Cầu Giấy", 5), "Phòng…");
        assert_eq!(preview("phòng", 100), "phòng");
    }
}
