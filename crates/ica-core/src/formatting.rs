//! Text helpers shared by reports and the Telegram front-end.

/// Collapse a multi-line post into a single trimmed line.
pub fn one_line(text: &str) -> String {
    text.replace("\r\n", " ").replace('\n', " ").trim().to_string()
}

/// Split `text` into chunks of at most `limit` UTF-16 code units (how
/// Telegram measures message length), preferring line breaks.
///
/// Lines longer than `limit` are cut on char boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(2);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = utf16_len(line);
        let sep = usize::from(!current.is_empty());

        if current_len + sep + line_len <= limit {
            if sep == 1 {
                current.push('\n');
            }
            current.push_str(line);
            current_len += sep + line_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len <= limit {
            current.push_str(line);
            current_len = line_len;
            continue;
        }

        let mut piece = String::new();
        let mut piece_len = 0usize;
        for c in line.chars() {
            let w = c.len_utf16();
            if piece_len + w > limit {
                chunks.push(std::mem::take(&mut piece));
                piece_len = 0;
            }
            piece.push(c);
            piece_len += w;
        }
        if !piece.is_empty() {
            chunks.push(piece);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}
