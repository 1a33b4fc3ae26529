use std::borrow::Cow;

const TEXT_WIDTH: usize = 80;

/// Wrap a bare HTML fragment in a minimal document. Complete documents are
/// returned untouched.
#[must_use]
pub fn ensure_document(html: &str) -> Cow<'_, str> {
    let head = html.trim_start().to_ascii_lowercase();

    if head.starts_with("<!doctype") || head.contains("<html") {
        Cow::Borrowed(html)
    } else {
        Cow::Owned(format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"></head>\n<body>\n{html}\n</body>\n</html>"
        ))
    }
}

/// Plain text rendering of an HTML body.
#[must_use]
pub fn text_fallback(html: &str) -> String {
    html2text::from_read(html.as_bytes(), TEXT_WIDTH)
        .trim()
        .to_string()
}
