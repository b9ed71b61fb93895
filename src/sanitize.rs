//! Input sanitization used by [`Request`](crate::Request)'s typed accessors
//! and [`Response::redirect`](crate::Response::redirect).
//!
//! Small, allocation-per-call helpers. Only [`html`] keeps markup, and it
//! goes through `ammonia`'s allowlist.

/// URL schemes a redirect target may use. Anything else is dropped.
const ALLOWED_SCHEMES: &[&str] = &[
    "http", "https", "ftp", "ftps", "mailto", "news", "irc", "irc6", "ircs", "gopher", "nntp",
    "feed", "telnet", "mms", "rtsp", "sms", "svn", "tel", "fax", "xmpp", "webcal", "urn",
];

/// Removes every tag, plus the contents of `<script>` and `<style>` blocks.
pub fn strip_all_tags(input: &str) -> String {
    let without_blocks = strip_blocks(input, "script");
    let without_blocks = strip_blocks(&without_blocks, "style");

    let mut output = String::with_capacity(without_blocks.len());
    let mut inside_tag = false;
    for c in without_blocks.chars() {
        match c {
            '<' => inside_tag = true,
            '>' => inside_tag = false,
            _ if !inside_tag => output.push(c),
            _ => {}
        }
    }
    output
}

/// Single-line text: tags stripped, line breaks and tabs removed, runs of
/// whitespace collapsed, ends trimmed.
pub fn text_field(input: &str) -> String {
    strip_all_tags(input)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Multi-line text: tags stripped, line breaks kept, each line trimmed of
/// trailing whitespace and the whole value trimmed.
pub fn textarea_field(input: &str) -> String {
    strip_all_tags(input)
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

/// Post-content HTML: tags and attributes outside a conservative allowlist
/// are removed, `<script>` and `<style>` with their contents, and links are
/// limited to safe schemes.
pub fn html(input: &str) -> String {
    ammonia::clean(input)
}

/// Keeps only characters valid in an address; returns an empty string when
/// the result is not shaped like `local@domain`.
pub fn email(input: &str) -> String {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || "@.!#$%&'*+/=?^_`{|}~-".contains(*c))
        .collect();

    match cleaned.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && domain.contains('.') && !domain.contains('@') =>
        {
            cleaned
        }
        _ => String::new(),
    }
}

/// Strips whitespace and control characters and rejects unknown schemes.
pub fn url(input: &str) -> String {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();

    if let Some((scheme, _)) = cleaned.split_once(':') {
        // Relative paths and bare `ip:port` carry no scheme.
        let looks_like_scheme = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+.-".contains(c));
        if looks_like_scheme && !ALLOWED_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
            return String::new();
        }
    }
    cleaned
}

/// Removes `<tag ...>...</tag>` blocks, matching the tag name ASCII
/// case-insensitively. An unterminated block swallows the rest of the input.
fn strip_blocks(input: &str, tag: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let mut output = String::with_capacity(input.len());
    let mut cursor = 0;
    while let Some(start) = lower[cursor..].find(&open).map(|i| cursor + i) {
        output.push_str(&input[cursor..start]);
        match lower[start..].find(&close) {
            Some(end) => cursor = start + end + close.len(),
            None => return output,
        }
    }
    output.push_str(&input[cursor..]);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_allowlist() {
        assert_eq!(html("<p>ok <b>bold</b></p><script>x()</script>"), "<p>ok <b>bold</b></p>");
        let image = html(r#"<img src="a.png" onerror="alert(1)">"#);
        assert!(image.contains(r#"src="a.png""#) && !image.contains("onerror"), "{image}");
    }

    #[test]
    fn script_contents_are_removed() {
        assert_eq!(strip_all_tags("<script>alert(1)</script>John"), "John");
        assert_eq!(strip_all_tags("<SCRIPT src=x>y</Script>ok"), "ok");
        assert_eq!(strip_all_tags("<p>Hello <b>World</b></p>"), "Hello World");
    }

    #[test]
    fn text_field_collapses_whitespace() {
        assert_eq!(text_field("  a\n\tb   <i>c</i> "), "a b c");
    }

    #[test]
    fn textarea_keeps_line_breaks() {
        assert_eq!(textarea_field(" line one  \n<b>line</b> two\n"), "line one\nline two");
    }

    #[test]
    fn email_rejects_garbage() {
        assert_eq!(email(" jo hn@example.com "), "john@example.com");
        assert_eq!(email("not-an-address"), "");
        assert_eq!(email("a@b@c.com"), "");
    }

    #[test]
    fn url_drops_unknown_schemes() {
        assert_eq!(url("javascript:alert(1)"), "");
        assert_eq!(url(" https://example.com/a b "), "https://example.com/ab");
        assert_eq!(url("/login?next=/home"), "/login?next=/home");
        assert_eq!(url("localhost:8080/x"), "");
        assert_eq!(url("127.0.0.1:8080"), "127.0.0.1:8080");
    }
}
