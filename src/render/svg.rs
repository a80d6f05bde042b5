/// CSS-filter SVG wrapper
///
/// When pixels cannot be read (a remote host refuses the fetch, or the
/// image fails to decode) the shot is stored as an SVG that references
/// the original image and applies `brightness()`/`saturate()` as a CSS
/// filter. The vignette gradient is not reproduced.

use crate::state::edit::FilterValues;

use super::data_url::DataUrl;

/// Inline SVG payload applying `filters` over `source`
pub fn svg_filter_fallback(source: &str, filters: &FilterValues) -> String {
    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="100%" height="100%">"#,
            r#"<image href="{href}" xlink:href="{href}" width="100%" height="100%" preserveAspectRatio="xMidYMid meet" style="filter: {filter}"/>"#,
            r#"</svg>"#
        ),
        href = escape_attribute(source),
        filter = filters.css_filter(),
    );
    DataUrl::encode("image/svg+xml", svg.as_bytes())
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(payload: &str) -> String {
        let data = DataUrl::parse(payload).unwrap();
        assert_eq!(data.mime, "image/svg+xml");
        String::from_utf8(data.bytes).unwrap()
    }

    #[test]
    fn test_wrapper_applies_css_filter() {
        let payload = svg_filter_fallback(
            "https://cdn.example.com/shot.jpg?a=1&b=2",
            &FilterValues::new(120.0, 40.0, 60.0),
        );
        let svg = decode(&payload);

        assert!(svg.contains("filter: brightness(120%) saturate(40%)"));
        assert!(svg.contains("shot.jpg?a=1&amp;b=2"));
        assert!(!svg.contains("radialGradient"));
    }
}
