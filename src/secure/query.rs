//! Raw query string handling.
//!
//! Query strings are treated as `&`-separated segments of raw text. Only the
//! key of a segment is ever decoded, to match it against a parameter name;
//! segments that are kept are copied byte for byte.

/// The pieces of a URL string around its query.
pub(crate) struct UrlParts<'a> {
    base: &'a str,
    query: &'a str,
    fragment: Option<&'a str>,
}

impl<'a> UrlParts<'a> {
    pub(crate) fn split(url: &'a str) -> Self {
        let (rest, fragment) = match url.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment)),
            None => (url, None),
        };
        let (base, query) = rest.split_once('?').unwrap_or((rest, ""));

        Self {
            base,
            query,
            fragment,
        }
    }

    pub(crate) fn segments(&self) -> impl Iterator<Item = &'a str> {
        self.query.split('&').filter(|segment| !segment.is_empty())
    }

    pub(crate) fn join(&self, segments: &[String]) -> String {
        let mut url = self.base.to_string();
        if !segments.is_empty() {
            url.push('?');
            url.push_str(&segments.join("&"));
        }
        if let Some(fragment) = self.fragment {
            url.push('#');
            url.push_str(fragment);
        }
        url
    }
}

pub(crate) fn segment_pair(segment: &str) -> Option<(String, String)> {
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
}

/// Drops every segment whose decoded key satisfies `remove`.
///
/// Returns `url` untouched when nothing matches, so empty segments and a
/// trailing `?` survive in that case.
pub(crate) fn remove_params(url: &str, remove: impl Fn(&str) -> bool) -> String {
    let parts = UrlParts::split(url);
    let is_removed = |segment: &str| matches!(segment_pair(segment), Some((key, _)) if remove(key.as_str()));

    if !parts.segments().any(|segment| is_removed(segment)) {
        return url.to_string();
    }

    let kept: Vec<String> = parts
        .segments()
        .filter(|segment| !is_removed(*segment))
        .map(str::to_string)
        .collect();
    parts.join(&kept)
}
