use std::borrow::Cow;

use regex::Regex;
use url::form_urlencoded;

/// The request target of an inbound request.
///
/// Holds the raw url, its path, the decoded query parameters in arrival order
/// (duplicates kept) and, after a successful [`Uri::match_pattern`], the
/// positional capture groups of the matching route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uri {
    url: String,
    path: String,
    query: Vec<(String, String)>,
    captures: Vec<String>,
}

impl Uri {
    /// Parses a request target such as `/api/v1/items?limit=10`.
    /// Absolute-form targets (`http://host/path?query`) are accepted as well.
    pub fn parse(url: &str) -> Self {
        let target: Cow<'_, str> = match url.find("://") {
            Some(scheme_end) => {
                let rest = &url[scheme_end + 3..];
                match rest.find(|c: char| c == '/' || c == '?' || c == '#') {
                    Some(end) if rest[end..].starts_with('/') => Cow::Borrowed(&rest[end..]),
                    Some(end) => Cow::Owned(format!("/{}", &rest[end..])),
                    None => Cow::Borrowed("/"),
                }
            }
            None => Cow::Borrowed(url),
        };
        let target = target.split('#').next().unwrap_or_default();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        Uri {
            url: url.to_string(),
            path: path.to_string(),
            query: query.map(parse_query).unwrap_or_default(),
            captures: Vec::new(),
        }
    }

    pub(crate) fn from_hyper(uri: &hyper::Uri) -> Self {
        Uri {
            url: uri.to_string(),
            path: uri.path().to_string(),
            query: uri.query().map(parse_query).unwrap_or_default(),
            captures: Vec::new(),
        }
    }

    /// The full request target as received.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The path component, without query string. Not percent-decoded.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replaces the path used for route matching.
    pub fn change_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Every value of query parameter `name`, in the order they appeared.
    pub fn param_values(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// The first value of query parameter `name`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.query.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Matches the whole path against `pattern` and stores its capture groups.
    ///
    /// A match that does not span the entire path counts as a miss; routes
    /// compiled by the router are anchored, so this only matters for
    /// hand-built expressions. Captures are left untouched on a miss.
    pub fn match_pattern(&mut self, pattern: &Regex) -> bool {
        let captures = match pattern.captures(&self.path) {
            Some(captures) => captures,
            None => return false,
        };

        let whole = captures.get(0).map(|m| (m.start(), m.end()));
        if whole != Some((0, self.path.len())) {
            return false;
        }

        self.captures = captures
            .iter()
            .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();
        true
    }

    /// Capture group `number` of the last successful match; group 0 is the
    /// whole path. Returns an empty string for a missing group.
    pub fn sub_match(&self, number: usize) -> &str {
        self.captures.get(number).map(String::as_str).unwrap_or("")
    }

    pub fn captures(&self) -> &[String] {
        &self.captures
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}
