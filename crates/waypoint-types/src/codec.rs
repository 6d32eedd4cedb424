use indexmap::IndexMap;
use url::{Url, form_urlencoded};

use crate::{Segments, StackError};

/// Translates structured segments to and from wire-format URL strings.
pub trait PathCodec: Send + Sync {
    fn encode(&self, segments: &Segments) -> String;
    fn decode(&self, url: &str) -> Result<Segments, StackError>;
}

const PARSE_BASE: &str = "http://waypoint.invalid/";

/// Default codec: `{basename}{path}?{query}#{hash}` with form-encoded query pairs.
#[derive(Debug, Clone, Default)]
pub struct UrlPathCodec {
    basename: String,
}

impl UrlPathCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec for an application mounted below `basename` (e.g. `/app`).
    pub fn with_basename(basename: impl Into<String>) -> Self {
        let basename = basename.into().trim_end_matches('/').to_owned();
        Self { basename }
    }
}

impl PathCodec for UrlPathCodec {
    fn encode(&self, segments: &Segments) -> String {
        let basename = if segments.basename.is_empty() {
            self.basename.as_str()
        } else {
            segments.basename.trim_end_matches('/')
        };
        let mut out = String::with_capacity(basename.len() + segments.path.len() + 16);
        out.push_str(basename);
        if !segments.path.starts_with('/') {
            out.push('/');
        }
        out.push_str(&segments.path);
        if !segments.query.is_empty() {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, value) in &segments.query {
                serializer.append_pair(key, value);
            }
            out.push('?');
            out.push_str(&serializer.finish());
        }
        if !segments.hash.is_empty() {
            out.push('#');
            out.push_str(segments.hash.trim_start_matches('#'));
        }
        out
    }

    fn decode(&self, input: &str) -> Result<Segments, StackError> {
        let base = Url::parse(PARSE_BASE).map_err(|err| invalid(input, err))?;
        let url = base.join(input).map_err(|err| invalid(input, err))?;
        let full_path = url.path();
        let path = match full_path.strip_prefix(self.basename.as_str()) {
            Some(rest) if !self.basename.is_empty() && (rest.is_empty() || rest.starts_with('/')) => {
                if rest.is_empty() { "/" } else { rest }
            }
            _ => full_path,
        };
        let query: IndexMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok(Segments {
            path: path.to_owned(),
            query,
            hash: url.fragment().unwrap_or_default().to_owned(),
            basename: self.basename.clone(),
        })
    }
}

fn invalid(input: &str, err: url::ParseError) -> StackError {
    StackError::InvalidLocation {
        input: input.to_owned(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_query_and_hash() {
        let codec = UrlPathCodec::new();
        let segments = Segments::path("/search")
            .with_query("q", "rust lang")
            .with_query("page", "2")
            .with_hash("results");
        assert_eq!(codec.encode(&segments), "/search?q=rust+lang&page=2#results");
    }

    #[test]
    fn decode_strips_basename() {
        let codec = UrlPathCodec::with_basename("/app/");
        let segments = codec.decode("/app/orders/7?sort=desc#top").unwrap();
        assert_eq!(segments.path, "/orders/7");
        assert_eq!(segments.basename, "/app");
        assert_eq!(segments.query.get("sort").map(String::as_str), Some("desc"));
        assert_eq!(segments.hash, "top");
        assert_eq!(codec.encode(&segments), "/app/orders/7?sort=desc#top");
    }

    #[test]
    fn basename_root_maps_to_slash() {
        let codec = UrlPathCodec::with_basename("/app");
        assert_eq!(codec.decode("/app").unwrap().path, "/");
        assert_eq!(codec.decode("/application").unwrap().path, "/application");
    }
}
