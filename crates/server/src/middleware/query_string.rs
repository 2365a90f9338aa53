//! Decodes `QUERY_STRING` and url-encoded form bodies into request parameters.
//!
//! * `name=value` adds a value, a repeated name becomes a list
//! * `name[]=value` always adds to a list
//! * `name[3]=value` adds to a list ordered by the index
//!
//! Percent sequences that aren't valid UTF-8 decode to U+FFFD and a pair without `=`
//! decodes to an empty value. A bad query never rejects the request.

use std::collections::BTreeMap;

use async_trait::async_trait;
use micro_scgi::chain::Middleware;
use micro_scgi::protocol::{BoxError, Request, Response};
use tracing::{trace, warn};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Fills [`Request::parameters`] before the inner processor runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryStringMiddleware {
    skip_body: bool,
}

impl QueryStringMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only decodes `QUERY_STRING`, leaving form bodies for the processor to read.
    pub fn query_only() -> Self {
        Self { skip_body: true }
    }
}

#[async_trait]
impl Middleware for QueryStringMiddleware {
    async fn before(&self, request: &mut Request, _response: &mut Response) -> Result<bool, BoxError> {
        if let Some(query) = request.query_string().filter(|query| !query.is_empty()) {
            let pairs = decode_pairs(query.as_bytes());
            add_parameters(request, pairs);
        }

        if !self.skip_body && is_form(request.content_type()) && request.content_length() > 0 {
            let body = request.read_body().await?;
            add_parameters(request, decode_pairs(&body));
        }
        Ok(true)
    }
}

fn is_form(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|content_type| content_type.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(FORM_URLENCODED))
}

fn decode_pairs(input: &[u8]) -> Vec<(String, String)> {
    match serde_urlencoded::from_bytes::<Vec<(String, String)>>(input) {
        Ok(pairs) => pairs,
        Err(e) => {
            warn!(cause = %e, "ignoring undecodable parameters");
            Vec::new()
        }
    }
}

enum Key<'a> {
    Plain(&'a str),
    List(&'a str),
    Indexed(&'a str, usize),
}

fn parse_key(name: &str) -> Key<'_> {
    let Some(base) = name.strip_suffix(']') else {
        return Key::Plain(name);
    };
    let Some((base, index)) = base.split_once('[') else {
        return Key::Plain(name);
    };

    if base.is_empty() {
        Key::Plain(name)
    } else if index.is_empty() {
        Key::List(base)
    } else if let Ok(index) = index.parse::<usize>() {
        Key::Indexed(base, index)
    } else {
        Key::Plain(name)
    }
}

fn add_parameters(request: &mut Request, pairs: Vec<(String, String)>) {
    let mut indexed: BTreeMap<String, Vec<(usize, String)>> = BTreeMap::new();

    for (name, value) in pairs {
        trace!(%name, %value, "parameter");
        match parse_key(&name) {
            Key::Plain(name) => request.add_parameter(name, value),
            Key::List(name) => request.add_list_parameter(name, value),
            Key::Indexed(name, index) => indexed.entry(name.to_string()).or_default().push((index, value)),
        }
    }

    for (name, mut values) in indexed {
        values.sort_by_key(|(index, _)| *index);
        for (_, value) in values {
            request.add_list_parameter(name.as_str(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use micro_scgi::protocol::body::ReqBody;
    use micro_scgi::protocol::Parameter;

    async fn decoded(query: &str) -> Request {
        let mut request = Request::new();
        request.set_variable("QUERY_STRING", query).unwrap();
        QueryStringMiddleware::new().before(&mut request, &mut Response::new()).await.unwrap();
        request
    }

    #[tokio::test]
    async fn plain_and_repeated_names() {
        let request = decoded("a=1&b=two+words&a=3&c=%2Fpath").await;

        assert_eq!(request.parameter("a"), Some(&Parameter::List(vec!["1".into(), "3".into()])));
        assert_eq!(request.parameter("b"), Some(&Parameter::Single("two words".into())));
        assert_eq!(request.parameter("c").and_then(Parameter::as_str), Some("/path"));
    }

    #[tokio::test]
    async fn bracket_names_are_lists() {
        let request = decoded("tag[]=x&item[2]=c&item[0]=a&item[1]=b&odd[k]=v").await;

        assert_eq!(request.parameter("tag"), Some(&Parameter::List(vec!["x".into()])));
        assert_eq!(request.parameter("item").unwrap().values(), ["a", "b", "c"]);
        assert!(request.contains_parameter("odd[k]"));
    }

    #[tokio::test]
    async fn bad_encoding_is_replaced() {
        let request = decoded("name=%FF&flag").await;

        assert_eq!(request.parameter("name").and_then(Parameter::as_str), Some("\u{FFFD}"));
        assert_eq!(request.parameter("flag").and_then(Parameter::as_str), Some(""));
    }

    #[tokio::test]
    async fn decodes_form_body() {
        let body = &b"user=bob&lang[]=rust"[..];
        let mut request = Request::new();
        request.set_variable("CONTENT_TYPE", "application/x-www-form-urlencoded; charset=utf-8").unwrap();
        request.set_variable("CONTENT_LENGTH", body.len().to_string()).unwrap();
        request.set_body(ReqBody::new(bytes::Bytes::from_static(body), tokio::io::empty(), body.len() as u64));

        QueryStringMiddleware::new().before(&mut request, &mut Response::new()).await.unwrap();

        assert_eq!(request.parameter("user").and_then(Parameter::as_str), Some("bob"));
        assert!(request.parameter("lang").unwrap().is_list());
        // still readable by the processor
        assert_eq!(&request.read_body().await.unwrap()[..], body);
    }

    #[tokio::test]
    async fn query_only_leaves_the_body() {
        let mut request = Request::new();
        request.set_variable("CONTENT_TYPE", "application/x-www-form-urlencoded").unwrap();
        request.set_variable("CONTENT_LENGTH", "3").unwrap();
        request.set_body(ReqBody::new(bytes::Bytes::from_static(b"a=1"), tokio::io::empty(), 3));

        QueryStringMiddleware::query_only().before(&mut request, &mut Response::new()).await.unwrap();

        assert!(request.parameters().is_empty());
    }
}
