//! Per-request context: the parsed request plus the path parameters captured
//! by the route that matched it.

use std::collections::HashMap;

use crate::Request;

/// Path parameters extracted from the matched route, e.g. `id → "42"` for
/// `/carts/:id` against `/carts/42`.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// State handed to every middleware stage and, finally, to the route handler.
#[derive(Debug)]
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    /// Creates a context with no path parameters. Used before routing.
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    /// Creates a context carrying the parameters of a matched route.
    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self { request, params }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Shorthand for `self.params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Replaces the path parameters, keeping the request.
    pub fn into_routed(self, params: PathParams) -> Self {
        Self::with_params(self.request, params)
    }

    /// Decodes the request body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] produced by decoding.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(raw: &str) -> Request {
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[test]
    fn new_context_has_no_params() {
        let ctx = Context::new(request("GET /api/carts HTTP/1.1\r\n\r\n"));
        assert!(ctx.params().is_empty());
        assert_eq!(ctx.param("id"), None);
    }

    #[test]
    fn routed_context_exposes_params() {
        let ctx = Context::new(request("GET /api/carts/7 HTTP/1.1\r\n\r\n"));
        let mut params = PathParams::new();
        params.insert("id".to_owned(), "7".to_owned());

        let ctx = ctx.into_routed(params);
        assert_eq!(ctx.param("id"), Some("7"));
        assert_eq!(ctx.request().path(), "/api/carts/7");
    }

    #[test]
    fn json_decodes_body() {
        let raw = "POST /api/carts/1/items HTTP/1.1\r\nContent-Length: 14\r\n\r\n{\"quantity\":3}";
        let ctx = Context::new(request(raw));
        let value: serde_json::Value = ctx.json().unwrap();
        assert_eq!(value["quantity"], 3);
    }

    #[test]
    fn json_reports_malformed_body() {
        let raw = "POST /api/carts HTTP/1.1\r\nContent-Length: 5\r\n\r\n{oops";
        let ctx = Context::new(request(raw));
        assert!(ctx.json::<serde_json::Value>().is_err());
    }
}
