//! Per-request context: the request view, the response accumulator, cookies and
//! type-keyed extensions.
//!
//! A fresh [`Context`] is built by the dispatcher for every request and handed by
//! `&mut` to each handler in the chain. Handlers refine [`Context::response_mut`]
//! in place or return a partial [`HttpResponse`] that the chain merges in.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    net::SocketAddr,
    path::Path,
};

use crate::cookie::CookieStorage;
use crate::error::HttpError;
use crate::http::{Method, Request, StatusCode};
use crate::response::HttpResponse;
use crate::static_files;

type AnyValue = Box<dyn Any + Send + Sync>;

/// Per-request values keyed by their type.
///
/// An outer handler stores something (the authenticated user, a timer) and the
/// handlers it delegates to read it back without sharing any other type.
#[derive(Default)]
pub struct Extensions {
    values: HashMap<TypeId, AnyValue>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, returning the value of the same type it replaced.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.values
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(unbox)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values.get(&TypeId::of::<T>())?.downcast_ref()
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.values.get_mut(&TypeId::of::<T>())?.downcast_mut()
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.values.remove(&TypeId::of::<T>()).and_then(unbox)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn unbox<T: 'static>(value: AnyValue) -> Option<T> {
    value.downcast::<T>().ok().map(|boxed| *boxed)
}

/// Path parameters extracted for the route entry currently executing.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    map: HashMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over `(name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Parameters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Parameters::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Per-request state shared by every handler in a chain.
pub struct Context {
    request: Request,
    params: Parameters,
    response: HttpResponse,
    cookies: CookieStorage,
    remote: Option<SocketAddr>,
    extensions: Extensions,
}

impl Context {
    /// Builds the context for `request`. Cookies are parsed from its `Cookie`
    /// header and the response accumulator starts out as an empty `200`.
    pub fn new(request: Request, remote: Option<SocketAddr>) -> Self {
        let cookies = request
            .headers()
            .get("cookie")
            .map(CookieStorage::from_header)
            .unwrap_or_default();

        Self {
            request,
            params: Parameters::new(),
            response: HttpResponse::new().with_status(StatusCode::Ok),
            cookies,
            remote,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Shorthand for `ctx.request().method()`.
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Shorthand for `ctx.request().path()`.
    pub fn path(&self) -> &str {
        self.request.path()
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Shorthand for `ctx.params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub(crate) fn set_params(&mut self, params: Parameters) {
        self.params = params;
    }

    /// The response accumulated so far.
    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut HttpResponse {
        &mut self.response
    }

    pub(crate) fn take_response(&mut self) -> HttpResponse {
        std::mem::take(&mut self.response)
    }

    pub fn cookies(&self) -> &CookieStorage {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut CookieStorage {
        &mut self.cookies
    }

    /// The peer address reported by the transport, when there is one.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Deserializes the request body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the body is not valid JSON for `T`.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }

    /// Serves the request path as a file below `root`.
    ///
    /// # Errors
    ///
    /// `403` when the path names a directory without `index.html`, `404` when
    /// nothing exists there.
    pub async fn send(&self, root: impl AsRef<Path>) -> Result<HttpResponse, HttpError> {
        static_files::serve_static(self.request.path(), "/", root.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    #[derive(Debug, PartialEq)]
    struct UserId(u64);

    // ── Extensions ────────────────────────────────────────────────────────────

    #[test]
    fn extensions_are_keyed_by_type() {
        let mut ext = Extensions::new();
        assert!(ext.insert(UserId(7)).is_none());
        ext.insert("label");
        assert_eq!(ext.get::<UserId>(), Some(&UserId(7)));
        assert_eq!(ext.get::<&str>(), Some(&"label"));
        assert_eq!(ext.len(), 2);
    }

    #[test]
    fn extensions_insert_returns_previous() {
        let mut ext = Extensions::new();
        ext.insert(UserId(1));
        assert_eq!(ext.insert(UserId(2)), Some(UserId(1)));
        ext.get_mut::<UserId>().unwrap().0 = 3;
        assert_eq!(ext.remove::<UserId>(), Some(UserId(3)));
        assert!(ext.is_empty());
    }

    // ── Parameters ────────────────────────────────────────────────────────────

    #[test]
    fn parameters_from_pairs() {
        let params: Parameters = [("id", "7"), ("slug", "intro")].into_iter().collect();
        assert_eq!(params.get("id"), Some("7"));
        assert!(params.contains("slug"));
        assert_eq!(params.len(), 2);
    }

    // ── Context ───────────────────────────────────────────────────────────────

    #[test]
    fn context_parses_cookie_header() {
        let req = Request::new(Method::Get, "/").with_header("Cookie", "a=1; b=two%20words");
        let ctx = Context::new(req, None);
        assert_eq!(ctx.cookies().len(), 2);
        assert_eq!(ctx.cookies().get("b").and_then(|c| c.value()), Some("two words"));
    }

    #[test]
    fn context_starts_with_empty_ok_response() {
        let addr: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let ctx = Context::new(Request::new(Method::Get, "/x"), Some(addr));
        assert_eq!(ctx.response().status_opt(), Some(StatusCode::Ok));
        assert!(ctx.response().is_empty());
        assert!(ctx.params().is_empty());
        assert_eq!(ctx.remote_addr(), Some(addr));
        assert_eq!(ctx.path(), "/x");
    }

    #[test]
    fn context_json_body() {
        let req = Request::new(Method::Post, "/").with_body(r#"{"name":"ada"}"#);
        let ctx = Context::new(req, None);
        let body: serde_json::Value = ctx.json().unwrap();
        assert_eq!(body["name"], "ada");
    }

    #[test]
    fn take_response_resets_accumulator() {
        let mut ctx = Context::new(Request::new(Method::Get, "/"), None);
        ctx.response_mut().set_body("done");
        let res = ctx.take_response();
        assert_eq!(res.body().as_text(), Some("done"));
        assert!(ctx.response().body().is_falsy());
    }
}
