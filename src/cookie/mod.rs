//! Cookie store: inbound cookies, outbound `Set-Cookie` records and deletion.
//!
//! Every request gets a [`CookieStorage`] built from its `Cookie` header. Those
//! entries are marked `overwrite = false`: reading a cookie never sends it back.
//! Anything set or deleted through the store is marked `overwrite = true` and ends
//! up as one `Set-Cookie` header on the final response.

use std::fmt;

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

// Everything except the characters a URI component may carry unescaped.
const COOKIE_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// The `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SameSite::Strict => "strict",
            SameSite::Lax => "lax",
            SameSite::None => "none",
        })
    }
}

/// Attributes applied when creating a [`Cookie`].
///
/// `overwrite` defaults to `true` when left unset.
///
/// ```
/// use canopy::cookie::{CookieOptions, SameSite};
///
/// let options = CookieOptions::new()
///     .path("/")
///     .http_only(true)
///     .same_site(SameSite::Lax)
///     .max_age(3600);
/// assert_eq!(options.path.as_deref(), Some("/"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CookieOptions {
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub http_only: bool,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub same_site: Option<SameSite>,
    pub signed: bool,
    pub overwrite: Option<bool>,
}

impl CookieOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Sets `Max-Age` in seconds. It is only written alongside `SameSite`.
    #[must_use]
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    #[must_use]
    pub fn signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = Some(overwrite);
        self
    }
}

/// One cookie record.
///
/// A cookie without a value is an expiring record: its `Display` form clears the
/// cookie on the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    name: String,
    value: Option<String>,
    overwrite: bool,
    path: Option<String>,
    http_only: bool,
    domain: Option<String>,
    expires: Option<DateTime<Utc>>,
    max_age: Option<i64>,
    secure: bool,
    same_site: Option<SameSite>,
    signed: bool,
}

impl Cookie {
    /// Creates a cookie. An empty `value` produces an expiring record whose expiry
    /// is the Unix epoch, whatever `options.expires` says.
    pub fn new(name: impl Into<String>, value: impl Into<String>, options: &CookieOptions) -> Self {
        let value = Some(value.into()).filter(|v| !v.is_empty());
        let expires = match value {
            Some(_) => options.expires,
            None => Some(DateTime::<Utc>::UNIX_EPOCH),
        };
        Self {
            name: name.into(),
            value,
            overwrite: options.overwrite.unwrap_or(true),
            path: options.path.clone(),
            http_only: options.http_only,
            domain: options.domain.clone(),
            expires,
            max_age: options.max_age,
            secure: options.secure,
            same_site: options.same_site,
            signed: options.signed,
        }
    }

    /// An expiring record that clears `name` on the client, scoped to `path`.
    pub fn expired(name: impl Into<String>, path: Option<String>) -> Self {
        let options = CookieOptions {
            path,
            ..CookieOptions::default()
        };
        Self::new(name, "", &options)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The decoded value; `None` for an expiring record.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Whether this record is sent to the client as `Set-Cookie`.
    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    pub fn max_age(&self) -> Option<i64> {
        self.max_age
    }

    pub fn http_only(&self) -> bool {
        self.http_only
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn same_site(&self) -> Option<SameSite> {
        self.same_site
    }

    pub fn signed(&self) -> bool {
        self.signed
    }
}

impl fmt::Display for Cookie {
    /// Renders the `Set-Cookie` header value. Attribute order is fixed:
    /// Expires, HttpOnly, Secure, Domain, Path, SameSite (and Max-Age after it).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(value) = &self.value else {
            return write!(
                f,
                "{}=; Expires={}; Path={}",
                self.name,
                DateTime::<Utc>::UNIX_EPOCH.format(HTTP_DATE),
                self.path.as_deref().unwrap_or("/")
            );
        };

        write!(f, "{}={}", self.name, utf8_percent_encode(value, COOKIE_VALUE))?;
        if let Some(expires) = &self.expires {
            write!(f, "; Expires={}", expires.format(HTTP_DATE))?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; SameSite={same_site}")?;
            if let Some(max_age) = self.max_age {
                write!(f, "; Max-Age={max_age}")?;
            }
        }
        Ok(())
    }
}

/// Ordered cookie store for one request.
///
/// Iteration follows first-insertion order; setting an existing name replaces the
/// record in place.
#[derive(Debug, Clone, Default)]
pub struct CookieStorage {
    cookies: Vec<Cookie>,
}

impl CookieStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from name/value pairs, each created with `options`.
    pub fn from_pairs<I, K, V>(pairs: I, options: &CookieOptions) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut storage = Self::new();
        for (name, value) in pairs {
            storage.put(Cookie::new(name, value, options));
        }
        storage
    }

    /// Builds a store from an inbound `Cookie` header. The entries are not
    /// retransmitted unless they are set again.
    ///
    /// ```
    /// use canopy::cookie::CookieStorage;
    ///
    /// let store = CookieStorage::from_header("token=abc; theme=dark%20blue");
    /// assert_eq!(store.get("theme").and_then(|c| c.value()), Some("dark blue"));
    /// assert!(!store.get("token").unwrap().overwrite());
    /// ```
    pub fn from_header(header: &str) -> Self {
        Self::from_pairs(parse_cookies(header), &CookieOptions::new().overwrite(false))
    }

    /// Sets (or replaces) a cookie.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>, options: &CookieOptions) {
        self.put(Cookie::new(name, value, options));
    }

    /// Replaces an existing cookie with an expiring record that keeps its path.
    /// Unknown names are ignored.
    pub fn delete(&mut self, name: &str) {
        let path = match self.get(name) {
            Some(cookie) => cookie.path.clone(),
            None => return,
        };
        self.put(Cookie::expired(name, path));
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    fn put(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(slot) => *slot = cookie,
            None => self.cookies.push(cookie),
        }
    }
}

/// Parses a `Cookie` header (`k=v; k2=v2`) into percent-decoded pairs.
pub fn parse_cookies(input: &str) -> Vec<(String, String)> {
    input
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, value) = entry.split_once('=').unwrap_or((entry, ""));
            let value = percent_decode_str(value).decode_utf8_lossy().into_owned();
            (name.to_owned(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn full_options() -> CookieOptions {
        CookieOptions::new()
            .http_only(true)
            .path("/")
            .domain("localhost.com")
            .expires(Utc.with_ymd_and_hms(2024, 6, 17, 13, 24, 0).unwrap())
            .max_age(12345)
            .secure(true)
            .same_site(SameSite::Lax)
            .signed(true)
    }

    // ── Cookie ────────────────────────────────────────────────────────────────

    #[test]
    fn cookie_defaults() {
        let cookie = Cookie::new("test", "val", &CookieOptions::new());
        assert_eq!(cookie.name(), "test");
        assert_eq!(cookie.value(), Some("val"));
        assert!(cookie.overwrite());
        assert_eq!(cookie.expires(), None);
        assert_eq!(cookie.to_string(), "test=val");
    }

    #[test]
    fn cookie_with_options() {
        let options = full_options();
        let cookie = Cookie::new("foo", "bar", &options);
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("localhost.com"));
        assert_eq!(cookie.expires(), options.expires);
        assert_eq!(cookie.max_age(), Some(12345));
        assert!(cookie.http_only());
        assert!(cookie.secure());
        assert!(cookie.signed());
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn cookie_attribute_order() {
        let cookie = Cookie::new("foo", "bar", &full_options());
        assert_eq!(
            cookie.to_string(),
            "foo=bar; Expires=Mon, 17 Jun 2024 13:24:00 GMT; HttpOnly; Secure; \
             Domain=localhost.com; Path=/; SameSite=lax; Max-Age=12345"
        );
    }

    #[test]
    fn max_age_needs_same_site() {
        let cookie = Cookie::new("a", "b", &CookieOptions::new().max_age(60));
        assert_eq!(cookie.to_string(), "a=b");
    }

    #[test]
    fn cookie_value_is_percent_encoded_on_output() {
        let cookie = Cookie::new("foo", "$(test-value:;&)", &CookieOptions::new());
        assert_eq!(cookie.value(), Some("$(test-value:;&)"));
        assert_eq!(cookie.to_string(), "foo=%24(test-value%3A%3B%26)");
    }

    #[test]
    fn empty_value_is_an_expiring_record() {
        let cookie = Cookie::new("gone", "", &CookieOptions::new().path("/app"));
        assert_eq!(cookie.value(), None);
        assert_eq!(cookie.expires(), Some(DateTime::<Utc>::UNIX_EPOCH));
        assert_eq!(
            cookie.to_string(),
            "gone=; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/app"
        );
    }

    // ── CookieStorage ─────────────────────────────────────────────────────────

    #[test]
    fn storage_from_pairs_keeps_order() {
        let store = CookieStorage::from_pairs([("foo", "bar"), ("bar", "baz")], &CookieOptions::new());
        let names: Vec<_> = store.iter().map(Cookie::name).collect();
        assert_eq!(names, vec!["foo", "bar"]);
        assert_eq!(store.get("bar").and_then(Cookie::value), Some("baz"));
    }

    #[test]
    fn storage_get_missing() {
        let store = CookieStorage::from_header("foo=bar");
        assert!(store.get("bar").is_none());
    }

    #[test]
    fn storage_set_and_len() {
        let mut store = CookieStorage::from_header("foo=bar");
        assert_eq!(store.len(), 1);
        store.set("bar", "baz", &CookieOptions::new());
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("foo").and_then(Cookie::value), Some("bar"));
        assert!(store.get("bar").unwrap().overwrite());
    }

    #[test]
    fn storage_set_replaces_in_place() {
        let mut store = CookieStorage::from_header("a=1; b=2");
        store.set("a", "3", &CookieOptions::new());
        let values: Vec<_> = store.iter().map(|c| c.value().unwrap()).collect();
        assert_eq!(values, vec!["3", "2"]);
    }

    #[test]
    fn storage_delete_keeps_path_and_marks_for_transmission() {
        let mut store = CookieStorage::new();
        store.set("session", "xyz", &CookieOptions::new().path("/"));
        store.delete("session");

        let cookie = store.get("session").unwrap();
        assert_eq!(cookie.value(), None);
        assert_eq!(cookie.path(), Some("/"));
        assert!(cookie.overwrite());
        assert!(cookie.expires().unwrap() < Utc::now());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn storage_delete_inbound_cookie_turns_on_overwrite() {
        let mut store = CookieStorage::from_header("foo=bar");
        assert!(!store.get("foo").unwrap().overwrite());
        store.delete("foo");
        assert!(store.get("foo").unwrap().overwrite());
    }

    #[test]
    fn storage_delete_unknown_is_noop() {
        let mut store = CookieStorage::new();
        store.delete("nothing");
        assert!(store.is_empty());
    }

    // ── parse_cookies ─────────────────────────────────────────────────────────

    #[test]
    fn parse_empty() {
        assert!(parse_cookies("").is_empty());
    }

    #[test]
    fn parse_pairs() {
        let parsed = parse_cookies("token=NVusVh37Vhs759VjDS8vjoiDB9rn7d1; example=SbhSDydj2");
        assert_eq!(
            parsed,
            vec![
                ("token".to_owned(), "NVusVh37Vhs759VjDS8vjoiDB9rn7d1".to_owned()),
                ("example".to_owned(), "SbhSDydj2".to_owned()),
            ]
        );
    }

    #[test]
    fn parse_percent_encoded() {
        let parsed = parse_cookies("first=Hello%20World%3B; second=%24(test-value%3A%3F)");
        assert_eq!(parsed[0].1, "Hello World;");
        assert_eq!(parsed[1].1, "$(test-value:?)");
    }
}
