//! Ordered header fields with case-insensitive names.

use std::fmt;

/// One `name: value` header line. The name keeps the case it was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    name: String,
    value: String,
}

impl Field {
    fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Header fields in the order they were added.
///
/// A name may occur several times (`Set-Cookie`). Lookups ignore ASCII case,
/// output keeps the case each field was inserted with.
///
/// ```
/// use canopy::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "text/html; charset=utf-8");
/// headers.insert("Set-Cookie", "a=1");
/// headers.insert("Set-Cookie", "b=2");
///
/// assert_eq!(headers.get("content-type"), Some("text/html; charset=utf-8"));
/// assert_eq!(headers.get_all("set-cookie").collect::<Vec<_>>(), ["a=1", "b=2"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<Field>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Adds a field after the existing ones, even if the name is already present.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Leaves exactly one field called `name`.
    ///
    /// It sits where the first old field of that name was, or at the end.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let field = Field {
            name: name.into(),
            value: value.into(),
        };
        let Some(first) = self.fields.iter().position(|f| f.is(&field.name)) else {
            self.fields.push(field);
            return;
        };
        let mut kept = Vec::with_capacity(self.fields.len());
        for (i, old) in self.fields.drain(..).enumerate() {
            if i == first {
                kept.push(field.clone());
            } else if !old.is(&field.name) {
                kept.push(old);
            }
        }
        self.fields = kept;
    }

    /// Merges maps so that, per name, the earliest map carrying it wins outright.
    ///
    /// Every field of the first map is kept. A later map contributes only the
    /// names that no earlier map had, together with all their values.
    ///
    /// ```
    /// use canopy::http::Headers;
    ///
    /// let mut returned = Headers::new();
    /// returned.insert("X-Source", "handler");
    /// let mut accumulated = Headers::new();
    /// accumulated.insert("x-source", "earlier");
    /// accumulated.insert("X-Trace", "1");
    ///
    /// let merged = Headers::union([&returned, &accumulated]);
    /// assert_eq!(merged.get("x-source"), Some("handler"));
    /// assert_eq!(merged.get("x-trace"), Some("1"));
    /// assert_eq!(merged.len(), 2);
    /// ```
    pub fn union<'a>(maps: impl IntoIterator<Item = &'a Headers>) -> Headers {
        let mut merged = Headers::new();
        for map in maps {
            let claimed = merged.fields.len();
            let fresh: Vec<Field> = map
                .fields
                .iter()
                .filter(|f| !merged.fields[..claimed].iter().any(|m| m.is(&f.name)))
                .cloned()
                .collect();
            merged.fields.extend(fresh);
        }
        merged
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|f| f.is(name)).map(|f| f.value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.is(name))
            .map(|f| f.value.as_str())
    }

    /// Drops every field called `name`; `true` if there was one.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| !f.is(name));
        self.fields.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.is(name))
    }

    /// Number of fields, counting repeats.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|f| (f.name.as_str(), f.value.as_str()))
    }
}

/// Renders the fields as wire lines, each ending in CRLF.
impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fields
            .iter()
            .try_for_each(|field| write!(f, "{}: {}\r\n", field.name, field.value))
    }
}
