//! Ordered header list.
//!
//! Headers are kept as a plain `Vec` of name/value pairs so that every copy
//! (request parsing, response buffering, the final write to hyper) preserves
//! the order in which they were added. Lookups are case-insensitive, names
//! are stored as given.

/// An ordered multimap of HTTP header name/value pairs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a value, keeping any existing values for `name`.
    pub fn add(&mut self, name: &str, value: &str) {
        self.0.push((name.to_owned(), value.to_owned()));
    }

    /// Replaces every value of `name` with `value`.
    ///
    /// The new pair takes the position of the first removed one, or goes to
    /// the end if `name` was absent.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.0.iter().position(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(first) => {
                self.0[first].1 = value.to_owned();
                let mut index = 0;
                self.0.retain(|(k, _)| {
                    let keep = index <= first || !k.eq_ignore_ascii_case(name);
                    index += 1;
                    keep
                });
            }
            None => self.add(name, value),
        }
    }

    /// Removes every value of `name`.
    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// First value of `name`, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0.iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Headers {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut headers = Headers::new();
        headers.add("X-Request-ID", "abc");
        assert_eq!(headers.get("x-request-id"), Some("abc"));
        assert_eq!(headers.get("x-missing"), None);
    }

    #[test]
    fn add_keeps_insertion_order() {
        let mut headers = Headers::new();
        headers.add("x-pre", "Logging");
        headers.add("content-type", "text/plain");
        headers.add("x-pre", "Tracing");

        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, [
            ("x-pre", "Logging"),
            ("content-type", "text/plain"),
            ("x-pre", "Tracing"),
        ]);
        assert_eq!(headers.get_all("X-Pre").collect::<Vec<_>>(), ["Logging", "Tracing"]);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut headers: Headers = [("a", "1"), ("b", "2"), ("A", "3")].into_iter().collect();
        headers.set("a", "9");
        assert_eq!(headers.iter().collect::<Vec<_>>(), [("a", "9"), ("b", "2")]);

        headers.set("c", "4");
        assert_eq!(headers.iter().last(), Some(("c", "4")));
    }

    #[test]
    fn remove_drops_every_value() {
        let mut headers: Headers = [("a", "1"), ("b", "2"), ("A", "3")].into_iter().collect();
        headers.remove("A");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("b"), Some("2"));
    }
}
