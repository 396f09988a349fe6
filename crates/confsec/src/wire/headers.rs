//! Ordered, case-preserving header list

/// HTTP headers in caller order
///
/// Names keep their original casing, lookups ignore case. Unlike
/// `http::HeaderMap` nothing is normalized, so the serialized request carries
/// exactly what the caller supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Empty header list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing entries with the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace the value of the first header named `name` in place, or append
    /// it. Later duplicates are removed.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(index) => {
                self.entries[index].1 = value;
                let mut seen = 0usize;
                self.entries.retain(|(existing, _)| {
                    if existing.eq_ignore_ascii_case(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// First value of the header named `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|index| self.entries[index].1.as_str())
    }

    /// Whether a header named `name` is present
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Remove every header named `name`
    pub fn remove(&mut self, name: &str) {
        self.entries
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
    }

    /// Iterate over `(name, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl<N, V> FromIterator<(N, V)> for Headers
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

impl<N, V, const L: usize> From<[(N, V); L]> for Headers
where
    N: Into<String>,
    V: Into<String>,
{
    fn from(entries: [(N, V); L]) -> Self {
        entries.into_iter().collect()
    }
}

impl IntoIterator for Headers {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let headers = Headers::from([("Content-Type", "application/json")]);
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert!(headers.contains("CONTENT-TYPE"));
        assert!(!headers.contains("host"));
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut headers = Headers::from([
            ("Accept", "*/*"),
            ("X-Confsec-Node-Tags", "foo=bar"),
            ("User-Agent", "test"),
            ("x-confsec-node-tags", "dup=1"),
        ]);

        headers.set("x-confsec-node-tags", "foo=bar,model=gpt-x");

        let entries: Vec<_> = headers.iter().collect();
        assert_eq!(
            entries,
            vec![
                ("Accept", "*/*"),
                ("X-Confsec-Node-Tags", "foo=bar,model=gpt-x"),
                ("User-Agent", "test"),
            ]
        );
    }

    #[test]
    fn test_set_appends_when_missing() {
        let mut headers = Headers::from([("Accept", "*/*")]);
        headers.set("x-confsec-node-tags", "model=gpt-x");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("X-CONFSEC-NODE-TAGS"), Some("model=gpt-x"));
    }

    #[test]
    fn test_remove() {
        let mut headers = Headers::from([("a", "1"), ("B", "2"), ("A", "3")]);
        headers.remove("a");
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec![("B", "2")]);
    }
}
