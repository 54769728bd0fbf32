use std::fmt;


#[inline(always)]
pub fn is_content_length(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-length")
}

/// Decodes header bytes as ISO-8859-1
///
/// Every byte maps to exactly one char so this never fails.
pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Header multimap
///
/// Names are compared case-insensitively. Setting a name that is already
/// present replaces the old value, so the last value wins. Iteration
/// yields headers in the order names were first set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    items: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Headers {
        Headers { items: Vec::new() }
    }
    pub fn set<N, V>(&mut self, name: N, value: V)
        where N: Into<String>, V: Into<String>
    {
        let name = name.into();
        let value = value.into();
        match self.items.iter_mut()
            .find(|item| item.0.eq_ignore_ascii_case(&name))
        {
            Some(item) => item.1 = value,
            None => self.items.push((name, value)),
        }
    }
    pub fn get(&self, name: &str) -> Option<&str> {
        self.items.iter()
            .find(|item| item.0.eq_ignore_ascii_case(name))
            .map(|item| &item.1[..])
    }
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self.items.iter()
            .position(|item| item.0.eq_ignore_ascii_case(name))?;
        Some(self.items.remove(pos).1)
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item=(&str, &str)> {
        self.items.iter().map(|item| (&item.0[..], &item.1[..]))
    }
}

/// Writes `Name: Value\r\n` for every header
impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (name, value) in self.iter() {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        Ok(())
    }
}
