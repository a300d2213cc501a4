//! Filter option strings (`key=value:key=value`)

use std::fmt;

/// Ordered filter options rendered as `name=k=v:k=v`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    name: &'static str,
    options: Vec<(&'static str, String)>,
}

impl FilterSpec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            options: Vec::new(),
        }
    }

    /// Append an option, keeping insertion order
    pub fn opt(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.options.push((key, value.to_string()));
        self
    }

    /// Append an option only when `condition` holds
    pub fn opt_if(self, condition: bool, key: &'static str, value: impl fmt::Display) -> Self {
        if condition {
            self.opt(key, value)
        } else {
            self
        }
    }

    /// Value of an option, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        for (i, (key, value)) in self.options.iter().enumerate() {
            let sep = if i == 0 { '=' } else { ':' };
            write!(f, "{}{}={}", sep, key, value)?;
        }
        Ok(())
    }
}

/// Join an optional pre-filter, a filter and an optional post-filter with `,`
pub fn filter_chain(pre: Option<&str>, filter: &str, post: Option<&str>) -> String {
    pre.into_iter()
        .chain(std::iter::once(filter))
        .chain(post)
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}
