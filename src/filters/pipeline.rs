//! Filter directives and pipelines.
//!
//! A pipeline expression is a `|`-separated list of directives, each a
//! `,`-separated name followed by positional arguments:
//!
//! ```text
//! grayscale|colorize,40,20,0|unsharp_mask,80,0.5,3
//! ```
//!
//! Parsing here is purely syntactic. Names are resolved, and arguments
//! type-checked, only when the pipeline runs.

use std::fmt;

/// One step of a pipeline: a filter name plus raw argument tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterDirective {
    pub name: String,
    pub args: Vec<String>,
}

impl FilterDirective {
    pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse `name,arg1,arg2`. Returns `None` for an empty directive.
    pub fn parse(expr: &str) -> Option<Self> {
        let mut parts = expr.split(',').map(str::trim);
        let name = parts.next()?.to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            args: parts.map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for FilterDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            write!(f, ",{arg}")?;
        }
        Ok(())
    }
}

/// Ordered list of directives. Order is significant and preserved exactly;
/// duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterPipeline(Vec<FilterDirective>);

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(expr: &str) -> Self {
        Self(expr.split('|').filter_map(FilterDirective::parse).collect())
    }

    pub fn push(&mut self, directive: FilterDirective) {
        self.0.push(directive);
    }

    pub fn extend(&mut self, other: FilterPipeline) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FilterDirective> {
        self.0.iter()
    }
}

impl FromIterator<FilterDirective> for FilterPipeline {
    fn from_iter<T: IntoIterator<Item = FilterDirective>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FilterPipeline {
    type Item = &'a FilterDirective;
    type IntoIter = std::slice::Iter<'a, FilterDirective>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for FilterPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, directive) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{directive}")?;
        }
        Ok(())
    }
}
