use super::value::RenderedValue;

/* 📖 # How do field selectors work?

A selector is a comma separated list of dotted paths, e.g. `name,apps.name`. A bracketed
segment lists alternatives separated by colons, so `[a:b].c` is shorthand for `a.c,b.c`.
`*` matches any field.

A selector only ever looks at one nesting level: `allows` checks the first segment of
each pattern and `enter` strips it. When no pattern survives entering a field, the
selector is empty and lets everything below that point through.
*/

/// A compiled set of dotted field patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    patterns: Vec<String>,
}

impl FieldSelector {
    /// Compile a raw selector. An empty string selects everything.
    pub fn parse(raw: &str) -> Self {
        let patterns: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .flat_map(expand_clause)
            .collect();
        if patterns.is_empty() {
            return Self::all();
        }
        Self { patterns }
    }

    pub fn all() -> Self {
        Self {
            patterns: vec!["*".to_string()],
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True once every pattern has been used up by `enter`.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn allows(&self, field: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            let head = first_segment(pattern);
            head == field || head == "*"
        })
    }

    /// Narrow the selector to the patterns below `field`.
    pub fn enter(&self, field: &str) -> Self {
        let patterns = self
            .patterns
            .iter()
            .filter_map(|pattern| {
                let (head, rest) = pattern.split_once('.')?;
                (head == field).then(|| rest.to_string())
            })
            .collect();
        Self { patterns }
    }

    /// Prune `value` to the selected shape.
    pub fn filter(&self, value: RenderedValue) -> RenderedValue {
        if self.is_empty() {
            return value;
        }
        match value {
            RenderedValue::Sequence(items) => {
                RenderedValue::Sequence(items.into_iter().map(|item| self.filter(item)).collect())
            }
            RenderedValue::Record(record) => RenderedValue::Record(
                record
                    .into_iter()
                    .filter(|(name, _)| self.allows(name))
                    .map(|(name, value)| {
                        let value = self.enter(&name).filter(value);
                        (name, value)
                    })
                    .collect(),
            ),
            scalar => scalar,
        }
    }
}

impl Default for FieldSelector {
    fn default() -> Self {
        Self::all()
    }
}

fn first_segment(pattern: &str) -> &str {
    pattern.split_once('.').map_or(pattern, |(head, _)| head)
}

/// Expand the bracket alternatives of one clause into plain dotted paths.
fn expand_clause(clause: &str) -> Vec<String> {
    let mut expanded = vec![String::new()];
    for part in split_outside_brackets(clause) {
        let alternatives: Vec<&str> = match part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
            Some(inner) => inner.split(':').map(str::trim).collect(),
            None => vec![part.trim()],
        };
        expanded = expanded
            .iter()
            .flat_map(|prefix| {
                alternatives.iter().map(move |alternative| {
                    if prefix.is_empty() {
                        alternative.to_string()
                    } else {
                        format!("{}.{}", prefix, alternative)
                    }
                })
            })
            .collect();
    }
    expanded
}

fn split_outside_brackets(clause: &str) -> Vec<&str> {
    let mut parts = vec![];
    let mut depth = 0usize;
    let mut start = 0;
    for (index, c) in clause.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                parts.push(&clause[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&clause[start..]);
    parts
}
