use std::fmt;
use std::sync::LazyLock;

use haltree_base::{HaltreeError, HaltreeResult};
use regex::Regex;

/* 📖 # Why a small directive language for relationships?

A relationship field says how its target appears in the rendered document:
`embed()` inlines the target, `embed(name,env)` inlines only some of its fields,
`link()` adds an href to the parent's links and `page(1,20)` records paging defaults.
Directives are separated by `;`, e.g. `embed(name); link()`.

Parsing happens once while compiling the schema, so any mistake in a directive string
stops the process at start-up instead of surfacing on some request later.
*/

static DIRECTIVE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(?P<name>[^()\s]*)\s*\((?P<params>[^()]*)$"));

/// Metadata governing how a relationship is navigated and rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipTag {
    /// Relation name, always lower-cased. Empty only for the root.
    pub rel: String,
    pub embed: bool,
    /// Fields kept when embedding; empty means all fields.
    pub embed_fields: Vec<String>,
    pub link: bool,
    pub page: bool,
    pub page_number: i64,
    pub page_size: i64,
}

impl RelationshipTag {
    /// The tag of the root node, which is not reached through any relationship.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a `;`-separated directive string for the relation `rel`.
    pub fn parse(rel: &str, directives: &str) -> HaltreeResult<Self> {
        if rel.is_empty() {
            return Err(Box::new(HaltreeError::compile("Tags require rel")));
        }
        let pattern = DIRECTIVE.as_ref().map_err(|e| {
            HaltreeError::compile(format!("Invalid directive pattern: {}", e))
        })?;
        let mut tag = Self {
            rel: rel.to_lowercase(),
            ..Self::default()
        };
        for directive in directives.split(';') {
            tag.apply(pattern, directive)?;
        }
        Ok(tag)
    }

    fn apply(&mut self, pattern: &Regex, directive: &str) -> HaltreeResult<()> {
        let trimmed = directive.trim();
        let trimmed = trimmed.strip_suffix(')').unwrap_or(trimmed).trim();
        let captures = pattern.captures(trimmed).ok_or_else(|| {
            HaltreeError::compile(format!(
                "Tag '{}' not recognised. Format is tagname(params)",
                trimmed
            ))
        })?;
        let params = captures["params"].trim();
        match &captures["name"] {
            "embed" => {
                self.embed = true;
                self.embed_fields = if params.is_empty() {
                    vec![]
                } else {
                    params.split(',').map(|f| f.trim().to_string()).collect()
                };
            }
            "link" => {
                if !params.is_empty() {
                    return Err(Box::new(HaltreeError::compile(format!(
                        "link tag; got params '{}', expected no parameters",
                        params
                    ))));
                }
                self.link = true;
            }
            "page" => self.apply_page(params)?,
            other => {
                return Err(Box::new(HaltreeError::compile(format!(
                    "Tag name '{}' not recognised, expected embed, link or page",
                    other
                ))));
            }
        }
        Ok(())
    }

    fn apply_page(&mut self, params: &str) -> HaltreeResult<()> {
        let parts: Vec<&str> = params.split(',').map(str::trim).collect();
        if parts.len() > 2 {
            return Err(Box::new(HaltreeError::compile(format!(
                "page tag; got params '{}', expected 2 integers separated with a comma",
                params
            ))));
        }
        self.page = true;
        self.page_number = parse_page_param(parts[0], "page number")?;
        if let Some(size) = parts.get(1) {
            self.page_size = parse_page_param(size, "page size")?;
        }
        Ok(())
    }
}

fn parse_page_param(raw: &str, what: &str) -> HaltreeResult<i64> {
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse::<i64>().map_err(|_| {
        Box::new(HaltreeError::compile(format!(
            "Unable to parse {}: '{}'",
            what, raw
        )))
    })
}

impl fmt::Display for RelationshipTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rel)?;
        if self.embed {
            write!(f, " embed({})", self.embed_fields.join(","))?;
        }
        if self.link {
            write!(f, " link()")?;
        }
        if self.page {
            write!(f, " page({},{})", self.page_number, self.page_size)?;
        }
        Ok(())
    }
}
