use std::borrow::Cow;
use std::sync::LazyLock;

use minijinja::{Environment, UndefinedBehavior};
use regex::Regex;
use thiserror::Error;

use crate::dialogs::UnreadCounts;

pub const DEFAULT_FORMAT: &str = "{{.unread}}/{{.mentions}}";

/// Matches Go-template style fields such as `{{.unread}}` or `{{ .mentions }}`.
static DOT_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(-?)\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*(-?)\}\}").expect("valid dot field regex"));

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

/// How the final counts are printed.
#[derive(Clone, Debug)]
pub enum OutputFormat {
    /// Unread dialog count only, as a bare integer.
    CountOnly,
    Template(String),
}

impl OutputFormat {
    /// Builds a template format and checks that it renders.
    ///
    /// The check runs before any dialogs are fetched so a broken template
    /// never costs a full walk of the dialog list.
    pub fn template(source: &str) -> Result<Self, OutputError> {
        let source = normalize_placeholders(source).into_owned();
        render_template(&source, UnreadCounts::default())?;
        Ok(OutputFormat::Template(source))
    }

    pub fn render(&self, counts: UnreadCounts) -> Result<String, OutputError> {
        match self {
            OutputFormat::CountOnly => Ok(counts.unread.to_string()),
            OutputFormat::Template(source) => render_template(source, counts),
        }
    }
}

pub fn print_counts(format: &OutputFormat, counts: UnreadCounts) -> Result<(), OutputError> {
    let line = format.render(counts)?;
    println!("{line}");
    Ok(())
}

fn render_template(source: &str, counts: UnreadCounts) -> Result<String, OutputError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    Ok(env.render_str(source, counts)?)
}

/// Rewrites `{{.name}}` placeholders to `{{ name }}`, keeping trim markers.
fn normalize_placeholders(source: &str) -> Cow<'_, str> {
    DOT_FIELD_RE.replace_all(source, "{{$1 $2 $3}}")
}
