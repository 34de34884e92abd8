//! # Template Engine
//!
//! Strict text templates for generated resources, built on minijinja:
//! - Undefined variables are errors (`UndefinedBehavior::Strict`)
//! - Unregistered filters are errors
//! - Syntax is checked when a [`Template`] is compiled, so a broken template
//!   is rejected while mappings load rather than at render time
//! - Output may hold several YAML documents separated by a `---` line
//!
//! Registered filters: `dns_safe`, `env_safe`, `b64encode`, `b64decode`
//! (plus minijinja's builtins such as `tojson`, `items` and `default`).

mod context;
mod error;
mod filters;

pub use context::RenderContext;
pub use error::TemplateError;
pub use filters::{dns_safe, env_safe};

use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use std::sync::{Arc, LazyLock};

static ENVIRONMENT: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    // Debug info embeds variable values into error output
    env.set_debug(false);

    env.add_filter("dns_safe", filters::dns_safe_filter);
    env.add_filter("env_safe", filters::env_safe_filter);
    env.add_filter("b64encode", filters::b64encode);
    env.add_filter("b64decode", filters::b64decode);
    env
});

/// A compiled resource template
///
/// Stateless after compilation; cloning shares the source.
#[derive(Debug, Clone)]
pub struct Template {
    name: Arc<str>,
    source: Arc<str>,
}

impl Template {
    /// Compile `source`, failing fast on syntax errors
    pub fn compile(name: &str, source: &str) -> Result<Self, TemplateError> {
        ENVIRONMENT
            .template_from_named_str(name, source)
            .map_err(|e| TemplateError::Syntax {
                template: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name: Arc::from(name),
            source: Arc::from(source),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render against `ctx`
    ///
    /// Errors name the offending identifier and dump the supplied variables
    /// with every secret value masked.
    pub fn render(&self, ctx: &RenderContext) -> Result<String, TemplateError> {
        let template = ENVIRONMENT
            .template_from_named_str(&self.name, &self.source)
            .map_err(|e| TemplateError::Syntax {
                template: self.name.to_string(),
                message: ctx.mask(&e.to_string()),
            })?;

        template.render(ctx).map_err(|e| {
            let message = ctx.mask(&e.to_string());
            let variables = ctx.diagnostic();
            match e.kind() {
                ErrorKind::UndefinedError => {
                    let mut names: Vec<String> = template
                        .undeclared_variables(true)
                        .into_iter()
                        .filter(|path| !ctx.resolves(path))
                        .collect();
                    names.sort();
                    if names.is_empty() {
                        names.push(message);
                    }
                    TemplateError::UndefinedVariable {
                        template: self.name.to_string(),
                        names,
                        variables,
                    }
                }
                ErrorKind::UnknownFilter => TemplateError::UnknownFilter {
                    template: self.name.to_string(),
                    message,
                    variables,
                },
                _ => TemplateError::Render {
                    template: self.name.to_string(),
                    message,
                    variables,
                },
            }
        })
    }
}

/// Split rendered output into documents.
///
/// A line consisting of exactly `---` separates documents. Documents that are
/// empty or whitespace-only are dropped.
pub fn split_documents(rendered: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();

    for line in rendered.lines() {
        if line.trim_end_matches('\r') == "---" {
            documents.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    documents.push(current);

    documents
        .into_iter()
        .filter(|doc| !doc.trim().is_empty())
        .collect()
}
