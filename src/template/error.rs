//! Template error types
//!
//! Messages may carry a dump of the supplied variables for diagnosis. Secret
//! values are masked before they ever reach an error.

use thiserror::Error;

/// Errors that can occur while compiling or rendering a template
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template source failed to parse
    #[error("template '{template}' has a syntax error: {message}")]
    Syntax { template: String, message: String },

    /// A referenced variable is not defined in the render context
    #[error("template '{template}' references undefined variable(s) {names:?} (supplied: {variables})")]
    UndefinedVariable {
        template: String,
        names: Vec<String>,
        variables: String,
    },

    /// A filter that is not registered was invoked
    #[error("template '{template}' uses an unknown filter: {message} (supplied: {variables})")]
    UnknownFilter {
        template: String,
        message: String,
        variables: String,
    },

    /// Any other render-time failure
    #[error("template '{template}' failed to render: {message} (supplied: {variables})")]
    Render {
        template: String,
        message: String,
        variables: String,
    },
}

impl TemplateError {
    /// Name of the template that failed
    pub fn template(&self) -> &str {
        match self {
            Self::Syntax { template, .. }
            | Self::UndefinedVariable { template, .. }
            | Self::UnknownFilter { template, .. }
            | Self::Render { template, .. } => template,
        }
    }
}
