//! Template variables and the `{{ }}` text-expansion engine.
mod render;
mod vars;

use thiserror::Error;

pub use render::render;
pub use vars::{TemplateVars, VarsScope};

use crate::config::Node;
use crate::platform::Platform;

/// What a template can see while rendering.
pub trait Environment {
    /// Value of the template variable `name`.
    fn lookup(&self, name: &str) -> Option<Node>;
    /// Runtime facts for `OS`, `ARCH`, `Distro`, ...
    fn platform(&self) -> &Platform;
    /// Whether `sudo` can be used without a prompt (`CanSudo`).
    fn can_sudo(&self) -> bool;
}

/// Template parse and evaluation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// An action or block is never closed.
    #[error("unclosed action in {0:?}")]
    Unclosed(String),

    /// `else` or `end` without a matching `if`.
    #[error("unexpected {{{{ {0} }}}}")]
    Unexpected(String),

    /// The action calls a function that does not exist.
    #[error("function \"{0}\" not defined")]
    UnknownFunction(String),

    /// A function was called with the wrong number of arguments.
    #[error("wrong number of args for {name}: want {expected} got {got}")]
    Arity {
        /// Function name.
        name: String,
        /// Expected argument count.
        expected: usize,
        /// Actual argument count.
        got: usize,
    },

    /// The action text is malformed.
    #[error("template: {action:?}: {message}")]
    Syntax {
        /// Action body.
        action: String,
        /// What went wrong.
        message: String,
    },
}

/// `true` if `src` contains `{{` followed later by `}}`.
#[must_use]
pub fn has_template(src: &str) -> bool {
    src.find("{{")
        .and_then(|open| src.get(open..))
        .is_some_and(|rest| rest.contains("}}"))
}

/// Render `src` only when it contains an action; otherwise return it as is.
///
/// # Errors
///
/// Same as [`render`].
pub fn render_field(env: &dyn Environment, src: &str) -> Result<String, TemplateError> {
    if has_template(src) {
        render(env, src)
    } else {
        Ok(src.to_string())
    }
}

/// Render `src` and compare the result to `true`, ignoring case.
///
/// # Errors
///
/// Same as [`render`].
pub fn render_true(env: &dyn Environment, src: &str) -> Result<bool, TemplateError> {
    Ok(render(env, src)?.trim().eq_ignore_ascii_case("true"))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    struct Empty(Platform);

    impl Environment for Empty {
        fn lookup(&self, _name: &str) -> Option<Node> {
            None
        }
        fn platform(&self) -> &Platform {
            &self.0
        }
        fn can_sudo(&self) -> bool {
            true
        }
    }

    #[test]
    fn has_template_needs_both_delimiters() {
        assert!(has_template("a {{ OS }} b"));
        assert!(!has_template("a {{ b"));
        assert!(!has_template("}} {{"));
        assert!(!has_template("plain"));
    }

    #[test]
    fn render_field_passes_plain_text_through() {
        let env = Empty(Platform::new("linux", "amd64"));
        assert_eq!(render_field(&env, "~/.bashrc").unwrap(), "~/.bashrc");
        assert_eq!(render_field(&env, "{{ OS }}").unwrap(), "linux");
    }

    #[test]
    fn render_true_ignores_case() {
        let env = Empty(Platform::new("linux", "amd64"));
        assert!(render_true(&env, "TRUE").unwrap());
        assert!(render_true(&env, "{{ CanSudo }}").unwrap());
        assert!(!render_true(&env, "{{ IsRoot }}").unwrap());
        assert!(!render_true(&env, "yes").unwrap());
    }
}
