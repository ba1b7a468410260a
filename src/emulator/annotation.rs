//! The import annotation triple.

use std::fmt;

/// The binding of one native method to a script function.
///
/// Built by the scanner from an `@Import` annotation with its defaults applied: `module`
/// defaults to the simple name of the declaring class, `name` to the method name. A missing
/// or empty script means the function must already exist in the script environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportAnnotation {
    /// Name of the module namespace object
    pub module: String,
    /// Name of the function inside the module
    pub name: String,
    /// Script source of the function, `None` to bind to an existing object
    pub script: Option<String>,
}

impl ImportAnnotation {
    /// Creates an annotation. An empty script is stored as `None`.
    pub fn new(module: impl Into<String>, name: impl Into<String>, script: Option<String>) -> Self {
        ImportAnnotation {
            module: module.into(),
            name: name.into(),
            script: script.filter(|s| !s.trim().is_empty()),
        }
    }

    /// Creates an annotation with a script body.
    pub fn with_script(
        module: impl Into<String>,
        name: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self::new(module, name, Some(script.into()))
    }

    /// Returns `true` if this annotation carries a script body.
    #[must_use]
    pub fn has_script(&self) -> bool {
        self.script.is_some()
    }

    /// The `(module, name)` pair identifying the installed function.
    #[must_use]
    pub fn key(&self) -> (String, String) {
        (self.module.clone(), self.name.clone())
    }
}

impl fmt::Display for ImportAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// Returns `true` if `value` can be used as a script identifier.
pub(crate) fn is_script_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
