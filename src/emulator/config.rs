//! Emulator configuration.
//!
//! [`EmulatorConfig`] collects every knob of the emulator: which annotation marks an import,
//! which static method the rewritten bodies call, which parameter classes are string-like
//! wrappers, the name of the namespace object in the script environment, and the lifecycle
//! timeouts.
//!
//! # Presets
//!
//! - [`EmulatorConfig::default()`] - 30 s boot timeout, unbounded execution
//! - [`EmulatorConfig::unbounded()`] - no timeouts at all
//! - [`EmulatorConfig::testing()`] - short timeouts for test suites
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use importshim::emulator::EmulatorConfig;
//!
//! let config = EmulatorConfig::default()
//!     .with_namespace("imports")
//!     .with_execute_timeout(Some(Duration::from_secs(5)));
//! assert_eq!(config.namespace, "imports");
//!
//! let config = EmulatorConfig::from_agent_args("namespace=env,boot_timeout_ms=0")?;
//! assert_eq!(config.boot_timeout, None);
//! # Ok::<(), importshim::Error>(())
//! ```

use std::time::Duration;

use crate::{Error, Result};

/// Descriptor of the import annotation.
pub const DEFAULT_IMPORT_ANNOTATION: &str = "Lde/inetsoftware/jwebassembly/api/annotation/Import;";

/// Internal name of the class whose static method the rewritten bodies call.
pub const DEFAULT_BRIDGE_CLASS: &str =
    "de/inetsoftware/jwebassembly/emulator/JWebAssemblyEmulator$JavaFxApplication";

/// Name of the bridge method. Its descriptor is always [`BRIDGE_DESCRIPTOR`].
pub const DEFAULT_BRIDGE_METHOD: &str = "executeScript";

/// `(String module, String name, Object[] args) -> Object`
pub const BRIDGE_DESCRIPTOR: &str =
    "(Ljava/lang/String;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;";

/// The string-like wrapper type of the DOM API.
pub const DEFAULT_STRING_WRAPPER: &str = "de/inetsoftware/jwebassembly/web/DOMString";

/// Name of the global object holding the module namespaces.
pub const DEFAULT_NAMESPACE: &str = "wasmImports";

/// Emulator configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulatorConfig {
    /// Field descriptor of the annotation type that marks an import
    pub import_annotation: String,

    /// Internal name of the class declaring the bridge method
    pub bridge_class: String,

    /// Name of the static bridge method, descriptor [`BRIDGE_DESCRIPTOR`]
    pub bridge_method: String,

    /// Internal names of parameter types that are converted to strings before the call.
    ///
    /// Values of these types cannot cross into the script engine as objects.
    pub string_wrappers: Vec<String>,

    /// Global object holding the module namespace objects.
    ///
    /// Found on the loaded page, or created empty.
    pub namespace: String,

    /// How long a launching thread waits for the page to load. `None` waits forever.
    pub boot_timeout: Option<Duration>,

    /// How long a caller waits for posted work. `None` waits forever.
    ///
    /// Work that times out keeps running on the engine thread.
    pub execute_timeout: Option<Duration>,

    /// Boot the engine with [`EmulatorConfig::default_page`] on first registration or execution.
    pub auto_boot: bool,

    /// Page content loaded by an automatic boot.
    pub default_page: String,

    /// Forward the script `console` to the `log` facade.
    pub forward_console: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        EmulatorConfig {
            import_annotation: DEFAULT_IMPORT_ANNOTATION.to_string(),
            bridge_class: DEFAULT_BRIDGE_CLASS.to_string(),
            bridge_method: DEFAULT_BRIDGE_METHOD.to_string(),
            string_wrappers: vec![DEFAULT_STRING_WRAPPER.to_string()],
            namespace: DEFAULT_NAMESPACE.to_string(),
            boot_timeout: Some(Duration::from_secs(30)),
            execute_timeout: None,
            auto_boot: true,
            default_page: String::new(),
            forward_console: true,
        }
    }
}

impl EmulatorConfig {
    /// Waits forever for boot and execution.
    #[must_use]
    pub fn unbounded() -> Self {
        EmulatorConfig {
            boot_timeout: None,
            execute_timeout: None,
            ..Default::default()
        }
    }

    /// Short timeouts so that a hanging engine fails a test instead of stalling the suite.
    #[must_use]
    pub fn testing() -> Self {
        EmulatorConfig {
            boot_timeout: Some(Duration::from_secs(5)),
            execute_timeout: Some(Duration::from_secs(10)),
            ..Default::default()
        }
    }

    /// Sets the import annotation descriptor.
    #[must_use]
    pub fn with_import_annotation(mut self, descriptor: impl Into<String>) -> Self {
        self.import_annotation = descriptor.into();
        self
    }

    /// Sets the bridge class and method.
    #[must_use]
    pub fn with_bridge(mut self, class: impl Into<String>, method: impl Into<String>) -> Self {
        self.bridge_class = class.into();
        self.bridge_method = method.into();
        self
    }

    /// Adds a string-like wrapper type.
    #[must_use]
    pub fn with_string_wrapper(mut self, class: impl Into<String>) -> Self {
        self.string_wrappers.push(class.into());
        self
    }

    /// Sets the namespace object name.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the boot timeout.
    #[must_use]
    pub fn with_boot_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.boot_timeout = timeout;
        self
    }

    /// Sets the execution timeout.
    #[must_use]
    pub fn with_execute_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.execute_timeout = timeout;
        self
    }

    /// Enables or disables the automatic boot.
    #[must_use]
    pub fn with_auto_boot(mut self, enabled: bool) -> Self {
        self.auto_boot = enabled;
        self
    }

    /// Sets the page content of the automatic boot.
    #[must_use]
    pub fn with_default_page(mut self, content: impl Into<String>) -> Self {
        self.default_page = content.into();
        self
    }

    /// Enables or disables console forwarding.
    #[must_use]
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.forward_console = enabled;
        self
    }

    /// Returns `true` if values of the class `internal_name` are converted to strings.
    #[must_use]
    pub fn is_string_wrapper(&self, internal_name: &str) -> bool {
        self.string_wrappers.iter().any(|w| w == internal_name)
    }

    /// Parses an agent argument string of comma separated `key=value` pairs on top of the
    /// defaults.
    ///
    /// Keys: `annotation`, `bridge` (`class#method`), `string_wrapper` (repeatable),
    /// `namespace`, `boot_timeout_ms`, `execute_timeout_ms` (`0` disables), `auto_boot`,
    /// `console`. Class names may use `.` or `/`.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for unknown keys and [`Error::Error`] for invalid values.
    pub fn from_agent_args(args: &str) -> Result<Self> {
        let mut config = EmulatorConfig::default();

        for pair in args.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| Error::Error(format!("Agent argument {:?} is not key=value", pair)))?;

            match key {
                "annotation" => {
                    let name = value.replace('.', "/");
                    config.import_annotation = if name.starts_with('L') && name.ends_with(';') {
                        name
                    } else {
                        format!("L{};", name)
                    };
                }
                "bridge" => {
                    let (class, method) = value.split_once('#').ok_or_else(|| {
                        Error::Error(format!("bridge {:?} must be class#method", value))
                    })?;
                    config.bridge_class = class.replace('.', "/");
                    config.bridge_method = method.to_string();
                }
                "string_wrapper" => config.string_wrappers.push(value.replace('.', "/")),
                "namespace" => config.namespace = value.to_string(),
                "boot_timeout_ms" => config.boot_timeout = parse_timeout(key, value)?,
                "execute_timeout_ms" => config.execute_timeout = parse_timeout(key, value)?,
                "auto_boot" => config.auto_boot = parse_bool(key, value)?,
                "console" => config.forward_console = parse_bool(key, value)?,
                other => {
                    return Err(Error::NotSupported(format!("Unknown agent argument {:?}", other)))
                }
            }
        }

        Ok(config)
    }
}

fn parse_timeout(key: &str, value: &str) -> Result<Option<Duration>> {
    let ms = value
        .parse::<u64>()
        .map_err(|_| Error::Error(format!("{} expects milliseconds, got {:?}", key, value)))?;
    Ok((ms > 0).then(|| Duration::from_millis(ms)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::Error(format!("{} expects a boolean, got {:?}", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EmulatorConfig::default();
        assert_eq!(config.namespace, "wasmImports");
        assert_eq!(config.boot_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.execute_timeout, None);
        assert!(config.auto_boot);
        assert!(config.is_string_wrapper("de/inetsoftware/jwebassembly/web/DOMString"));
    }

    #[test]
    fn test_presets() {
        assert_eq!(EmulatorConfig::unbounded().boot_timeout, None);
        assert!(EmulatorConfig::testing().execute_timeout.is_some());
    }

    #[test]
    fn test_agent_args() {
        let config = EmulatorConfig::from_agent_args(
            "annotation=com.acme.Native, bridge=com.acme.Host#call,string_wrapper=com.acme.Text,\
             boot_timeout_ms=250,execute_timeout_ms=0,auto_boot=false,console=off",
        )
        .unwrap();

        assert_eq!(config.import_annotation, "Lcom/acme/Native;");
        assert_eq!(config.bridge_class, "com/acme/Host");
        assert_eq!(config.bridge_method, "call");
        assert!(config.is_string_wrapper("com/acme/Text"));
        assert_eq!(config.boot_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.execute_timeout, None);
        assert!(!config.auto_boot);
        assert!(!config.forward_console);

        assert_eq!(EmulatorConfig::from_agent_args("").unwrap(), EmulatorConfig::default());
    }

    #[test]
    fn test_agent_args_errors() {
        assert!(matches!(
            EmulatorConfig::from_agent_args("colour=blue"),
            Err(Error::NotSupported(_))
        ));
        assert!(EmulatorConfig::from_agent_args("namespace").is_err());
        assert!(EmulatorConfig::from_agent_args("boot_timeout_ms=soon").is_err());
        assert!(EmulatorConfig::from_agent_args("bridge=NoMethod").is_err());
    }
}
