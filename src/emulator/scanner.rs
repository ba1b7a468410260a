//! Discovery of import-annotated native methods.
//!
//! The scanner looks only at the structural part of a class: method access flags, names,
//! descriptors and the two annotation attributes. `Code` attributes are never decoded, and the
//! annotation attributes of non-native methods are not even parsed.
//!
//! A method whose annotation cannot be turned into an [`ImportAnnotation`] is skipped and
//! reported as a [`Diagnostic`]; the remaining methods of the class are still collected.

use std::fmt;

use crate::{
    classfile::{
        annotations::{parse_annotations, Annotation},
        attributes::names,
        ClassFile, MethodInfo,
    },
    emulator::{annotation::is_script_identifier, ImportAnnotation, ImportRegistry, MethodKey},
    Result,
};

/// Element names of the import annotation.
pub mod element {
    /// Overrides the module name
    pub const MODULE: &str = "module";
    /// Overrides the function name
    pub const NAME: &str = "name";
    /// The script body
    pub const JS: &str = "js";
    /// Accepted alias of [`JS`]
    pub const SCRIPT: &str = "script";
}

/// A problem with one method's import annotation. The method is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Internal name of the class
    pub class: String,
    /// Name and descriptor of the method
    pub method: MethodKey,
    /// What was wrong
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.class, self.method, self.message)
    }
}

/// Result of scanning one class.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// The import-annotated native methods
    pub registry: ImportRegistry,
    /// Methods skipped because of malformed annotations
    pub diagnostics: Vec<Diagnostic>,
}

/// Scans `class` for native methods carrying the annotation `annotation_descriptor`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the class name or a native method's name or
/// descriptor cannot be resolved. Annotation problems are not errors; see [`Diagnostic`].
///
/// # Examples
///
/// ```rust,no_run
/// use importshim::classfile::ClassFile;
/// use importshim::emulator::scan;
///
/// let class = ClassFile::from_path("Bindings.class")?;
/// let result = scan(&class, "Lde/inetsoftware/jwebassembly/api/annotation/Import;")?;
/// for (method, annotation) in result.registry.iter() {
///     println!("{} -> {}", method, annotation);
/// }
/// # Ok::<(), importshim::Error>(())
/// ```
pub fn scan(class: &ClassFile, annotation_descriptor: &str) -> Result<ScanResult> {
    let class_name = class.this_class_name()?;
    let default_module = crate::classfile::simple_name(&class_name);
    let mut result = ScanResult::default();

    for method in class.methods.iter().filter(|m| m.access_flags.is_native()) {
        let name = class.method_name(method)?;
        let descriptor = class.method_descriptor(method)?;
        let key = MethodKey::new(name.as_ref(), descriptor.as_ref());

        match import_annotation(class, method, annotation_descriptor, default_module, &name) {
            Ok(Some(annotation)) => result.registry.insert(key, annotation),
            Ok(None) => {}
            Err(message) => result.diagnostics.push(Diagnostic {
                class: class_name.to_string(),
                method: key,
                message,
            }),
        }
    }

    Ok(result)
}

fn find_annotation(
    class: &ClassFile,
    method: &MethodInfo,
    annotation_descriptor: &str,
) -> std::result::Result<Option<Annotation>, String> {
    let pool = &class.constant_pool;
    for attribute_name in [
        names::RUNTIME_INVISIBLE_ANNOTATIONS,
        names::RUNTIME_VISIBLE_ANNOTATIONS,
    ] {
        let Some(attribute) = method.attribute(pool, attribute_name) else {
            continue;
        };
        let annotations = parse_annotations(&attribute.data)
            .map_err(|e| format!("unreadable {}: {}", attribute_name, e))?;
        for annotation in annotations {
            let descriptor = annotation
                .type_descriptor(pool)
                .map_err(|e| format!("unreadable annotation type: {}", e))?;
            if descriptor == annotation_descriptor {
                return Ok(Some(annotation));
            }
        }
    }
    Ok(None)
}

fn import_annotation(
    class: &ClassFile,
    method: &MethodInfo,
    annotation_descriptor: &str,
    default_module: &str,
    method_name: &str,
) -> std::result::Result<Option<ImportAnnotation>, String> {
    let Some(annotation) = find_annotation(class, method, annotation_descriptor)? else {
        return Ok(None);
    };

    let pool = &class.constant_pool;
    let mut module = default_module.to_string();
    let mut name = method_name.to_string();
    let mut script = None;

    for element in annotation.named_elements(pool) {
        let (element_name, value) = element.map_err(|e| format!("unreadable element name: {}", e))?;
        let target = match element_name.as_ref() {
            element::MODULE => &mut module,
            element::NAME => &mut name,
            element::JS | element::SCRIPT => script.get_or_insert_with(String::new),
            // elements of other annotation versions are ignored
            _ => continue,
        };
        *target = value
            .as_string(pool)
            .map_err(|e| format!("element '{}' is not a string: {}", element_name, e))?
            .into_owned();
    }

    if !is_script_identifier(&module) {
        return Err(format!("module {:?} is not a valid script identifier", module));
    }
    if !is_script_identifier(&name) {
        return Err(format!("name {:?} is not a valid script identifier", name));
    }

    Ok(Some(ImportAnnotation::new(module, name, script)))
}
