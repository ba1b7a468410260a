//! Generation of script proxy bodies for import-annotated native methods.
//!
//! For every registry entry the rewriter clears `ACC_NATIVE` and gives the method a `Code`
//! attribute of the form
//!
//! ```text
//! ldc "module"
//! ldc "name"
//! <argc>; anewarray java/lang/Object
//! dup; <i>; <xload slot>; <box>; aastore          (once per parameter)
//! invokestatic <bridge>(String, String, Object[]) Object
//! <unbox>; <xreturn>
//! ```
//!
//! Primitive parameters are boxed with the wrapper's `valueOf`, string-like wrapper objects are
//! turned into strings with `java.util.Objects.toString(Object, String)` so that `null` stays
//! `null`, everything else is passed as is. The body has no branches, so no `StackMapTable`
//! is needed.
//!
//! Before any method is touched, every proxy of the class is generated; a single method that
//! cannot be marshalled fails the whole class and leaves its methods unmodified. Registration with the
//! [`ScriptRegistrar`] happens only after generation succeeded.

use std::sync::Arc;

use crate::{
    bytecode::CodeEncoder,
    classfile::{
        attributes::{names, CodeAttribute},
        AttributeInfo, ClassFile, MethodSignature, ReturnKind, ValueKind,
    },
    emulator::{
        config::BRIDGE_DESCRIPTOR, EmulatorConfig, ImportAnnotation, ImportRegistry, MethodKey,
    },
    Result,
};

const OBJECT: &str = "java/lang/Object";
const NUMBER: &str = "java/lang/Number";
const BOOLEAN: &str = "java/lang/Boolean";
const OBJECTS: &str = "java/util/Objects";
const OBJECTS_TO_STRING: &str = "(Ljava/lang/Object;Ljava/lang/String;)Ljava/lang/String;";

/// Receives the annotations of rewritten methods so that their functions exist in the script
/// environment before the first call.
pub trait ScriptRegistrar: Send + Sync {
    /// Installs (or re-installs) the function described by `annotation`.
    ///
    /// # Errors
    /// Implementations return an error if the function cannot be registered, which aborts the
    /// rewrite of the class.
    fn register_script(&self, annotation: Arc<ImportAnnotation>) -> Result<()>;
}

/// A registrar that accepts everything and installs nothing, for offline instrumentation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistrar;

impl ScriptRegistrar for NoopRegistrar {
    fn register_script(&self, _annotation: Arc<ImportAnnotation>) -> Result<()> {
        Ok(())
    }
}

/// Record of one rewritten method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedMethod {
    /// Name and descriptor of the method
    pub method: MethodKey,
    /// The binding the proxy calls
    pub annotation: Arc<ImportAnnotation>,
}

/// Rewrites import-annotated native methods into script proxies.
pub struct MethodRewriter<'a> {
    config: &'a EmulatorConfig,
    registrar: &'a dyn ScriptRegistrar,
}

impl<'a> MethodRewriter<'a> {
    /// Creates a rewriter calling the bridge of `config` and registering with `registrar`.
    #[must_use]
    pub fn new(config: &'a EmulatorConfig, registrar: &'a dyn ScriptRegistrar) -> Self {
        MethodRewriter { config, registrar }
    }

    /// Rewrites every method of `class` that has an entry in `registry`.
    ///
    /// # Errors
    /// - [`crate::Error::Rewrite`] if a method's descriptor cannot be marshalled; the class is
    ///   left unmodified
    /// - [`crate::Error::Malformed`] if a method's name or descriptor cannot be resolved
    /// - any error of [`ScriptRegistrar::register_script`]
    pub fn rewrite(&self, class: &mut ClassFile, registry: &ImportRegistry) -> Result<Vec<PatchedMethod>> {
        let mut bodies = Vec::with_capacity(registry.len());
        for (index, method) in class.methods.iter().enumerate() {
            let name = class.constant_pool.utf8(method.name_index)?.into_owned();
            let descriptor = class.constant_pool.utf8(method.descriptor_index)?.into_owned();
            let Some(annotation) = registry.get(&name, &descriptor) else {
                continue;
            };
            bodies.push((index, MethodKey::new(name, descriptor), Arc::clone(annotation)));
        }

        let mut staged = Vec::with_capacity(bodies.len());
        for (index, key, annotation) in bodies {
            let is_static = class.methods[index].access_flags.is_static();
            let code = self.proxy_body(&mut class.constant_pool, &key, &annotation, is_static)?;
            staged.push((index, key, annotation, code));
        }

        let code_name = class.constant_pool.add_utf8(names::CODE)?;
        let mut patched = Vec::with_capacity(staged.len());
        for (index, key, annotation, code) in staged {
            self.registrar.register_script(Arc::clone(&annotation))?;

            let data = code.to_bytes()?;
            let method = &mut class.methods[index];
            method.access_flags.remove(crate::classfile::MethodAccess::NATIVE);
            method
                .attributes
                .retain(|a| !a.is_named(&class.constant_pool, names::CODE));
            method.attributes.insert(
                0,
                AttributeInfo {
                    name_index: code_name,
                    data,
                },
            );

            log::debug!("rewrote {} as proxy for {}", key, annotation);
            patched.push(PatchedMethod {
                method: key,
                annotation,
            });
        }

        Ok(patched)
    }

    /// Generates the proxy `Code` attribute for one method.
    ///
    /// # Errors
    /// Returns [`crate::Error::Rewrite`] if the descriptor cannot be marshalled.
    pub fn proxy_body(
        &self,
        pool: &mut crate::classfile::ConstantPool,
        method: &MethodKey,
        annotation: &ImportAnnotation,
        is_static: bool,
    ) -> Result<CodeAttribute> {
        let signature = MethodSignature::parse(&method.descriptor)
            .map_err(|e| rewrite_error!(method, "invalid descriptor: {}", e))?;

        let receiver: u32 = if is_static { 0 } else { 1 };
        let slots = receiver + signature.params.iter().map(|p| u32::from(p.slot_size())).sum::<u32>();
        if slots > 255 {
            return Err(rewrite_error!(
                method,
                "{} parameter slots exceed the limit of 255",
                slots
            ));
        }
        let argc = i32::try_from(signature.params.len())
            .map_err(|_| rewrite_error!(method, "too many parameters"))?;

        let mut encoder = CodeEncoder::new(pool);
        encoder
            .ldc_string(&annotation.module)?
            .ldc_string(&annotation.name)?
            .push_int(argc)?
            .anewarray(OBJECT)?;

        let mut slot = receiver as u16;
        for (position, kind) in signature.params.iter().enumerate() {
            encoder.dup()?.push_int(position as i32)?.load(kind, slot)?;
            self.marshal(&mut encoder, kind)?;
            encoder.aastore()?;
            slot += kind.slot_size();
        }

        encoder.invokestatic(&self.config.bridge_class, &self.config.bridge_method, BRIDGE_DESCRIPTOR)?;
        unmarshal(&mut encoder, &signature.ret)?;

        encoder.finalize(slot)
    }

    fn marshal(&self, encoder: &mut CodeEncoder, kind: &ValueKind) -> Result<()> {
        if let Some(wrapper) = kind.box_class() {
            let descriptor = format!("({})L{};", kind, wrapper);
            encoder.invokestatic(wrapper, "valueOf", &descriptor)?;
        } else if let ValueKind::Object(class) = kind {
            if self.config.is_string_wrapper(class) {
                encoder
                    .aconst_null()?
                    .invokestatic(OBJECTS, "toString", OBJECTS_TO_STRING)?;
            }
        }
        Ok(())
    }
}

fn unmarshal(encoder: &mut CodeEncoder, ret: &ReturnKind) -> Result<()> {
    let kind = match ret {
        ReturnKind::Void => {
            encoder.pop(1)?.return_value(ret)?;
            return Ok(());
        }
        ReturnKind::Value(kind) => kind,
    };

    match kind {
        ValueKind::Boolean => {
            encoder
                .checkcast(BOOLEAN)?
                .invokevirtual(BOOLEAN, "booleanValue", "()Z")?;
        }
        ValueKind::Byte | ValueKind::Char | ValueKind::Short | ValueKind::Int => {
            encoder
                .checkcast(NUMBER)?
                .invokevirtual(NUMBER, "intValue", "()I")?
                .narrow(kind)?;
        }
        ValueKind::Long => {
            encoder.checkcast(NUMBER)?.invokevirtual(NUMBER, "longValue", "()J")?;
        }
        ValueKind::Float => {
            encoder.checkcast(NUMBER)?.invokevirtual(NUMBER, "floatValue", "()F")?;
        }
        ValueKind::Double => {
            encoder.checkcast(NUMBER)?.invokevirtual(NUMBER, "doubleValue", "()D")?;
        }
        ValueKind::Object(class) if class == OBJECT => {}
        ValueKind::Object(_) | ValueKind::Array(_) => {
            if let Some(operand) = kind.class_operand() {
                encoder.checkcast(&operand)?;
            }
        }
    }

    encoder.return_value(ret)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        bytecode::{decode, Opcode},
        classfile::{ClassAccess, ConstantPool, MethodAccess, MethodInfo},
        Error,
    };

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ScriptRegistrar for Recorder {
        fn register_script(&self, annotation: Arc<ImportAnnotation>) -> Result<()> {
            self.0.lock().unwrap().push(annotation.to_string());
            Ok(())
        }
    }

    fn opcodes(code: &CodeAttribute) -> Vec<Opcode> {
        decode(&code.code).unwrap().into_iter().map(|i| i.opcode).collect()
    }

    fn body(descriptor: &str, is_static: bool) -> Result<(ConstantPool, CodeAttribute)> {
        let config = EmulatorConfig::default();
        let rewriter = MethodRewriter::new(&config, &NoopRegistrar);
        let mut pool = ConstantPool::new();
        let code = rewriter.proxy_body(
            &mut pool,
            &MethodKey::new("f", descriptor),
            &ImportAnnotation::new("M", "f", None),
            is_static,
        )?;
        Ok((pool, code))
    }

    #[test]
    fn int_add_proxy() {
        let (pool, code) = body("(II)I", true).unwrap();
        assert_eq!(
            opcodes(&code),
            vec![
                Opcode::Ldc,
                Opcode::Ldc,
                Opcode::Iconst2,
                Opcode::Anewarray,
                Opcode::Dup,
                Opcode::Iconst0,
                Opcode::Iload0,
                Opcode::Invokestatic,
                Opcode::Aastore,
                Opcode::Dup,
                Opcode::Iconst1,
                Opcode::Iload1,
                Opcode::Invokestatic,
                Opcode::Aastore,
                Opcode::Invokestatic,
                Opcode::Checkcast,
                Opcode::Invokevirtual,
                Opcode::Ireturn,
            ]
        );
        assert_eq!(code.max_locals, 2);
        assert_eq!(code.max_stack, 6);

        let bridge = decode(&code.code).unwrap()[14].pool_index().unwrap();
        let (class, name, descriptor) = pool.method_ref(bridge).unwrap();
        assert_eq!(class, crate::emulator::config::DEFAULT_BRIDGE_CLASS);
        assert_eq!(name, "executeScript");
        assert_eq!(descriptor, BRIDGE_DESCRIPTOR);
    }

    #[test]
    fn wide_parameters_and_receiver() {
        let (_, code) = body("(JD)V", false).unwrap();
        let ops = opcodes(&code);
        assert!(ops.contains(&Opcode::Lload1));
        assert!(ops.contains(&Opcode::Dload3));
        assert_eq!(&ops[ops.len() - 2..], &[Opcode::Pop, Opcode::Return]);
        assert_eq!(code.max_locals, 5);
    }

    #[test]
    fn narrowing_and_casts() {
        let (_, code) = body("()S", true).unwrap();
        assert!(opcodes(&code).contains(&Opcode::I2s));

        let (_, code) = body("()Z", true).unwrap();
        assert!(!opcodes(&code).contains(&Opcode::I2b));

        let (_, code) = body("()Ljava/lang/Object;", true).unwrap();
        assert!(!opcodes(&code).contains(&Opcode::Checkcast));

        let (pool, code) = body("()[Ljava/lang/String;", true).unwrap();
        let cast = decode(&code.code).unwrap()[5].pool_index().unwrap();
        assert_eq!(pool.class_name(cast).unwrap(), "[Ljava/lang/String;");
    }

    #[test]
    fn string_wrapper_is_stringified() {
        let (pool, code) = body("(Lde/inetsoftware/jwebassembly/web/DOMString;)V", true).unwrap();
        let instructions = decode(&code.code).unwrap();
        assert_eq!(instructions[7].opcode, Opcode::AconstNull);
        let (class, name, _) = pool.method_ref(instructions[8].pool_index().unwrap()).unwrap();
        assert_eq!((class.as_str(), name.as_str()), ("java/util/Objects", "toString"));
    }

    #[test]
    fn unmarshallable_descriptors() {
        assert!(matches!(body("(V)V", true), Err(Error::Rewrite { .. })));
        assert!(matches!(body("(I", true), Err(Error::Rewrite { .. })));

        let too_many = format!("({})V", "J".repeat(128));
        assert!(matches!(body(&too_many, true), Err(Error::Rewrite { .. })));
        let just_fits = format!("({})V", "J".repeat(127));
        assert!(body(&just_fits, false).is_ok());

        let too_deep = format!("({}I)V", "[".repeat(256));
        assert!(matches!(body(&too_deep, true), Err(Error::Rewrite { .. })));
        let deepest = format!("({}I)V", "[".repeat(255));
        assert!(body(&deepest, true).is_ok());
    }

    #[test]
    fn rewrite_class_registers_and_patches() {
        let mut pool = ConstantPool::new();
        let this_class = pool.add_class("com/example/Bindings").unwrap();
        let super_class = pool.add_class(OBJECT).unwrap();
        let method = MethodInfo {
            access_flags: MethodAccess::PUBLIC | MethodAccess::STATIC | MethodAccess::NATIVE,
            name_index: pool.add_utf8("add").unwrap(),
            descriptor_index: pool.add_utf8("(II)I").unwrap(),
            attributes: Vec::new(),
        };
        let mut class = ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool: pool,
            access_flags: ClassAccess::PUBLIC,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: vec![method],
            attributes: Vec::new(),
        };

        let mut registry = ImportRegistry::new();
        registry.insert(
            MethodKey::new("add", "(II)I"),
            ImportAnnotation::with_script("M", "add", "(a,b)=>a+b"),
        );

        let config = EmulatorConfig::default();
        let recorder = Recorder::default();
        let patched = MethodRewriter::new(&config, &recorder)
            .rewrite(&mut class, &registry)
            .unwrap();

        assert_eq!(patched.len(), 1);
        assert_eq!(*recorder.0.lock().unwrap(), vec!["M.add".to_string()]);
        let method = &class.methods[0];
        assert!(!method.access_flags.is_native());
        assert!(method.access_flags.is_static());
        assert!(method.code(&class.constant_pool).unwrap().is_some());

        let reparsed = ClassFile::parse(&class.to_bytes().unwrap()).unwrap();
        assert_eq!(reparsed, class);
    }

    #[test]
    fn failing_method_leaves_class_untouched() {
        let mut pool = ConstantPool::new();
        let this_class = pool.add_class("com/example/Bindings").unwrap();
        let methods = vec![
            MethodInfo {
                access_flags: MethodAccess::STATIC | MethodAccess::NATIVE,
                name_index: pool.add_utf8("ok").unwrap(),
                descriptor_index: pool.add_utf8("()V").unwrap(),
                attributes: Vec::new(),
            },
            MethodInfo {
                access_flags: MethodAccess::STATIC | MethodAccess::NATIVE,
                name_index: pool.add_utf8("bad").unwrap(),
                descriptor_index: pool.add_utf8(&format!("({})V", "D".repeat(200))).unwrap(),
                attributes: Vec::new(),
            },
        ];
        let mut class = ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool: pool,
            access_flags: ClassAccess::PUBLIC,
            this_class,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods,
            attributes: Vec::new(),
        };
        let mut registry = ImportRegistry::new();
        registry.insert(MethodKey::new("ok", "()V"), ImportAnnotation::new("M", "ok", None));
        registry.insert(
            MethodKey::new("bad", format!("({})V", "D".repeat(200))),
            ImportAnnotation::new("M", "bad", None),
        );

        let config = EmulatorConfig::default();
        let recorder = Recorder::default();
        let result = MethodRewriter::new(&config, &recorder).rewrite(&mut class, &registry);

        assert!(matches!(result, Err(Error::Rewrite { .. })));
        assert!(recorder.0.lock().unwrap().is_empty());
        assert!(class.methods.iter().all(|m| m.access_flags.is_native()));
    }
}
