//! Shared fixtures for the integration tests.
//!
//! [`ClassBuilder`] assembles classes with import-annotated native methods, and [`Machine`]
//! executes the straight-line proxy bodies the rewriter produces, forwarding the bridge call
//! to a [`ScriptBridge`]. Together they stand in for a JVM running the rewritten class.

#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use importshim::{
    bytecode::{decode, Opcode},
    classfile::{
        annotations::{element_tag, write_annotations, Annotation, ElementValue},
        attributes::names,
        constpool::Constant,
        AttributeInfo, ClassAccess, ClassFile, ConstantPool, MethodAccess, MethodInfo,
        MethodSignature, ValueKind,
    },
    emulator::{config::DEFAULT_IMPORT_ANNOTATION, EmulatorConfig, HostValue, ScriptBridge, StringLike},
};

/// Builds a class file with annotated native methods.
pub struct ClassBuilder {
    name: String,
    pool: ConstantPool,
    methods: Vec<MethodInfo>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        ClassBuilder {
            name: name.to_string(),
            pool: ConstantPool::new(),
            methods: Vec::new(),
        }
    }

    /// A static native method carrying `@Import` with the given string elements.
    pub fn import(self, name: &str, descriptor: &str, elements: &[(&str, &str)]) -> Self {
        self.annotated(
            MethodAccess::PUBLIC | MethodAccess::STATIC | MethodAccess::NATIVE,
            name,
            descriptor,
            DEFAULT_IMPORT_ANNOTATION,
            elements,
        )
    }

    /// An instance native method carrying `@Import`.
    pub fn instance_import(self, name: &str, descriptor: &str, elements: &[(&str, &str)]) -> Self {
        self.annotated(
            MethodAccess::PUBLIC | MethodAccess::NATIVE,
            name,
            descriptor,
            DEFAULT_IMPORT_ANNOTATION,
            elements,
        )
    }

    pub fn annotated(
        mut self,
        flags: MethodAccess,
        name: &str,
        descriptor: &str,
        annotation: &str,
        elements: &[(&str, &str)],
    ) -> Self {
        let type_index = self.pool.add_utf8(annotation).unwrap();
        let elements = elements
            .iter()
            .map(|(key, value)| {
                (
                    self.pool.add_utf8(key).unwrap(),
                    ElementValue::Const {
                        tag: element_tag::STRING,
                        index: self.pool.add_utf8(value).unwrap(),
                    },
                )
            })
            .collect();
        let mut data = Vec::new();
        write_annotations(&[Annotation { type_index, elements }], &mut data).unwrap();
        let attribute = AttributeInfo {
            name_index: self.pool.add_utf8(names::RUNTIME_INVISIBLE_ANNOTATIONS).unwrap(),
            data,
        };
        self.push(flags, name, descriptor, vec![attribute])
    }

    /// A native method without annotations.
    pub fn native(self, name: &str, descriptor: &str) -> Self {
        self.push(
            MethodAccess::PUBLIC | MethodAccess::STATIC | MethodAccess::NATIVE,
            name,
            descriptor,
            Vec::new(),
        )
    }

    fn push(
        mut self,
        flags: MethodAccess,
        name: &str,
        descriptor: &str,
        attributes: Vec<AttributeInfo>,
    ) -> Self {
        self.methods.push(MethodInfo {
            access_flags: flags,
            name_index: self.pool.add_utf8(name).unwrap(),
            descriptor_index: self.pool.add_utf8(descriptor).unwrap(),
            attributes,
        });
        self
    }

    pub fn build(mut self) -> ClassFile {
        let this_class = self.pool.add_class(&self.name).unwrap();
        let super_class = self.pool.add_class("java/lang/Object").unwrap();
        ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool: self.pool,
            access_flags: ClassAccess::PUBLIC | ClassAccess::SUPER,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: self.methods,
            attributes: Vec::new(),
        }
    }

    pub fn bytes(self) -> Vec<u8> {
        self.build().to_bytes().unwrap()
    }
}

/// A JVM value as seen by the proxy body.
#[derive(Debug, Clone, PartialEq)]
pub enum Jv {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    /// A boxed `java.lang.Number`
    Number(f64),
    /// A boxed `java.lang.Boolean`
    Bool(bool),
    /// A boxed `java.lang.Character`
    Char(u16),
    /// An instance of a string wrapper type; `toString` yields the content
    Wrapper(String),
    Array(Rc<RefCell<Vec<Jv>>>),
    /// A script object that came back through the bridge
    Opaque(HostValue),
}

impl Jv {
    fn width(&self) -> usize {
        match self {
            Jv::Long(_) | Jv::Double(_) => 2,
            _ => 1,
        }
    }

    fn int(&self) -> i32 {
        match self {
            Jv::Int(value) => *value,
            other => panic!("expected int, got {:?}", other),
        }
    }

    fn to_host(&self) -> HostValue {
        match self {
            Jv::Null => HostValue::Null,
            Jv::Int(v) => HostValue::Int(*v),
            Jv::Number(v) | Jv::Double(v) => {
                if v.fract() == 0.0 && *v >= f64::from(i32::MIN) && *v <= f64::from(i32::MAX) {
                    HostValue::Int(*v as i32)
                } else {
                    HostValue::Double(*v)
                }
            }
            Jv::Long(v) => HostValue::Double(*v as f64),
            Jv::Float(v) => HostValue::Double(f64::from(*v)),
            Jv::Str(s) => HostValue::String(s.clone()),
            Jv::Bool(b) => HostValue::Bool(*b),
            Jv::Char(c) => HostValue::String(String::from_utf16_lossy(&[*c])),
            Jv::Wrapper(s) => panic!("wrapper {:?} crossed the bridge unconverted", s),
            Jv::Array(items) => HostValue::Array(items.borrow().iter().map(Jv::to_host).collect()),
            Jv::Opaque(value) => value.clone(),
        }
    }

    fn from_host(value: HostValue) -> Jv {
        match value {
            HostValue::Undefined | HostValue::Null => Jv::Null,
            HostValue::Bool(b) => Jv::Bool(b),
            HostValue::Int(v) => Jv::Number(f64::from(v)),
            HostValue::Double(v) => Jv::Number(v),
            HostValue::String(s) => Jv::Str(s),
            HostValue::StringLike(s) => Jv::Str(s.to_script_string()),
            HostValue::Array(items) => {
                Jv::Array(Rc::new(RefCell::new(items.into_iter().map(Jv::from_host).collect())))
            }
            object @ HostValue::Object(_) => Jv::Opaque(object),
        }
    }
}

/// Executes proxy bodies of one rewritten class.
pub struct Machine<'a> {
    class: &'a ClassFile,
    config: &'a EmulatorConfig,
    bridge: &'a dyn ScriptBridge,
    /// `(module, name, args)` of every bridge call, in order
    pub calls: RefCell<Vec<(String, String, Vec<HostValue>)>>,
}

impl<'a> Machine<'a> {
    pub fn new(class: &'a ClassFile, config: &'a EmulatorConfig, bridge: &'a dyn ScriptBridge) -> Self {
        Machine {
            class,
            config,
            bridge,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Calls a static method.
    pub fn call(&self, name: &str, descriptor: &str, args: &[Jv]) -> Result<Jv, String> {
        self.call_on(None, name, descriptor, args)
    }

    /// Calls a method with an optional receiver. `Err` models a thrown exception.
    pub fn call_on(
        &self,
        receiver: Option<Jv>,
        name: &str,
        descriptor: &str,
        args: &[Jv],
    ) -> Result<Jv, String> {
        let method = self
            .class
            .find_method(name, descriptor)
            .ok_or_else(|| format!("no method {}{}", name, descriptor))?;
        if method.access_flags.is_native() {
            return Err(format!("UnsatisfiedLinkError: {}{}", name, descriptor));
        }
        let code = method
            .code(&self.class.constant_pool)
            .map_err(|e| e.to_string())?
            .ok_or("method has no code")?;

        let mut locals = vec![Jv::Null; usize::from(code.max_locals)];
        let mut slot = 0;
        for value in receiver.iter().chain(args) {
            locals[slot] = value.clone();
            slot += value.width();
        }
        let signature = MethodSignature::parse(descriptor).unwrap();
        assert_eq!(
            slot,
            usize::from(signature.arg_slots()) + usize::from(receiver.is_some()),
            "argument slots"
        );

        let pool = &self.class.constant_pool;
        let mut stack: Vec<Jv> = Vec::new();
        for instruction in decode(&code.code).map_err(|e| e.to_string())? {
            let operand = instruction.operands.first().copied().unwrap_or(0);
            match instruction.opcode {
                Opcode::AconstNull => stack.push(Jv::Null),
                Opcode::IconstM1
                | Opcode::Iconst0
                | Opcode::Iconst1
                | Opcode::Iconst2
                | Opcode::Iconst3
                | Opcode::Iconst4
                | Opcode::Iconst5 => {
                    stack.push(Jv::Int(i32::from(instruction.opcode.code()) - 3));
                }
                Opcode::Bipush => stack.push(Jv::Int(i32::from(operand as i8))),
                Opcode::Sipush => {
                    let value = i16::from_be_bytes([instruction.operands[0], instruction.operands[1]]);
                    stack.push(Jv::Int(i32::from(value)));
                }
                Opcode::Ldc | Opcode::LdcW => {
                    let index = instruction.pool_index().unwrap();
                    match pool.get(index).unwrap() {
                        Constant::String(utf8) => stack.push(Jv::Str(pool.utf8(*utf8).unwrap().into_owned())),
                        Constant::Integer(value) => stack.push(Jv::Int(*value)),
                        other => panic!("unexpected ldc constant {:?}", other),
                    }
                }
                Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload | Opcode::Aload => {
                    stack.push(locals[usize::from(operand)].clone());
                }
                Opcode::Wide => {
                    let slot = u16::from_be_bytes([instruction.operands[1], instruction.operands[2]]);
                    stack.push(locals[usize::from(slot)].clone());
                }
                op @ (Opcode::Iload0
                | Opcode::Iload1
                | Opcode::Iload2
                | Opcode::Iload3
                | Opcode::Lload0
                | Opcode::Lload1
                | Opcode::Lload2
                | Opcode::Lload3
                | Opcode::Fload0
                | Opcode::Fload1
                | Opcode::Fload2
                | Opcode::Fload3
                | Opcode::Dload0
                | Opcode::Dload1
                | Opcode::Dload2
                | Opcode::Dload3
                | Opcode::Aload0
                | Opcode::Aload1
                | Opcode::Aload2
                | Opcode::Aload3) => {
                    let slot = (op.code() - Opcode::Iload0.code()) % 4;
                    stack.push(locals[usize::from(slot)].clone());
                }
                Opcode::Anewarray => {
                    let length = stack.pop().unwrap().int();
                    let array = vec![Jv::Null; usize::try_from(length).unwrap()];
                    stack.push(Jv::Array(Rc::new(RefCell::new(array))));
                }
                Opcode::Dup => {
                    let top = stack.last().unwrap().clone();
                    stack.push(top);
                }
                Opcode::Aastore => {
                    let value = stack.pop().unwrap();
                    let index = stack.pop().unwrap().int();
                    let Jv::Array(array) = stack.pop().unwrap() else {
                        panic!("aastore into a non-array");
                    };
                    array.borrow_mut()[usize::try_from(index).unwrap()] = value;
                }
                Opcode::Pop | Opcode::Pop2 => {
                    stack.pop().unwrap();
                }
                Opcode::I2b => {
                    let value = stack.pop().unwrap().int();
                    stack.push(Jv::Int(i32::from(value as i8)));
                }
                Opcode::I2c => {
                    let value = stack.pop().unwrap().int();
                    stack.push(Jv::Int(i32::from(value as u16)));
                }
                Opcode::I2s => {
                    let value = stack.pop().unwrap().int();
                    stack.push(Jv::Int(i32::from(value as i16)));
                }
                Opcode::Checkcast => {
                    let class = pool.class_name(instruction.pool_index().unwrap()).unwrap();
                    check_cast(stack.last().unwrap(), &class)?;
                }
                Opcode::Invokestatic => {
                    let (class, name, descriptor) =
                        pool.method_ref(instruction.pool_index().unwrap()).unwrap();
                    let result = self.invoke_static(&class, &name, &descriptor, &mut stack)?;
                    stack.push(result);
                }
                Opcode::Invokevirtual => {
                    let (_, name, _) = pool.method_ref(instruction.pool_index().unwrap()).unwrap();
                    let value = unbox(stack.pop().unwrap(), &name)?;
                    stack.push(value);
                }
                Opcode::Return => return Ok(Jv::Null),
                Opcode::Ireturn
                | Opcode::Lreturn
                | Opcode::Freturn
                | Opcode::Dreturn
                | Opcode::Areturn => return Ok(stack.pop().unwrap()),
                other => panic!("unexpected {} in a proxy body", other.mnemonic()),
            }
        }
        Err("fell off the end of the code".to_string())
    }

    fn invoke_static(
        &self,
        class: &str,
        name: &str,
        descriptor: &str,
        stack: &mut Vec<Jv>,
    ) -> Result<Jv, String> {
        if class == self.config.bridge_class && name == self.config.bridge_method {
            let Jv::Array(args) = stack.pop().unwrap() else {
                panic!("bridge arguments are not an array");
            };
            let (Jv::Str(function), Jv::Str(module)) = (stack.pop().unwrap(), stack.pop().unwrap()) else {
                panic!("bridge module and name are not strings");
            };
            let args: Vec<HostValue> = args.borrow().iter().map(Jv::to_host).collect();
            self.calls
                .borrow_mut()
                .push((module.clone(), function.clone(), args.clone()));
            return self
                .bridge
                .invoke(&module, &function, args)
                .map(Jv::from_host)
                .map_err(|e| e.to_string());
        }

        match (class, name) {
            ("java/util/Objects", "toString") => {
                let fallback = stack.pop().unwrap();
                Ok(match stack.pop().unwrap() {
                    Jv::Null => fallback,
                    Jv::Wrapper(content) | Jv::Str(content) => Jv::Str(content),
                    other => panic!("toString of {:?}", other),
                })
            }
            (_, "valueOf") => {
                let kind = MethodSignature::parse(descriptor).unwrap().params[0].clone();
                let value = stack.pop().unwrap();
                Ok(match (kind, value) {
                    (ValueKind::Boolean, Jv::Int(v)) => Jv::Bool(v != 0),
                    (ValueKind::Char, Jv::Int(v)) => Jv::Char(v as u16),
                    (_, Jv::Int(v)) => Jv::Number(f64::from(v)),
                    (_, Jv::Long(v)) => Jv::Number(v as f64),
                    (_, Jv::Float(v)) => Jv::Number(f64::from(v)),
                    (_, Jv::Double(v)) => Jv::Number(v),
                    (kind, value) => panic!("{}.valueOf({:?}) for {}", class, value, kind),
                })
            }
            _ => panic!("unexpected call {}.{}{}", class, name, descriptor),
        }
    }
}

fn check_cast(value: &Jv, class: &str) -> Result<(), String> {
    let ok = match (value, class) {
        (Jv::Null, _) => true,
        (Jv::Number(_), "java/lang/Number") => true,
        (Jv::Bool(_), "java/lang/Boolean") => true,
        (Jv::Str(_), "java/lang/String") => true,
        (Jv::Array(_), array) if array.starts_with('[') => true,
        (Jv::Opaque(_), _) => true,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("ClassCastException: {:?} to {}", value, class))
    }
}

fn unbox(value: Jv, method: &str) -> Result<Jv, String> {
    match (value, method) {
        (Jv::Null, _) => Err("NullPointerException".to_string()),
        (Jv::Bool(b), "booleanValue") => Ok(Jv::Int(i32::from(b))),
        (Jv::Number(v), "intValue") => Ok(Jv::Int(v as i32)),
        (Jv::Number(v), "longValue") => Ok(Jv::Long(v as i64)),
        (Jv::Number(v), "floatValue") => Ok(Jv::Float(v as f32)),
        (Jv::Number(v), "doubleValue") => Ok(Jv::Double(v)),
        (value, method) => panic!("{}() on {:?}", method, value),
    }
}

/// Initializes test logging once.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
