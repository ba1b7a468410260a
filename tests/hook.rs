//! Class load hook behavior on whole class files.

mod common;

use std::{
    borrow::Cow,
    sync::{Arc, Mutex},
};

use common::{ClassBuilder, Jv, Machine};
use importshim::{emulator::NoopRegistrar, prelude::*};

#[derive(Default)]
struct Recorder(Mutex<Vec<ImportAnnotation>>);

impl ScriptRegistrar for Recorder {
    fn register_script(&self, annotation: Arc<ImportAnnotation>) -> Result<()> {
        self.0.lock().unwrap().push((*annotation).clone());
        Ok(())
    }
}

/// Answers every bridge call with a fixed value and records nothing itself; the machine
/// keeps the call log.
struct Fixed(HostValue);

impl ScriptBridge for Fixed {
    fn invoke(&self, _module: &str, _name: &str, _args: Vec<HostValue>) -> Result<HostValue> {
        Ok(self.0.clone())
    }
}

fn hook(recorder: Arc<Recorder>) -> ClassLoadHook {
    common::init_logging();
    ClassLoadHook::new(EmulatorConfig::default(), recorder)
}

#[test]
fn classes_without_imports_pass_through_byte_identical() {
    let hook = hook(Arc::default());
    let bytes = ClassBuilder::new("com/example/Plain")
        .native("nothing", "()V")
        .annotated(
            MethodAccess::PUBLIC | MethodAccess::NATIVE,
            "other",
            "(I)I",
            "Lcom/example/NotImport;",
            &[("module", "X")],
        )
        .bytes();

    let result = hook.transform("com/example/Plain", &bytes).unwrap();
    assert!(matches!(result, Cow::Borrowed(_)));
    assert_eq!(&*result, bytes.as_slice());
    assert!(hook.patched("com/example/Plain").is_none());
}

#[test]
fn only_annotated_natives_are_rewritten() {
    let recorder = Arc::new(Recorder::default());
    let hook = hook(Arc::clone(&recorder));
    let bytes = ClassBuilder::new("com/example/Bindings")
        .import("add", "(II)I", &[("js", "(a, b) => a + b")])
        .import("sin", "(D)D", &[("module", "Math")])
        .native("untouched", "()V")
        .bytes();

    let output = hook.transform("com/example/Bindings", &bytes).unwrap();
    let class = ClassFile::parse(&output).unwrap();

    for (name, descriptor) in [("add", "(II)I"), ("sin", "(D)D")] {
        let method = class.find_method(name, descriptor).unwrap();
        assert!(!method.access_flags.is_native(), "{}", name);
        assert!(method.access_flags.is_static());
        assert!(method.code(&class.constant_pool).unwrap().is_some());
    }
    let untouched = class.find_method("untouched", "()V").unwrap();
    assert!(untouched.access_flags.is_native());
    assert!(untouched.code(&class.constant_pool).unwrap().is_none());

    let registered = recorder.0.lock().unwrap().clone();
    assert_eq!(
        registered,
        vec![
            ImportAnnotation::with_script("Bindings", "add", "(a, b) => a + b"),
            ImportAnnotation::new("Math", "sin", None),
        ]
    );
    assert_eq!(hook.patched_classes(), vec!["com/example/Bindings".to_string()]);
    assert_eq!(hook.patched("com/example/Bindings").unwrap().len(), 2);
}

#[test]
fn rewritten_class_survives_a_file_round_trip() {
    let hook = hook(Arc::default());
    let bytes = ClassBuilder::new("com/example/Bindings")
        .import("now", "()J", &[("module", "Date")])
        .bytes();
    let output = hook.transform("com/example/Bindings", &bytes).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Bindings.class");
    std::fs::write(&path, &output).unwrap();

    let class = ClassFile::from_path(&path).unwrap();
    assert_eq!(class.to_bytes().unwrap(), output.into_owned());
    assert_eq!(class.this_class_name().unwrap(), "com/example/Bindings");
}

#[test]
fn invalid_annotation_skips_only_that_method() {
    let recorder = Arc::new(Recorder::default());
    let hook = hook(Arc::clone(&recorder));
    let bytes = ClassBuilder::new("com/example/Bindings")
        .import("bad", "()V", &[("module", "not-an-identifier")])
        .import("good", "()V", &[("js", "() => {}")])
        .bytes();

    let output = hook.transform("com/example/Bindings", &bytes).unwrap();
    let class = ClassFile::parse(&output).unwrap();
    assert!(class.find_method("bad", "()V").unwrap().access_flags.is_native());
    assert!(!class.find_method("good", "()V").unwrap().access_flags.is_native());
    assert_eq!(recorder.0.lock().unwrap().len(), 1);
}

#[test]
fn unmarshallable_method_fails_the_class() {
    let recorder = Arc::new(Recorder::default());
    let hook = hook(Arc::clone(&recorder));
    let too_wide = format!("({})V", "D".repeat(128));
    let bytes = ClassBuilder::new("com/example/Wide")
        .import("ok", "()V", &[])
        .import("wide", &too_wide, &[])
        .bytes();

    let result = hook.transform("com/example/Wide", &bytes);
    assert!(matches!(result, Err(Error::Rewrite { .. })));
    assert!(recorder.0.lock().unwrap().is_empty());
    assert!(hook.patched_classes().is_empty());
}

#[test]
fn custom_annotation_type() {
    let config = EmulatorConfig::default().with_import_annotation("Lcom/example/Js;");
    let hook = ClassLoadHook::new(config, Arc::new(NoopRegistrar));
    let bytes = ClassBuilder::new("com/example/Bindings")
        .import("standard", "()V", &[])
        .annotated(
            MethodAccess::STATIC | MethodAccess::NATIVE,
            "custom",
            "()V",
            "Lcom/example/Js;",
            &[],
        )
        .bytes();

    let class = ClassFile::parse(&hook.transform("com/example/Bindings", &bytes).unwrap()).unwrap();
    assert!(class.find_method("standard", "()V").unwrap().access_flags.is_native());
    assert!(!class.find_method("custom", "()V").unwrap().access_flags.is_native());
}

#[test]
fn proxy_passes_arguments_in_declaration_order() {
    let hook = hook(Arc::default());
    let descriptor = "(IJDZLjava/lang/String;C[I)V";
    let bytes = ClassBuilder::new("com/example/Bindings")
        .import("mixed", descriptor, &[("module", "Sink"), ("name", "take")])
        .bytes();
    let class = ClassFile::parse(&hook.transform("com/example/Bindings", &bytes).unwrap()).unwrap();

    let bridge = Fixed(HostValue::Undefined);
    let config = EmulatorConfig::default();
    let machine = Machine::new(&class, &config, &bridge);
    let array = Jv::Array(std::rc::Rc::new(std::cell::RefCell::new(vec![Jv::Int(7)])));
    let result = machine
        .call(
            "mixed",
            descriptor,
            &[
                Jv::Int(-4),
                Jv::Long(1 << 40),
                Jv::Double(0.5),
                Jv::Int(1),
                Jv::Str("text".into()),
                Jv::Int(i32::from(b'x')),
                array,
            ],
        )
        .unwrap();
    assert_eq!(result, Jv::Null);

    let calls = machine.calls.borrow();
    assert_eq!(calls.len(), 1);
    let (module, name, args) = &calls[0];
    assert_eq!((module.as_str(), name.as_str()), ("Sink", "take"));
    assert_eq!(
        args,
        &vec![
            HostValue::Int(-4),
            HostValue::Double((1u64 << 40) as f64),
            HostValue::Double(0.5),
            HostValue::Bool(true),
            HostValue::String("text".into()),
            HostValue::String("x".into()),
            HostValue::Array(vec![HostValue::Int(7)]),
        ]
    );
}

#[test]
fn instance_proxy_skips_the_receiver() {
    let hook = hook(Arc::default());
    let bytes = ClassBuilder::new("com/example/Node")
        .instance_import("id", "(I)I", &[("js", "(x) => x")])
        .bytes();
    let class = ClassFile::parse(&hook.transform("com/example/Node", &bytes).unwrap()).unwrap();

    let bridge = Fixed(HostValue::Int(300));
    let config = EmulatorConfig::default();
    let machine = Machine::new(&class, &config, &bridge);
    let result = machine
        .call_on(Some(Jv::Str("this".into())), "id", "(I)I", &[Jv::Int(9)])
        .unwrap();
    assert_eq!(result, Jv::Int(300));
    assert_eq!(machine.calls.borrow()[0].2, vec![HostValue::Int(9)]);
}

#[test]
fn string_wrappers_cross_as_strings() {
    let hook = hook(Arc::default());
    let descriptor = "(Lde/inetsoftware/jwebassembly/web/DOMString;)Ljava/lang/String;";
    let bytes = ClassBuilder::new("com/example/Dom")
        .import("echo", descriptor, &[])
        .bytes();
    let class = ClassFile::parse(&hook.transform("com/example/Dom", &bytes).unwrap()).unwrap();

    let bridge = Fixed(HostValue::String("back".into()));
    let config = EmulatorConfig::default();
    let machine = Machine::new(&class, &config, &bridge);
    let result = machine
        .call("echo", descriptor, &[Jv::Wrapper("content".into())])
        .unwrap();
    assert_eq!(result, Jv::Str("back".into()));
    assert_eq!(machine.calls.borrow()[0].2, vec![HostValue::String("content".into())]);

    machine.call("echo", descriptor, &[Jv::Null]).unwrap();
    assert_eq!(machine.calls.borrow()[1].2, vec![HostValue::Null]);
}

#[test]
fn narrow_returns_are_truncated() {
    let hook = hook(Arc::default());
    let bytes = ClassBuilder::new("com/example/Narrow")
        .import("byte", "()B", &[])
        .import("flag", "()Z", &[])
        .bytes();
    let class = ClassFile::parse(&hook.transform("com/example/Narrow", &bytes).unwrap()).unwrap();
    let config = EmulatorConfig::default();

    let bridge = Fixed(HostValue::Int(0x1FF));
    assert_eq!(Machine::new(&class, &config, &bridge).call("byte", "()B", &[]).unwrap(), Jv::Int(-1));

    let bridge = Fixed(HostValue::Bool(true));
    assert_eq!(Machine::new(&class, &config, &bridge).call("flag", "()Z", &[]).unwrap(), Jv::Int(1));

    let bridge = Fixed(HostValue::String("nope".into()));
    let error = Machine::new(&class, &config, &bridge).call("flag", "()Z", &[]).unwrap_err();
    assert!(error.starts_with("ClassCastException"), "{}", error);
}

#[test]
fn batch_transform_matches_single_transform() {
    let hook = hook(Arc::default());
    let first = ClassBuilder::new("a/A").import("f", "()V", &[]).bytes();
    let second = ClassBuilder::new("b/B").native("g", "()V").bytes();
    let classes: Vec<(&str, &[u8])> = vec![("a/A", &first[..]), ("b/B", &second[..]), ("c/C", &b"junk"[..])];

    let results = hook.transform_batch(&classes);
    assert!(matches!(results[0], Ok(Cow::Owned(_))));
    assert!(matches!(results[1], Ok(Cow::Borrowed(_))));
    assert!(results[2].is_err());
    assert_eq!(hook.patched_classes(), vec!["a/A".to_string()]);
}
