#![no_main]

use libfuzzer_sys::fuzz_target;
use importshim::emulator::{ClassLoadHook, ClassTransformer, EmulatorConfig, NoopRegistrar};
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let hook = ClassLoadHook::new(EmulatorConfig::default(), Arc::new(NoopRegistrar));
    let _ = hook.transform("fuzz/Input", data);
});
