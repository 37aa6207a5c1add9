//! Import resolution and invoke-boundary checks.

mod common;

use common::{vt, Body, ModuleBuilder};
use tidewasm::{
    Engine, Error, FuncType, GlobalType, Limits, LinkError, MemoryType, ValType, Value,
};

fn expect_link<T: std::fmt::Debug>(
    result: Result<T, Error>,
    check: impl FnOnce(&LinkError) -> bool,
) {
    match result {
        Err(Error::Link(e)) => assert!(check(&e), "unexpected link error: {e}"),
        other => panic!("expected link error, got {other:?}"),
    }
}

fn importing_module() -> Vec<u8> {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[vt::I32], &[vt::I32]);
    let f = m.import_func("env", "f", ty);
    let call = m.func(ty, &[], Body::new().local_get(0).call(f));
    m.export_func("call", call);
    m.build()
}

#[test]
fn missing_import() {
    let mut engine = Engine::new();
    expect_link(engine.instantiate(&importing_module()), |e| {
        matches!(e, LinkError::MissingImport { module, name } if module == "env" && name == "f")
    });
}

#[test]
fn import_kind_mismatch() {
    let mut engine = Engine::new();
    engine.register_memory("env", "f", MemoryType { limits: Limits::new(1, None) });
    expect_link(engine.instantiate(&importing_module()), |e| {
        matches!(e, LinkError::KindMismatch { .. })
    });
}

#[test]
fn function_signature_mismatch() {
    let mut engine = Engine::new();
    engine.register_func(
        "env",
        "f",
        FuncType::new(vec![ValType::I64], vec![ValType::I64]),
        |args| Ok(Some(args[0])),
    );
    expect_link(engine.instantiate(&importing_module()), |e| {
        matches!(e, LinkError::SignatureMismatch { .. })
    });
}

#[test]
fn memory_limits_mismatch() {
    let mut m = ModuleBuilder::new();
    m.import_memory("env", "mem", 2, Some(3));
    let bytes = m.build();

    // Provided minimum below the declared minimum.
    let mut engine = Engine::new();
    engine.register_memory("env", "mem", MemoryType { limits: Limits::new(1, Some(3)) });
    expect_link(engine.instantiate(&bytes), |e| {
        matches!(e, LinkError::LimitsMismatch { .. })
    });

    // Provided maximum missing while the declaration bounds it.
    let mut engine = Engine::new();
    engine.register_memory("env", "mem", MemoryType { limits: Limits::new(2, None) });
    expect_link(engine.instantiate(&bytes), |e| {
        matches!(e, LinkError::LimitsMismatch { .. })
    });

    // Exact match links.
    let mut engine = Engine::new();
    engine.register_memory("env", "mem", MemoryType { limits: Limits::new(2, Some(3)) });
    assert!(engine.instantiate(&bytes).is_ok());
}

#[test]
fn global_mutability_and_type_mismatch() {
    let mut m = ModuleBuilder::new();
    m.import_global("env", "g", vt::I32, false);
    let bytes = m.build();

    let mut engine = Engine::new();
    engine
        .register_global("env", "g", GlobalType::new(ValType::I32, true), Value::I32(0))
        .unwrap();
    expect_link(engine.instantiate(&bytes), |e| {
        matches!(e, LinkError::MutabilityMismatch { .. })
    });

    let mut engine = Engine::new();
    engine
        .register_global("env", "g", GlobalType::new(ValType::I64, false), Value::I64(0))
        .unwrap();
    expect_link(engine.instantiate(&bytes), |e| {
        matches!(e, LinkError::SignatureMismatch { .. })
    });
}

#[test]
fn table_limits_checked() {
    let mut m = ModuleBuilder::new();
    m.import_table("env", "t", 4, None);
    let bytes = m.build();

    let mut engine = Engine::new();
    engine.register_table(
        "env",
        "t",
        tidewasm::TableType {
            elem: Default::default(),
            limits: Limits::new(2, None),
        },
    );
    expect_link(engine.instantiate(&bytes), |e| {
        matches!(e, LinkError::LimitsMismatch { .. })
    });
}

#[test]
fn invoke_boundary_checks() {
    let mut m = ModuleBuilder::new();
    m.memory(1, None);
    m.export_memory("mem", 0);
    let ty = m.ty(&[vt::I32], &[vt::I32]);
    let f = m.func(ty, &[], Body::new().local_get(0));
    m.export_func("id", f);

    let mut engine = Engine::new();
    let inst = engine.instantiate(&m.build()).unwrap();

    expect_link(engine.invoke(inst, "nope", &[]), |e| {
        matches!(e, LinkError::MissingExport(n) if n == "nope")
    });
    expect_link(engine.invoke(inst, "mem", &[]), |e| {
        matches!(e, LinkError::NotAFunction(_))
    });
    expect_link(engine.invoke(inst, "id", &[]), |e| {
        matches!(e, LinkError::SignatureMismatch { .. })
    });
    // No implicit numeric conversion at the boundary.
    expect_link(engine.invoke(inst, "id", &[Value::F32(0)]), |e| {
        matches!(e, LinkError::SignatureMismatch { .. })
    });
    assert_eq!(
        engine.invoke(inst, "id", &[Value::I32(3)]).unwrap(),
        Some(Value::I32(3))
    );
}

#[test]
fn active_segment_out_of_bounds_fails_instantiation() {
    // Data segment reaching past the single page.
    let mut m = ModuleBuilder::new();
    m.memory(1, None);
    m.data_active(65535, &[1, 2, 3, 4]);
    let mut engine = Engine::new();
    expect_link(engine.instantiate(&m.build()), |e| {
        matches!(e, LinkError::DataOutOfBounds)
    });

    // Element segment past the table end.
    let mut m = ModuleBuilder::new();
    m.table(1, None);
    let ty = m.ty(&[], &[]);
    let f = m.func(ty, &[], Body::new());
    m.element_active(1, &[f]);
    let mut engine = Engine::new();
    expect_link(engine.instantiate(&m.build()), |e| {
        matches!(e, LinkError::ElemOutOfBounds)
    });
}
