//! Headless compilation checks of every kernel module: the WGSL must parse
//! and pass naga validation without a gpu.

use naga::valid::{Capabilities, ValidationFlags, Validator};
use wgsoft::shader::{reset_module_source, solver_module_source, update_module_source};

fn validate(label: &str, source: &str) -> naga::Module {
    let module = naga::front::wgsl::parse_str(source)
        .unwrap_or_else(|e| panic!("{label} failed to parse: {}", e.emit_to_string(source)));
    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .unwrap_or_else(|e| panic!("{label} failed validation: {e:?}"));
    module
}

fn entry_points(module: &naga::Module) -> Vec<String> {
    module.entry_points.iter().map(|e| e.name.clone()).collect()
}

#[test]
fn solver_module_compiles() {
    let module = validate("solver", &solver_module_source());
    let entries = entry_points(&module);
    for entry in [
        "integrate",
        "solve_edges",
        "solve_volumes",
        "post_collide",
        "apply_drag",
        "grid_clear",
        "broadphase",
        "apply_mouse",
        "apply_anchors",
    ] {
        assert!(entries.iter().any(|e| e == entry), "missing entry {entry}");
    }
}

#[test]
fn update_module_compiles() {
    let module = validate("update", &update_module_source());
    assert_eq!(entry_points(&module), vec!["update_tets"]);
}

#[test]
fn reset_module_compiles() {
    let module = validate("reset", &reset_module_source());
    let entries = entry_points(&module);
    assert!(entries.contains(&"reset_vertices".to_string()));
    assert!(entries.contains(&"reset_tets".to_string()));
}
