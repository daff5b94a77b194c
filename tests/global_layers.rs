#![allow(missing_docs, unused_results)]

// Global activation is process-wide, so everything touching it lives in a
// single test in its own binary.

use assert_matches::assert_matches;
use strata::settings::{StrataSettings, init_settings};
use strata::{
    DispatchError, Layer, Registry, activate_globally, current_activation_order,
    deactivate_globally, global_layers, is_active, with_layers, without_layers,
};

#[test]
fn global_activation_lifecycle() {
    let _ = init_settings(StrataSettings::default());

    let mut registry = Registry::new();
    let greet = registry
        .register_base("greet", |name: &String| Ok(format!("hello {name}")))
        .unwrap();
    let polite = Layer::new("polite");
    let loud = Layer::new("loud");
    registry
        .register_around(&greet, &polite, |_, p| Ok(format!("{}, please", p.proceed()?)))
        .unwrap();
    registry
        .register_around(&greet, &loud, |_, p| Ok(p.proceed()?.to_uppercase()))
        .unwrap();
    let name = "ada".to_owned();

    activate_globally(&polite).unwrap();
    assert_eq!(global_layers(), vec![polite.clone()]);
    assert_matches!(
        activate_globally(&polite),
        Err(DispatchError::AlreadyActive { layer }) if layer == "<layer polite>"
    );
    assert_eq!(registry.call(&greet, &name).unwrap(), "hello ada, please");

    // Visible from other threads.
    let seen = std::thread::spawn({
        let polite = polite.clone();
        move || is_active(&polite)
    })
    .join()
    .unwrap();
    assert!(seen);

    // Scoped layers are more specific than global ones.
    with_layers([&loud], || {
        assert_eq!(current_activation_order(), vec![loud.clone(), polite.clone()]);
        assert_eq!(registry.call(&greet, &name).unwrap(), "HELLO ADA, PLEASE");
    });

    // Scoped deactivation hides a global layer.
    let hidden = without_layers([&polite], || registry.call(&greet, &name)).unwrap();
    assert_eq!(hidden, "hello ada");

    // Later global activations rank above earlier ones.
    activate_globally(&loud).unwrap();
    assert_eq!(current_activation_order(), vec![loud.clone(), polite.clone()]);
    deactivate_globally(&loud).unwrap();

    deactivate_globally(&polite).unwrap();
    assert!(global_layers().is_empty());
    assert_matches!(
        deactivate_globally(&polite),
        Err(DispatchError::NotActive { .. })
    );
    assert_eq!(registry.call(&greet, &name).unwrap(), "hello ada");
}
