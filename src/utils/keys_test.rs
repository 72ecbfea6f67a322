use super::keys::module_enabled_key;
use super::keys::module_name_from_values_key;
use super::keys::module_name_to_values_key;

#[test]
fn kebab_name_becomes_lower_camel_key() {
    assert_eq!(module_name_to_values_key("module"), "module");
    assert_eq!(module_name_to_values_key("very-simple-module"), "verySimpleModule");
    assert_eq!(module_name_to_values_key("prometheus-2"), "prometheus2");
}

#[test]
fn lower_camel_key_becomes_kebab_name() {
    assert_eq!(module_name_from_values_key("module"), "module");
    assert_eq!(module_name_from_values_key("verySimpleModule"), "very-simple-module");
    assert_eq!(module_name_from_values_key("prometheus2"), "prometheus-2");
}

#[test]
fn name_key_conversion_roundtrips() {
    for name in ["a", "a-b", "cert-manager", "node-local-dns"] {
        assert_eq!(module_name_from_values_key(&module_name_to_values_key(name)), name);
    }
}

#[test]
fn enabled_key_appends_suffix_to_values_key() {
    assert_eq!(module_enabled_key("cert-manager"), "certManagerEnabled");
}
