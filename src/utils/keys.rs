//! Conversion between kebab-cased module names and lowerCamel values keys.

/// Returns the camelCased values key for a kebab-cased module name
/// (`very-simple-module` becomes `verySimpleModule`).
pub fn module_name_to_values_key(module_name: &str) -> String {
    let mut out = String::with_capacity(module_name.len());
    let mut upper_next = false;

    for c in module_name.chars() {
        if c == '-' || c == '_' {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }

    out
}

/// Returns the kebab-cased module name for a camelCased values key
/// (`verySimpleModule` becomes `very-simple-module`).
pub fn module_name_from_values_key(values_key: &str) -> String {
    let mut out = String::with_capacity(values_key.len() + 8);

    for (i, c) in values_key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else if c.is_ascii_digit() {
            if i > 0 {
                out.push('-');
            }
            out.push(c);
        } else {
            out.push(c);
        }
    }

    out
}

/// Returns the top level key that toggles a module on and off
/// (`very-simple-module` becomes `verySimpleModuleEnabled`).
pub fn module_enabled_key(module_name: &str) -> String {
    let mut key = module_name_to_values_key(module_name);
    key.push_str(crate::ENABLED_KEY_SUFFIX);
    key
}
