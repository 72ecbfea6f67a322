use serde::Deserialize;
use serde::Serialize;
use serde_yaml::Value;

use crate::HelmError;
use crate::Result;

/// Minimal typed view over one rendered manifest document: just enough
/// identity to find the object in the cluster again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl Manifest {
    /// The manifest's namespace, or the module's default one.
    pub fn namespace_or<'a>(
        &'a self,
        default: &'a str,
    ) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }

    /// Stable identifier for logs and the debug dump.
    pub fn id(&self) -> String {
        format!(
            "{}/{}/{}",
            self.namespace.as_deref().unwrap_or(""),
            self.kind.to_lowercase(),
            self.name.to_lowercase()
        )
    }
}

/// Splits a rendered multi-document YAML string into manifests. Empty
/// documents are skipped; a document without kind or name is an error.
pub fn manifests_from_yaml_documents(rendered: &str) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();

    for document in serde_yaml::Deserializer::from_str(rendered) {
        let value = Value::deserialize(document)
            .map_err(|e| HelmError::BadManifest(format!("parse rendered document: {e}")))?;

        if value.is_null() {
            continue;
        }

        let api_version = string_field(&value, "apiVersion");
        let kind = string_field(&value, "kind");
        let metadata = value.get("metadata");
        let name = metadata.and_then(|m| m.get("name")).and_then(Value::as_str);
        let namespace = metadata.and_then(|m| m.get("namespace")).and_then(Value::as_str);

        let (Some(kind), Some(name)) = (kind, name) else {
            return Err(HelmError::BadManifest(format!(
                "document without kind or metadata.name:\n{}",
                serde_yaml::to_string(&value).unwrap_or_default()
            ))
            .into());
        };

        manifests.push(Manifest {
            api_version: api_version.unwrap_or_default().to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        });
    }

    Ok(manifests)
}

fn string_field<'a>(
    value: &'a Value,
    field: &str,
) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str)
}
