use std::collections::BTreeMap;
use std::path::Path;
use std::{fs, io};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use validator::Validate;

use crate::error::{Error, Result};

pub const DEFAULT_VALUES_FILE: &str = "values.yml";

/// Local configuration file; parameter values live under a required
/// top-level `ssm` mapping.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ValuesFile {
    #[validate(required)]
    pub ssm: Option<Mapping>,
}

pub fn load(path: &Path) -> Result<Mapping> {
    let contents = match fs::read_to_string(path) {
        Ok(raw_contents) => raw_contents,
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("values file {}", path.display())))
            }
            _ => return Err(Error::Io(error)),
        },
    };

    let file: ValuesFile = serde_yaml::from_str(&contents)?;
    if let Err(error) = file.validate() {
        return Err(Error::InvalidValues(error.to_string()));
    }

    return Ok(file.ssm.unwrap_or_default());
}

/// Removes a single leading and trailing slash if present.
pub fn trim_key(path: &str) -> &str {
    let path = path.strip_prefix('/').unwrap_or(path);
    path.strip_suffix('/').unwrap_or(path)
}

/// Normalizes to a leading-slash path: `a/b` => `/a/b`, `` => `/`.
pub fn norm_key(path: &str) -> String {
    format!("/{}", trim_key(path))
}

/// Flattens a nested mapping to `/`-delimited paths under `prefix`.
/// Scalar leaves only; sequences and nulls are rejected.
pub fn flatten(mapping: &Mapping, prefix: &str) -> Result<BTreeMap<String, String>> {
    let mut flat = BTreeMap::new();
    flatten_into(mapping, prefix, &mut flat)?;
    return Ok(flat);
}

fn flatten_into(
    mapping: &Mapping,
    prefix: &str,
    flat: &mut BTreeMap<String, String>,
) -> Result<()> {
    for (key, value) in mapping {
        let key = key.as_str().ok_or_else(|| {
            Error::InvalidValues(format!("non-string key under `{}`", prefix))
        })?;
        let path = format!("{}{}", prefix, key);
        match value {
            Value::Mapping(child) => flatten_into(child, &format!("{}/", path), flat)?,
            Value::String(text) => {
                flat.insert(path, text.clone());
            }
            Value::Number(number) => {
                flat.insert(path, number.to_string());
            }
            Value::Bool(flag) => {
                flat.insert(path, flag.to_string());
            }
            _ => {
                return Err(Error::InvalidValues(format!(
                    "unsupported value at `{}`",
                    path
                )))
            }
        }
    }
    Ok(())
}

/// Builds the nested single-path mapping for `path`:
/// `nest("a/b", v)` => `{a: {b: v}}`.
pub fn nest(path: &str, value: Value) -> Value {
    let mut child = value;
    for key in path.split('/').filter(|part| !part.is_empty()).rev() {
        let mut parent = Mapping::new();
        parent.insert(Value::String(key.to_string()), child);
        child = Value::Mapping(parent);
    }
    return child;
}

/// Recursively merges `src` into `dest`; scalars overwrite.
pub fn merge(src: &Mapping, dest: &mut Mapping) {
    for (key, value) in src {
        match value {
            Value::Mapping(child) => {
                if !matches!(dest.get(key), Some(Value::Mapping(_))) {
                    dest.insert(key.clone(), Value::Mapping(Mapping::new()));
                }
                if let Some(Value::Mapping(node)) = dest.get_mut(key) {
                    merge(child, node);
                }
            }
            _ => {
                dest.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Flattens the subtree at `root` (or the whole mapping), returning the
/// remote prefix alongside the flat map: root `a/b` yields prefix `/a/b/`.
pub fn flat_under_root(
    values: &Mapping,
    root: Option<&str>,
) -> Result<(String, BTreeMap<String, String>)> {
    let root = root.map(trim_key).filter(|r| !r.is_empty());
    let root = match root {
        None => return Ok(("/".to_string(), flatten(values, "/")?)),
        Some(root) => root,
    };

    let mut node = values;
    for part in root.split('/') {
        let key = Value::String(part.to_string());
        node = match node.get(&key) {
            Some(Value::Mapping(child)) => child,
            _ => return Err(Error::InvalidValues(format!("error locating `{}`", root))),
        };
    }

    let prefix = format!("/{}/", root);
    let flat = flatten(node, &prefix)?;
    return Ok((prefix, flat));
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use serde_yaml::{Mapping, Value};
    use tempfile::tempdir;

    use super::{flat_under_root, flatten, load, merge, nest, norm_key, trim_key};
    use crate::error::Error;

    fn mapping(text: &str) -> Mapping {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn file_does_not_exist() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("values.yml");

        let result = load(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::NotFound(_) => {}
            _ => panic!("Expected `NotFound` error"),
        }
    }

    #[test]
    fn file_wrong_format() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("values.yml");

        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[not, a, mapping]").unwrap();

        let result = load(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::Yaml(_) => {}
            _ => panic!("Expected `Yaml` error"),
        }
    }

    #[test]
    fn file_missing_ssm_key() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("values.yml");

        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "other: {{}}").unwrap();

        let result = load(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::InvalidValues(_) => {}
            _ => panic!("Expected `InvalidValues` error"),
        }
    }

    #[test]
    fn loads_the_values() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("values.yml");

        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "ssm:\n  app:\n    db: host").unwrap();

        let values = load(&file_path).unwrap();
        assert_eq!(false, values.is_empty());
    }

    #[test]
    fn trims_and_normalizes_keys() {
        assert_eq!(trim_key("/a/b/"), "a/b");
        assert_eq!(trim_key("a/b"), "a/b");
        assert_eq!(norm_key("a/b/"), "/a/b");
        assert_eq!(norm_key(""), "/");
    }

    #[test]
    fn flattens_nested_mappings() {
        let values = mapping("app:\n  db:\n    host: localhost\n    port: 5432\n  debug: true");
        let flat = flatten(&values, "/").unwrap();

        assert_eq!(flat.get("/app/db/host").unwrap(), "localhost");
        assert_eq!(flat.get("/app/db/port").unwrap(), "5432");
        assert_eq!(flat.get("/app/debug").unwrap(), "true");
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn flatten_rejects_sequences() {
        let values = mapping("app:\n  hosts:\n    - a\n    - b");
        let result = flatten(&values, "/");
        match result.err().unwrap() {
            Error::InvalidValues(message) => assert!(message.contains("/app/hosts")),
            _ => panic!("Expected `InvalidValues` error"),
        }
    }

    #[test]
    fn nest_builds_single_path() {
        let nested = nest("a/b", Value::String("x".to_string()));
        let expected: Value = serde_yaml::from_str("a:\n  b: x").unwrap();
        assert_eq!(nested, expected);
    }

    #[test]
    fn merge_combines_subtrees() {
        let mut dest = mapping("a:\n  b: one");
        let src = mapping("a:\n  c: two\nd: three");
        merge(&src, &mut dest);

        let expected = mapping("a:\n  b: one\n  c: two\nd: three");
        assert_eq!(dest, expected);
    }

    #[test]
    fn flatten_round_trips_through_nest_and_merge() {
        let values = mapping("app:\n  db:\n    host: localhost\n  name: orders");
        let flat = flatten(&values, "/").unwrap();

        let mut rebuilt = Mapping::new();
        for (path, value) in &flat {
            if let Value::Mapping(single) = nest(path, Value::String(value.clone())) {
                merge(&single, &mut rebuilt);
            }
        }

        assert_eq!(rebuilt, values);
    }

    #[test]
    fn flat_under_root_scopes_and_prefixes() {
        let values = mapping("app:\n  db:\n    host: localhost\nother: x");
        let (prefix, flat) = flat_under_root(&values, Some("app/db")).unwrap();

        assert_eq!(prefix, "/app/db/");
        assert_eq!(flat.get("/app/db/host").unwrap(), "localhost");
        assert_eq!(flat.len(), 1);
    }

    #[test]
    fn flat_under_root_missing_root() {
        let values = mapping("app: {}");
        let result = flat_under_root(&values, Some("absent"));
        assert_eq!(true, result.is_err());
    }
}
