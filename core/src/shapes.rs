//! The conservative shape-key heuristic used to pull declared file paths
//! out of free-form tool parameters. Deliberately narrow: an unrecognised
//! parameter shape is a `None`, which callers turn into a deny rather than
//! silently skipping the path firewall.

use serde_json::Value;

const SINGLE_PATH_KEYS: &[&str] = &["path", "filePath", "filename", "target", "dst", "to", "src", "from"];

fn as_path_str(v: &Value) -> Option<String> {
    v.as_str().map(str::to_string)
}

/// Extracts every declared path from a known shape. Returns `None` only
/// when none of the recognised keys are present anywhere relevant;
/// callers treat that as "unrecognised shape".
pub fn extract_declared_paths(params: &Value) -> Option<Vec<String>> {
    let obj = params.as_object()?;
    let mut found_any_key = false;
    let mut paths = Vec::new();

    for key in SINGLE_PATH_KEYS {
        if let Some(v) = obj.get(*key) {
            found_any_key = true;
            if let Some(p) = as_path_str(v) {
                paths.push(p);
            }
        }
    }

    if let Some(patches) = obj.get("patches").and_then(Value::as_array) {
        found_any_key = true;
        for patch in patches {
            if let Some(patch_obj) = patch.as_object() {
                for key in ["path", "filePath"] {
                    if let Some(p) = patch_obj.get(key).and_then(as_path_str) {
                        paths.push(p);
                    }
                }
            }
        }
    }

    if found_any_key {
        Some(paths)
    } else {
        None
    }
}
