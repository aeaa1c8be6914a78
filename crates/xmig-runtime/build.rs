//! Build script for xmig-runtime
//!
//! Compile-time configuration:
//! 1. Start with library defaults
//! 2. If XMIG_CONFIG_RS is set, read the user's config file
//! 3. Merge user values over defaults (user wins, unknown names warn)
//! 4. Generate OUT_DIR/xmig_merged_config.rs
//!
//! The user file only lists what it changes, e.g.
//! ```text
//! pub const MAX_FRAMES: usize = 1024;
//! pub const STACK_SIZE: usize = 4 * 1024 * 1024;
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

struct ConfigParam {
    name: &'static str,
    rust_type: &'static str,
    default_value: &'static str,
}

const CONFIG_PARAMS: &[ConfigParam] = &[
    ConfigParam {
        name: "STACK_SIZE",
        rust_type: "usize",
        default_value: "1024 * 1024", // per stack half
    },
    ConfigParam {
        name: "MAX_FRAMES",
        rust_type: "usize",
        default_value: "512",
    },
    ConfigParam {
        name: "TRACE_CAPACITY",
        rust_type: "usize",
        default_value: "1024",
    },
    ConfigParam {
        name: "CAPTURE_HOST_STATE",
        rust_type: "bool",
        default_value: "true",
    },
    ConfigParam {
        name: "DEBUG_LOGGING",
        rust_type: "bool",
        default_value: "false",
    },
];

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let dest_path = Path::new(&out_dir).join("xmig_merged_config.rs");

    let mut config: BTreeMap<&str, String> = CONFIG_PARAMS
        .iter()
        .map(|p| (p.name, p.default_value.to_string()))
        .collect();

    let user_path = env::var("XMIG_CONFIG_RS").ok();
    if let Some(path) = &user_path {
        println!("cargo:rerun-if-changed={}", path);
        match fs::read_to_string(path) {
            Ok(content) => {
                for name in parse_and_merge(&content, &mut config) {
                    println!("cargo:warning=Unknown xmig config parameter: {}", name);
                }
                println!("cargo:warning=Using custom xmig config: {}", path);
            }
            Err(e) => {
                println!("cargo:warning=Failed to read XMIG_CONFIG_RS ({}): {}", path, e);
            }
        }
    }
    println!("cargo:rerun-if-env-changed=XMIG_CONFIG_RS");

    let output = generate_config(&config, user_path.as_deref());
    fs::write(&dest_path, output).expect("Failed to write merged config");
}

/// Merge `pub const NAME: TYPE = VALUE;` lines into `config`; returns
/// the names that are not known parameters
fn parse_and_merge(content: &str, config: &mut BTreeMap<&'static str, String>) -> Vec<String> {
    let mut unknown = Vec::new();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        let Some((name, value)) = parse_const_line(line) else {
            continue;
        };
        match CONFIG_PARAMS.iter().find(|p| p.name == name) {
            Some(param) => {
                config.insert(param.name, value);
            }
            None => unknown.push(name),
        }
    }
    unknown
}

fn parse_const_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("pub const ")?.trim();
    let colon = rest.find(':')?;
    let eq = rest.find('=')?;
    if eq < colon {
        return None;
    }
    let end = rest.rfind(';').unwrap_or(rest.len());
    let name = rest[..colon].trim().to_string();
    let value = rest[eq + 1..end].trim().to_string();
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name, value))
}

fn generate_config(config: &BTreeMap<&str, String>, user_path: Option<&str>) -> String {
    let mut output = String::new();
    output.push_str("// Auto-generated by xmig-runtime build.rs - do not edit\n");
    match user_path {
        Some(path) => output.push_str(&format!("// Library defaults merged with {}\n\n", path)),
        None => output.push_str("// Library defaults\n\n"),
    }
    for param in CONFIG_PARAMS {
        let value = config
            .get(param.name)
            .map(String::as_str)
            .unwrap_or(param.default_value);
        output.push_str(&format!(
            "pub const {}: {} = {};\n",
            param.name, param.rust_type, value
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_const_line() {
        assert_eq!(
            parse_const_line("pub const MAX_FRAMES: usize = 64;"),
            Some(("MAX_FRAMES".into(), "64".into()))
        );
        assert_eq!(
            parse_const_line("pub const STACK_SIZE: usize = 4 * 1024 * 1024;"),
            Some(("STACK_SIZE".into(), "4 * 1024 * 1024".into()))
        );
        assert_eq!(parse_const_line("const X: u8 = 1;"), None);
        assert_eq!(parse_const_line("pub const X = 1: u8;"), None);
    }

    #[test]
    fn test_merge_reports_unknown() {
        let mut config: BTreeMap<&'static str, String> = BTreeMap::new();
        config.insert("MAX_FRAMES", "512".into());
        let unknown = parse_and_merge(
            "// mine\npub const MAX_FRAMES: usize = 32;\npub const NUM_WORKERS: usize = 8;\n",
            &mut config,
        );
        assert_eq!(config.get("MAX_FRAMES"), Some(&"32".to_string()));
        assert_eq!(unknown, vec!["NUM_WORKERS".to_string()]);
    }
}
