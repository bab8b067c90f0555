//! Implements `qpub env`

use crate::config::Settings;

fn quote(value: &str) -> String {
    if value.is_empty() || value.contains(|c: char| c.is_whitespace() || "'\"$\\".contains(c)) {
        format!("'{}'", value.replace('\'', "'\\''"))
    } else {
        value.to_string()
    }
}

/// Shell `export` lines for the resolved settings
pub fn export_lines(settings: &Settings) -> Vec<String> {
    settings
        .dump()
        .into_iter()
        .map(|(key, value)| format!("export {}={}", key, quote(&value)))
        .collect()
}

pub fn execute_env(settings: &Settings) {
    for line in export_lines(settings) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_export_lines() {
        let settings = Settings {
            cache_dir: PathBuf::from("my cache"),
            ..Default::default()
        };
        let lines = export_lines(&settings);
        assert_eq!(lines[0], "export QPUB_BACKEND=flit");
        assert!(lines.contains(&"export QPUB_CACHE='my cache'".to_string()));
        assert!(lines.contains(&"export QPUB_CONDA=0".to_string()));
    }
}
